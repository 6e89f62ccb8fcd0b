//! HTTP(S) client adapter.
//!
//! Implements [`TransportPort`] with one request per connection.  Buffered
//! bodies are capped at [`MAX_BODY_SIZE`]; firmware images go through
//! `get_streaming` and never sit in memory whole.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::http::client` over
//!   mbedTLS, server certificates checked against the ESP-IDF CA bundle.
//! - **all other targets**: a route table filled by tests; unknown URLs
//!   fail with `ConnectFailed`.

use log::debug;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{BodySink, Response, TransportPort};
use crate::error::NetworkError;

/// Buffered bodies larger than this are refused.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Response headers the firmware inspects; everything else is dropped.
#[cfg(target_os = "espidf")]
const KEPT_HEADERS: [&str; 3] = ["Content-Type", "Content-Length", "X-firmware-version"];

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct HttpAdapter {
    timeout_ms: u32,
}

#[cfg(target_os = "espidf")]
impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            timeout_ms: crate::config::HTTP_TIMEOUT_MS,
        }
    }

    /// Send the request and read the response head.
    fn open(
        &mut self,
        method: esp_idf_svc::http::Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<(esp_idf_svc::http::client::EspHttpConnection, Response), NetworkError> {
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
        use esp_idf_svc::io::Write;

        let config = Configuration {
            timeout: Some(core::time::Duration::from_millis(u64::from(self.timeout_ms))),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut conn = EspHttpConnection::new(&config).map_err(|e| {
            warn!("HTTP: connection setup failed: {}", e);
            NetworkError::ConnectFailed
        })?;

        let len_header = body.map(|b| b.len().to_string());
        let mut all_headers: Vec<(&str, &str)> = headers.to_vec();
        if let Some(len) = len_header.as_deref() {
            all_headers.push(("Content-Length", len));
        }

        conn.initiate_request(method, url, &all_headers)
            .map_err(|_| NetworkError::ConnectFailed)?;
        if let Some(body) = body {
            conn.write_all(body).map_err(|_| NetworkError::Io)?;
        }
        conn.initiate_response().map_err(|_| NetworkError::Io)?;

        let mut head = Response::new(conn.status(), Vec::new());
        for name in KEPT_HEADERS {
            if let Some(value) = conn.header(name) {
                head.headers.push((name.to_owned(), value.to_owned()));
            }
        }
        Ok((conn, head))
    }

    fn exchange(
        &mut self,
        method: esp_idf_svc::http::Method,
        url: &str,
        headers: &[(&str, &str)],
        body: Option<&[u8]>,
    ) -> Result<Response, NetworkError> {
        use esp_idf_svc::io::Read;

        let (mut conn, mut resp) = self.open(method, url, headers, body)?;
        let mut buf = [0u8; READ_BLOCK];
        loop {
            let n = conn.read(&mut buf).map_err(|_| NetworkError::Io)?;
            if n == 0 {
                break;
            }
            if resp.body.len() + n > MAX_BODY_SIZE {
                return Err(NetworkError::ResponseTooLarge);
            }
            resp.body.extend_from_slice(&buf[..n]);
        }
        debug!("HTTP: {} -> {} ({} bytes)", url, resp.status, resp.body.len());
        Ok(resp)
    }
}

/// Bytes pulled off the connection per read.
#[cfg(target_os = "espidf")]
const READ_BLOCK: usize = 1024;

#[cfg(target_os = "espidf")]
impl TransportPort for HttpAdapter {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<Response, NetworkError> {
        self.exchange(esp_idf_svc::http::Method::Get, url, headers, None)
    }

    fn get_streaming(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        sink: &mut dyn BodySink,
    ) -> Result<Response, NetworkError> {
        use esp_idf_svc::io::Read;

        let (mut conn, head) = self.open(esp_idf_svc::http::Method::Get, url, headers, None)?;
        if !sink.start(&head) {
            return Ok(head);
        }
        let mut buf = [0u8; READ_BLOCK];
        let mut total = 0usize;
        loop {
            let n = conn.read(&mut buf).map_err(|_| NetworkError::Io)?;
            if n == 0 {
                break;
            }
            total += n;
            if !sink.data(&buf[..n]) {
                break;
            }
        }
        debug!("HTTP: {} -> {} ({} bytes streamed)", url, head.status, total);
        Ok(head)
    }

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Response, NetworkError> {
        self.exchange(esp_idf_svc::http::Method::Post, url, headers, Some(body))
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// One request as seen by the simulated server.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct HttpAdapter {
    routes: std::collections::HashMap<String, Response>,
    requests: Vec<SimRequest>,
}

#[cfg(not(target_os = "espidf"))]
impl HttpAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests whose URL (query string ignored) equals `url`.
    pub fn sim_route(&mut self, url: &str, response: Response) {
        self.routes.insert(url.to_owned(), response);
    }

    pub fn sim_requests(&self) -> &[SimRequest] {
        &self.requests
    }

    fn exchange(
        &mut self,
        method: &'static str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Response, NetworkError> {
        let resp = self.lookup(method, url, headers, body)?;
        if resp.body.len() > MAX_BODY_SIZE {
            return Err(NetworkError::ResponseTooLarge);
        }
        Ok(resp)
    }

    fn lookup(
        &mut self,
        method: &'static str,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Response, NetworkError> {
        self.requests.push(SimRequest {
            method,
            url: url.to_owned(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            body: body.to_vec(),
        });
        let path = url.split('?').next().unwrap_or(url);
        let resp = self
            .routes
            .get(path)
            .cloned()
            .ok_or(NetworkError::ConnectFailed)?;
        debug!("HTTP(sim): {} {} -> {}", method, url, resp.status);
        Ok(resp)
    }
}

#[cfg(not(target_os = "espidf"))]
impl TransportPort for HttpAdapter {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<Response, NetworkError> {
        self.exchange("GET", url, headers, &[])
    }

    fn get_streaming(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        sink: &mut dyn BodySink,
    ) -> Result<Response, NetworkError> {
        let resp = self.lookup("GET", url, headers, &[])?;
        Ok(crate::app::ports::replay_buffered(resp, sink))
    }

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Response, NetworkError> {
        self.exchange("POST", url, headers, body)
    }
}
