//! Unified error types for the sensor node firmware.
//!
//! A single `Error` enum that every subsystem converts into, one variant per
//! failure category.  Every category is absorbed and logged by the lifecycle
//! controller; only an OTA attempt ends a wake cycle early (by rebooting).
//! All variants are `Copy` so they can be passed around and logged without
//! allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A configuration document is unreadable or corrupt.
    Config(ConfigError),
    /// Association or transport failure.
    Network(NetworkError),
    /// Firmware fetch/apply failure.
    Ota(OtaError),
    /// Telemetry publish/flush failure.
    Telemetry(TelemetryError),
    /// Unknown sensor type or instantiation failure.
    Sensor(SensorError),
    /// The persistent store failed.
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Telemetry(e) => write!(f, "telemetry: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No document in storage (first boot).
    NotFound,
    /// Document failed to parse against the expected schema.
    Malformed,
    /// The control-server URL is unusable.
    InvalidControlUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "document not found"),
            Self::Malformed => write!(f, "document malformed"),
            Self::InvalidControlUrl => write!(f, "invalid control server URL"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Network errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// Association did not complete within the poll budget.
    AssociationTimeout,
    /// WiFi credentials rejected before association started.
    InvalidCredentials,
    /// The HTTP/TLS connection could not be established.
    ConnectFailed,
    /// Request sent but the exchange failed mid-way.
    Io,
    /// Response body exceeded the transport's size limit.
    ResponseTooLarge,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssociationTimeout => write!(f, "association budget exhausted"),
            Self::InvalidCredentials => write!(f, "invalid WiFi credentials"),
            Self::ConnectFailed => write!(f, "connection failed"),
            Self::Io => write!(f, "transport I/O error"),
            Self::ResponseTooLarge => write!(f, "response too large"),
        }
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

// ---------------------------------------------------------------------------
// OTA errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    AlreadyInProgress,
    InvalidSize,
    BeginFailed,
    WriteFailed,
    VerifyFailed,
    BootSetFailed,
    IncompleteTransfer,
    NotReceiving,
    Overflow,
    /// Firmware endpoint could not be reached.
    FetchFailed,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "OTA session already in progress"),
            Self::InvalidSize => write!(f, "firmware size out of range"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::VerifyFailed => write!(f, "OTA verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::IncompleteTransfer => write!(f, "finalize called before all bytes written"),
            Self::NotReceiving => write!(f, "operation requires an open OTA session"),
            Self::Overflow => write!(f, "chunk would exceed declared firmware size"),
            Self::FetchFailed => write!(f, "firmware fetch failed"),
        }
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

// ---------------------------------------------------------------------------
// Telemetry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    /// Sink was never opened (offline cycle).
    NotOpen,
    /// Write buffer is full; the point was dropped.
    BufferFull,
    /// The endpoint refused or failed the write.
    FlushFailed,
    /// A point could not be encoded.
    InvalidPoint,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => write!(f, "sink not open"),
            Self::BufferFull => write!(f, "buffer full"),
            Self::FlushFailed => write!(f, "flush failed"),
            Self::InvalidPoint => write!(f, "invalid point"),
        }
    }
}

impl From<TelemetryError> for Error {
    fn from(e: TelemetryError) -> Self {
        Self::Telemetry(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Descriptor has no `type` field.
    MissingType,
    /// No factory registered for the descriptor's type.
    UnknownType,
    /// A descriptor parameter is out of range or has the wrong type.
    InvalidParameter(&'static str),
    /// Bus transaction failed (ADC, I2C, 1-Wire).
    BusError,
    /// Data integrity check failed.
    CrcMismatch,
    /// Device did not answer at the configured address.
    NotPresent,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingType => write!(f, "descriptor has no type"),
            Self::UnknownType => write!(f, "unknown sensor type"),
            Self::InvalidParameter(p) => write!(f, "invalid parameter '{p}'"),
            Self::BusError => write!(f, "bus error"),
            Self::CrcMismatch => write!(f, "CRC mismatch"),
            Self::NotPresent => write!(f, "device not present"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file does not exist.
    NotFound,
    /// Partition is full.
    Full,
    /// Generic I/O error.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::Full => write!(f, "storage full"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
