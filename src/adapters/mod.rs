//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter     | Implements        | Connects to                    |
//! |-------------|-------------------|--------------------------------|
//! | `device_id` | -                 | eFuse MAC                      |
//! | `fs`        | StoragePort       | SPIFFS / in-memory map         |
//! | `http`      | TransportPort     | ESP-IDF HTTP client (TLS)      |
//! | `influx`    | TelemetrySink     | InfluxDB v2 write API          |
//! | `log_sink`  | EventSink         | Serial log output              |
//! | `ota`       | FirmwarePort      | `esp-ota` partition writer     |
//! | `power`     | PowerPort         | RTC memory, deep sleep         |
//! | `time`      | TimePort          | FreeRTOS delay, SNTP           |
//! | `wifi`      | ConnectivityPort  | ESP-IDF WiFi STA               |

pub mod device_id;
pub mod fs;
pub mod http;
pub mod influx;
pub mod log_sink;
pub mod ota;
pub mod power;
pub mod time;
pub(super) mod utils;
pub mod wifi;
