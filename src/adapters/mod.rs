//! Adapters: concrete implementations of the bridge port traits.
//!
//! | Adapter       | Implements        | Connects to                      |
//! |---------------|-------------------|----------------------------------|
//! | `cdc_acm`     | WiredTransport    | ESP-IDF USB host + CDC-ACM driver|
//! | `nordic_uart` | WirelessTransport | Bluedroid GATT server (NUS)      |
//! | `delay`       | DelayNs           | FreeRTOS / thread sleep          |
//! | `time_driver` | embassy-time      | esp_timer / `Instant`            |

pub mod cdc_acm;
pub mod delay;
pub mod nordic_uart;
pub mod time_driver;
