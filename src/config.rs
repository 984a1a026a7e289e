//! Bridge configuration parameters
//!
//! Compile-time constants for the radio and the BLE service, plus the
//! tunable [`BridgeConfig`]. The firmware starts from
//! [`BridgeConfig::default()`] and may apply a JSON override baked in at
//! build time (see `main.rs`).

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::line_coding::LineCoding;

/// USB vendor ID of the MD9600 radio's CDC interface.
pub const TARGET_VID: u16 = 0x1FC9;
/// USB product ID of the MD9600 radio's CDC interface.
pub const TARGET_PID: u16 = 0x0094;

/// Upper bound on a single relayed line (payload bytes, excluding NUL).
pub const MAX_LINE_LEN: usize = 256;

/// Depth of the wired→wireless hand-off channel, in lines.
pub const INBOUND_QUEUE_DEPTH: usize = 16;

/// Longest advertised name that still fits a legacy advertising packet.
pub const MAX_SERVICE_NAME_LEN: usize = 29;

/// Core bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    // --- Wired device ---
    /// Vendor ID the lifecycle manager opens.
    pub vid: u16,
    /// Product ID the lifecycle manager opens.
    pub pid: u16,
    /// Line coding applied after every open.
    pub line_coding: LineCoding,
    /// Level driven on DTR once configured.
    pub dtr: bool,
    /// Level driven on RTS once configured.
    pub rts: bool,
    /// Fail configuration when the read-back coding differs from the request.
    pub strict_line_coding: bool,

    // --- Timing ---
    /// How long `open` waits for a matching device to enumerate.
    pub open_timeout_ms: u32,
    /// Pause between a successful open and the first control request.
    pub settle_delay_ms: u32,
    /// Timeout for one blocking BLE→USB send.
    pub tx_timeout_ms: u32,
    /// First retry delay after a failed open/configure.
    pub backoff_initial_ms: u32,
    /// Retry delay ceiling.
    pub backoff_max_ms: u32,
    /// Period of the relay statistics log line (0 disables it).
    pub stats_interval_secs: u32,

    // --- Driver ---
    /// USB IN transfer buffer size handed to the CDC-ACM driver.
    pub usb_in_buffer_size: usize,
    /// USB OUT transfer buffer size handed to the CDC-ACM driver.
    pub usb_out_buffer_size: usize,
    /// Consecutive driver errors treated as a lost device.
    pub max_consecutive_driver_errors: u32,

    // --- BLE ---
    /// Advertised name of the Nordic UART service.
    pub service_name: heapless::String<MAX_SERVICE_NAME_LEN>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut service_name = heapless::String::new();
        // Fits: 9 bytes into a 29-byte string.
        let _ = service_name.push_str("DMR-RADIO");

        Self {
            vid: TARGET_VID,
            pid: TARGET_PID,
            line_coding: LineCoding::default(),
            dtr: true,
            rts: false,
            strict_line_coding: false,

            open_timeout_ms: 1000,
            settle_delay_ms: 100,
            tx_timeout_ms: 1000,
            backoff_initial_ms: 250,
            backoff_max_ms: 8000,
            stats_interval_secs: 60,

            usb_in_buffer_size: 512,
            usb_out_buffer_size: 512,
            max_consecutive_driver_errors: 3,

            service_name,
        }
    }
}

impl BridgeConfig {
    /// Parse a (possibly partial) JSON override; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|_| Error::Config("malformed JSON override"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.line_coding.baud_rate == 0 {
            return Err(Error::Config("baud rate must be non-zero"));
        }
        if self.tx_timeout_ms == 0 {
            return Err(Error::Config("tx timeout must be non-zero"));
        }
        if self.backoff_initial_ms == 0 || self.backoff_initial_ms > self.backoff_max_ms {
            return Err(Error::Config("backoff bounds must satisfy 0 < initial <= max"));
        }
        if self.max_consecutive_driver_errors == 0 {
            return Err(Error::Config("driver error threshold must be non-zero"));
        }
        if self.usb_in_buffer_size == 0 || self.usb_out_buffer_size == 0 {
            return Err(Error::Config("USB buffer sizes must be non-zero"));
        }
        if self.service_name.is_empty() {
            return Err(Error::Config("service name must not be empty"));
        }
        Ok(())
    }
}
