//! Unified error types for the bridge firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! lifecycle loop's retry path handles every failure kind uniformly.
//! All variants are `Copy`: they travel through callbacks and log lines
//! without allocation.

use core::fmt;

use crate::line_coding::LineCoding;

// ---------------------------------------------------------------------------
// Top-level bridge error
// ---------------------------------------------------------------------------

/// Every fallible bridge operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The wired device could not be opened (retried by the lifecycle loop).
    DeviceOpen(OpenError),
    /// The wired device opened but could not be configured (retried).
    DeviceConfig(ConfigureError),
    /// A relay send failed; the message is dropped.
    TransportSend(Direction, TransportError),
    /// The wired device left the bus or its transport faulted.
    UnexpectedDisconnect(DisconnectCause),
    /// The CDC-ACM driver reported an internal error code.
    DriverInternal(i32),
    /// Platform initialisation failed.
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceOpen(e) => write!(f, "device open: {e}"),
            Self::DeviceConfig(e) => write!(f, "device config: {e}"),
            Self::TransportSend(dir, e) => write!(f, "{dir} send: {e}"),
            Self::UnexpectedDisconnect(cause) => write!(f, "disconnect: {cause}"),
            Self::DriverInternal(code) => write!(f, "driver error {code}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Relay direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// USB radio → BLE client.
    WiredToWireless,
    /// BLE client → USB radio.
    WirelessToWired,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WiredToWireless => write!(f, "UART->BLE"),
            Self::WirelessToWired => write!(f, "BLE->UART"),
        }
    }
}

// ---------------------------------------------------------------------------
// Open errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenError {
    /// No device matching the VID/PID filter appeared within the timeout.
    NotFound,
    /// The device appeared but did not finish enumeration in time.
    Timeout,
    /// Driver returned an error code.
    Driver(i32),
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no matching device"),
            Self::Timeout => write!(f, "timed out"),
            Self::Driver(code) => write!(f, "driver error {code}"),
        }
    }
}

impl From<OpenError> for Error {
    fn from(e: OpenError) -> Self {
        Self::DeviceOpen(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors (control requests and data sends)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No device / client is connected, or it is being closed.
    NotConnected,
    /// The operation did not complete within its timeout.
    Timeout,
    /// The peer rejected the request (e.g. STALL on a class request).
    Rejected,
    /// Driver returned an error code.
    Driver(i32),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Timeout => write!(f, "timed out"),
            Self::Rejected => write!(f, "rejected by peer"),
            Self::Driver(code) => write!(f, "driver error {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Failure of one step of the post-open configuration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureError {
    GetLineCoding(TransportError),
    SetLineCoding(TransportError),
    ReadBack(TransportError),
    /// Device reports a line coding other than the one requested.
    Mismatch {
        requested: LineCoding,
        reported: LineCoding,
    },
    ControlLines(TransportError),
}

impl fmt::Display for ConfigureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetLineCoding(e) => write!(f, "get line coding: {e}"),
            Self::SetLineCoding(e) => write!(f, "set line coding: {e}"),
            Self::ReadBack(e) => write!(f, "line coding read-back: {e}"),
            Self::Mismatch {
                requested,
                reported,
            } => write!(f, "line coding mismatch: requested {requested}, device reports {reported}"),
            Self::ControlLines(e) => write!(f, "set control lines: {e}"),
        }
    }
}

impl From<ConfigureError> for Error {
    fn from(e: ConfigureError) -> Self {
        Self::DeviceConfig(e)
    }
}

// ---------------------------------------------------------------------------
// Disconnect causes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The driver reported the device left the bus.
    Removed,
    /// Too many consecutive driver errors; the last code is carried.
    TransportFault(i32),
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => write!(f, "device removed"),
            Self::TransportFault(code) => write!(f, "transport fault (last error {code})"),
        }
    }
}

impl From<DisconnectCause> for Error {
    fn from(cause: DisconnectCause) -> Self {
        Self::UnexpectedDisconnect(cause)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
