//! Port traits: the hexagonal boundary between the bridge core and the
//! two serial transports.
//!
//! ```text
//!   CdcAcmHost ──▶ WiredTransport ──▶ ┌──────────────┐ ◀── WirelessTransport ◀── NordicUart
//!                  WiredListener  ◀── │ bridge core  │
//!                                     └──────────────┘
//! ```
//!
//! Adapters implement these traits; the lifecycle manager and both relays
//! consume them via generics, so the core never touches the USB host or
//! BLE stacks directly and runs against mocks on the host.

use core::fmt;
use core::time::Duration;

use crate::error::{OpenError, TransportError};
use crate::line::Line;
use crate::line_coding::LineCoding;

// ───────────────────────────────────────────────────────────────
// Device selection
// ───────────────────────────────────────────────────────────────

/// VID/PID pair a wired device must match exactly to be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vid: u16,
    pub pid: u16,
}

impl DeviceFilter {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }

    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}:0x{:04X}", self.vid, self.pid)
    }
}

// ───────────────────────────────────────────────────────────────
// Device events (driver context → core)
// ───────────────────────────────────────────────────────────────

/// CDC `SERIAL_STATE` notification bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerialState(pub u16);

impl SerialState {
    const FLAGS: [(u16, &'static str); 7] = [
        (1 << 0, "DCD"),
        (1 << 1, "DSR"),
        (1 << 2, "BREAK"),
        (1 << 3, "RING"),
        (1 << 4, "FRAMING"),
        (1 << 5, "PARITY"),
        (1 << 6, "OVERRUN"),
    ];
    const ERROR_MASK: u16 = (1 << 4) | (1 << 5) | (1 << 6);

    /// Framing, parity or overrun error reported by the device.
    pub fn has_line_error(self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }

    /// Names of every set flag, in bit order.
    pub fn flag_names(self) -> impl Iterator<Item = &'static str> {
        Self::FLAGS
            .into_iter()
            .filter(move |(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| name)
    }
}

impl fmt::Display for SerialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} [", self.0)?;
        for (i, name) in self.flag_names().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
        }
        f.write_str("]")
    }
}

/// Events the wired driver reports outside the data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Driver-internal error, usually local to one transfer.
    Error(i32),
    /// The device left the bus.
    Disconnected,
    /// Serial state notification from the device.
    SerialState(SerialState),
    /// Any other CDC notification (raw driver event kind).
    Unsupported(i32),
}

/// Callbacks the wired driver invokes from its own event context.
///
/// Implementations must return promptly and never block.
pub trait WiredListener: Send + Sync {
    /// One received chunk. Returns `true` once the chunk is fully consumed.
    fn on_data(&self, chunk: &[u8]) -> bool;

    fn on_event(&self, event: DeviceEvent);
}

// ───────────────────────────────────────────────────────────────
// Wired transport (USB CDC-ACM host)
// ───────────────────────────────────────────────────────────────

/// Primitives of the USB CDC-ACM host driver.
pub trait WiredTransport: Send + Sync + 'static {
    /// An open device session.
    type Handle: Send + 'static;

    /// Open the first device matching `filter`, waiting up to `timeout_ms`
    /// for it to enumerate. `listener` receives data and events until the
    /// handle is closed.
    fn open(
        &self,
        filter: DeviceFilter,
        timeout_ms: u32,
        listener: &std::sync::Arc<dyn WiredListener>,
    ) -> Result<Self::Handle, OpenError>;

    fn close(&self, handle: Self::Handle) -> Result<(), TransportError>;

    fn line_coding(&self, handle: &Self::Handle) -> Result<LineCoding, TransportError>;

    fn set_line_coding(
        &self,
        handle: &Self::Handle,
        coding: &LineCoding,
    ) -> Result<(), TransportError>;

    fn set_control_lines(
        &self,
        handle: &Self::Handle,
        dtr: bool,
        rts: bool,
    ) -> Result<(), TransportError>;

    /// Send `data`, blocking until the transfer completes or `timeout_ms`
    /// elapses.
    fn send_blocking(
        &self,
        handle: &Self::Handle,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Wireless transport (BLE UART service)
// ───────────────────────────────────────────────────────────────

/// Primitives of the BLE UART service.
///
/// Received data is lent out as [`Item`](Self::Item)s that remain owned by
/// the transport's queue storage until handed back through
/// [`release`](Self::release).
pub trait WirelessTransport: Send + Sync + 'static {
    type Item: AsRef<[u8]> + Send;

    /// Register the service and start advertising as `service_name`.
    fn start(&self, service_name: &str) -> Result<(), TransportError>;

    /// Send one line to the connected client.
    fn send_line(&self, line: &Line) -> Result<(), TransportError>;

    /// Dequeue the next received item, waiting up to `timeout`
    /// (`None` waits forever). Returns `None` on timeout.
    fn receive(&self, timeout: Option<Duration>) -> Option<Self::Item>;

    /// Return a dequeued item to the queue storage.
    fn release(&self, item: Self::Item);
}
