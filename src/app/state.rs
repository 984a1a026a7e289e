//! Shared coordination state between the lifecycle manager, the driver
//! callbacks and both relays.
//!
//! ```text
//!                      ┌────────────────────────────────────────┐
//!  lifecycle ─publish─▶│ device: Mutex<Option<H>> + Condvar     │◀─with_device── outbound relay
//!            ─close───▶│ link:   AtomicU8 (LinkState)           │
//!                      │ disconnect: Signal + armed flag        │◀─raise──────── driver callbacks
//!                      │ inbound: Channel<Line, 16>             │◀─try_send───── driver callbacks
//!                      └────────────────────────────────────────┘──receive─────▶ forwarder task
//! ```
//!
//! Only the lifecycle manager publishes or removes the device handle.
//! The device lock is held for the whole duration of a blocking send, so a
//! handle is never closed while a transfer against it is in flight. The
//! link state is published lock-free and flips to [`LinkState::Closing`]
//! before the lock is taken, so relays stop starting new sends at once.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use core::time::Duration;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

use crate::config::INBOUND_QUEUE_DEPTH;
use crate::error::{DisconnectCause, TransportError};
use crate::line::Line;

use super::stats::RelayStats;

/// Wired link state, as driven by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Searching = 0,
    Opening = 1,
    Configuring = 2,
    Connected = 3,
    Closing = 4,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Opening,
            2 => Self::Configuring,
            3 => Self::Connected,
            4 => Self::Closing,
            _ => Self::Searching,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Searching => "SEARCHING",
            Self::Opening => "OPENING",
            Self::Configuring => "CONFIGURING",
            Self::Connected => "CONNECTED",
            Self::Closing => "CLOSING",
        };
        f.write_str(name)
    }
}

pub type InboundChannel = Channel<CriticalSectionRawMutex, Line, INBOUND_QUEUE_DEPTH>;

pub struct BridgeState<H> {
    link: AtomicU8,
    device: Mutex<Option<H>>,
    connected: Condvar,
    disconnect: Signal<CriticalSectionRawMutex, DisconnectCause>,
    disconnect_armed: AtomicBool,
    inbound: InboundChannel,
    stats: RelayStats,
}

impl<H> BridgeState<H> {
    pub fn new() -> Self {
        Self {
            link: AtomicU8::new(LinkState::Searching as u8),
            device: Mutex::new(None),
            connected: Condvar::new(),
            disconnect: Signal::new(),
            disconnect_armed: AtomicBool::new(false),
            inbound: Channel::new(),
            stats: RelayStats::default(),
        }
    }

    pub fn link_state(&self) -> LinkState {
        LinkState::from_u8(self.link.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn inbound(&self) -> &InboundChannel {
        &self.inbound
    }

    // ── Lifecycle side ────────────────────────────────────────

    pub(crate) fn set_link_state(&self, state: LinkState) {
        self.link.store(state as u8, Ordering::Release);
    }

    /// Clear any stale disconnect and accept exactly one new one.
    pub(crate) fn arm_disconnect(&self) {
        self.disconnect.reset();
        self.disconnect_armed.store(true, Ordering::Release);
    }

    /// Stop accepting disconnects for the current session.
    pub(crate) fn disarm_disconnect(&self) {
        self.disconnect_armed.store(false, Ordering::Release);
        self.disconnect.reset();
    }

    /// Make `handle` the current device and wake relays waiting for it.
    pub(crate) fn publish(&self, handle: H) {
        let mut slot = self.lock_device();
        *slot = Some(handle);
        self.set_link_state(LinkState::Connected);
        drop(slot);
        self.connected.notify_all();
    }

    /// Withdraw the current device. Blocks until any in-flight send ends.
    pub(crate) fn withdraw(&self) -> Option<H> {
        self.set_link_state(LinkState::Closing);
        self.lock_device().take()
    }

    /// Block until the armed disconnect is raised.
    pub(crate) fn wait_disconnect(&self) -> DisconnectCause {
        futures_lite::future::block_on(self.disconnect.wait())
    }

    // ── Driver callback side ──────────────────────────────────

    /// Raise the disconnect signal. Only the first raise per armed session
    /// takes effect; returns whether this call raised it.
    pub fn raise_disconnect(&self, cause: DisconnectCause) -> bool {
        if self.disconnect_armed.swap(false, Ordering::AcqRel) {
            self.disconnect.signal(cause);
            true
        } else {
            false
        }
    }

    // ── Relay side ────────────────────────────────────────────

    /// Wait until a device is published. `None` waits forever.
    /// Returns whether a device is present.
    pub fn wait_connected(&self, timeout: Option<Duration>) -> bool {
        let slot = self.lock_device();
        match timeout {
            None => self
                .connected
                .wait_while(slot, |s| s.is_none())
                .unwrap_or_else(PoisonError::into_inner)
                .is_some(),
            Some(t) => self
                .connected
                .wait_timeout_while(slot, t, |s| s.is_none())
                .unwrap_or_else(PoisonError::into_inner)
                .0
                .is_some(),
        }
    }

    /// Run `f` against the current device while holding the device lock.
    /// A missing or closing device is reported as `NotConnected`.
    pub fn with_device<R>(&self, f: impl FnOnce(&H) -> R) -> Result<R, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let slot = self.lock_device();
        // Closing may have started while we waited for the lock.
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        slot.as_ref().map(f).ok_or(TransportError::NotConnected)
    }

    fn lock_device(&self) -> MutexGuard<'_, Option<H>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H> Default for BridgeState<H> {
    fn default() -> Self {
        Self::new()
    }
}
