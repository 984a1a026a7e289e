//! Wireless → wired path ("BLE->UART").
//!
//! A long-lived thread that sleeps on the connection condvar until a radio
//! is published, then takes one item at a time off the BLE receive queue and
//! writes it to the radio with a bounded blocking send. Queue waits are
//! bounded by [`CONNECTION_RECHECK`], so after an unplug new items stay in
//! the BLE queue until the next radio is connected. The item is returned
//! to the BLE queue exactly once whatever happens to it.

use core::time::Duration;
use std::sync::Arc;

use log::{info, warn};

use crate::drivers::task_pin::{self, Core};
use crate::error::{Direction, Error, Result, TransportError};
use crate::line::Line;

use super::ports::{WiredTransport, WirelessTransport};
use super::state::BridgeState;
use super::stats::RelayStats;

const TAG: &str = "BLE->UART";

/// Longest the relay blocks on the BLE queue before re-checking that a
/// radio is still connected.
pub const CONNECTION_RECHECK: Duration = Duration::from_millis(200);

/// A dequeued item that goes back to the transport when dropped.
struct Lent<'a, B: WirelessTransport> {
    wireless: &'a B,
    stats: &'a RelayStats,
    item: Option<B::Item>,
}

impl<B: WirelessTransport> Lent<'_, B> {
    fn bytes(&self) -> &[u8] {
        match &self.item {
            Some(item) => item.as_ref(),
            None => &[],
        }
    }
}

impl<B: WirelessTransport> Drop for Lent<'_, B> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.wireless.release(item);
            self.stats.items_released();
        }
    }
}

pub struct OutboundRelay<W: WiredTransport, B> {
    state: Arc<BridgeState<W::Handle>>,
    wired: Arc<W>,
    wireless: Arc<B>,
    tx_timeout_ms: u32,
}

impl<W: WiredTransport, B: WirelessTransport> OutboundRelay<W, B> {
    pub fn new(
        state: Arc<BridgeState<W::Handle>>,
        wired: Arc<W>,
        wireless: Arc<B>,
        tx_timeout_ms: u32,
    ) -> Self {
        Self {
            state,
            wired,
            wireless,
            tx_timeout_ms,
        }
    }

    /// Write one dequeued item to the radio, releasing it afterwards.
    /// Stops at the first line that cannot be delivered; the rest of the
    /// item is dropped with it.
    pub fn forward(&self, item: B::Item) -> Result<()> {
        let lent = Lent {
            wireless: &*self.wireless,
            stats: self.state.stats(),
            item: Some(item),
        };
        for line in Line::split(lent.bytes()) {
            self.send(&line)
                .map_err(|e| Error::TransportSend(Direction::WirelessToWired, e))?;
        }
        Ok(())
    }

    fn send(&self, line: &Line) -> core::result::Result<(), TransportError> {
        let sent = self.state.with_device(|handle| {
            self.wired
                .send_blocking(handle, line.as_bytes(), self.tx_timeout_ms)
        });
        match sent {
            Ok(Ok(())) => {
                self.state.stats().outbound_sent();
                info!(target: TAG, "{}", line.display());
                Ok(())
            }
            Ok(Err(e)) => {
                self.state.stats().outbound_failed();
                warn!(target: TAG, "send failed ({e}), dropping \"{}\"", line.display());
                Err(e)
            }
            Err(e) => {
                self.state.stats().outbound_dropped();
                warn!(target: TAG, "radio {e}, dropping \"{}\"", line.display());
                Err(e)
            }
        }
    }

    /// Take at most one item off the BLE queue and forward it.
    /// Returns `false` if nothing arrived within `timeout`.
    pub fn pump_once(&self, timeout: Option<Duration>) -> bool {
        match self.wireless.receive(timeout) {
            Some(item) => {
                // Errors are logged and counted inside.
                let _ = self.forward(item);
                true
            }
            None => false,
        }
    }

    pub fn run(&self) -> ! {
        info!("Outbound relay started (tx timeout {} ms)", self.tx_timeout_ms);
        loop {
            self.state.wait_connected(None);
            self.pump_once(Some(CONNECTION_RECHECK));
        }
    }

    /// Run the relay on its own thread. This is the only thread that
    /// performs blocking sends to the radio.
    pub fn spawn(self) -> std::io::Result<std::thread::JoinHandle<()>> {
        task_pin::spawn_on_core(Core::App, 8, 6, "ble-uart\0", move || self.run())
    }
}
