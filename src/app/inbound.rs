//! Wired → wireless path ("UART->BLE").
//!
//! [`BridgeCallbacks`] runs in the USB driver's event context: it copies each
//! received chunk into bounded [`Line`]s and hands them off through the
//! inbound channel with `try_send`, never blocking. A full channel drops the
//! line. [`Forwarder`] owns the other end on its own thread and pushes every
//! line to the BLE service, alongside the periodic statistics task.
//!
//! ```text
//!  USB driver ctx            forwarder thread (edge-executor)
//!  ┌──────────────┐  Line   ┌──────────────────────────────────┐
//!  │ on_data()    │──try──▶ │ forward_loop: receive → send_line │
//!  │ on_event()   │         │ stats_loop:   Timer → log         │
//!  └──────┬───────┘         └──────────────────────────────────┘
//!         └─ raise_disconnect ─▶ lifecycle manager
//! ```

use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::sync::Arc;

use embassy_sync::channel::TrySendError;
use log::{info, warn};

use crate::drivers::task_pin::{self, Core};
use crate::error::{Direction, DisconnectCause, Error, Result};
use crate::line::Line;

use super::ports::{DeviceEvent, WiredListener, WirelessTransport};
use super::state::BridgeState;
use super::stats::StatsSnapshot;

const TAG: &str = "UART->BLE";

// ── Driver-context callbacks ─────────────────────────────────

/// Listener registered with the wired transport on every open.
pub struct BridgeCallbacks<H> {
    state: Arc<BridgeState<H>>,
    consecutive_errors: AtomicU32,
    max_consecutive_errors: u32,
}

impl<H: Send> BridgeCallbacks<H> {
    pub fn new(state: Arc<BridgeState<H>>, max_consecutive_errors: u32) -> Self {
        Self {
            state,
            consecutive_errors: AtomicU32::new(0),
            max_consecutive_errors: max_consecutive_errors.max(1),
        }
    }

    /// Forget errors from a previous session.
    pub fn reset_errors(&self) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
    }

    fn on_driver_error(&self, code: i32) {
        self.state.stats().driver_errors();
        let n = self.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("USB: {} ({n}/{})", Error::DriverInternal(code), self.max_consecutive_errors);
        if n >= self.max_consecutive_errors
            && self.state.raise_disconnect(DisconnectCause::TransportFault(code))
        {
            warn!("USB: {n} consecutive driver errors, dropping device");
        }
    }
}

impl<H: Send> WiredListener for BridgeCallbacks<H> {
    fn on_data(&self, chunk: &[u8]) -> bool {
        self.consecutive_errors.store(0, Ordering::Relaxed);
        for line in Line::split(chunk) {
            if let Err(TrySendError::Full(line)) = self.state.inbound().try_send(line) {
                self.state.stats().inbound_dropped();
                warn!(target: TAG, "hand-off full, dropping {} bytes", line.len());
            }
        }
        true
    }

    fn on_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Disconnected => {
                info!("USB: device disconnected");
                self.state.raise_disconnect(DisconnectCause::Removed);
            }
            DeviceEvent::Error(code) => self.on_driver_error(code),
            DeviceEvent::SerialState(s) if s.has_line_error() => {
                warn!("USB: serial state {s}");
            }
            DeviceEvent::SerialState(s) => info!("USB: serial state {s}"),
            DeviceEvent::Unsupported(kind) => warn!("USB: unsupported CDC event {kind}"),
        }
    }
}

// ── Forwarder thread ─────────────────────────────────────────

pub struct Forwarder<B, H> {
    state: Arc<BridgeState<H>>,
    wireless: Arc<B>,
    stats_interval_secs: u32,
}

impl<B: WirelessTransport, H: Send + 'static> Forwarder<B, H> {
    pub fn new(state: Arc<BridgeState<H>>, wireless: Arc<B>, stats_interval_secs: u32) -> Self {
        Self {
            state,
            wireless,
            stats_interval_secs,
        }
    }

    /// Push one line to the BLE service. Failures are logged and counted,
    /// never retried.
    pub fn forward(&self, line: &Line) -> Result<()> {
        match self.wireless.send_line(line) {
            Ok(()) => {
                self.state.stats().inbound_forwarded();
                info!(target: TAG, "{}", line.display());
                Ok(())
            }
            Err(e) => {
                let err = Error::TransportSend(Direction::WiredToWireless, e);
                self.state.stats().inbound_failed();
                warn!(target: TAG, "{err}, dropping \"{}\"", line.display());
                Err(err)
            }
        }
    }

    /// Forward everything currently queued without waiting.
    /// Returns the number of lines taken off the channel.
    pub fn forward_pending(&self) -> usize {
        let mut n = 0;
        while let Ok(line) = self.state.inbound().try_receive() {
            // Logged and counted inside.
            let _ = self.forward(&line);
            n += 1;
        }
        n
    }

    async fn forward_loop(&self) {
        loop {
            let line = self.state.inbound().receive().await;
            let _ = self.forward(&line);
        }
    }

    async fn stats_loop(&self) {
        if self.stats_interval_secs == 0 {
            return core::future::pending().await;
        }
        let period = Duration::from_secs(u64::from(self.stats_interval_secs));
        let mut last = StatsSnapshot::default();
        loop {
            async_io_mini::Timer::after(period).await;
            let snap = self.state.stats().snapshot();
            if snap != last {
                info!("Stats: {snap} [link {}]", self.state.link_state());
                last = snap;
            }
        }
    }

    /// Drive both tasks on the calling thread. Never returns.
    pub fn run(&self) -> ! {
        let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
        executor.spawn(self.forward_loop()).detach();
        executor.spawn(self.stats_loop()).detach();

        info!("Forwarder started (stats every {}s)", self.stats_interval_secs);
        futures_lite::future::block_on(executor.run(core::future::pending::<()>()));
        unreachable!("forwarder executor exited")
    }

    /// Run the forwarder on its own thread, pinned next to the BLE stack.
    pub fn spawn(self) -> std::io::Result<std::thread::JoinHandle<()>> {
        task_pin::spawn_on_core(Core::Pro, 10, 6, "uart-ble\0", move || self.run())
    }
}
