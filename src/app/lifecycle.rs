//! Wired device lifecycle: find, open, configure, publish, wait for loss,
//! close, repeat.
//!
//! ```text
//!   Searching ─▶ Opening ──fail──▶ (backoff) ─▶ Searching
//!                  │ ok
//!                  ▼ settle
//!               Configuring ──fail──▶ close ─▶ (backoff) ─▶ Searching
//!                  │ ok
//!                  ▼
//!               Connected ──disconnect signal──▶ Closing ─▶ Searching
//! ```
//!
//! Every failure flows back into the search loop; nothing here aborts.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{ConfigureError, DisconnectCause, Error, Result};
use crate::line_coding::LineCoding;

use super::backoff::Backoff;
use super::inbound::BridgeCallbacks;
use super::ports::{DeviceFilter, WiredListener, WiredTransport};
use super::state::{BridgeState, LinkState};

pub struct DeviceLifecycleManager<W: WiredTransport, D> {
    config: BridgeConfig,
    filter: DeviceFilter,
    state: Arc<BridgeState<W::Handle>>,
    wired: Arc<W>,
    callbacks: Arc<BridgeCallbacks<W::Handle>>,
    listener: Arc<dyn WiredListener>,
    delay: D,
    backoff: Backoff,
}

impl<W: WiredTransport, D: DelayNs> DeviceLifecycleManager<W, D> {
    pub fn new(
        config: &BridgeConfig,
        state: Arc<BridgeState<W::Handle>>,
        wired: Arc<W>,
        callbacks: Arc<BridgeCallbacks<W::Handle>>,
        delay: D,
    ) -> Self {
        let listener: Arc<dyn WiredListener> = callbacks.clone();
        Self {
            config: config.clone(),
            filter: DeviceFilter::new(config.vid, config.pid),
            state,
            wired,
            callbacks,
            listener,
            delay,
            backoff: Backoff::new(config.backoff_initial_ms, config.backoff_max_ms),
        }
    }

    /// Reconnect loop. Never returns.
    pub fn run(&mut self) -> ! {
        info!("Lifecycle: searching for radio {}", self.filter);
        loop {
            match self.run_cycle() {
                Ok(cause) => info!(
                    "Lifecycle: {}, searching again",
                    Error::UnexpectedDisconnect(cause)
                ),
                Err(e) => debug!("Lifecycle: cycle failed: {e}"),
            }
        }
    }

    /// One pass from Searching back to Searching.
    ///
    /// Returns the disconnect cause after a connected session, or the error
    /// that ended the attempt early (after the backoff delay has elapsed).
    pub fn run_cycle(&mut self) -> Result<DisconnectCause> {
        self.state.set_link_state(LinkState::Opening);
        self.callbacks.reset_errors();
        // Armed before open: the listener is live as soon as open returns.
        self.state.arm_disconnect();

        let handle = match self
            .wired
            .open(self.filter, self.config.open_timeout_ms, &self.listener)
        {
            Ok(h) => h,
            Err(e) => {
                self.state.disarm_disconnect();
                self.state.set_link_state(LinkState::Searching);
                self.state.stats().open_failures();
                let wait = self.backoff.next_delay_ms();
                warn!("USB: open {} failed: {e}, retry in {wait} ms", self.filter);
                self.delay.delay_ms(wait);
                return Err(e.into());
            }
        };

        info!("USB: radio {} opened", self.filter);
        self.delay.delay_ms(self.config.settle_delay_ms);
        self.state.set_link_state(LinkState::Configuring);

        let coding = match self.configure(&handle) {
            Ok(c) => c,
            Err(e) => {
                self.state.disarm_disconnect();
                self.close(handle);
                self.state.set_link_state(LinkState::Searching);
                let wait = self.backoff.next_delay_ms();
                warn!("USB: configure failed: {e}, retry in {wait} ms");
                self.delay.delay_ms(wait);
                return Err(e.into());
            }
        };

        self.state.publish(handle);
        self.state.stats().reconnects();
        self.backoff.reset();
        info!(
            "Connected to radio {} ({coding}, DTR={} RTS={})",
            self.filter, self.config.dtr as u8, self.config.rts as u8
        );

        let cause = self.state.wait_disconnect();
        warn!("USB: radio lost: {cause}");

        if let Some(handle) = self.state.withdraw() {
            self.close(handle);
        }
        self.state.set_link_state(LinkState::Searching);
        Ok(cause)
    }

    /// Apply the target line coding and control lines. Returns the coding
    /// the device reports afterwards.
    fn configure(&self, handle: &W::Handle) -> core::result::Result<LineCoding, ConfigureError> {
        let current = self
            .wired
            .line_coding(handle)
            .map_err(ConfigureError::GetLineCoding)?;
        debug!("USB: device line coding {current}");

        let requested = self.config.line_coding;
        self.wired
            .set_line_coding(handle, &requested)
            .map_err(ConfigureError::SetLineCoding)?;

        let reported = self
            .wired
            .line_coding(handle)
            .map_err(ConfigureError::ReadBack)?;
        if reported != requested {
            self.state.stats().line_coding_anomalies();
            warn!("USB: line coding mismatch, requested {requested}, device reports {reported}");
            if self.config.strict_line_coding {
                return Err(ConfigureError::Mismatch {
                    requested,
                    reported,
                });
            }
        }

        self.wired
            .set_control_lines(handle, self.config.dtr, self.config.rts)
            .map_err(ConfigureError::ControlLines)?;
        Ok(reported)
    }

    fn close(&self, handle: W::Handle) {
        if let Err(e) = self.wired.close(handle) {
            warn!("USB: close failed: {e}");
        }
    }
}
