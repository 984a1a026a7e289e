//! Bridge assembly. Wires the shared state, callbacks, relays and
//! lifecycle manager around a pair of transports.
//!
//! ```text
//!  WiredTransport ──▶ ┌───────────────────────────────────┐ ◀── WirelessTransport
//!                     │ Bridge                            │
//!                     │  BridgeState · BridgeCallbacks    │
//!                     │  Forwarder · OutboundRelay        │
//!                     │  DeviceLifecycleManager           │
//!                     └───────────────────────────────────┘
//! ```

use core::convert::Infallible;
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{error, info};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};

use super::inbound::{BridgeCallbacks, Forwarder};
use super::lifecycle::DeviceLifecycleManager;
use super::outbound::OutboundRelay;
use super::ports::{WiredTransport, WirelessTransport};
use super::state::BridgeState;

pub struct Bridge<W: WiredTransport, B: WirelessTransport> {
    config: BridgeConfig,
    state: Arc<BridgeState<W::Handle>>,
    callbacks: Arc<BridgeCallbacks<W::Handle>>,
    wired: Arc<W>,
    wireless: Arc<B>,
}

impl<W: WiredTransport, B: WirelessTransport> Bridge<W, B> {
    /// Validate `config` and build the shared state.
    pub fn new(config: BridgeConfig, wired: Arc<W>, wireless: Arc<B>) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(BridgeState::new());
        let callbacks = Arc::new(BridgeCallbacks::new(
            state.clone(),
            config.max_consecutive_driver_errors,
        ));
        Ok(Self {
            config,
            state,
            callbacks,
            wired,
            wireless,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<BridgeState<W::Handle>> {
        &self.state
    }

    /// Listener handed to the wired transport on every open.
    pub fn callbacks(&self) -> &Arc<BridgeCallbacks<W::Handle>> {
        &self.callbacks
    }

    /// Register the BLE UART service and start advertising.
    pub fn start_wireless(&self) -> Result<()> {
        self.wireless
            .start(&self.config.service_name)
            .map_err(|e| {
                error!("BLE: service start failed: {e}");
                Error::Init("BLE UART service")
            })?;
        info!("BLE: advertising as '{}'", self.config.service_name);
        Ok(())
    }

    pub fn forwarder(&self) -> Forwarder<B, W::Handle> {
        Forwarder::new(
            self.state.clone(),
            self.wireless.clone(),
            self.config.stats_interval_secs,
        )
    }

    pub fn outbound_relay(&self) -> OutboundRelay<W, B> {
        OutboundRelay::new(
            self.state.clone(),
            self.wired.clone(),
            self.wireless.clone(),
            self.config.tx_timeout_ms,
        )
    }

    pub fn lifecycle<D: DelayNs>(&self, delay: D) -> DeviceLifecycleManager<W, D> {
        DeviceLifecycleManager::new(
            &self.config,
            self.state.clone(),
            self.wired.clone(),
            self.callbacks.clone(),
            delay,
        )
    }

    /// Start the BLE service and both relay threads, then run the
    /// lifecycle loop on the calling thread. Only returns on startup failure.
    pub fn run<D: DelayNs>(self, delay: D) -> Result<Infallible> {
        self.start_wireless()?;
        self.forwarder()
            .spawn()
            .map_err(|_| Error::Init("forwarder thread"))?;
        self.outbound_relay()
            .spawn()
            .map_err(|_| Error::Init("outbound relay thread"))?;
        self.lifecycle(delay).run()
    }
}
