//! RadioBridge Firmware: Main Entry Point
//!
//! Makes a USB CDC-ACM radio reachable over a BLE UART service.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  CdcAcmHost (WiredTransport)     NordicUart (WirelessTransport)│
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Bridge: lifecycle (main task) · forwarder · outbound  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::Result;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};

use radiobridge::adapters::cdc_acm::CdcAcmHost;
use radiobridge::adapters::delay::PlatformDelay;
use radiobridge::adapters::nordic_uart::NordicUart;
use radiobridge::app::Bridge;
use radiobridge::config::BridgeConfig;

/// JSON override baked in at build time, e.g.
/// `RADIOBRIDGE_CONFIG='{"tx_timeout_ms":500}' cargo build`.
const CONFIG_OVERRIDE: Option<&str> = option_env!("RADIOBRIDGE_CONFIG");

fn load_config() -> BridgeConfig {
    match CONFIG_OVERRIDE.map(BridgeConfig::from_json) {
        Some(Ok(cfg)) => {
            info!("Config: build-time override applied");
            cfg
        }
        Some(Err(e)) => {
            warn!("Config: override rejected ({e}), using defaults");
            BridgeConfig::default()
        }
        None => BridgeConfig::default(),
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RadioBridge v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let config = load_config();
    info!(
        "Radio {:04X}:{:04X} @ {}, BLE name '{}'",
        config.vid, config.pid, config.line_coding, config.service_name
    );

    // ── 3. Transports ─────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let wired = Arc::new(CdcAcmHost::install(&config)?);
    let wireless = Arc::new(NordicUart::new(peripherals.modem, Some(nvs))?);

    // ── 4. Bridge: BLE service, relay threads, lifecycle loop ─
    let bridge = Bridge::new(config, wired, wireless)?;
    match bridge.run(PlatformDelay)? {}
}
