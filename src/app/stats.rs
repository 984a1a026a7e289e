//! Relay counters.
//!
//! Plain relaxed atomics: every counter is bumped from exactly one context
//! and only read for the periodic log line and tests.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct RelayStats {
    inbound_forwarded: AtomicU32,
    inbound_dropped: AtomicU32,
    inbound_failed: AtomicU32,
    outbound_sent: AtomicU32,
    outbound_dropped: AtomicU32,
    outbound_failed: AtomicU32,
    items_released: AtomicU32,
    open_failures: AtomicU32,
    reconnects: AtomicU32,
    driver_errors: AtomicU32,
    line_coding_anomalies: AtomicU32,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Lines handed to the BLE service.
    pub inbound_forwarded: u32,
    /// Lines lost because the hand-off channel was full.
    pub inbound_dropped: u32,
    /// Lines the BLE service refused.
    pub inbound_failed: u32,
    /// Lines written to the radio.
    pub outbound_sent: u32,
    /// Lines discarded because no radio was connected.
    pub outbound_dropped: u32,
    /// Lines whose USB send timed out or failed.
    pub outbound_failed: u32,
    /// Queue items returned to the BLE service.
    pub items_released: u32,
    pub open_failures: u32,
    /// Successful transitions into the connected state.
    pub reconnects: u32,
    pub driver_errors: u32,
    pub line_coding_anomalies: u32,
}

macro_rules! counters {
    ($($name:ident),* $(,)?) => {
        impl RelayStats {
            $(
                pub(crate) fn $name(&self) {
                    self.$name.fetch_add(1, Ordering::Relaxed);
                }
            )*

            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters!(
    inbound_forwarded,
    inbound_dropped,
    inbound_failed,
    outbound_sent,
    outbound_dropped,
    outbound_failed,
    items_released,
    open_failures,
    reconnects,
    driver_errors,
    line_coding_anomalies,
);

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UART->BLE fwd={} drop={} fail={} | BLE->UART sent={} drop={} fail={} rel={} | \
             links={} open_fail={} drv_err={} lc_anom={}",
            self.inbound_forwarded,
            self.inbound_dropped,
            self.inbound_failed,
            self.outbound_sent,
            self.outbound_dropped,
            self.outbound_failed,
            self.items_released,
            self.reconnects,
            self.open_failures,
            self.driver_errors,
            self.line_coding_anomalies,
        )
    }
}
