//! Bridge core: relay and lifecycle logic, no direct I/O.
//!
//! Both transports are reached only through the port traits in [`ports`],
//! so everything here runs against mocks on the host.

pub mod backoff;
pub mod inbound;
pub mod lifecycle;
pub mod outbound;
pub mod ports;
pub mod service;
pub mod state;
pub mod stats;

pub use inbound::{BridgeCallbacks, Forwarder};
pub use lifecycle::DeviceLifecycleManager;
pub use outbound::OutboundRelay;
pub use service::Bridge;
pub use state::{BridgeState, LinkState};
pub use stats::{RelayStats, StatsSnapshot};
