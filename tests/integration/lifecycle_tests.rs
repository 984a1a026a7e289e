//! Device lifecycle: open filtering, configuration sequence, failure
//! handling and the reconnect loop.

use std::sync::Arc;

use radiobridge::BridgeConfig;
use radiobridge::app::ports::DeviceEvent;
use radiobridge::app::{Bridge, LinkState};
use radiobridge::error::{ConfigureError, DisconnectCause, Error, OpenError, TransportError};
use radiobridge::line_coding::LineCoding;

use super::mock_transport::*;

struct Rig {
    wired: Arc<MockWired>,
    bridge: Bridge<MockWired, MockWireless>,
    delay: RecordingDelay,
}

fn rig_with(wired: MockWired, config: BridgeConfig) -> Rig {
    let wired = Arc::new(wired);
    let bridge = Bridge::new(config, wired.clone(), Arc::new(MockWireless::new())).unwrap();
    Rig {
        wired,
        bridge,
        delay: RecordingDelay::default(),
    }
}

fn rig(wired: MockWired) -> Rig {
    rig_with(wired, quick_config())
}

#[test]
fn opens_only_the_radio_vid_pid() {
    let wired = MockWired::new();
    wired.plug(0x1FC9, 0x0095);
    wired.plug(0x0094, 0x1FC9);
    let r = rig(wired);
    let mut lc = r.bridge.lifecycle(r.delay.clone());

    assert_eq!(lc.run_cycle(), Err(Error::DeviceOpen(OpenError::NotFound)));
    assert_eq!(r.bridge.state().link_state(), LinkState::Searching);
    assert_eq!(r.bridge.state().stats().snapshot().open_failures, 1);
    assert_eq!(
        r.wired.calls(),
        vec![WiredCall::Open {
            vid: 0x1FC9,
            pid: 0x0094
        }]
    );

    r.wired.plug(RADIO.0, RADIO.1);
    let handle = cycle_in_background(lc);
    assert!(wait_until(|| r.bridge.state().is_connected()));
    r.wired.unplug();
    let (_, outcome) = handle.join().unwrap();
    assert_eq!(outcome, Ok(DisconnectCause::Removed));
}

#[test]
fn configure_sequence_after_settle() {
    let r = rig(MockWired::with_radio());
    let handle = cycle_in_background(r.bridge.lifecycle(r.delay.clone()));
    assert!(wait_until(|| r.bridge.state().is_connected()));

    let target = LineCoding::default();
    assert_eq!(
        r.wired.calls(),
        vec![
            WiredCall::Open {
                vid: RADIO.0,
                pid: RADIO.1
            },
            WiredCall::GetLineCoding,
            WiredCall::SetLineCoding(target),
            WiredCall::GetLineCoding,
            WiredCall::SetControlLines {
                dtr: true,
                rts: false
            },
        ]
    );
    assert_eq!(r.delay.delays(), vec![100], "settle delay only");

    r.wired.unplug();
    assert_eq!(handle.join().unwrap().1, Ok(DisconnectCause::Removed));
    assert_eq!(r.bridge.state().stats().snapshot().line_coding_anomalies, 0);
}

#[test]
fn readback_mismatch_is_reported_but_tolerated() {
    let wired = MockWired::with_radio();
    wired.ignore_line_coding();
    let r = rig(wired);
    let handle = cycle_in_background(r.bridge.lifecycle(r.delay.clone()));

    assert!(wait_until(|| r.bridge.state().is_connected()));
    assert_eq!(r.bridge.state().stats().snapshot().line_coding_anomalies, 1);

    r.wired.unplug();
    let (_, outcome) = handle.join().unwrap();
    assert_eq!(outcome, Ok(DisconnectCause::Removed));
}

#[test]
fn strict_mismatch_closes_and_retries() {
    let wired = MockWired::with_radio();
    wired.ignore_line_coding();
    let r = rig_with(
        wired,
        BridgeConfig {
            strict_line_coding: true,
            ..quick_config()
        },
    );
    let mut lc = r.bridge.lifecycle(r.delay.clone());

    let requested = LineCoding::default();
    let reported = LineCoding {
        baud_rate: 9600,
        ..requested
    };
    assert_eq!(
        lc.run_cycle(),
        Err(Error::DeviceConfig(ConfigureError::Mismatch {
            requested,
            reported
        }))
    );
    assert_eq!(r.wired.open_handles(), 0, "handle closed on failure");
    assert!(r.wired.calls().contains(&WiredCall::Close(1)));
    assert_eq!(r.bridge.state().link_state(), LinkState::Searching);
    assert_eq!(r.delay.delays(), vec![100, 250]);
}

#[test]
fn control_line_failure_is_retried_not_fatal() {
    let wired = MockWired::with_radio();
    wired.fail_control_lines(TransportError::Rejected);
    let r = rig(wired);
    let mut lc = r.bridge.lifecycle(r.delay.clone());

    for _ in 0..3 {
        assert_eq!(
            lc.run_cycle(),
            Err(Error::DeviceConfig(ConfigureError::ControlLines(
                TransportError::Rejected
            )))
        );
    }
    assert_eq!(r.wired.open_count(), 3);
    assert_eq!(r.wired.open_handles(), 0);
    assert!(!r.bridge.state().is_connected());
}

#[test]
fn backoff_grows_then_resets_on_connect() {
    let r = rig(MockWired::new());
    let mut lc = r.bridge.lifecycle(r.delay.clone());

    lc.run_cycle().unwrap_err();
    lc.run_cycle().unwrap_err();
    lc.run_cycle().unwrap_err();
    assert_eq!(r.delay.delays(), vec![250, 500, 1000]);

    r.wired.plug(RADIO.0, RADIO.1);
    let handle = cycle_in_background(lc);
    assert!(wait_until(|| r.bridge.state().is_connected()));
    r.wired.unplug();
    let (mut lc, _) = handle.join().unwrap();

    r.delay.log.lock().unwrap().clear();
    lc.run_cycle().unwrap_err();
    assert_eq!(r.delay.delays(), vec![250], "backoff starts over after a connection");
}

#[test]
fn reconnects_after_every_disconnect() {
    let r = rig(MockWired::with_radio());
    let mut lc = r.bridge.lifecycle(r.delay.clone());

    for round in 1..=3 {
        let handle = cycle_in_background(lc);
        assert!(wait_until(|| r.bridge.state().is_connected()));
        r.wired.unplug();
        let (back, outcome) = handle.join().unwrap();
        lc = back;
        assert_eq!(outcome, Ok(DisconnectCause::Removed));
        assert_eq!(r.bridge.state().link_state(), LinkState::Searching);
        assert_eq!(r.bridge.state().stats().snapshot().reconnects, round);
        assert_eq!(r.wired.open_handles(), 0);
        r.wired.plug(RADIO.0, RADIO.1);
    }
    assert_eq!(r.wired.open_count(), 3);
}

#[test]
fn disconnect_during_configure_ends_the_session() {
    let wired = MockWired::with_radio();
    wired.disconnect_during_configure();
    let r = rig(wired);
    let mut lc = r.bridge.lifecycle(r.delay.clone());

    assert_eq!(lc.run_cycle(), Ok(DisconnectCause::Removed));
    assert_eq!(r.wired.open_handles(), 0);
    assert_eq!(r.bridge.state().link_state(), LinkState::Searching);
}

#[test]
fn repeated_driver_errors_drop_the_device() {
    let r = rig(MockWired::with_radio());
    let handle = cycle_in_background(r.bridge.lifecycle(r.delay.clone()));
    assert!(wait_until(|| r.bridge.state().is_connected()));

    r.wired.emit(DeviceEvent::Error(-7));
    r.wired.emit(DeviceEvent::Error(-7));
    assert!(r.bridge.state().is_connected(), "below threshold");
    r.wired.emit(DeviceEvent::Error(-7));

    let (_, outcome) = handle.join().unwrap();
    assert_eq!(outcome, Ok(DisconnectCause::TransportFault(-7)));
    assert_eq!(r.bridge.state().stats().snapshot().driver_errors, 3);
    assert_eq!(r.wired.open_handles(), 0);
}

#[test]
fn stale_disconnect_does_not_end_next_session() {
    let r = rig(MockWired::with_radio());
    let handle = cycle_in_background(r.bridge.lifecycle(r.delay.clone()));
    assert!(wait_until(|| r.bridge.state().is_connected()));

    // Two removal reports for one unplug: only the first counts.
    r.wired.emit(DeviceEvent::Disconnected);
    r.wired.emit(DeviceEvent::Disconnected);
    let (lc, outcome) = handle.join().unwrap();
    assert_eq!(outcome, Ok(DisconnectCause::Removed));

    let handle = cycle_in_background(lc);
    assert!(wait_until(|| r.bridge.state().is_connected()));
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(r.bridge.state().is_connected(), "second session still up");
    r.wired.unplug();
    assert_eq!(handle.join().unwrap().1, Ok(DisconnectCause::Removed));
}
