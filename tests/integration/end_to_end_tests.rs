//! PING/ACK through the whole bridge: lifecycle, driver callbacks,
//! forwarder and outbound relay against mock transports.

use std::sync::Arc;
use std::time::Duration;

use radiobridge::app::Bridge;
use radiobridge::app::outbound::CONNECTION_RECHECK;
use radiobridge::error::DisconnectCause;

use super::mock_transport::*;

#[test]
fn ping_ack_round_trip() {
    let wired = Arc::new(MockWired::with_radio());
    let wireless = Arc::new(MockWireless::new());
    let bridge = Bridge::new(quick_config(), wired.clone(), wireless.clone()).unwrap();
    bridge.start_wireless().unwrap();
    assert_eq!(wireless.service_name().as_deref(), Some("DMR-RADIO"));

    let forwarder = bridge.forwarder();
    let relay = bridge.outbound_relay();
    let cycle = cycle_in_background(bridge.lifecycle(RecordingDelay::default()));
    assert!(wait_until(|| bridge.state().is_connected()));

    // Radio → phone: exact bytes, CR/LF included.
    assert!(wired.receive(b"PING\r\n"));
    assert_eq!(forwarder.forward_pending(), 1);
    assert_eq!(wireless.sent(), vec![b"PING\r\n".to_vec()]);

    // Phone → radio.
    wireless.push(b"ACK\n");
    assert!(relay.pump_once(Some(Duration::from_millis(100))));
    assert_eq!(wired.sent(), vec![b"ACK\n".to_vec()]);
    assert_eq!(wireless.released(), 1);

    // Phone → radio with the send timing out: dropped, released, not retried.
    wired.set_send(SendBehaviour::Timeout);
    wireless.push(b"ACK\n");
    assert!(relay.pump_once(Some(Duration::from_millis(100))));
    assert_eq!(wired.sent().len(), 1);
    assert_eq!(wireless.released(), 2);

    let snap = bridge.state().stats().snapshot();
    assert_eq!(snap.inbound_forwarded, 1);
    assert_eq!(snap.outbound_sent, 1);
    assert_eq!(snap.outbound_failed, 1);
    assert_eq!(snap.items_released, 2);

    wired.unplug();
    cycle.join().unwrap().1.unwrap();
}

#[test]
fn outbound_after_unplug_is_dropped_without_touching_the_driver() {
    let wired = Arc::new(MockWired::with_radio());
    let wireless = Arc::new(MockWireless::new());
    let bridge = Bridge::new(quick_config(), wired.clone(), wireless.clone()).unwrap();
    let relay = bridge.outbound_relay();

    let cycle = cycle_in_background(bridge.lifecycle(RecordingDelay::default()));
    assert!(wait_until(|| bridge.state().is_connected()));
    wired.unplug();
    assert_eq!(cycle.join().unwrap().1, Ok(DisconnectCause::Removed));

    wireless.push(b"ACK\n");
    assert!(relay.pump_once(Some(Duration::from_millis(100))));
    assert!(wired.sent().is_empty());
    assert_eq!(wireless.released(), 1);
    assert_eq!(bridge.state().stats().snapshot().outbound_dropped, 1);
}

#[test]
fn threads_relay_both_directions() {
    let wired = Arc::new(MockWired::with_radio());
    let wireless = Arc::new(MockWireless::new());
    let bridge = Bridge::new(quick_config(), wired.clone(), wireless.clone()).unwrap();

    bridge.forwarder().spawn().unwrap();
    bridge.outbound_relay().spawn().unwrap();

    // Queued before any radio is present: held until connection.
    wireless.push(b"EARLY\n");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(wireless.lent(), 0, "relay waits for a connection first");

    let cycle = cycle_in_background(bridge.lifecycle(RecordingDelay::default()));
    assert!(wait_until(|| wired.sent() == vec![b"EARLY\n".to_vec()]));
    assert!(wait_until(|| wireless.released() == 1));

    wired.receive(b"STATUS OK\r\n");
    assert!(wait_until(|| wireless.sent() == vec![b"STATUS OK\r\n".to_vec()]));

    wired.unplug();
    assert_eq!(cycle.join().unwrap().1, Ok(DisconnectCause::Removed));
}

#[test]
fn writes_after_unplug_wait_for_the_next_radio() {
    let wired = Arc::new(MockWired::with_radio());
    let wireless = Arc::new(MockWireless::new());
    let bridge = Bridge::new(quick_config(), wired.clone(), wireless.clone()).unwrap();
    bridge.outbound_relay().spawn().unwrap();

    let cycle = cycle_in_background(bridge.lifecycle(RecordingDelay::default()));
    assert!(wait_until(|| bridge.state().is_connected()));
    wired.unplug();
    let (lc, outcome) = cycle.join().unwrap();
    assert_eq!(outcome, Ok(DisconnectCause::Removed));

    // Let the relay's pending queue wait lapse so it parks on the condvar.
    std::thread::sleep(CONNECTION_RECHECK * 2);
    wireless.push(b"LATE\n");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(wireless.lent(), 0, "held in the BLE queue while unplugged");
    assert_eq!(bridge.state().stats().snapshot().outbound_dropped, 0);

    wired.plug(RADIO.0, RADIO.1);
    let cycle = cycle_in_background(lc);
    assert!(wait_until(|| wired.sent() == vec![b"LATE\n".to_vec()]));
    assert!(wait_until(|| wireless.released() == 1));

    wired.unplug();
    assert_eq!(cycle.join().unwrap().1, Ok(DisconnectCause::Removed));
}
