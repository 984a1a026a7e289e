//! Mock transports for integration tests.
//!
//! `MockWired` plays the USB bus plus the CDC-ACM driver: devices can be
//! plugged and unplugged, every driver call is recorded, and the stored
//! listener can be poked to simulate driver-context callbacks.
//! `MockWireless` plays the BLE UART service with an in-memory receive
//! queue that counts lent and released items.

use core::time::Duration;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use embedded_hal::delay::DelayNs;
use radiobridge::app::ports::{
    DeviceEvent, DeviceFilter, WiredListener, WiredTransport, WirelessTransport,
};
use radiobridge::error::{DisconnectCause, OpenError, TransportError};
use radiobridge::line::Line;
use radiobridge::line_coding::LineCoding;
use radiobridge::{BridgeConfig, app::DeviceLifecycleManager};

pub const RADIO: (u16, u16) = (0x1FC9, 0x0094);

// ── Wired call record ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum WiredCall {
    Open { vid: u16, pid: u16 },
    Close(u32),
    GetLineCoding,
    SetLineCoding(LineCoding),
    SetControlLines { dtr: bool, rts: bool },
    Send(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SendBehaviour {
    Deliver,
    Timeout,
    Fail(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockHandle(pub u32);

struct WiredState {
    attached: Vec<(u16, u16)>,
    device_coding: LineCoding,
    honor_set_coding: bool,
    control_lines_result: Result<(), TransportError>,
    disconnect_on_configure: bool,
    send: SendBehaviour,
    listener: Option<Arc<dyn WiredListener>>,
    next_handle: u32,
    open_handles: Vec<u32>,
    calls: Vec<WiredCall>,
}

pub struct MockWired {
    inner: Mutex<WiredState>,
}

#[allow(dead_code)]
impl MockWired {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(WiredState {
                attached: Vec::new(),
                device_coding: LineCoding {
                    baud_rate: 9600,
                    ..LineCoding::default()
                },
                honor_set_coding: true,
                control_lines_result: Ok(()),
                disconnect_on_configure: false,
                send: SendBehaviour::Deliver,
                listener: None,
                next_handle: 1,
                open_handles: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// A bus with the radio already plugged in.
    pub fn with_radio() -> Self {
        let m = Self::new();
        m.plug(RADIO.0, RADIO.1);
        m
    }

    pub fn plug(&self, vid: u16, pid: u16) {
        self.inner.lock().unwrap().attached.push((vid, pid));
    }

    /// Remove every device and report the removal to the open session.
    pub fn unplug(&self) {
        let listener = {
            let mut s = self.inner.lock().unwrap();
            s.attached.clear();
            s.listener.clone()
        };
        if let Some(l) = listener {
            l.on_event(DeviceEvent::Disconnected);
        }
    }

    /// Deliver a received chunk from the driver context.
    pub fn receive(&self, chunk: &[u8]) -> bool {
        let listener = self.inner.lock().unwrap().listener.clone();
        listener.map_or(false, |l| l.on_data(chunk))
    }

    pub fn emit(&self, event: DeviceEvent) {
        let listener = self.inner.lock().unwrap().listener.clone();
        if let Some(l) = listener {
            l.on_event(event);
        }
    }

    pub fn ignore_line_coding(&self) {
        self.inner.lock().unwrap().honor_set_coding = false;
    }

    pub fn fail_control_lines(&self, err: TransportError) {
        self.inner.lock().unwrap().control_lines_result = Err(err);
    }

    pub fn disconnect_during_configure(&self) {
        self.inner.lock().unwrap().disconnect_on_configure = true;
    }

    pub fn set_send(&self, behaviour: SendBehaviour) {
        self.inner.lock().unwrap().send = behaviour;
    }

    pub fn calls(&self) -> Vec<WiredCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    pub fn open_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, WiredCall::Open { .. }))
            .count()
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                WiredCall::Send(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn open_handles(&self) -> usize {
        self.inner.lock().unwrap().open_handles.len()
    }

    fn check_open(s: &WiredState, h: &MockHandle) -> Result<(), TransportError> {
        if s.open_handles.contains(&h.0) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl WiredTransport for MockWired {
    type Handle = MockHandle;

    fn open(
        &self,
        filter: DeviceFilter,
        _timeout_ms: u32,
        listener: &Arc<dyn WiredListener>,
    ) -> Result<MockHandle, OpenError> {
        let mut s = self.inner.lock().unwrap();
        s.calls.push(WiredCall::Open {
            vid: filter.vid,
            pid: filter.pid,
        });
        if !s.attached.iter().any(|&(v, p)| filter.matches(v, p)) {
            return Err(OpenError::NotFound);
        }
        let id = s.next_handle;
        s.next_handle += 1;
        s.open_handles.push(id);
        s.listener = Some(listener.clone());
        Ok(MockHandle(id))
    }

    fn close(&self, handle: MockHandle) -> Result<(), TransportError> {
        let mut s = self.inner.lock().unwrap();
        s.calls.push(WiredCall::Close(handle.0));
        s.open_handles.retain(|&h| h != handle.0);
        s.listener = None;
        Ok(())
    }

    fn line_coding(&self, handle: &MockHandle) -> Result<LineCoding, TransportError> {
        let mut s = self.inner.lock().unwrap();
        s.calls.push(WiredCall::GetLineCoding);
        Self::check_open(&s, handle)?;
        Ok(s.device_coding)
    }

    fn set_line_coding(&self, handle: &MockHandle, coding: &LineCoding) -> Result<(), TransportError> {
        let mut s = self.inner.lock().unwrap();
        s.calls.push(WiredCall::SetLineCoding(*coding));
        Self::check_open(&s, handle)?;
        if s.honor_set_coding {
            s.device_coding = *coding;
        }
        Ok(())
    }

    fn set_control_lines(&self, handle: &MockHandle, dtr: bool, rts: bool) -> Result<(), TransportError> {
        let (result, listener) = {
            let mut s = self.inner.lock().unwrap();
            s.calls.push(WiredCall::SetControlLines { dtr, rts });
            Self::check_open(&s, handle)?;
            let listener = if s.disconnect_on_configure {
                s.attached.clear();
                s.listener.clone()
            } else {
                None
            };
            (s.control_lines_result, listener)
        };
        if let Some(l) = listener {
            l.on_event(DeviceEvent::Disconnected);
        }
        result
    }

    fn send_blocking(&self, handle: &MockHandle, data: &[u8], _timeout_ms: u32) -> Result<(), TransportError> {
        let mut s = self.inner.lock().unwrap();
        Self::check_open(&s, handle)?;
        match s.send {
            SendBehaviour::Deliver => {
                s.calls.push(WiredCall::Send(data.to_vec()));
                Ok(())
            }
            SendBehaviour::Timeout => Err(TransportError::Timeout),
            SendBehaviour::Fail(code) => Err(TransportError::Driver(code)),
        }
    }
}

// ── Wireless side ─────────────────────────────────────────────

#[derive(Debug)]
pub struct MockItem(pub Vec<u8>);

impl AsRef<[u8]> for MockItem {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Default)]
struct WirelessState {
    service_name: Option<String>,
    queue: VecDeque<Vec<u8>>,
    lent: u32,
    released: u32,
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
}

#[derive(Default)]
pub struct MockWireless {
    inner: Mutex<WirelessState>,
    ready: Condvar,
}

#[allow(dead_code)]
impl MockWireless {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a client write.
    pub fn push(&self, data: &[u8]) {
        self.inner.lock().unwrap().queue.push_back(data.to_vec());
        self.ready.notify_one();
    }

    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().unwrap().fail_sends = fail;
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn lent(&self) -> u32 {
        self.inner.lock().unwrap().lent
    }

    pub fn released(&self) -> u32 {
        self.inner.lock().unwrap().released
    }

    pub fn service_name(&self) -> Option<String> {
        self.inner.lock().unwrap().service_name.clone()
    }
}

impl WirelessTransport for MockWireless {
    type Item = MockItem;

    fn start(&self, service_name: &str) -> Result<(), TransportError> {
        self.inner.lock().unwrap().service_name = Some(service_name.to_owned());
        Ok(())
    }

    fn send_line(&self, line: &Line) -> Result<(), TransportError> {
        let mut s = self.inner.lock().unwrap();
        if s.fail_sends {
            return Err(TransportError::NotConnected);
        }
        s.sent.push(line.as_bytes().to_vec());
        Ok(())
    }

    fn receive(&self, timeout: Option<Duration>) -> Option<MockItem> {
        let guard = self.inner.lock().unwrap();
        let mut s = match timeout {
            None => self.ready.wait_while(guard, |s| s.queue.is_empty()).unwrap(),
            Some(t) => {
                self.ready
                    .wait_timeout_while(guard, t, |s| s.queue.is_empty())
                    .unwrap()
                    .0
            }
        };
        let data = s.queue.pop_front()?;
        s.lent += 1;
        Some(MockItem(data))
    }

    fn release(&self, _item: MockItem) {
        self.inner.lock().unwrap().released += 1;
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Records requested delays instead of sleeping.
#[derive(Clone, Default)]
pub struct RecordingDelay {
    pub log: Arc<Mutex<Vec<u32>>>,
}

#[allow(dead_code)]
impl RecordingDelay {
    pub fn delays(&self) -> Vec<u32> {
        self.log.lock().unwrap().clone()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.log.lock().unwrap().push(ns / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.log.lock().unwrap().push(ms);
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Poll `cond` until it holds or two seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub type Lifecycle = DeviceLifecycleManager<MockWired, RecordingDelay>;

/// Run one lifecycle cycle on a helper thread (it blocks while connected).
#[allow(dead_code)]
pub fn cycle_in_background(
    mut lifecycle: Lifecycle,
) -> JoinHandle<(Lifecycle, radiobridge::Result<DisconnectCause>)> {
    std::thread::spawn(move || {
        let outcome = lifecycle.run_cycle();
        (lifecycle, outcome)
    })
}

#[allow(dead_code)]
pub fn quick_config() -> BridgeConfig {
    BridgeConfig {
        stats_interval_secs: 0,
        ..BridgeConfig::default()
    }
}
