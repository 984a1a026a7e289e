//! Nordic UART Service adapter.
//!
//! Implements [`WirelessTransport`], the BLE side of the bridge.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server. The controller and
//!   Bluedroid are brought up by `esp_idf_svc::bt::BtDriver`, which builds
//!   the chip's default controller config. Client writes to the
//!   RX characteristic land in a FreeRTOS no-split ring buffer; each ring
//!   item is lent to the outbound relay and handed back with
//!   `vRingbufferReturnItem`. Lines go out as TX notifications of at most
//!   `MTU - 3` bytes each.
//! - **all other targets**: in-memory simulation for host-side tests.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                                   | Perms        |
//! |----------------|----------------------------------------|--------------|
//! | RX             | `6e400002-b5a3-f393-e0a9-e50e24dcca9e` | Write / WNR  |
//! | TX             | `6e400003-b5a3-f393-e0a9-e50e24dcca9e` | Notify       |

use crate::app::ports::WirelessTransport;
use crate::error::TransportError;
use crate::line::Line;

use core::time::Duration;

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e;
pub const CHAR_RX: u128 = 0x6e40_0002_b5a3_f393_e0a9_e50e_24dc_ca9e;
pub const CHAR_TX: u128 = 0x6e40_0003_b5a3_f393_e0a9_e50e_24dc_ca9e;

/// MTU before any exchange.
pub const DEFAULT_MTU: u16 = 23;
/// ATT notification header (opcode + handle).
const ATT_NOTIFY_OVERHEAD: usize = 3;
/// Bytes of client writes buffered ahead of the outbound relay.
pub const RX_RING_SIZE: usize = 4096;

/// Largest notification payload for `mtu`.
pub fn notify_payload_len(mtu: u16) -> usize {
    usize::from(mtu).saturating_sub(ATT_NOTIFY_OVERHEAD).max(1)
}

/// Convert a receive timeout to FreeRTOS ticks, rounding up so a non-zero
/// timeout waits at least one tick. Clamped below `portMAX_DELAY`, which
/// would mean forever.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn ms_to_ticks(ms: u128, tick_rate_hz: u32) -> u32 {
    let ticks = ms.saturating_mul(u128::from(tick_rate_hz)).div_ceil(1000);
    u32::try_from(ticks).map_or(u32::MAX - 1, |t| t.min(u32::MAX - 1))
}

/// Split `data` into consecutive notification payloads for `mtu`.
pub fn notify_chunks(data: &[u8], mtu: u16) -> core::slice::Chunks<'_, u8> {
    data.chunks(notify_payload_len(mtu))
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF: Bluedroid GATT server
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod platform {
    use super::*;

    use core::ffi::c_void;
    use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
    use std::sync::Mutex;

    use esp_idf_svc::bt::{Ble, BtDriver};
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys::*;
    use log::{error, info, warn};

    use crate::config::MAX_SERVICE_NAME_LEN;

    // Bluedroid callbacks are plain C function pointers; these statics carry
    // their state across to the adapter.
    static GATTS_IF: AtomicU32 = AtomicU32::new(0);
    static CONN_ID: AtomicU32 = AtomicU32::new(0);
    static CONNECTED: AtomicBool = AtomicBool::new(false);
    static MTU: AtomicU32 = AtomicU32::new(DEFAULT_MTU as u32);
    static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
    static RX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
    static TX_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
    static CHAR_STEP: AtomicU32 = AtomicU32::new(0);
    static RX_RING: AtomicPtr<c_void> = AtomicPtr::new(core::ptr::null_mut());
    // NUL-terminated copy of the advertised name.
    static ADV_NAME: Mutex<heapless::Vec<u8, { MAX_SERVICE_NAME_LEN + 1 }>> =
        Mutex::new(heapless::Vec::new());

    const CCCD_UUID: u16 = 0x2902;

    fn uuid128(uuid: u128) -> esp_bt_uuid_t {
        // SAFETY: all-zero is a valid esp_bt_uuid_t.
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 16;
        t.uuid.uuid128 = uuid.to_le_bytes();
        t
    }

    fn uuid16(uuid: u16) -> esp_bt_uuid_t {
        // SAFETY: as above.
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 2;
        t.uuid.uuid16 = uuid;
        t
    }

    fn check(ret: esp_err_t, what: &'static str) -> Result<(), TransportError> {
        if ret == ESP_OK as i32 {
            Ok(())
        } else {
            error!("BLE: {what} failed ({ret})");
            Err(TransportError::Driver(ret))
        }
    }

    unsafe fn start_advertising() {
        let mut adv_params = esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        };
        unsafe { esp_ble_gap_start_advertising(&mut adv_params) };
    }

    unsafe fn add_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
        let mut char_uuid = uuid128(uuid);
        unsafe {
            esp_ble_gatts_add_char(
                svc_handle,
                &mut char_uuid,
                perm as esp_gatt_perm_t,
                prop as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => unsafe {
                start_advertising();
            },
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                info!("BLE GAP: advertising started");
            }
            _ => {}
        }
    }

    unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        GATTS_IF.store(u32::from(gatts_if), Ordering::Relaxed);

        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: uuid128(SERVICE_UUID),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 8) };
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let svc_handle = unsafe { (*param).create.service_handle };
                SVC_HANDLE.store(u32::from(svc_handle), Ordering::Relaxed);
                CHAR_STEP.store(1, Ordering::Relaxed);
                unsafe {
                    esp_ble_gatts_start_service(svc_handle);
                    add_char(
                        svc_handle,
                        CHAR_RX,
                        ESP_GATT_PERM_WRITE,
                        ESP_GATT_CHAR_PROP_BIT_WRITE | ESP_GATT_CHAR_PROP_BIT_WRITE_NR,
                    );
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let handle = unsafe { (*param).add_char.attr_handle };
                let svc_handle = SVC_HANDLE.load(Ordering::Relaxed) as u16;
                match CHAR_STEP.load(Ordering::Relaxed) {
                    1 => {
                        RX_CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
                        CHAR_STEP.store(2, Ordering::Relaxed);
                        unsafe {
                            add_char(
                                svc_handle,
                                CHAR_TX,
                                ESP_GATT_PERM_READ,
                                ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                            );
                        }
                    }
                    2 => {
                        TX_CHAR_HANDLE.store(u32::from(handle), Ordering::Relaxed);
                        CHAR_STEP.store(3, Ordering::Relaxed);
                        let mut cccd = uuid16(CCCD_UUID);
                        unsafe {
                            esp_ble_gatts_add_char_descr(
                                svc_handle,
                                &mut cccd,
                                (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
                                core::ptr::null_mut(),
                                core::ptr::null_mut(),
                            );
                        }
                    }
                    _ => {}
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
                info!(
                    "BLE GATTS: UART service ready (rx={}, tx={})",
                    RX_CHAR_HANDLE.load(Ordering::Relaxed),
                    TX_CHAR_HANDLE.load(Ordering::Relaxed)
                );
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let conn_id = unsafe { (*param).connect.conn_id };
                CONN_ID.store(u32::from(conn_id), Ordering::Relaxed);
                MTU.store(u32::from(DEFAULT_MTU), Ordering::Relaxed);
                CONNECTED.store(true, Ordering::Release);
                info!("BLE GATTS: client connected (conn_id={conn_id})");
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                CONNECTED.store(false, Ordering::Release);
                info!("BLE GATTS: client disconnected, advertising again");
                unsafe { start_advertising() };
            }
            esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
                let mtu = unsafe { (*param).mtu.mtu };
                MTU.store(u32::from(mtu), Ordering::Relaxed);
                info!("BLE GATTS: MTU {mtu}");
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = unsafe { &(*param).write };
                if u32::from(p.handle) == RX_CHAR_HANDLE.load(Ordering::Relaxed) && p.len > 0 {
                    let ring = RX_RING.load(Ordering::Acquire);
                    let sent = !ring.is_null()
                        && unsafe {
                            xRingbufferSend(ring.cast(), p.value as *const c_void, usize::from(p.len), 0)
                        } != 0;
                    if !sent {
                        warn!("BLE: RX ring full, dropping {} bytes", p.len);
                    }
                }
                if p.need_rsp {
                    unsafe {
                        esp_ble_gatts_send_response(
                            gatts_if,
                            p.conn_id,
                            p.trans_id,
                            esp_gatt_status_t_ESP_GATT_OK,
                            core::ptr::null_mut(),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    /// A client write held in the RX ring until released.
    pub struct RxItem {
        ptr: *mut u8,
        len: usize,
    }

    // SAFETY: the ring item stays valid until vRingbufferReturnItem, which
    // may be called from any task.
    unsafe impl Send for RxItem {}

    impl AsRef<[u8]> for RxItem {
        fn as_ref(&self) -> &[u8] {
            // SAFETY: ptr/len came from xRingbufferReceive and the item is
            // not yet returned.
            unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    pub struct NordicUart {
        /// Keeps the controller and Bluedroid up; dropping it deinits both.
        _bt: Mutex<BtDriver<'static, Ble>>,
    }

    impl NordicUart {
        /// Initialise and enable the BLE controller and Bluedroid. `nvs`
        /// holds PHY calibration data.
        pub fn new(modem: Modem, nvs: Option<EspDefaultNvsPartition>) -> Result<Self, EspError> {
            let bt = BtDriver::<Ble>::new(modem, nvs)?;
            info!("BLE(espidf): controller enabled");
            Ok(Self { _bt: Mutex::new(bt) })
        }

        fn init_stack(&self, service_name: &str) -> Result<(), TransportError> {
            {
                let mut name = ADV_NAME.lock().map_err(|_| TransportError::Rejected)?;
                name.clear();
                if name.extend_from_slice(service_name.as_bytes()).is_err() || name.push(0).is_err()
                {
                    return Err(TransportError::Rejected);
                }
            }

            // SAFETY: one-time stack bring-up from a single task; every
            // pointer passed below outlives the call it is passed to.
            unsafe {
                let ring = xRingbufferCreate(RX_RING_SIZE, RingbufferType_t_RINGBUF_TYPE_NOSPLIT);
                if ring.is_null() {
                    error!("BLE: RX ring allocation failed");
                    return Err(TransportError::Driver(ESP_ERR_NO_MEM as i32));
                }
                RX_RING.store(ring.cast(), Ordering::Release);

                check(
                    esp_ble_gap_register_callback(Some(gap_event_handler)),
                    "gap_register_callback",
                )?;
                check(
                    esp_ble_gatts_register_callback(Some(gatts_event_handler)),
                    "gatts_register_callback",
                )?;
                check(esp_ble_gatts_app_register(0), "gatts_app_register")?;
                check(esp_ble_gatt_set_local_mtu(247), "gatt_set_local_mtu")?;

                let name = ADV_NAME.lock().map_err(|_| TransportError::Rejected)?;
                check(
                    esp_ble_gap_set_device_name(name.as_ptr().cast()),
                    "gap_set_device_name",
                )?;

                // Advertising starts once the data is set (GAP callback).
                let mut adv_data = esp_ble_adv_data_t {
                    set_scan_rsp: false,
                    include_name: true,
                    include_txpower: false,
                    min_interval: 0x0006,
                    max_interval: 0x0010,
                    flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                    ..core::mem::zeroed()
                };
                check(esp_ble_gap_config_adv_data(&mut adv_data), "gap_config_adv_data")?;
            }
            Ok(())
        }
    }

    impl WirelessTransport for NordicUart {
        type Item = RxItem;

        fn start(&self, service_name: &str) -> Result<(), TransportError> {
            self.init_stack(service_name)?;
            info!("BLE(espidf): Bluedroid up, UART service '{service_name}'");
            Ok(())
        }

        fn send_line(&self, line: &Line) -> Result<(), TransportError> {
            if !CONNECTED.load(Ordering::Acquire) {
                return Err(TransportError::NotConnected);
            }
            let gatts_if = GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t;
            let conn_id = CONN_ID.load(Ordering::Relaxed) as u16;
            let tx_handle = TX_CHAR_HANDLE.load(Ordering::Relaxed) as u16;
            let mtu = MTU.load(Ordering::Relaxed) as u16;

            for chunk in notify_chunks(line.as_bytes(), mtu) {
                // SAFETY: Bluedroid copies the payload before returning.
                let ret = unsafe {
                    esp_ble_gatts_send_indicate(
                        gatts_if,
                        conn_id,
                        tx_handle,
                        chunk.len() as u16,
                        chunk.as_ptr().cast_mut(),
                        false,
                    )
                };
                if ret != ESP_OK as i32 {
                    return Err(TransportError::Driver(ret));
                }
            }
            Ok(())
        }

        fn receive(&self, timeout: Option<Duration>) -> Option<RxItem> {
            let ring = RX_RING.load(Ordering::Acquire);
            if ring.is_null() {
                return None;
            }
            let ticks = match timeout {
                None => u32::MAX,
                Some(t) => ms_to_ticks(t.as_millis(), configTICK_RATE_HZ),
            };
            let mut len: usize = 0;
            // SAFETY: ring is a live no-split ring buffer.
            let ptr = unsafe { xRingbufferReceive(ring.cast(), &mut len, ticks) };
            if ptr.is_null() {
                None
            } else {
                Some(RxItem {
                    ptr: ptr.cast(),
                    len,
                })
            }
        }

        fn release(&self, item: RxItem) {
            let ring = RX_RING.load(Ordering::Acquire);
            // SAFETY: the item came from this ring and is returned once,
            // since `release` takes it by value.
            unsafe { vRingbufferReturnItem(ring.cast(), item.ptr.cast()) };
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod platform {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::{Condvar, Mutex, PoisonError};

    use log::info;

    /// A simulated client write.
    #[derive(Debug)]
    pub struct RxItem(Vec<u8>);

    impl AsRef<[u8]> for RxItem {
        fn as_ref(&self) -> &[u8] {
            &self.0
        }
    }

    #[derive(Default)]
    struct Sim {
        started: bool,
        client_connected: bool,
        mtu: u16,
        rx: VecDeque<Vec<u8>>,
        rx_bytes: usize,
        notified: Vec<Vec<u8>>,
        outstanding: usize,
    }

    pub struct NordicUart {
        sim: Mutex<Sim>,
        rx_ready: Condvar,
    }

    impl NordicUart {
        pub fn new() -> Self {
            Self {
                sim: Mutex::new(Sim {
                    mtu: DEFAULT_MTU,
                    ..Sim::default()
                }),
                rx_ready: Condvar::new(),
            }
        }

        fn sim(&self) -> std::sync::MutexGuard<'_, Sim> {
            self.sim.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Simulate a client connecting with the given MTU.
        pub fn connect_client(&self, mtu: u16) {
            let mut sim = self.sim();
            sim.client_connected = true;
            sim.mtu = mtu;
        }

        pub fn disconnect_client(&self) {
            self.sim().client_connected = false;
        }

        /// Simulate a client write to RX. Returns `false` when the ring is full.
        pub fn client_write(&self, data: &[u8]) -> bool {
            let mut sim = self.sim();
            if sim.rx_bytes + data.len() > RX_RING_SIZE {
                return false;
            }
            sim.rx_bytes += data.len();
            sim.rx.push_back(data.to_vec());
            drop(sim);
            self.rx_ready.notify_one();
            true
        }

        /// Notification payloads sent so far, in order.
        pub fn take_notified(&self) -> Vec<Vec<u8>> {
            core::mem::take(&mut self.sim().notified)
        }

        /// Items received but not yet released.
        pub fn outstanding(&self) -> usize {
            self.sim().outstanding
        }
    }

    impl Default for NordicUart {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WirelessTransport for NordicUart {
        type Item = RxItem;

        fn start(&self, service_name: &str) -> Result<(), TransportError> {
            self.sim().started = true;
            info!("BLE(sim): advertising '{service_name}' (service {SERVICE_UUID:032x})");
            Ok(())
        }

        fn send_line(&self, line: &Line) -> Result<(), TransportError> {
            let mut sim = self.sim();
            if !sim.started || !sim.client_connected {
                return Err(TransportError::NotConnected);
            }
            let mtu = sim.mtu;
            for chunk in notify_chunks(line.as_bytes(), mtu) {
                sim.notified.push(chunk.to_vec());
            }
            Ok(())
        }

        fn receive(&self, timeout: Option<Duration>) -> Option<RxItem> {
            let sim = self.sim();
            let mut sim = match timeout {
                None => self
                    .rx_ready
                    .wait_while(sim, |s| s.rx.is_empty())
                    .unwrap_or_else(PoisonError::into_inner),
                Some(t) => {
                    self.rx_ready
                        .wait_timeout_while(sim, t, |s| s.rx.is_empty())
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
            let data = sim.rx.pop_front()?;
            sim.outstanding += 1;
            Some(RxItem(data))
        }

        fn release(&self, item: RxItem) {
            let mut sim = self.sim();
            sim.rx_bytes -= item.0.len();
            sim.outstanding -= 1;
        }
    }
}

pub use platform::{NordicUart, RxItem};
