//! USB CDC-ACM host adapter.
//!
//! Implements [`WiredTransport`] on top of the ESP-IDF USB host library and
//! the `usb_host_cdc_acm` class driver.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real driver via `esp_idf_svc::sys`. A
//!   dedicated task pumps `usb_host_lib_handle_events`; the class driver
//!   invokes the registered [`WiredListener`] from its own task.
//! - **all targets**: error-code and line-coding translation, so the
//!   mapping is testable on the host.
//!
//! ```text
//!   usb-lib task ── usb_host_lib_handle_events (forever)
//!   cdc driver   ── data_cb  ─▶ WiredListener::on_data
//!                └─ event_cb ─▶ WiredListener::on_event
//! ```

use crate::error::{OpenError, TransportError};
use crate::line_coding::{LineCoding, LineCodingError};

// esp_err_t values the mapping cares about.
const ESP_OK: i32 = 0;
const ESP_ERR_INVALID_STATE: i32 = 0x103;
const ESP_ERR_NOT_FOUND: i32 = 0x105;
const ESP_ERR_NOT_SUPPORTED: i32 = 0x106;
const ESP_ERR_TIMEOUT: i32 = 0x107;

/// Translate a `cdc_acm_host_open` result.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn open_result(ret: i32) -> Result<(), OpenError> {
    match ret {
        ESP_OK => Ok(()),
        ESP_ERR_NOT_FOUND => Err(OpenError::NotFound),
        ESP_ERR_TIMEOUT => Err(OpenError::Timeout),
        code => Err(OpenError::Driver(code)),
    }
}

/// Translate a control-request or transfer result.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn transfer_result(ret: i32) -> Result<(), TransportError> {
    match ret {
        ESP_OK => Ok(()),
        ESP_ERR_TIMEOUT => Err(TransportError::Timeout),
        // Class request STALLed by the device.
        ESP_ERR_NOT_SUPPORTED => Err(TransportError::Rejected),
        // Device gone or handle already closed.
        ESP_ERR_INVALID_STATE => Err(TransportError::NotConnected),
        code => Err(TransportError::Driver(code)),
    }
}

/// `usb_host_lib_handle_events` flag: the last client deregistered.
const LIB_EVENT_NO_CLIENTS: u32 = 0x01;
/// Pause after a failed event pump before trying again.
const LIB_ERROR_PAUSE_MS: u32 = 100;

/// What the USB library task does after one `usb_host_lib_handle_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
enum LibStep {
    /// Pump failed; sleep before retrying.
    Pause(u32),
    FreeDevices,
    Continue,
}

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn lib_step(ret: i32, flags: u32) -> LibStep {
    if ret != ESP_OK {
        LibStep::Pause(LIB_ERROR_PAUSE_MS)
    } else if flags & LIB_EVENT_NO_CLIENTS != 0 {
        LibStep::FreeDevices
    } else {
        LibStep::Continue
    }
}

/// [`LineCoding`] → fields of a `cdc_acm_line_coding_t`
/// (`dwDTERate`, `bCharFormat`, `bParityType`, `bDataBits`).
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn encode_line_coding(coding: &LineCoding) -> (u32, u8, u8, u8) {
    let raw = coding.to_bytes();
    (u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]), raw[4], raw[5], raw[6])
}

/// Fields of a `cdc_acm_line_coding_t` → [`LineCoding`].
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn decode_line_coding(
    baud_rate: u32,
    char_format: u8,
    parity: u8,
    data_bits: u8,
) -> Result<LineCoding, LineCodingError> {
    let mut raw = [0u8; crate::line_coding::LINE_CODING_LEN];
    raw[..4].copy_from_slice(&baud_rate.to_le_bytes());
    raw[4] = char_format;
    raw[5] = parity;
    raw[6] = data_bits;
    LineCoding::from_bytes(&raw)
}

#[cfg(target_os = "espidf")]
mod platform {
    use super::{
        LibStep, decode_line_coding, encode_line_coding, lib_step, open_result, transfer_result,
    };
    use crate::error::{OpenError, TransportError};
    use crate::line_coding::LineCoding;

    use core::ffi::c_void;
    use std::sync::Arc;

    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::sys::*;
    use log::{debug, error, info, warn};

    use crate::app::ports::{DeviceEvent, DeviceFilter, SerialState, WiredListener, WiredTransport};
    use crate::config::BridgeConfig;
    use crate::drivers::task_pin::{self, Core};
    use crate::error::Error;

    type ListenerBox = Arc<dyn WiredListener>;

    /// An open CDC-ACM session plus the listener registered with it.
    pub struct CdcHandle {
        raw: cdc_acm_dev_hdl_t,
        listener: *mut ListenerBox,
    }

    // SAFETY: the driver handle may be used from any task; the listener
    // box is only freed by `close`, which consumes the handle.
    unsafe impl Send for CdcHandle {}

    pub struct CdcAcmHost {
        in_buffer_size: usize,
        out_buffer_size: usize,
    }

    fn usb_lib_loop() {
        loop {
            let mut flags: u32 = 0;
            // SAFETY: usb_host_install succeeded before this task started.
            let ret = unsafe { usb_host_lib_handle_events(u32::MAX, &mut flags) };
            match lib_step(ret, flags) {
                LibStep::Pause(ms) => {
                    warn!("USB: lib event pump returned {ret}");
                    FreeRtos::delay_ms(ms);
                }
                LibStep::FreeDevices => {
                    // SAFETY: as above.
                    unsafe { usb_host_device_free_all() };
                    debug!("USB: no clients, freed all devices");
                }
                LibStep::Continue => {}
            }
        }
    }

    unsafe extern "C" fn on_rx(data: *const u8, len: usize, user_arg: *mut c_void) -> bool {
        // SAFETY: user_arg is the ListenerBox leaked in `open` and freed
        // only after the driver stops calling back.
        let listener = unsafe { &*user_arg.cast::<ListenerBox>() };
        let chunk = if data.is_null() {
            &[][..]
        } else {
            // SAFETY: the driver guarantees `len` readable bytes at `data`.
            unsafe { core::slice::from_raw_parts(data, len) }
        };
        listener.on_data(chunk)
    }

    unsafe extern "C" fn on_event(event: *const cdc_acm_host_dev_event_data_t, user_ctx: *mut c_void) {
        // SAFETY: see `on_rx`; `event` is valid for the call.
        let (listener, event) = unsafe { (&*user_ctx.cast::<ListenerBox>(), &*event) };
        let mapped = match event.type_ {
            cdc_acm_host_dev_event_t_CDC_ACM_HOST_ERROR => {
                DeviceEvent::Error(unsafe { event.data.error })
            }
            cdc_acm_host_dev_event_t_CDC_ACM_HOST_DEVICE_DISCONNECTED => DeviceEvent::Disconnected,
            cdc_acm_host_dev_event_t_CDC_ACM_HOST_SERIAL_STATE => {
                DeviceEvent::SerialState(SerialState(unsafe { event.data.serial_state.val }))
            }
            other => DeviceEvent::Unsupported(other as i32),
        };
        listener.on_event(mapped);
    }

    impl CdcAcmHost {
        /// Install the USB host library and the CDC-ACM class driver and
        /// start the library event task.
        pub fn install(config: &BridgeConfig) -> Result<Self, Error> {
            let host_config = usb_host_config_t {
                skip_phy_setup: false,
                intr_flags: ESP_INTR_FLAG_LEVEL1 as i32,
                // SAFETY: remaining fields are plain data; zero is their default.
                ..unsafe { core::mem::zeroed() }
            };
            // SAFETY: called once at boot.
            let ret = unsafe { usb_host_install(&host_config) };
            if ret != ESP_OK as i32 {
                error!("USB: usb_host_install failed ({ret})");
                return Err(Error::Init("usb_host_install"));
            }

            task_pin::spawn_on_core(Core::Pro, 20, 4, "usb-lib\0", usb_lib_loop)
                .map_err(|_| Error::Init("usb lib task"))?;

            // SAFETY: NULL selects the default driver configuration.
            let ret = unsafe { cdc_acm_host_install(core::ptr::null()) };
            if ret != ESP_OK as i32 {
                error!("USB: cdc_acm_host_install failed ({ret})");
                return Err(Error::Init("cdc_acm_host_install"));
            }
            info!("USB: host + CDC-ACM driver installed");

            Ok(Self {
                in_buffer_size: config.usb_in_buffer_size,
                out_buffer_size: config.usb_out_buffer_size,
            })
        }
    }

    impl WiredTransport for CdcAcmHost {
        type Handle = CdcHandle;

        fn open(
            &self,
            filter: DeviceFilter,
            timeout_ms: u32,
            listener: &Arc<dyn WiredListener>,
        ) -> Result<CdcHandle, OpenError> {
            let ctx: *mut ListenerBox = Box::into_raw(Box::new(listener.clone()));
            let dev_config = cdc_acm_host_device_config_t {
                connection_timeout_ms: timeout_ms,
                out_buffer_size: self.out_buffer_size,
                in_buffer_size: self.in_buffer_size,
                event_cb: Some(on_event),
                data_cb: Some(on_rx),
                user_arg: ctx.cast(),
            };
            let mut raw: cdc_acm_dev_hdl_t = core::ptr::null_mut();
            // SAFETY: dev_config and raw outlive the call.
            let ret = unsafe { cdc_acm_host_open(filter.vid, filter.pid, 0, &dev_config, &mut raw) };
            if let Err(e) = open_result(ret) {
                // SAFETY: the driver did not keep ctx.
                drop(unsafe { Box::from_raw(ctx) });
                return Err(e);
            }
            Ok(CdcHandle { raw, listener: ctx })
        }

        fn close(&self, handle: CdcHandle) -> Result<(), TransportError> {
            // SAFETY: the handle is consumed; no callback runs after close.
            let ret = unsafe { cdc_acm_host_close(handle.raw) };
            drop(unsafe { Box::from_raw(handle.listener) });
            transfer_result(ret)
        }

        fn line_coding(&self, handle: &CdcHandle) -> Result<LineCoding, TransportError> {
            // SAFETY: all-zero is a valid cdc_acm_line_coding_t.
            let mut lc: cdc_acm_line_coding_t = unsafe { core::mem::zeroed() };
            transfer_result(unsafe { cdc_acm_host_line_coding_get(handle.raw, &mut lc) })?;
            let (baud, fmt, parity, bits) = (lc.dwDTERate, lc.bCharFormat, lc.bParityType, lc.bDataBits);
            decode_line_coding(baud, fmt, parity, bits).map_err(|e| {
                warn!("USB: device reported invalid line coding: {e}");
                TransportError::Rejected
            })
        }

        fn set_line_coding(&self, handle: &CdcHandle, coding: &LineCoding) -> Result<(), TransportError> {
            let (rate, char_format, parity, data_bits) = encode_line_coding(coding);
            let lc = cdc_acm_line_coding_t {
                dwDTERate: rate,
                bCharFormat: char_format,
                bParityType: parity,
                bDataBits: data_bits,
            };
            // SAFETY: handle is open; lc outlives the call.
            transfer_result(unsafe { cdc_acm_host_line_coding_set(handle.raw, &lc) })
        }

        fn set_control_lines(&self, handle: &CdcHandle, dtr: bool, rts: bool) -> Result<(), TransportError> {
            // SAFETY: handle is open.
            transfer_result(unsafe { cdc_acm_host_set_control_line_state(handle.raw, dtr, rts) })
        }

        fn send_blocking(&self, handle: &CdcHandle, data: &[u8], timeout_ms: u32) -> Result<(), TransportError> {
            // SAFETY: handle is open; data outlives the blocking call.
            transfer_result(unsafe {
                cdc_acm_host_data_tx_blocking(handle.raw, data.as_ptr(), data.len(), timeout_ms)
            })
        }
    }
}

#[cfg(target_os = "espidf")]
pub use platform::{CdcAcmHost, CdcHandle};
