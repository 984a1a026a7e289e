//! Time driver for `embassy-time`.
//!
//! `async-io-mini` timers (used by the forwarder's statistics task) run on
//! `embassy-time`, which links against two driver symbols. They are
//! provided here:
//!
//! - **`target_os = "espidf"`**: microseconds from `esp_timer_get_time()`.
//! - **`not(target_os = "espidf")`**: microseconds since first use, from
//!   `std::time::Instant`, for host tests.
//!
//! Both tick at 1 MHz, the `embassy-time` default. Wakeups are scheduled on
//! a short-lived thread that sleeps until the deadline.

use core::ffi::c_void;
use core::task::Waker;
use core::time::Duration;

#[cfg(target_os = "espidf")]
fn now_us() -> u64 {
    // SAFETY: plain read of the monotonic high-resolution timer.
    unsafe { esp_idf_svc::sys::esp_timer_get_time() as u64 }
}

#[cfg(not(target_os = "espidf"))]
fn now_us() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64
}

#[unsafe(no_mangle)]
pub extern "C" fn _embassy_time_now() -> u64 {
    now_us()
}

#[unsafe(no_mangle)]
pub extern "C" fn _embassy_time_schedule_wake(at: u64, waker: *mut c_void) {
    if waker.is_null() {
        return;
    }
    // SAFETY: embassy-time passes a valid `&Waker` for the duration of the
    // call; it is cloned before returning.
    let waker = unsafe { (*(waker as *const Waker)).clone() };
    let spawned = std::thread::Builder::new()
        .name("time-wake".into())
        .stack_size(3072)
        .spawn(move || {
            let now = now_us();
            if at > now {
                std::thread::sleep(Duration::from_micros(at - now));
            }
            waker.wake();
        });
    if let Err(e) = spawned {
        log::warn!("timer wake thread: {e}");
    }
}
