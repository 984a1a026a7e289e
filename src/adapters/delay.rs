//! Blocking delay provider for the lifecycle manager.
//!
//! FreeRTOS `vTaskDelay` on ESP-IDF, thread sleep elsewhere. Both implement
//! [`embedded_hal::delay::DelayNs`].

#[cfg(target_os = "espidf")]
pub use esp_idf_hal::delay::FreeRtos as PlatformDelay;

#[cfg(not(target_os = "espidf"))]
pub use host::StdDelay as PlatformDelay;

#[cfg(not(target_os = "espidf"))]
mod host {
    use core::time::Duration;

    use embedded_hal::delay::DelayNs;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct StdDelay;

    impl DelayNs for StdDelay {
        fn delay_ns(&mut self, ns: u32) {
            std::thread::sleep(Duration::from_nanos(u64::from(ns)));
        }

        fn delay_ms(&mut self, ms: u32) {
            std::thread::sleep(Duration::from_millis(u64::from(ms)));
        }
    }
}
