//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock transports. All tests run on the host with no USB or BLE
//! hardware required.

mod end_to_end_tests;
mod lifecycle_tests;
mod mock_transport;
