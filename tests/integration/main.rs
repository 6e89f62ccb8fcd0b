//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below drives the lifecycle controller through whole wake
//! cycles against the recording mocks in `mock_hw`.  Everything runs on the
//! host with no hardware.

mod config_refresh_tests;
mod connectivity_tests;
mod lifecycle_tests;
mod mock_hw;
