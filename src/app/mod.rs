//! Application core: the wake-cycle lifecycle and its ports.
//!
//! The lifecycle rules live here and in [`crate::fsm`].  Every interaction
//! with the outside world happens through the **port traits** in [`ports`],
//! so the whole cycle runs on the host against mocks.

pub mod events;
pub mod ports;
pub mod service;
