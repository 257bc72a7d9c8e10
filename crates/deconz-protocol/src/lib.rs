//! deCONZ Serial Protocol implementation for ConBee II
//!
//! This crate implements the serial protocol used to communicate with
//! Dresden Elektronik ConBee II Zigbee coordinators.

pub mod commands;
pub mod frame;
pub mod slip;
pub mod transport;
pub mod types;

pub use commands::{CommandId, NetworkParameter};
pub use frame::Frame;
pub use slip::{SlipDecoder, SlipEncoder};
pub use transport::{DeconzEvent, DeconzTransport};
pub use types::*;
