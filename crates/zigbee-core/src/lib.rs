//! Zigbee application-layer stack core.
//!
//! Drives a Zigbee coordinator radio (over whatever implements
//! [`radio::RadioDriver`]) end to end: the device/endpoint/cluster object
//! graph (C6/C7/C8), the ZCL wire codec (C1-C3), the cluster registry and
//! runtime (C4/C5), request/response correlation (C14), OTA firmware
//! delivery (C10), network backup/restore (C11), and the topology scanner
//! (C12). See `DESIGN.md` for the grounding ledger.

pub mod application;
pub mod backup;
pub mod cluster;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod group;
pub mod listener;
pub mod ota;
pub mod persistence;
pub mod radio;
pub mod state;
pub mod struct_codec;
pub mod topology;
pub mod types;
pub mod zcl;
pub mod zdo;

pub use application::{ApplicationController, ApplicationConfig};
pub use device::{Device, DeviceStatus};
pub use endpoint::Endpoint;
pub use error::{Result, ZigbeeError};
pub use persistence::PersistenceEvent;
