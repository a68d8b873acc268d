//! BASim: a deterministic, tick-based simulator of a university campus's
//! HVAC, electrical, data-center and wastewater plant, exposed over
//! Modbus/TCP, BACnet/IP, BACnet/SC and an HTTP/JSON API.

pub mod api;
pub mod bacnet;
pub mod campus;
pub mod central_plant;
pub mod clock;
pub mod config;
pub mod equipment;
pub mod error;
pub mod modbus_server;
pub mod registry;
pub mod weather;

pub use campus::{Campus, CampusShared};
pub use config::Config;
pub use error::{BasimError, BasimResult};
