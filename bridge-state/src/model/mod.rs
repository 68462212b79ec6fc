//! Device model: canonical identifiers, snapshots and derived views

mod device_id;
mod snapshot;
mod views;

pub use device_id::DeviceId;
pub use snapshot::{
    DeviceSnapshot, STATE_COLOR_TEMPERATURE_MIREDS, STATE_LEVEL, STATE_ON_OFF,
};
pub use views::{LightView, SensorView};
