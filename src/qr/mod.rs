pub mod codec;
pub mod geofence;
