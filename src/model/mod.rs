pub mod attendance;
pub mod attendance_token;
pub mod role;
