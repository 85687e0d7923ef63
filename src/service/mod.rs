pub mod attendance_flow;
