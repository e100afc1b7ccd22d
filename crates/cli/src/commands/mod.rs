pub mod breaks;
pub mod debug;
