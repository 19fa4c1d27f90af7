//! Background Tasks Module
//!
//! # Tasks
//! - L1 sweep: drops expired in-process entries at a configured interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
