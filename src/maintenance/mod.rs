//! # Maintenance Window Scheduling
//!
//! Cron-driven installation windows for devices that must not be
//! updated outside agreed service periods.
//!
//! ## Components
//!
//! - [`schedule`]: 6-field cron expression parser with occurrence lookup
//! - [`window`]: window definition and pure wall-clock evaluation

pub mod schedule;
pub mod window;

pub use schedule::CronSchedule;
pub use window::{MaintenanceWindow, WindowState};
