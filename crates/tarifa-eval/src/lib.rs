#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![forbid(unsafe_code)]

//! The rotation and portfolio backtesters (§4.3, §4.4), the per-day
//! portfolio state tracker they share, the rotation scheduler, and the
//! performance metrics computed over a completed run (§4.5).

pub mod metrics;
pub mod portfolio;
pub mod report;
pub mod rotation;
pub mod scheduler;
pub mod tracker;

pub use metrics::{MetricsConfig, PerformanceMetrics};
pub use portfolio::PortfolioBacktester;
pub use report::{build_failed_report, build_report};
pub use rotation::{benchmark_task, RotationBacktester};
pub use scheduler::{RebalanceScheduler, SchedulerState};
pub use tracker::PortfolioStateTracker;
