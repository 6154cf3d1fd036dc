#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![forbid(unsafe_code)]

//! Universe resolution, the Smart Filter, and per-task signal generation
//! (§4.2).

pub mod filter;
pub mod generator;
pub mod universe;

pub use filter::{SmartFilter, SmartFilterConfig, SmartFilterPresets};
pub use generator::SignalGenerator;
pub use universe::resolve_universe;
