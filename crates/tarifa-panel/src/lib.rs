#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! The `PanelFrame` value type shared by the factor expression engine and
//! the signal generator.

mod frame;

pub use frame::PanelFrame;
