#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Weight-scheme construction shared by the rotation and portfolio
//! backtesters (§4.3 step 5, §4.4).
//!
//! # Examples
//!
//! ```rust
//! use tarifa_combine::{scheme_for, WeightScheme};
//! use tarifa_traits::Weight;
//!
//! let scheme = scheme_for(&Weight::Equal);
//! let weights = scheme.weights(&["A".to_string(), "B".to_string()]);
//! assert_eq!(weights["A"], 0.5);
//! ```

mod combiner;
mod equal_weight;
mod fixed_weight;

pub use combiner::WeightScheme;
pub use equal_weight::EqualWeight;
pub use fixed_weight::FixedWeight;

use tarifa_traits::Weight;

/// Build the [`WeightScheme`] a task's declared [`Weight`] calls for.
#[must_use]
pub fn scheme_for(weight: &Weight) -> Box<dyn WeightScheme> {
    match weight {
        Weight::Equal => Box::new(EqualWeight),
        Weight::Fixed(declared) => Box::new(FixedWeight::new(declared.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn scheme_for_equal_splits_evenly() {
        let scheme = scheme_for(&Weight::Equal);
        let weights = scheme.weights(&["A".to_string(), "B".to_string()]);
        assert_eq!(weights["A"], 0.5);
        assert_eq!(weights["B"], 0.5);
    }

    #[test]
    fn scheme_for_fixed_uses_declared_weights() {
        let mut declared = HashMap::new();
        declared.insert("A".to_string(), 0.7);
        let scheme = scheme_for(&Weight::Fixed(declared));
        let weights = scheme.weights(&["A".to_string()]);
        assert_eq!(weights["A"], 0.7);
    }
}
