//! Equal-weight scheme.

use std::collections::HashMap;

use tarifa_traits::Symbol;

use crate::combiner::WeightScheme;

/// `1/|selected|` for every selected symbol (§4.3 step 5 "Equal ⇒
/// `1/|selected|`"; §4.4 "Target weight `w = 1/|current_signals|`").
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl WeightScheme for EqualWeight {
    fn weights(&self, selected: &[Symbol]) -> HashMap<Symbol, f64> {
        if selected.is_empty() {
            return HashMap::new();
        }
        let w = 1.0 / selected.len() as f64;
        selected.iter().cloned().map(|symbol| (symbol, w)).collect()
    }

    fn name(&self) -> &str {
        "equal_weight"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_evenly_across_selected_symbols() {
        let selected = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let weights = EqualWeight.weights(&selected);
        assert_eq!(weights.len(), 3);
        for symbol in &selected {
            assert!((weights[symbol] - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn single_symbol_gets_the_whole_weight() {
        let weights = EqualWeight.weights(&["A".to_string()]);
        assert_eq!(weights["A"], 1.0);
    }

    #[test]
    fn empty_selection_is_empty() {
        assert!(EqualWeight.weights(&[]).is_empty());
    }
}
