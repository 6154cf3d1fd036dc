//! Fixed-weight scheme.

use std::collections::HashMap;

use tarifa_traits::Symbol;

use crate::combiner::WeightScheme;

/// Declared per-symbol weights (`Task::weight`'s `Weight::Fixed` variant).
/// `Task::validate` already enforces the declared weights sum to at most
/// `1.0`; this scheme does not re-check it.
///
/// A symbol outside `selected` is ignored even if declared; a selected
/// symbol absent from the declared map gets weight `0.0` (§4.3 step 5
/// "Fixed ⇒ as declared").
#[derive(Debug, Clone)]
pub struct FixedWeight {
    declared: HashMap<Symbol, f64>,
}

impl FixedWeight {
    /// Wrap a task's declared `{symbol -> weight}` map.
    #[must_use]
    pub fn new(declared: HashMap<Symbol, f64>) -> Self {
        Self { declared }
    }
}

impl WeightScheme for FixedWeight {
    fn weights(&self, selected: &[Symbol]) -> HashMap<Symbol, f64> {
        selected
            .iter()
            .map(|symbol| (symbol.clone(), self.declared.get(symbol).copied().unwrap_or(0.0)))
            .collect()
    }

    fn name(&self) -> &str {
        "fixed_weight"
    }
}
