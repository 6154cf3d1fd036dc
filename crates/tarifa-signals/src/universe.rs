//! Universe resolution (§4.2 "Universe resolution"): turns a task's
//! declared symbols (or the whole classification table) plus the
//! [`SmartFilter`](crate::SmartFilter) into the symbol set a task is
//! actually evaluated against on a given date.

use tarifa_traits::{AssetType, Date, Symbol, SymbolClassification, Task};

use crate::filter::SmartFilter;
use tarifa_panel::PanelFrame;

/// Resolve the evaluation universe for `task` on `target_date`.
///
/// `classification` is the full classification table (every asset type);
/// this narrows to `asset_type` first. If `task.symbols` is empty, every
/// classified symbol of that asset type is a candidate; otherwise only the
/// declared symbols that also appear in the classification table are. The
/// [`SmartFilter`] then narrows candidates to the final universe.
///
/// `turnover_rate`/`amount` must cover every candidate symbol through
/// `target_date`, per [`SmartFilter::apply`]'s requirement.
#[must_use]
pub fn resolve_universe(
    task: &Task,
    asset_type: AssetType,
    classification: &[SymbolClassification],
    filter: &SmartFilter,
    target_date: Date,
    turnover_rate: &PanelFrame,
    amount: &PanelFrame,
) -> Vec<Symbol> {
    let of_asset_type: Vec<&SymbolClassification> =
        classification.iter().filter(|c| c.asset_type == asset_type).collect();

    let candidates: Vec<SymbolClassification> = if task.symbols.is_empty() {
        of_asset_type.into_iter().cloned().collect()
    } else {
        of_asset_type
            .into_iter()
            .filter(|c| task.symbols.contains(&c.symbol))
            .cloned()
            .collect()
    };

    filter.apply(&candidates, target_date, turnover_rate, amount)
}
