#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![forbid(unsafe_code)]

//! Strategy discovery and load-time validation (§6, Strategy Loader).

use std::fs;
use std::path::{Path, PathBuf};

use tarifa_traits::{Task, TarifaError};

/// The outcome of loading one strategy file.
///
/// Mirrors a single entry of [`load_dir`]'s result: either a `Task` that
/// passed every load-time check, or the reason it didn't, keyed by the
/// file it came from so a caller can report which declaration to fix.
#[derive(Debug, Clone)]
pub struct LoadedTask {
    /// File stem, used as the strategy's identity when its own `name`
    /// field cannot be trusted (the file failed before deserializing).
    pub filename: String,
    /// Full path the declaration was read from.
    pub filepath: PathBuf,
    /// The parsed and validated task, or `None` if loading failed.
    pub task: Option<Task>,
    /// The failure that prevented `task` from being populated.
    pub error: Option<TarifaError>,
}

impl LoadedTask {
    /// Whether this entry loaded successfully.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.task.is_some()
    }
}

/// Discover every `*.toml` file directly under `dir` and load each one.
///
/// Files are processed in directory order; a dotfile (name starting with
/// `.`) is skipped outright, matching the original loader's convention of
/// ignoring hidden and cache entries. A broken file does not stop the
/// scan — it is recorded as a failed [`LoadedTask`] and the rest of the
/// directory still loads, so one bad strategy never takes down a whole
/// catalogue.
///
/// # Errors
///
/// Returns [`TarifaError::Other`] if `dir` cannot be read at all (it does
/// not exist or isn't a directory). Per-file failures never propagate
/// here; they are reported in the returned `Vec`.
pub fn load_dir(dir: &Path) -> Result<Vec<LoadedTask>, TarifaError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| TarifaError::Other(format!("cannot read strategy directory {}: {e}", dir.display())))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "toml")
                && path.file_name().and_then(|n| n.to_str()).is_some_and(|n| !n.starts_with('.'))
        })
        .collect();
    paths.sort();

    Ok(paths.iter().map(|path| load_file(path)).collect())
}

/// Load and validate a single strategy file.
///
/// Deserializes the TOML into a [`Task`], runs [`Task::validate`], then
/// parses every declared expression (`select_buy`, `select_sell`, and
/// `order_by_signal` when present) with the factor expression grammar so a
/// malformed formula is caught at load time rather than on the first
/// trading day that evaluates it.
#[must_use]
pub fn load_file(path: &Path) -> LoadedTask {
    let filename = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string();

    let result = (|| -> Result<Task, TarifaError> {
        let source = fs::read_to_string(path).map_err(|e| TarifaError::Other(format!("cannot read {}: {e}", path.display())))?;
        let task: Task = toml::from_str(&source).map_err(|e| TarifaError::StrategyCompileError {
            strategy: filename.clone(),
            message: format!("TOML parse error: {e}"),
        })?;
        task.validate()?;
        validate_expressions(&task)?;
        Ok(task)
    })();

    match result {
        Ok(task) => {
            tracing::info!(strategy = %task.name, path = %path.display(), "loaded strategy");
            LoadedTask { filename, filepath: path.to_path_buf(), task: Some(task), error: None }
        }
        Err(err) => {
            tracing::warn!(strategy = %filename, path = %path.display(), error = %err, "skipping strategy");
            LoadedTask { filename, filepath: path.to_path_buf(), task: None, error: Some(err) }
        }
    }
}

/// Parse every expression a task declares, rewriting the resulting
/// [`TarifaError::StrategyCompileError`] (the parser has no task name to
/// attach) to carry this task's name.
fn validate_expressions(task: &Task) -> Result<(), TarifaError> {
    let attach_name = |result: Result<_, TarifaError>| -> Result<(), TarifaError> {
        result.map(|_| ()).map_err(|err| match err {
            TarifaError::StrategyCompileError { message, .. } => {
                TarifaError::StrategyCompileError { strategy: task.name.clone(), message }
            }
            other => other,
        })
    };

    for expr in &task.select_buy {
        attach_name(tarifa_expr::parse(expr))?;
    }
    for expr in &task.select_sell {
        attach_name(tarifa_expr::parse(expr))?;
    }
    if let Some(expr) = &task.order_by_signal {
        attach_name(tarifa_expr::parse(expr))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    const VALID: &str = r#"
name = "momentum-rotation"
start_date = "2024-01-01"
end_date = "2024-12-31"
benchmark = "510300.SH"
select_buy = ["roc(close, 20) > 0.05"]
period = "monthly"
initial_capital = 1000000.0
"#;

    #[test]
    fn loads_a_well_formed_strategy() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "momentum.toml", VALID);

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].is_valid());
        assert_eq!(loaded[0].task.as_ref().unwrap().name, "momentum-rotation");
    }

    #[test]
    fn a_broken_expression_fails_that_file_without_blocking_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.toml", &VALID.replace("roc(close, 20) > 0.05", "roc(close, ) >"));
        write(dir.path(), "good.toml", VALID);

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        let broken = loaded.iter().find(|t| t.filename == "broken").unwrap();
        let good = loaded.iter().find(|t| t.filename == "good").unwrap();
        assert!(!broken.is_valid());
        assert!(matches!(broken.error, Some(TarifaError::StrategyCompileError { .. })));
        assert!(good.is_valid());
    }

    #[test]
    fn malformed_toml_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notreally.toml", "this is not = [valid toml");

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(!loaded[0].is_valid());
    }

    #[test]
    fn a_non_expression_validation_failure_is_caught_too() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "inverted.toml", &VALID.replace("2024-01-01", "2025-01-01"));

        let loaded = load_dir(dir.path()).unwrap();
        assert!(!loaded[0].is_valid());
    }

    #[test]
    fn dotfiles_and_non_toml_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".hidden.toml", VALID);
        write(dir.path(), "notes.txt", "not a strategy");
        write(dir.path(), "real.toml", VALID);

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].filename, "real");
    }

    #[test]
    fn missing_directory_is_a_top_level_error() {
        let result = load_dir(Path::new("/no/such/strategy/directory"));
        assert!(result.is_err());
    }
}
