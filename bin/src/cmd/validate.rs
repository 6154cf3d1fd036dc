//! The `validate` subcommand: loads every strategy in a directory and
//! reports which ones parse and validate, without running anything.

use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn run(strategies_dir: PathBuf) -> Result<()> {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                     Strategy Validation                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let loaded = tarifa_loader::load_dir(&strategies_dir).context("loading strategy directory")?;

    if loaded.is_empty() {
        println!("No .toml strategy files found in {}\n", strategies_dir.display());
        return Ok(());
    }

    let mut ok_count = 0;
    let mut err_count = 0;

    for entry in &loaded {
        if entry.is_valid() {
            ok_count += 1;
            println!("  OK    {}", entry.filename);
        } else {
            err_count += 1;
            let message = entry.error.as_ref().map_or_else(|| "unknown error".to_string(), ToString::to_string);
            println!("  FAIL  {}: {}", entry.filename, message);
        }
    }

    println!("\n{ok_count} valid, {err_count} failed, {} total\n", loaded.len());

    if err_count > 0 {
        std::process::exit(1);
    }

    Ok(())
}
