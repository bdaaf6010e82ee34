//! `dealflow validate <config>`

use std::path::Path;

use anyhow::{bail, Result};
use colored::Colorize;

use crate::config::PipelineConfig;

pub fn execute(path: &Path) -> Result<()> {
    let config = PipelineConfig::from_file(path)?;

    match config.validate() {
        Ok(()) => {
            let terminals = config.stages.iter().filter(|s| s.terminal.is_some()).count();
            println!(
                "{} {} is valid ({} stages, {} terminal)",
                "✓".green().bold(),
                path.display(),
                config.stages.len() - terminals,
                terminals
            );
            Ok(())
        }
        Err(errors) => {
            println!("{} {} has {} problem(s):", "✗".red().bold(), path.display(), errors.len());
            for error in &errors {
                println!("  {} {}", "-".red(), error);
            }
            bail!("Pipeline config validation failed")
        }
    }
}
