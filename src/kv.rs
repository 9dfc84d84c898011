//! `KEY=VALUE` parameter streams
//!
//! Secrets bundles and `tag.conf`/`user.conf` overlays share the shell-sourced
//! dotenv format: one assignment per line, blank lines and `#` comments
//! ignored, quotes removed and `$VAR` expanded.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

/// Parse a `KEY=VALUE` stream, keeping the order of assignments.
pub fn parse(reader: impl Read) -> Result<Vec<(String, String)>> {
    dotenvy::from_read_iter(reader)
        .map(|item| item.context("Invalid KEY=VALUE line"))
        .collect()
}

/// Parse a `KEY=VALUE` file.
pub fn read_file(path: &Path) -> Result<Vec<(String, String)>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    parse(file).with_context(|| format!("Failed to parse {}", path.display()))
}
