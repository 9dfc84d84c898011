//! Configuration template rendering
//!
//! Templates use Jinja2 syntax. The rendering context is the process
//! environment overridden by `KEY=VALUE` parameter files, applied in order.
//! Parameter values are literal, so secrets such as `SECRET_KEY` may contain
//! `$`, quotes and `#`.

use anyhow::{Context, Result};
use minijinja::Environment;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

const STDIN: &str = "-";

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == STDIN
}

/// Process environment, skipping variables that are not valid UTF-8
pub fn environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Parse a parameter stream: one `KEY=VALUE` per line split at the first `=`,
/// both sides trimmed, blank lines and `#` lines skipped. A line without `=`
/// sets an empty value.
pub fn parse_parameters(reader: impl BufRead) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').unwrap_or((line, ""));
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}

fn read_parameters(path: &Path) -> Result<Vec<(String, String)>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    parse_parameters(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Apply parameter files over `base`; `-` reads standard input
pub fn context<P: AsRef<Path>>(
    mut base: BTreeMap<String, String>,
    params: &[P],
) -> Result<BTreeMap<String, String>> {
    for path in params {
        let path = path.as_ref();
        let pairs = if is_stdin(path) {
            parse_parameters(std::io::stdin().lock())
                .context("Failed to parse parameters from stdin")?
        } else {
            read_parameters(path)?
        };
        debug!("{} parameter(s) from {}", pairs.len(), path.display());
        base.extend(pairs);
    }
    Ok(base)
}

/// Read the template source; `-` reads standard input
pub fn read_template(path: &Path) -> Result<String> {
    if is_stdin(path) {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read template from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))
}

/// Render `source` with `context`; undefined variables render empty
pub fn render(source: &str, context: &BTreeMap<String, String>) -> Result<String> {
    let env = Environment::new();
    env.render_str(source, context)
        .context("Failed to render template")
}
