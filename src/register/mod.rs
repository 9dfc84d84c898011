//! Product registration driver
//!
//! Product files are discovered on the host, checked against the server's
//! registry by a status command running in the application container, and the
//! files reported as new or updated are piped into the registration command.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{Deployment, RegistrationConfig};
use crate::engine::ContainerEngine;

const ANY: &str = "*";
const EMPTY_COLUMN: &str = "-";

/// The product file a status line selects, if any.
///
/// Status lines are tab separated with the action in the first column. For
/// `register` and `update` the product file is the last column that is not
/// `-`; every other action selects nothing.
pub fn selected_file(line: &str) -> Option<&str> {
    let mut columns = line.split('\t');
    match columns.next() {
        Some("register") | Some("update") => columns
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != EMPTY_COLUMN)
            .last(),
        _ => None,
    }
}

/// Split a status stream: selected files go to `selected`, every other line
/// to `rest` unchanged. Returns the number of selected files.
pub fn filter_status<R, O, E>(input: R, selected: &mut O, rest: &mut E) -> Result<usize>
where
    R: BufRead,
    O: Write,
    E: Write,
{
    let mut count = 0;
    for line in input.lines() {
        let line = line.context("Failed to read status line")?;
        match selected_file(&line) {
            Some(file) => {
                writeln!(selected, "{}", file)?;
                count += 1;
            }
            None => writeln!(rest, "{}", line)?,
        }
    }
    Ok(count)
}

/// Collect product files under `paths` whose file name matches `pattern`.
///
/// Files named explicitly are taken as they are. The result is sorted and
/// free of duplicates.
pub fn discover(paths: &[PathBuf], pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = glob::Pattern::new(pattern)
        .with_context(|| format!("Invalid file name pattern '{}'", pattern))?;
    let mut found = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            walk(path, &pattern, &mut found)?;
        } else if path.exists() {
            found.insert(path.clone());
        } else {
            anyhow::bail!("No such file or directory: {}", path.display());
        }
    }
    Ok(found.into_iter().collect())
}

fn walk(dir: &Path, pattern: &glob::Pattern, found: &mut BTreeSet<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, pattern, found)?;
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| pattern.matches(n))
        {
            found.insert(path);
        }
    }
    Ok(())
}

fn substitute(template: &[String], values: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            values.iter().fold(arg.clone(), |arg, (key, value)| {
                arg.replace(&format!("{{{}}}", key), value)
            })
        })
        .collect()
}

fn file_list<P: AsRef<Path>>(files: &[P]) -> String {
    files
        .iter()
        .map(|f| format!("{}\n", f.as_ref().display()))
        .collect()
}

pub struct Registrar<'a> {
    engine: &'a dyn ContainerEngine,
    deployment: &'a Deployment,
}

impl<'a> Registrar<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, deployment: &'a Deployment) -> Self {
        Self { engine, deployment }
    }

    fn settings(&self) -> &RegistrationConfig {
        &self.deployment.registration
    }

    fn container(&self) -> Result<String> {
        let image = self.deployment.image(&self.settings().image)?;
        Ok(image.container_name()?.to_string())
    }

    /// File name pattern of a collection, `*` when none is configured
    pub fn pattern(&self, collection: &str) -> &str {
        self.settings()
            .collections
            .get(collection)
            .map(String::as_str)
            .unwrap_or(ANY)
    }

    /// Register the new or updated products found under `paths`.
    ///
    /// With `dry_run` the selection is written to `out` and nothing is
    /// registered. Returns the number of selected files.
    pub fn register<O: Write, E: Write>(
        &self,
        collection: &str,
        paths: &[PathBuf],
        pattern: Option<&str>,
        dry_run: bool,
        out: &mut O,
        rest: &mut E,
    ) -> Result<usize> {
        let container = self.container()?;
        let pattern = pattern.unwrap_or_else(|| self.pattern(collection));
        let files = discover(paths, pattern)?;
        info!(
            "Found {} file(s) matching '{}' for {}",
            files.len(),
            pattern,
            collection
        );
        if files.is_empty() {
            info!("Nothing to register");
            return Ok(0);
        }

        let values = [("collection", collection)];
        let status_command = substitute(&self.settings().status_command, &values);
        let status = self
            .engine
            .exec_capture(&container, &status_command, file_list(&files).as_bytes())?;

        let mut selected = Vec::new();
        let count = filter_status(status.as_bytes(), &mut selected, rest)?;
        if dry_run {
            out.write_all(&selected)?;
            info!("{} file(s) would be registered", count);
            return Ok(count);
        }
        if count == 0 {
            info!("Nothing to register");
            return Ok(0);
        }

        info!("Registering {} file(s) in {}", count, collection);
        let register_command = substitute(&self.settings().register_command, &values);
        self.engine
            .exec_with_input(&container, &register_command, &selected)?;
        Ok(count)
    }

    /// Replace a singleton cached product with `file`
    pub fn cached_product(&self, product_type: &str, file: &Path) -> Result<()> {
        let container = self.container()?;
        let file = file.display().to_string();
        let command = substitute(
            &self.settings().cached_product_command,
            &[("type", product_type), ("file", &file)],
        );
        debug!("Cached product command: {}", command.join(" "));
        info!("Updating cached product {} from {}", product_type, file);
        self.engine.exec(&container, &[], &command)
    }
}

#[cfg(test)]
mod tests;
