//! Database credential bundles
//!
//! A bundle is a small `KEY=VALUE` file holding `DBNAME`, `DBUSER`,
//! `DBPASSWD` and the optional `DBEXTENSIONS`. It is generated once with a
//! random password, kept with mode 0600, and piped into `create_db` on every
//! pod start.

use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::constants::database::PASSWORD_LENGTH;
use crate::constants::secrets::{DBEXTENSIONS, DBNAME, DBPASSWD, DBUSER};
use crate::kv;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub name: String,
    pub user: String,
    pub password: String,
    pub extensions: Vec<String>,
}

/// Random alphanumeric password
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl DbCredentials {
    pub fn generate(name: &str, user: &str, extensions: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            user: user.to_string(),
            password: generate_password(),
            extensions,
        }
    }

    /// Parse a bundle; every required variable must be present and non-empty
    pub fn parse(reader: impl Read) -> Result<Self> {
        let values: HashMap<String, String> = kv::parse(reader)?.into_iter().collect();
        let required = |key: &str| -> Result<String> {
            values
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .with_context(|| format!("{} is not set", key))
        };

        Ok(Self {
            name: required(DBNAME)?,
            user: required(DBUSER)?,
            password: required(DBPASSWD)?,
            extensions: values
                .get(DBEXTENSIONS)
                .map(|v| split_list(v))
                .unwrap_or_default(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to read secrets file {}", path.display()))?;
        Self::parse(file).with_context(|| format!("Invalid secrets file {}", path.display()))
    }

    /// Serialise as `KEY=VALUE` lines
    pub fn to_env(&self) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "{}={}", DBNAME, self.name)?;
        writeln!(out, "{}={}", DBUSER, self.user)?;
        writeln!(out, "{}={}", DBPASSWD, self.password)?;
        if !self.extensions.is_empty() {
            writeln!(out, "{}=\"{}\"", DBEXTENSIONS, self.extensions.join(" "))?;
        }
        Ok(out)
    }

    /// Write the bundle readable by its owner only
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        // NamedTempFile is created with mode 0600 on unix
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        file.write_all(self.to_env()?.as_bytes())?;
        file.persist(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Create a secrets file unless one already exists
///
/// Returns true when a new bundle was written.
pub fn ensure_file(
    path: &Path,
    name: &str,
    user: &str,
    extensions: Vec<String>,
    force: bool,
) -> Result<bool> {
    if path.exists() && !force {
        info!("Secrets file {} already exists", path.display());
        return Ok(false);
    }
    DbCredentials::generate(name, user, extensions).write(path)?;
    info!("Generated secrets file {}", path.display());
    Ok(true)
}
