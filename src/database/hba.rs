//! `pg_hba.conf` access stanzas
//!
//! Each managed database gets one stanza bounded by marker comments. Applying
//! a stanza first strips the previous one together with any unmarked rule for
//! the same database, so the edit converges: applying it twice gives the same
//! file as applying it once.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::constants::database::{HBA_BEGIN, HBA_END, HBA_METHOD, HBA_SUPERUSER_METHOD};

fn begin_marker(database: &str) -> String {
    format!("{} {}", HBA_BEGIN, database)
}

fn end_marker(database: &str) -> String {
    format!("{} {}", HBA_END, database)
}

fn is_rule(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn rule_database(line: &str) -> Option<&str> {
    if !is_rule(line) {
        return None;
    }
    line.split_whitespace()
        .nth(1)
        .map(|db| db.trim_matches('"'))
}

/// The stanza granting `user` exclusive access to `database`.
///
/// `superuser` keeps its local socket access so the database can still be
/// administered (and dropped) afterwards.
pub fn stanza(database: &str, user: &str, superuser: &str) -> Vec<String> {
    vec![
        begin_marker(database),
        format!("local   {}   {}   {}", database, user, HBA_METHOD),
        format!("host    {}   {}   127.0.0.1/32   {}", database, user, HBA_METHOD),
        format!("host    {}   {}   ::1/128   {}", database, user, HBA_METHOD),
        format!("local   {}   {}   {}", database, superuser, HBA_SUPERUSER_METHOD),
        format!("local   {}   all   reject", database),
        format!("host    {}   all   all   reject", database),
        end_marker(database),
    ]
}

/// Remove the managed stanza and any other rule naming `database`
pub fn strip(content: &str, database: &str) -> Vec<String> {
    let begin = begin_marker(database);
    let end = end_marker(database);
    let mut kept = Vec::new();
    let mut inside = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if inside {
            if trimmed == end {
                inside = false;
            }
            continue;
        }
        if trimmed == begin {
            inside = true;
            continue;
        }
        if trimmed == end || rule_database(line) == Some(database) {
            continue;
        }
        kept.push(line.to_string());
    }
    kept
}

fn render(lines: Vec<String>) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Restrict `database` to `user`; the stanza goes before the first rule
/// because pg_hba.conf is first-match
pub fn restrict(content: &str, database: &str, user: &str, superuser: &str) -> String {
    let mut lines = strip(content, database);
    let position = lines
        .iter()
        .position(|l| is_rule(l))
        .unwrap_or(lines.len());
    lines.splice(position..position, stanza(database, user, superuser));
    render(lines)
}

/// Drop every access rule for `database`
pub fn unrestrict(content: &str, database: &str) -> String {
    render(strip(content, database))
}

/// Rewrite a pg_hba.conf file; `user` of `None` removes the stanza.
///
/// Returns whether the file changed.
pub fn edit_file(
    path: &Path,
    database: &str,
    user: Option<&str>,
    superuser: &str,
) -> Result<bool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let updated = match user {
        Some(user) => restrict(&content, database, user, superuser),
        None => unrestrict(&content, database),
    };
    if updated == content {
        debug!("{} already up to date for {}", path.display(), database);
        return Ok(false);
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let permissions = std::fs::metadata(path)?.permissions();
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(updated.as_bytes())?;
    std::fs::set_permissions(file.path(), permissions)?;
    file.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Updated access rules for {} in {}", database, path.display());
    Ok(true)
}
