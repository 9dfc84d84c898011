//! PostgreSQL bootstrap helper
//!
//! Reconciles a role and database with a credential bundle: check the current
//! state, then apply only what is missing. Statements run through
//! [`SqlRunner`], normally `psql` inside the database container.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::constants::database::SUPERUSER;
use crate::secrets::DbCredentials;

pub mod hba;
pub mod sql;

/// Executes SQL against the server
pub trait SqlRunner {
    /// Run a query and return its unaligned, tuples-only output
    fn query(&self, database: Option<&str>, sql: &str) -> Result<String>;

    fn execute(&self, database: Option<&str>, sql: &str) -> Result<()> {
        self.query(database, sql).map(|_| ())
    }

    fn exists(&self, sql: &str) -> Result<bool> {
        Ok(!self.query(None, sql)?.trim().is_empty())
    }

    /// Role the statements run as; it keeps local access to restricted databases
    fn superuser(&self) -> &str {
        SUPERUSER
    }
}

/// `psql` command line client
pub struct Psql {
    program: PathBuf,
    superuser: String,
}

impl Default for Psql {
    fn default() -> Self {
        Self::new("psql", SUPERUSER)
    }
}

impl Psql {
    pub fn new(program: impl Into<PathBuf>, superuser: &str) -> Self {
        Self {
            program: program.into(),
            superuser: superuser.to_string(),
        }
    }

    fn command(&self, database: Option<&str>, sql: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-X", "-q", "-v", "ON_ERROR_STOP=1", "-tA", "-U"])
            .arg(&self.superuser);
        if let Some(database) = database {
            cmd.arg("-d").arg(database);
        }
        cmd.arg("-c").arg(sql);
        cmd
    }
}

impl SqlRunner for Psql {
    fn query(&self, database: Option<&str>, sql: &str) -> Result<String> {
        let mut cmd = self.command(database, sql);
        // the statement may carry a password
        debug!("Running psql against {}", database.unwrap_or("the default database"));
        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute {}", self.program.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("psql failed: {}", stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn superuser(&self) -> &str {
        &self.superuser
    }
}

/// Result of a `create` reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

pub struct Bootstrap<'a> {
    runner: &'a dyn SqlRunner,
    pg_hba: Option<PathBuf>,
}

impl<'a> Bootstrap<'a> {
    pub fn new(runner: &'a dyn SqlRunner, pg_hba: Option<PathBuf>) -> Self {
        Self { runner, pg_hba }
    }

    /// Default pg_hba.conf location under `$PGDATA`
    pub fn default_pg_hba() -> Option<PathBuf> {
        std::env::var_os("PGDATA").map(|data| PathBuf::from(data).join("pg_hba.conf"))
    }

    /// Create or update the role, then create the database it owns.
    ///
    /// An existing database is left untouched unless `force` is set, in which
    /// case it is dropped and created again.
    pub fn create(&self, creds: &DbCredentials, force: bool) -> Result<CreateOutcome> {
        if self.runner.exists(&sql::database_exists(&creds.name))? {
            if !force {
                info!("Database {} already exists", creds.name);
                return Ok(CreateOutcome::AlreadyExists);
            }
            warn!("Dropping existing database {}", creds.name);
            self.runner.execute(None, &sql::drop_database(&creds.name))?;
        }

        if self.runner.exists(&sql::role_exists(&creds.user))? {
            info!("Updating role {}", creds.user);
            self.runner
                .execute(None, &sql::alter_role(&creds.user, &creds.password))?;
        } else {
            info!("Creating role {}", creds.user);
            self.runner
                .execute(None, &sql::create_role(&creds.user, &creds.password))?;
        }

        info!("Creating database {} owned by {}", creds.name, creds.user);
        self.runner
            .execute(None, &sql::create_database(&creds.name, &creds.user))?;

        for extension in &creds.extensions {
            info!("Creating extension {} in {}", extension, creds.name);
            self.runner
                .execute(Some(&creds.name), &sql::create_extension(extension))?;
        }

        self.update_access(&creds.name, Some(&creds.user))?;
        Ok(CreateOutcome::Created)
    }

    /// Drop a role, and its database when given. A missing role is not an error.
    pub fn drop_user(&self, user: &str, database: Option<&str>) -> Result<()> {
        if !self.runner.exists(&sql::role_exists(user))? {
            warn!("Role {} does not exist", user);
            return Ok(());
        }
        if let Some(database) = database {
            info!("Dropping database {}", database);
            self.runner.execute(None, &sql::drop_database(database))?;
        }
        info!("Dropping role {}", user);
        self.runner.execute(None, &sql::drop_role(user))?;
        if let Some(database) = database {
            self.update_access(database, None)?;
        }
        Ok(())
    }

    fn update_access(&self, database: &str, user: Option<&str>) -> Result<()> {
        let Some(path) = &self.pg_hba else {
            warn!("No pg_hba.conf location known, access rules left unchanged");
            return Ok(());
        };
        if hba::edit_file(path, database, user, self.runner.superuser())? {
            self.runner.execute(None, sql::RELOAD_CONF)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
