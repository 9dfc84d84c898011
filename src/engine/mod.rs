//! Container engine abstraction
//!
//! Every container operation goes through [`ContainerEngine`]. The production
//! implementation, [`CliEngine`], shells out to `podman` or `docker`; the
//! engine's exit status is the only signal we get back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::constants::engine::{DOCKER, PODMAN, SEARCH_ORDER};

mod cli;
#[cfg(test)]
pub(crate) mod fake;

pub use cli::CliEngine;

/// Errors raised while driving the container engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No container engine found on PATH (tried {})", SEARCH_ORDER.join(", "))]
    NotFound,

    #[error("Container engine '{0}' not found")]
    Missing(String),

    #[error("Failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed with {}", describe_code(.code))]
    Failed { command: String, code: Option<i32> },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

impl EngineError {
    /// Exit code to propagate as our own
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EngineError::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Process exit status for a failed invocation: the code of the first failed
/// engine command in the chain, 1 for anything else
pub fn exit_status(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<EngineError>())
        .and_then(EngineError::exit_code)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

/// Flavour of container engine CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Podman,
    Docker,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Podman => PODMAN,
            EngineKind::Docker => DOCKER,
        }
    }

    /// Guess the flavour from an executable path
    pub fn from_program(program: &Path) -> Self {
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.contains(DOCKER) {
            EngineKind::Docker
        } else {
            EngineKind::Podman
        }
    }

    /// Podman groups containers in pods; docker gets a network instead
    pub fn has_pods(&self) -> bool {
        matches!(self, EngineKind::Podman)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locate the container engine executable.
///
/// An override may name an engine (`podman`, `docker`) or point at an
/// executable. Without one, the first engine of [`SEARCH_ORDER`] on PATH wins.
pub fn detect(engine_override: Option<&str>) -> Result<(EngineKind, PathBuf), EngineError> {
    if let Some(value) = engine_override.filter(|v| !v.is_empty()) {
        let path = PathBuf::from(value);
        let program = if path.components().count() > 1 {
            if !path.exists() {
                return Err(EngineError::Missing(value.to_string()));
            }
            path
        } else {
            which::which(value).map_err(|_| EngineError::Missing(value.to_string()))?
        };
        let kind = EngineKind::from_program(&program);
        debug!("Using {} engine at {}", kind, program.display());
        return Ok((kind, program));
    }

    for name in SEARCH_ORDER {
        if let Ok(program) = which::which(name) {
            let kind = EngineKind::from_program(&program);
            debug!("Detected {} engine at {}", kind, program.display());
            return Ok((kind, program));
        }
    }

    Err(EngineError::NotFound)
}

/// What `create` needs to know about a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub pod: Option<String>,
    pub options: Vec<String>,
    pub volumes: Vec<String>,
    pub environment: Vec<(String, String)>,
    pub command: Vec<String>,
}

/// Operations the deployment tooling needs from a container engine
pub trait ContainerEngine {
    fn kind(&self) -> EngineKind;

    /// Names of running containers, or of all containers when `all` is set
    fn list_containers(&self, all: bool) -> anyhow::Result<Vec<String>>;

    fn is_running(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.list_containers(false)?.iter().any(|n| n == name))
    }

    fn exists(&self, name: &str) -> anyhow::Result<bool> {
        Ok(self.list_containers(true)?.iter().any(|n| n == name))
    }

    fn create(&self, spec: &ContainerSpec) -> anyhow::Result<()>;
    fn start(&self, name: &str) -> anyhow::Result<()>;
    fn stop(&self, name: &str) -> anyhow::Result<()>;
    fn remove(&self, name: &str) -> anyhow::Result<()>;
    fn status(&self, name: &str) -> anyhow::Result<()>;
    fn logs(&self, name: &str, args: &[String]) -> anyhow::Result<()>;

    /// Attached exec with the caller's terminal
    fn exec(&self, name: &str, options: &[String], command: &[String]) -> anyhow::Result<()>;

    /// Exec feeding `input` to the command's standard input
    fn exec_with_input(&self, name: &str, command: &[String], input: &[u8])
        -> anyhow::Result<()>;

    /// Exec feeding `input` and capturing standard output; stderr is inherited
    fn exec_capture(&self, name: &str, command: &[String], input: &[u8])
        -> anyhow::Result<String>;

    /// Quiet exec reporting only whether the command succeeded
    fn probe(&self, name: &str, command: &[String]) -> anyhow::Result<bool>;

    fn run(&self, image: &str, options: &[String], command: &[String]) -> anyhow::Result<()>;
    fn build(&self, reference: &str, options: &[String], context: &Path) -> anyhow::Result<()>;
    fn pull(&self, reference: &str) -> anyhow::Result<()>;
    fn push(&self, reference: &str) -> anyhow::Result<()>;

    fn pod_exists(&self, pod: &str) -> anyhow::Result<bool>;
    fn create_pod(&self, pod: &str, options: &[String]) -> anyhow::Result<()>;
}
