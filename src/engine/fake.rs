//! In-memory engine used by unit tests

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{ContainerEngine, ContainerSpec, EngineError, EngineKind};

#[derive(Default)]
pub(crate) struct FakeState {
    /// container name -> running
    pub containers: BTreeMap<String, bool>,
    pub specs: BTreeMap<String, ContainerSpec>,
    pub pods: BTreeSet<String>,
    pub calls: Vec<String>,
    pub inputs: Vec<(String, String)>,
    pub probe_results: VecDeque<bool>,
    pub probe_default: bool,
    pub capture_output: String,
    /// calls starting with this prefix fail with exit code 125
    pub fail_on: Option<String>,
}

pub(crate) struct FakeEngine {
    kind: EngineKind,
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::with_kind(EngineKind::Podman)
    }

    pub fn with_kind(kind: EngineKind) -> Self {
        Self {
            kind,
            state: Mutex::new(FakeState {
                probe_default: true,
                ..Default::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn running(&self) -> Vec<String> {
        self.state()
            .containers
            .iter()
            .filter(|(_, running)| **running)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn record(&self, call: String) -> Result<()> {
        let mut state = self.state();
        let fails = state
            .fail_on
            .as_ref()
            .is_some_and(|prefix| call.starts_with(prefix.as_str()));
        state.calls.push(call.clone());
        if fails {
            return Err(EngineError::Failed {
                command: format!("fake {}", call),
                code: Some(125),
            }
            .into());
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<()> {
        if self.state().containers.contains_key(name) {
            Ok(())
        } else {
            Err(EngineError::Failed {
                command: format!("fake: no such container {}", name),
                code: Some(125),
            }
            .into())
        }
    }
}

/// Space-joined call description without empty parts
fn call(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

impl ContainerEngine for FakeEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn list_containers(&self, all: bool) -> Result<Vec<String>> {
        Ok(self
            .state()
            .containers
            .iter()
            .filter(|(_, running)| all || **running)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn create(&self, spec: &ContainerSpec) -> Result<()> {
        self.record(format!("create {}", spec.name))?;
        let mut state = self.state();
        if state.containers.contains_key(&spec.name) {
            anyhow::bail!("fake: container {} already exists", spec.name);
        }
        state.containers.insert(spec.name.clone(), false);
        state.specs.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn start(&self, name: &str) -> Result<()> {
        self.record(format!("start {}", name))?;
        self.require(name)?;
        self.state().containers.insert(name.to_string(), true);
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.record(format!("stop {}", name))?;
        self.require(name)?;
        self.state().containers.insert(name.to_string(), false);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.record(format!("rm {}", name))?;
        self.require(name)?;
        let mut state = self.state();
        if state.containers.get(name) == Some(&true) {
            anyhow::bail!("fake: container {} is running", name);
        }
        state.containers.remove(name);
        state.specs.remove(name);
        Ok(())
    }

    fn status(&self, name: &str) -> Result<()> {
        self.record(format!("status {}", name))
    }

    fn logs(&self, name: &str, args: &[String]) -> Result<()> {
        self.record(call(&["logs", name, &args.join(" ")]))
    }

    fn exec(&self, name: &str, options: &[String], command: &[String]) -> Result<()> {
        self.record(call(&["exec", &options.join(" "), name, &command.join(" ")]))
    }

    fn exec_with_input(&self, name: &str, command: &[String], input: &[u8]) -> Result<()> {
        self.record(format!("exec-input {} {}", name, command.join(" ")))?;
        self.state()
            .inputs
            .push((name.to_string(), String::from_utf8_lossy(input).to_string()));
        Ok(())
    }

    fn exec_capture(&self, name: &str, command: &[String], input: &[u8]) -> Result<String> {
        self.record(format!("exec-capture {} {}", name, command.join(" ")))?;
        let mut state = self.state();
        state
            .inputs
            .push((name.to_string(), String::from_utf8_lossy(input).to_string()));
        Ok(state.capture_output.clone())
    }

    fn probe(&self, name: &str, command: &[String]) -> Result<bool> {
        self.record(format!("probe {} {}", name, command.join(" ")))?;
        let mut state = self.state();
        let default = state.probe_default;
        Ok(state.probe_results.pop_front().unwrap_or(default))
    }

    fn run(&self, image: &str, options: &[String], command: &[String]) -> Result<()> {
        self.record(call(&["run", &options.join(" "), image, &command.join(" ")]))
    }

    fn build(&self, reference: &str, options: &[String], context: &Path) -> Result<()> {
        self.record(call(&[
            "build",
            reference,
            &options.join(" "),
            &context.display().to_string(),
        ]))
    }

    fn pull(&self, reference: &str) -> Result<()> {
        self.record(format!("pull {}", reference))
    }

    fn push(&self, reference: &str) -> Result<()> {
        self.record(format!("push {}", reference))
    }

    fn pod_exists(&self, pod: &str) -> Result<bool> {
        Ok(self.state().pods.contains(pod))
    }

    fn create_pod(&self, pod: &str, _options: &[String]) -> Result<()> {
        self.record(format!("pod-create {}", pod))?;
        self.state().pods.insert(pod.to_string());
        Ok(())
    }
}
