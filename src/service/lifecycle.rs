//! Container lifecycle helper
//!
//! Translates an `(image, action)` pair into engine invocations. The only
//! state consulted is the engine's live container list; nothing is cached.

use anyhow::Result;
use clap::ValueEnum;
use tracing::info;

use crate::config::ImageDescriptor;
use crate::engine::{ContainerEngine, ContainerSpec};

/// Lifecycle actions accepted by `vires container <image> <action>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Start,
    Stop,
    Remove,
    Restart,
    Reload,
    Status,
    Logs,
    Exec,
    Run,
}

pub struct Lifecycle<'a> {
    engine: &'a dyn ContainerEngine,
    image: &'a ImageDescriptor,
}

impl<'a> Lifecycle<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, image: &'a ImageDescriptor) -> Self {
        Self { engine, image }
    }

    /// Run one action; `args` are forwarded to `logs`, `exec` and `run`
    pub fn dispatch(&self, action: Action, args: &[String]) -> Result<()> {
        match action {
            Action::Start => self.start(),
            Action::Stop => self.stop(),
            Action::Remove => self.remove(),
            Action::Restart => self.restart(),
            Action::Reload => self.reload(),
            Action::Status => self.engine.status(self.image.container_name()?),
            Action::Logs => self.engine.logs(self.image.container_name()?, args),
            Action::Exec => self.exec(args),
            Action::Run => self.run(args),
        }
    }

    /// Container creation parameters derived from the descriptor
    pub fn spec(&self) -> Result<ContainerSpec> {
        Ok(ContainerSpec {
            name: self.image.container_name()?.to_string(),
            image: self.image.reference.clone(),
            pod: self.image.pod.clone(),
            options: self.image.create_options.clone(),
            volumes: self.image.volumes.clone(),
            environment: self
                .image
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            command: self.image.command.clone(),
        })
    }

    /// Create the container if absent, then start it unless already running
    pub fn start(&self) -> Result<()> {
        let name = self.image.container_name()?;
        if self.engine.is_running(name)? {
            info!("Container {} is already running", name);
            return Ok(());
        }
        if !self.engine.exists(name)? {
            self.create()?;
        }
        info!("Starting container {}", name);
        self.engine.start(name)
    }

    pub fn stop(&self) -> Result<()> {
        let name = self.image.container_name()?;
        if !self.engine.is_running(name)? {
            info!("Container {} is not running", name);
            return Ok(());
        }
        info!("Stopping container {}", name);
        self.engine.stop(name)
    }

    pub fn remove(&self) -> Result<()> {
        let name = self.image.container_name()?;
        self.stop()?;
        if !self.engine.exists(name)? {
            info!("Container {} does not exist", name);
            return Ok(());
        }
        info!("Removing container {}", name);
        self.engine.remove(name)
    }

    pub fn restart(&self) -> Result<()> {
        self.stop()?;
        self.start()
    }

    /// Recreate the container from the current descriptor
    pub fn reload(&self) -> Result<()> {
        self.remove()?;
        self.create()?;
        let name = self.image.container_name()?;
        info!("Starting container {}", name);
        self.engine.start(name)
    }

    fn create(&self) -> Result<()> {
        let spec = self.spec()?;
        if let Some(pod) = &spec.pod {
            if !self.engine.pod_exists(pod)? {
                info!("Creating pod {}", pod);
                self.engine.create_pod(pod, &self.image.pod_options)?;
            }
        }
        info!("Creating container {} from {}", spec.name, spec.image);
        self.engine.create(&spec)
    }

    fn command_or_shell(&self, args: &[String]) -> Vec<String> {
        if args.is_empty() {
            self.image.shell.clone()
        } else {
            args.to_vec()
        }
    }

    pub fn exec(&self, args: &[String]) -> Result<()> {
        let name = self.image.container_name()?;
        self.engine
            .exec(name, &self.image.exec_options, &self.command_or_shell(args))
    }

    /// One-off container from the image, removed on exit
    pub fn run(&self, args: &[String]) -> Result<()> {
        let mut options = Vec::new();
        for volume in &self.image.volumes {
            options.push("-v".to_string());
            options.push(volume.clone());
        }
        for (key, value) in &self.image.environment {
            options.push("-e".to_string());
            options.push(format!("{}={}", key, value));
        }
        options.extend(self.image.run_options.iter().cloned());
        self.engine
            .run(&self.image.reference, &options, &self.command_or_shell(args))
    }
}
