//! Pod bring-up sequencer
//!
//! Starts the database, waits until it accepts connections, bootstraps the
//! service databases from their secrets bundles and then starts the remaining
//! services in order. The first failing step aborts the sequence.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Deployment, ImageDescriptor};
use crate::engine::ContainerEngine;
use crate::secrets::DbCredentials;
use crate::service::Lifecycle;

/// One step of the bring-up plan
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Start(String),
    WaitReady(String),
    Bootstrap { image: String, secrets: PathBuf },
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Start(image) => write!(f, "start {}", image),
            Step::WaitReady(image) => write!(f, "wait for {}", image),
            Step::Bootstrap { image, secrets } => {
                write!(f, "bootstrap {} < {}", image, secrets.display())
            }
        }
    }
}

pub struct PodSequencer<'a> {
    engine: &'a dyn ContainerEngine,
    deployment: &'a Deployment,
}

impl<'a> PodSequencer<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, deployment: &'a Deployment) -> Self {
        Self { engine, deployment }
    }

    /// The ordered bring-up plan
    pub fn plan(&self) -> Vec<Step> {
        let pod = &self.deployment.pod;
        let mut steps = vec![
            Step::Start(pod.database.clone()),
            Step::WaitReady(pod.database.clone()),
        ];
        for secrets in &pod.bootstraps {
            steps.push(Step::Bootstrap {
                image: pod.database.clone(),
                secrets: self.deployment.path(secrets),
            });
        }
        steps.extend(pod.services.iter().cloned().map(Step::Start));
        steps
    }

    fn resolve(&self, steps: &[Step]) -> Result<Vec<(Step, ImageDescriptor)>> {
        steps
            .iter()
            .map(|step| {
                let name = match step {
                    Step::Start(image) | Step::WaitReady(image) => image,
                    Step::Bootstrap { image, .. } => image,
                };
                Ok((step.clone(), self.deployment.image(name)?))
            })
            .collect()
    }

    /// Bring the pod up. Blocks until every step has run.
    pub fn up(&self) -> Result<()> {
        let steps = self.plan();
        info!("Bringing up pod {} in {} steps", self.deployment.pod.name, steps.len());
        for step in &steps {
            debug!("  {}", step);
        }
        // resolve every descriptor before touching the engine
        let resolved = self.resolve(&steps)?;

        for (index, (step, image)) in resolved.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, resolved.len(), step);
            match step {
                Step::Start(_) => Lifecycle::new(self.engine, image).start()?,
                Step::WaitReady(_) => self.wait_ready(image)?,
                Step::Bootstrap { secrets, .. } => self.bootstrap(image, secrets)?,
            }
        }

        info!("Pod {} is up", self.deployment.pod.name);
        Ok(())
    }

    /// Stop the services in reverse order, then the database
    pub fn down(&self) -> Result<()> {
        let pod = &self.deployment.pod;
        let mut names: Vec<&String> = pod.services.iter().rev().collect();
        names.push(&pod.database);

        let images = names
            .iter()
            .map(|name| self.deployment.image(name))
            .collect::<Result<Vec<_>>>()?;
        for image in &images {
            Lifecycle::new(self.engine, image).stop()?;
        }

        info!("Pod {} is down", pod.name);
        Ok(())
    }

    fn wait_ready(&self, image: &ImageDescriptor) -> Result<()> {
        let pod = &self.deployment.pod;
        let name = image.container_name()?;
        let attempts = pod.ready_attempts.max(1);
        let interval = Duration::from_millis(pod.ready_interval_ms);

        for attempt in 1..=attempts {
            if self.engine.probe(name, &pod.ready_command)? {
                info!("{} is ready", name);
                return Ok(());
            }
            debug!("{} not ready (attempt {}/{})", name, attempt, attempts);
            if attempt < attempts {
                std::thread::sleep(interval);
            }
        }

        anyhow::bail!(
            "{} did not become ready after {} attempts of `{}`",
            name,
            attempts,
            pod.ready_command.join(" ")
        )
    }

    fn bootstrap(&self, image: &ImageDescriptor, secrets: &std::path::Path) -> Result<()> {
        let name = image.container_name()?;
        let content = std::fs::read(secrets)
            .with_context(|| format!("Failed to read secrets file {}", secrets.display()))?;
        // refuse incomplete bundles before they reach the database
        let credentials = DbCredentials::parse(content.as_slice())
            .with_context(|| format!("Invalid secrets file {}", secrets.display()))?;

        info!("Bootstrapping database {} in {}", credentials.name, name);
        self.engine
            .exec_with_input(name, &self.deployment.pod.bootstrap_command, &content)
    }
}
