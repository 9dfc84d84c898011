use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use tracing::debug;

use super::{ContainerEngine, ContainerSpec, EngineError, EngineKind};

/// Container engine driven through its command line interface
pub struct CliEngine {
    kind: EngineKind,
    program: PathBuf,
}

impl CliEngine {
    pub fn new(kind: EngineKind, program: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    /// Detect the engine on PATH, honouring an explicit override
    pub fn detect(engine_override: Option<&str>) -> Result<Self, EngineError> {
        let (kind, program) = super::detect(engine_override)?;
        Ok(Self::new(kind, program))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }

    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.kind.as_str().to_string()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run with inherited stdio and fail on a non-zero exit
    fn invoke(&self, args: Vec<String>) -> Result<()> {
        let mut cmd = self.command(&args);
        debug!("Running command: {:?}", cmd);
        let status = cmd.status().map_err(|source| EngineError::Launch {
            command: self.describe(&args),
            source,
        })?;
        self.check(&args, status)
    }

    fn invoke_with_input(&self, args: Vec<String>, input: &[u8], capture: bool) -> Result<String> {
        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::piped());
        if capture {
            cmd.stdout(Stdio::piped());
        }
        debug!("Running command with {} bytes of input: {:?}", input.len(), cmd);

        let launch_error = |source: std::io::Error| EngineError::Launch {
            command: self.describe(&args),
            source,
        };
        let mut child = cmd.spawn().map_err(launch_error)?;
        let stdin = child.stdin.take();

        // stdin is fed from its own thread while stdout drains, otherwise both
        // pipes fill up once the output outgrows the pipe buffer
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(input),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            (writer.join(), output)
        });

        let output = output.map_err(launch_error)?;
        self.check(&args, output.status)?;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("{} exited before reading all of its input", self.describe(&args));
            }
            Ok(Err(err)) => return Err(launch_error(err).into()),
            Err(_) => anyhow::bail!("Failed to feed input to `{}`", self.describe(&args)),
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn capture(&self, args: Vec<String>) -> Result<String> {
        let mut cmd = self.command(&args);
        cmd.stderr(Stdio::inherit());
        debug!("Running command: {:?}", cmd);
        let output = cmd.output().map_err(|source| EngineError::Launch {
            command: self.describe(&args),
            source,
        })?;
        self.check(&args, output.status)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn quiet(&self, args: Vec<String>) -> Result<bool> {
        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        debug!("Probing: {:?}", cmd);
        let status = cmd.status().map_err(|source| EngineError::Launch {
            command: self.describe(&args),
            source,
        })?;
        Ok(status.success())
    }

    fn check(&self, args: &[String], status: ExitStatus) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        Err(EngineError::Failed {
            command: self.describe(args),
            code: status.code(),
        }
        .into())
    }
}

fn strings<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    items.iter().map(|s| s.as_ref().to_string()).collect()
}

/// `ps` arguments listing container names, one per line
pub(crate) fn ps_args(all: bool) -> Vec<String> {
    let mut args = strings(&["ps", "--format", "{{.Names}}"]);
    if all {
        args.insert(1, "-a".to_string());
    }
    args
}

pub(crate) fn create_args(kind: EngineKind, spec: &ContainerSpec) -> Vec<String> {
    let mut args = strings(&["create", "--name", spec.name.as_str()]);
    if let Some(pod) = &spec.pod {
        if kind.has_pods() {
            args.push("--pod".to_string());
        } else {
            args.push("--network".to_string());
        }
        args.push(pod.clone());
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    for (key, value) in &spec.environment {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.extend(spec.options.iter().cloned());
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

pub(crate) fn exec_args(name: &str, options: &[String], command: &[String]) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    args.extend(options.iter().cloned());
    args.push(name.to_string());
    args.extend(command.iter().cloned());
    args
}

pub(crate) fn run_args(image: &str, options: &[String], command: &[String]) -> Vec<String> {
    let mut args = strings(&["run", "--rm"]);
    args.extend(options.iter().cloned());
    args.push(image.to_string());
    args.extend(command.iter().cloned());
    args
}

pub(crate) fn build_args(reference: &str, options: &[String], context: &Path) -> Vec<String> {
    let mut args = strings(&["build", "-t", reference]);
    args.extend(options.iter().cloned());
    args.push(context.display().to_string());
    args
}

impl ContainerEngine for CliEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn list_containers(&self, all: bool) -> Result<Vec<String>> {
        let output = self.capture(ps_args(all))?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn create(&self, spec: &ContainerSpec) -> Result<()> {
        self.invoke(create_args(self.kind, spec))
    }

    fn start(&self, name: &str) -> Result<()> {
        self.invoke(strings(&["start", name]))
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.invoke(strings(&["stop", name]))
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.invoke(strings(&["rm", name]))
    }

    fn status(&self, name: &str) -> Result<()> {
        let filter = format!("name=^{}$", name);
        self.invoke(strings(&["ps", "-a", "--filter", filter.as_str()]))
    }

    fn logs(&self, name: &str, args: &[String]) -> Result<()> {
        let mut all = vec!["logs".to_string()];
        all.extend(args.iter().cloned());
        all.push(name.to_string());
        self.invoke(all)
    }

    fn exec(&self, name: &str, options: &[String], command: &[String]) -> Result<()> {
        self.invoke(exec_args(name, options, command))
    }

    fn exec_with_input(&self, name: &str, command: &[String], input: &[u8]) -> Result<()> {
        let args = exec_args(name, &["-i".to_string()], command);
        self.invoke_with_input(args, input, false).map(|_| ())
    }

    fn exec_capture(&self, name: &str, command: &[String], input: &[u8]) -> Result<String> {
        let args = exec_args(name, &["-i".to_string()], command);
        self.invoke_with_input(args, input, true)
    }

    fn probe(&self, name: &str, command: &[String]) -> Result<bool> {
        self.quiet(exec_args(name, &[], command))
    }

    fn run(&self, image: &str, options: &[String], command: &[String]) -> Result<()> {
        self.invoke(run_args(image, options, command))
    }

    fn build(&self, reference: &str, options: &[String], context: &Path) -> Result<()> {
        self.invoke(build_args(reference, options, context))
    }

    fn pull(&self, reference: &str) -> Result<()> {
        self.invoke(strings(&["pull", reference]))
    }

    fn push(&self, reference: &str) -> Result<()> {
        self.invoke(strings(&["push", reference]))
    }

    fn pod_exists(&self, pod: &str) -> Result<bool> {
        if self.kind.has_pods() {
            self.quiet(strings(&["pod", "exists", pod]))
        } else {
            self.quiet(strings(&["network", "inspect", pod]))
        }
    }

    fn create_pod(&self, pod: &str, options: &[String]) -> Result<()> {
        if self.kind.has_pods() {
            let mut args = strings(&["pod", "create", "--name", pod]);
            args.extend(options.iter().cloned());
            self.invoke(args)
        } else {
            // pod options (published ports) belong to pods only
            debug!("Ignoring pod options {:?} for {} network", options, pod);
            self.invoke(strings(&["network", "create", pod]))
        }
    }
}
