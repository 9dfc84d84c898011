//! Deployment configuration
//!
//! Configuration is layered. Later layers override earlier ones field by
//! field:
//!
//! 1. `<root>/common.toml` - global defaults plus `[sequence]` and
//!    `[registration]`
//! 2. `<root>/<engine>/common.toml` - per-engine defaults
//! 3. `<root>/<image>/common.toml` - the image descriptor
//! 4. `<root>/<image>/tag.conf`, then `<root>/<image>/user.conf` - `KEY=VALUE`
//!    overlays
//!
//! The merged result is an immutable [`ImageDescriptor`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::{config as layout, container, engine, pod, tag};
use crate::engine::EngineKind;
use crate::kv;


/// One configuration layer; unset fields fall through to earlier layers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layer {
    pub registry: Option<String>,
    pub image_name: Option<String>,
    pub image_tag: Option<String>,
    pub source_image: Option<String>,
    pub build_options: Option<Vec<String>>,
    pub build_context: Option<PathBuf>,
    pub container_name: Option<String>,
    pub pod: Option<String>,
    pub pod_options: Option<Vec<String>>,
    pub create_options: Option<Vec<String>>,
    pub run_options: Option<Vec<String>>,
    pub exec_options: Option<Vec<String>>,
    pub volumes: Option<Vec<String>>,
    pub environment: Option<BTreeMap<String, String>>,
    pub command: Option<Vec<String>>,
    pub shell: Option<Vec<String>>,
}

macro_rules! overlay_fields {
    ($target:ident, $other:ident; $($field:ident),*) => {
        $(
            if $other.$field.is_some() {
                $target.$field = $other.$field;
            }
        )*
    };
}

impl Layer {
    /// Apply `other` on top of `self`
    pub fn merge(&mut self, other: Layer) {
        if let Some(environment) = other.environment {
            self.environment
                .get_or_insert_with(BTreeMap::new)
                .extend(environment);
        }
        overlay_fields!(self, other;
            registry, image_name, image_tag, source_image, build_options,
            build_context, container_name, pod, pod_options, create_options,
            run_options, exec_options, volumes, command, shell);
    }

    /// Apply a `KEY=VALUE` overlay assignment; returns false for unknown keys
    pub fn apply_assignment(&mut self, key: &str, value: &str) -> bool {
        let words = || -> Vec<String> { value.split_whitespace().map(str::to_string).collect() };
        match key {
            "REGISTRY" => self.registry = Some(value.to_string()),
            "IMAGE_NAME" => self.image_name = Some(value.to_string()),
            "IMAGE_TAG" => self.image_tag = Some(value.to_string()),
            "SOURCE_IMAGE" => self.source_image = Some(value.to_string()),
            "CONTAINER_NAME" => self.container_name = Some(value.to_string()),
            "POD" => self.pod = Some(value.to_string()),
            "BUILD_OPTIONS" => self.build_options = Some(words()),
            "POD_OPTIONS" => self.pod_options = Some(words()),
            "CREATE_OPTIONS" => self.create_options = Some(words()),
            "RUN_OPTIONS" => self.run_options = Some(words()),
            "EXEC_OPTIONS" => self.exec_options = Some(words()),
            _ => return false,
        }
        true
    }
}

/// Settings of the pod bring-up sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodConfig {
    pub name: String,
    pub database: String,
    pub ready_command: Vec<String>,
    pub ready_attempts: u32,
    pub ready_interval_ms: u64,
    pub bootstrap_command: Vec<String>,
    /// Secrets bundles piped into the bootstrap command, relative to the root
    pub bootstraps: Vec<PathBuf>,
    pub services: Vec<String>,
}

impl Default for PodConfig {
    fn default() -> Self {
        Self {
            name: pod::NAME.to_string(),
            database: pod::DATABASE_IMAGE.to_string(),
            ready_command: pod::READY_COMMAND.iter().map(|s| s.to_string()).collect(),
            ready_attempts: pod::READY_ATTEMPTS,
            ready_interval_ms: pod::READY_INTERVAL_MS,
            bootstrap_command: vec![pod::BOOTSTRAP_COMMAND.to_string()],
            bootstraps: vec![
                PathBuf::from("secrets/oauth.db.conf"),
                PathBuf::from("secrets/swarm.db.conf"),
            ],
            services: pod::SERVICES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Settings of the product registration driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Image whose container runs the management commands
    pub image: String,
    /// Status check; reads file names on stdin, `{collection}` is substituted
    pub status_command: Vec<String>,
    /// Registration; reads file names on stdin, `{collection}` is substituted
    pub register_command: Vec<String>,
    /// Cached product update; `{type}` and `{file}` are substituted
    pub cached_product_command: Vec<String>,
    /// Collection name -> product file name pattern
    pub collections: BTreeMap<String, String>,
}

const MANAGE: [&str; 2] = ["python3", "/srv/vires/vires_swarm/manage.py"];

fn manage(args: &[&str]) -> Vec<String> {
    MANAGE.iter().chain(args).map(|s| s.to_string()).collect()
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            image: "swarm".to_string(),
            status_command: manage(&[
                "product",
                "register",
                "--check",
                "-c",
                "{collection}",
                "-f",
                "-",
            ]),
            register_command: manage(&["product", "register", "-c", "{collection}", "-f", "-"]),
            cached_product_command: manage(&["cached_product", "update", "{type}", "{file}"]),
            collections: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GlobalFile {
    #[serde(flatten)]
    defaults: Layer,
    #[serde(rename = "sequence")]
    pod: PodConfig,
    registration: RegistrationConfig,
}

/// Fully resolved description of one image and its container
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDescriptor {
    pub name: String,
    pub reference: String,
    pub registry: Option<String>,
    pub source_image: Option<String>,
    pub build_options: Vec<String>,
    pub build_context: PathBuf,
    pub container_name: Option<String>,
    pub pod: Option<String>,
    pub pod_options: Vec<String>,
    pub create_options: Vec<String>,
    pub run_options: Vec<String>,
    pub exec_options: Vec<String>,
    pub volumes: Vec<String>,
    pub command: Vec<String>,
    pub shell: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

impl ImageDescriptor {
    /// The container name, which every lifecycle operation requires
    pub fn container_name(&self) -> Result<&str> {
        self.container_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .with_context(|| format!("CONTAINER_NAME is not set for image '{}'", self.name))
    }
}

/// A deployment target: the container root and its global settings
#[derive(Debug, Clone)]
pub struct Deployment {
    pub root: PathBuf,
    pub engine: EngineKind,
    pub defaults: Layer,
    pub pod: PodConfig,
    pub registration: RegistrationConfig,
}

/// Pick the container root: explicit value, then `<config_dir>/vires`, then `.`
pub fn resolve_root(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(root) = explicit {
        return root;
    }
    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join(layout::APP_DIR);
        if candidate.is_dir() {
            return candidate;
        }
    }
    PathBuf::from(".")
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!("Loading configuration layer {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

impl Deployment {
    /// Load the global and per-engine layers of a container root
    pub fn load(root: impl Into<PathBuf>, engine: EngineKind) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            anyhow::bail!("Container root {} is not a directory", root.display());
        }

        let global: GlobalFile =
            read_toml(&root.join(layout::COMMON_FILE))?.unwrap_or_default();
        let mut defaults = global.defaults;

        let engine_file = root.join(engine.as_str()).join(layout::COMMON_FILE);
        if let Some(layer) = read_toml::<Layer>(&engine_file)? {
            defaults.merge(layer);
        }

        Ok(Self {
            root,
            engine,
            defaults,
            pod: global.pod,
            registration: global.registration,
        })
    }

    /// Directory holding an image's descriptor
    pub fn image_dir(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\'])
            && !engine::SEARCH_ORDER.contains(&name);
        let dir = self.root.join(name);
        if !valid || !dir.join(layout::COMMON_FILE).is_file() {
            anyhow::bail!(
                "Unknown image '{}' (no {} in {})",
                name,
                layout::COMMON_FILE,
                dir.display()
            );
        }
        Ok(dir)
    }

    /// Names of all images defined under the root, sorted
    pub fn images(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if self.image_dir(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve the descriptor of a named image
    pub fn image(&self, name: &str) -> Result<ImageDescriptor> {
        let dir = self.image_dir(name)?;

        let mut layer = self.defaults.clone();
        if let Some(own) = read_toml::<Layer>(&dir.join(layout::COMMON_FILE))? {
            layer.merge(own);
        }
        for overlay in [layout::TAG_OVERLAY, layout::USER_OVERLAY] {
            let path = dir.join(overlay);
            if !path.is_file() {
                continue;
            }
            debug!("Applying overlay {}", path.display());
            for (key, value) in kv::read_file(&path)? {
                if !layer.apply_assignment(&key, &value) {
                    warn!("Ignoring unknown key {} in {}", key, path.display());
                }
            }
        }

        Ok(self.descriptor(name, &dir, layer))
    }

    fn descriptor(&self, name: &str, dir: &Path, layer: Layer) -> ImageDescriptor {
        let image_name = layer.image_name.unwrap_or_else(|| name.to_string());
        let image_tag = layer.image_tag.unwrap_or_else(|| tag::DEFAULT.to_string());
        let registry = layer.registry.filter(|r| !r.is_empty());
        let reference = match &registry {
            Some(registry) => format!(
                "{}/{}:{}",
                registry.trim_end_matches('/'),
                image_name,
                image_tag
            ),
            None => format!("{}:{}", image_name, image_tag),
        };
        let build_context = match layer.build_context {
            Some(context) if context.is_absolute() => context,
            Some(context) => dir.join(context),
            None => dir.to_path_buf(),
        };

        ImageDescriptor {
            name: name.to_string(),
            reference,
            registry,
            source_image: layer.source_image,
            build_options: layer.build_options.unwrap_or_default(),
            build_context,
            container_name: layer.container_name,
            pod: layer.pod.filter(|p| !p.is_empty()),
            pod_options: layer.pod_options.unwrap_or_default(),
            create_options: layer.create_options.unwrap_or_default(),
            run_options: layer.run_options.unwrap_or_default(),
            exec_options: layer.exec_options.unwrap_or_else(|| {
                container::DEFAULT_EXEC_OPTIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            }),
            volumes: layer.volumes.unwrap_or_default(),
            environment: layer.environment.unwrap_or_default(),
            command: layer.command.unwrap_or_default(),
            shell: layer
                .shell
                .unwrap_or_else(|| vec![container::DEFAULT_SHELL.to_string()]),
        }
    }

    /// Resolve a path relative to the container root
    pub fn path(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }
}
