//! systemd unit synthesis
//!
//! The unit attaches to an already created container, so `container <image>
//! start` (or `pod up`) has to run once before the unit is enabled.

use anyhow::Result;
use std::fmt::Write;
use std::path::Path;

use crate::config::ImageDescriptor;
use crate::constants::systemd::{UNIT_PREFIX, UNIT_SUFFIX};

/// Unit name of an image, e.g. `vires-swarm.service`
pub fn unit_name(image: &str) -> String {
    format!("{}{}{}", UNIT_PREFIX, image, UNIT_SUFFIX)
}

/// Render the unit running the image's container through `engine`.
///
/// `after` lists images whose units must be started first.
pub fn unit(image: &ImageDescriptor, engine: &Path, after: &[String]) -> Result<String> {
    let container = image.container_name()?;
    let dependencies: Vec<String> = after.iter().map(|a| unit_name(a)).collect();
    let engine = engine.display();

    let mut unit = String::new();
    writeln!(unit, "[Unit]")?;
    writeln!(unit, "Description=VirES for Swarm {} container", image.name)?;
    writeln!(unit, "Wants=network-online.target")?;
    let mut ordering = vec!["network-online.target".to_string()];
    ordering.extend(dependencies.iter().cloned());
    writeln!(unit, "After={}", ordering.join(" "))?;
    if !dependencies.is_empty() {
        writeln!(unit, "Requires={}", dependencies.join(" "))?;
    }
    writeln!(unit)?;
    writeln!(unit, "[Service]")?;
    writeln!(unit, "Type=simple")?;
    writeln!(unit, "ExecStart={} start -a {}", engine, container)?;
    writeln!(unit, "ExecStop={} stop {}", engine, container)?;
    writeln!(unit, "Restart=on-failure")?;
    writeln!(unit)?;
    writeln!(unit, "[Install]")?;
    writeln!(unit, "WantedBy=multi-user.target")?;
    Ok(unit)
}
