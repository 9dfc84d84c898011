//! Image build, pull and push

use anyhow::Result;
use tracing::info;

use crate::config::ImageDescriptor;
use crate::engine::ContainerEngine;

/// Service for image level operations
pub struct ImageService;

impl ImageService {
    /// Build options for an image, with the source image passed as a build arg
    pub fn build_options(image: &ImageDescriptor) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(source) = &image.source_image {
            options.push("--build-arg".to_string());
            options.push(format!("SOURCE_IMAGE={}", source));
        }
        options.extend(image.build_options.iter().cloned());
        options
    }

    pub fn build(engine: &dyn ContainerEngine, image: &ImageDescriptor) -> Result<()> {
        if !image.build_context.is_dir() {
            anyhow::bail!(
                "Build context {} for image '{}' does not exist",
                image.build_context.display(),
                image.name
            );
        }
        info!("Building image {} from {}", image.reference, image.build_context.display());
        engine.build(&image.reference, &Self::build_options(image), &image.build_context)?;
        info!("Successfully built image: {}", image.reference);
        Ok(())
    }

    pub fn pull(engine: &dyn ContainerEngine, image: &ImageDescriptor) -> Result<()> {
        info!("Pulling image {}", image.reference);
        engine.pull(&image.reference)
    }

    pub fn push(engine: &dyn ContainerEngine, image: &ImageDescriptor) -> Result<()> {
        if image.registry.is_none() {
            anyhow::bail!("REGISTRY is not set for image '{}'", image.name);
        }
        info!("Pushing image {}", image.reference);
        engine.push(&image.reference)
    }
}
