use crate::listeners::FontSetting;
use crate::Config;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create cache directory: {0}")]
    CacheDirectoryCreationFailed(#[from] std::io::Error),

    #[error("Source directory does not exist: {0}")]
    SourceDirectoryMissing(String),

    #[error("Watermark font file missing: {0}")]
    WatermarkFontMissing(String),
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    // Cache directory must exist or be creatable
    let cache_dir = Path::new(&config.cache.directory);
    if !cache_dir.exists() {
        info!("Cache directory does not exist, creating: {:?}", cache_dir);
        if let Err(e) = tokio::fs::create_dir_all(cache_dir).await {
            error!("Failed to create cache directory: {}", e);
            errors.push(StartupCheckError::CacheDirectoryCreationFailed(e));
        } else {
            info!("Cache directory created successfully");
        }
    } else {
        info!("Cache directory exists: {:?}", cache_dir);
    }

    // Source directory must exist and be readable
    let source_dir = Path::new(&config.source.directory);
    if !source_dir.exists() {
        error!("Source directory does not exist: {:?}", source_dir);
        errors.push(StartupCheckError::SourceDirectoryMissing(
            source_dir.display().to_string(),
        ));
    } else {
        match tokio::fs::read_dir(source_dir).await {
            Ok(_) => info!("Source directory is accessible: {:?}", source_dir),
            Err(e) => {
                error!("Source directory is not accessible: {}", e);
                errors.push(StartupCheckError::SourceDirectoryMissing(
                    source_dir.display().to_string(),
                ));
            }
        }
    }

    // A configured watermark font file must be present; builtin font ids
    // need no file on disk.
    if let Some(watermark) = &config.watermark {
        match &watermark.font {
            FontSetting::File(path) => {
                if path.exists() {
                    info!("Watermark font file found: {:?}", path);
                } else {
                    warn!("Watermark font file missing: {:?}", path);
                    errors.push(StartupCheckError::WatermarkFontMissing(
                        path.display().to_string(),
                    ));
                }
            }
            FontSetting::Builtin(id) => {
                info!("Watermark uses builtin font {}", id);
            }
        }
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
