// Darkroom module - where requested images get developed and served
mod cache;
mod encode;
mod error;
mod handlers;

pub use encode::OutputFormat;
pub use error::DarkroomError;
pub use handlers::transform_handler;

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::params::RequestParameters;
use crate::pipeline::{
    run_image_stages, run_response_stage, Dispatcher, ResponseMetadata, FIRST_GENERATION_HEADER,
};

pub type SharedDarkroom = Arc<Darkroom>;

/// Per-process serving state: configuration plus the subscription table,
/// both immutable once the first request is served.
pub struct Darkroom {
    pub(crate) source: crate::SourceConfig,
    pub(crate) cache: crate::CacheConfig,
    pub(crate) output: crate::OutputConfig,
    pub(crate) dispatcher: Arc<Dispatcher>,
}

impl Darkroom {
    pub fn new(
        source: crate::SourceConfig,
        cache: crate::CacheConfig,
        output: crate::OutputConfig,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            source,
            cache,
            output,
            dispatcher,
        }
    }

    pub(crate) fn is_image(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        lower.ends_with(".jpg")
            || lower.ends_with(".jpeg")
            || lower.ends_with(".png")
            || lower.ends_with(".gif")
            || lower.ends_with(".webp")
            || lower.ends_with(".bmp")
    }

    /// Main entry point: develop the requested transformation (or reuse the
    /// cached result), then run the response stage and serve.
    pub async fn serve_transformed(
        &self,
        relative_path: &str,
        parameters: RequestParameters,
        accept_header: &str,
    ) -> Response {
        // Security check
        let full_path = self.source.directory.join(relative_path);
        if !full_path.starts_with(&self.source.directory) {
            return (StatusCode::FORBIDDEN, "Forbidden").into_response();
        }

        if !self.is_image(relative_path) {
            return (StatusCode::BAD_REQUEST, "Not an image path").into_response();
        }

        if !full_path.exists() {
            error!("Source image not found: {:?}", full_path);
            return (StatusCode::NOT_FOUND, "Image not found").into_response();
        }

        let output_format = OutputFormat::negotiate(accept_header, relative_path);
        debug!(
            "Serving image: {}, output format: {:?}",
            relative_path, output_format
        );

        let cache_filename =
            self.generate_cache_filename(relative_path, &parameters, output_format);
        let cache_path = self.cache.directory.join(&cache_filename);

        let first_generation = match self.is_cache_valid(&cache_path, &full_path).await {
            Ok(valid) => !valid,
            Err(e) => {
                error!("Cache validity check failed: {}", e);
                true
            }
        };

        if first_generation {
            if let Err(e) = self
                .develop(&full_path, &cache_path, parameters, output_format)
                .await
            {
                error!("Failed to develop image: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed")
                    .into_response();
            }
        }

        let mut metadata = ResponseMetadata::new();
        if first_generation {
            metadata.set(FIRST_GENERATION_HEADER, "1");
        }
        let metadata = match run_response_stage(&self.dispatcher, metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                error!("Response stage failed: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed")
                    .into_response();
            }
        };

        self.serve_file(&cache_path, output_format, !first_generation, &metadata)
            .await
    }

    /// Load the source, run the image stages in a blocking thread, and
    /// encode the result into the cache file.
    async fn develop(
        &self,
        original_path: &Path,
        cache_path: &Path,
        parameters: RequestParameters,
        output_format: OutputFormat,
    ) -> Result<(), DarkroomError> {
        tokio::fs::create_dir_all(&self.cache.directory).await?;

        let original_path = original_path.to_path_buf();
        let cache_path = cache_path.to_path_buf();
        let dispatcher = self.dispatcher.clone();
        let jpeg_quality = self.quality_directive(&parameters, self.output.jpeg_quality);
        let webp_quality = f32::from(self.quality_directive(
            &parameters,
            self.output.webp_quality as u8,
        ));

        tokio::task::spawn_blocking(move || -> Result<(), DarkroomError> {
            let image = image::open(&original_path)?;
            let developed = run_image_stages(&dispatcher, image, parameters)?
                .ok_or(DarkroomError::NotFound)?;
            encode::save_image(
                &developed,
                &cache_path,
                output_format,
                jpeg_quality,
                webp_quality,
            )
        })
        .await??;

        Ok(())
    }

    /// The `quality` parameter overrides the configured encode quality when
    /// it is a valid percentage; anything else falls back to the default.
    fn quality_directive(&self, parameters: &RequestParameters, default: u8) -> u8 {
        parameters
            .integer(&["quality"])
            .and_then(|q| u8::try_from(q).ok())
            .filter(|q| (1..=100).contains(q))
            .unwrap_or(default)
    }

    async fn serve_file(
        &self,
        path: &Path,
        output_format: OutputFormat,
        was_cached: bool,
        metadata: &ResponseMetadata,
    ) -> Response {
        match File::open(path).await {
            Ok(file) => {
                let file_metadata = match file.metadata().await {
                    Ok(m) => m,
                    Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                };

                let stream = ReaderStream::new(file);
                let body = Body::from_stream(stream);

                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(output_format.mime_type()),
                );
                if let Ok(length) = HeaderValue::from_str(&file_metadata.len().to_string()) {
                    headers.insert(header::CONTENT_LENGTH, length);
                }

                if was_cached {
                    headers.insert(
                        header::CACHE_CONTROL,
                        HeaderValue::from_static("public, max-age=31536000, immutable"),
                    );
                } else {
                    headers.insert(
                        header::CACHE_CONTROL,
                        HeaderValue::from_static("public, max-age=86400"),
                    );
                }

                for (key, value) in metadata.iter() {
                    if let (Ok(name), Ok(value)) = (
                        HeaderName::from_bytes(key.as_bytes()),
                        HeaderValue::from_str(value),
                    ) {
                        headers.insert(name, value);
                    }
                }

                (StatusCode::OK, headers, body).into_response()
            }
            Err(e) => {
                error!("Failed to open file: {:?}, error: {}", path, e);
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }
}
