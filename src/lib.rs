use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub mod darkroom;
pub mod listeners;
pub mod params;
pub mod pipeline;
pub mod processors;
pub mod startup_checks;

use listeners::{WatermarkConfig, WatermarkConfigError, WatermarkListener};
use pipeline::{Dispatcher, Stage, Subscriber};
use processors::ProcessorSubscriber;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub source: SourceConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub watermark: Option<WatermarkConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub jpeg_quality: u8,
    pub webp_quality: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            webp_quality: 85.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            app: AppConfig {
                name: "Genzou".to_string(),
                log_level: "info".to_string(),
            },
            source: SourceConfig {
                directory: PathBuf::from("photos"),
            },
            cache: CacheConfig {
                directory: PathBuf::from("cache"),
            },
            output: OutputConfig::default(),
            watermark: None,
        }
    }
}

use axum::Router;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub darkroom: darkroom::SharedDarkroom,
    pub config: Config,
}

/// Build the subscription table once at startup: the processor chain at
/// PreProcess, the watermark listener (when configured) at PostProcess and
/// Response. Registration order here is invocation order for every request.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher, WatermarkConfigError> {
    let mut builder = Dispatcher::builder();

    for processor in processors::default_chain() {
        builder = builder.register(
            Stage::PreProcess,
            Arc::new(ProcessorSubscriber::new(processor)),
        );
    }

    if let Some(watermark) = &config.watermark {
        let listener: Arc<dyn Subscriber> =
            Arc::new(WatermarkListener::from_config(watermark)?);
        builder = builder.register(Stage::PostProcess, listener.clone());
        builder = builder.register(Stage::Response, listener);
    }

    Ok(builder.build())
}

pub async fn create_app(config: Config) -> Result<Router, WatermarkConfigError> {
    let dispatcher = Arc::new(build_dispatcher(&config)?);

    let darkroom = Arc::new(darkroom::Darkroom::new(
        config.source.clone(),
        config.cache.clone(),
        config.output.clone(),
        dispatcher,
    ));

    let app_state = AppState {
        darkroom,
        config: config.clone(),
    };

    Ok(Router::new()
        .route(
            "/image/{*path}",
            axum::routing::get(darkroom::transform_handler),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let method = request.method();
                    let uri = request.uri();
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::info_span!(
                        "http_request",
                        method = %method,
                        uri = %uri,
                        matched_path,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    let method = request.method();
                    let uri = request.uri();
                    let headers = request.headers();
                    let user_agent = headers
                        .get("user-agent")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");
                    let referer = headers
                        .get("referer")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("-");

                    tracing::info!(
                        target: "access_log",
                        method = %method,
                        path = %uri.path(),
                        query = ?uri.query(),
                        user_agent = %user_agent,
                        referer = %referer,
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = response.status();
                        let size = response
                            .headers()
                            .get("content-length")
                            .and_then(|h| h.to_str().ok())
                            .unwrap_or("-");

                        tracing::info!(
                            target: "access_log",
                            status = %status,
                            size = %size,
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state))
}
