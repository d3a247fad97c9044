//! Tracing subscriber and optional OpenTelemetry export.
//!
//! Every log line goes to **stderr**.  Stdout carries the JSON-RPC stream and
//! must never receive anything else.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter, used when `--log-level` is not given. |
//! | `KEEPSAKE_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Enables the OTLP/HTTP span exporter. |

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging options resolved from flags, environment and config.
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directive from `--log-level`; takes precedence over `RUST_LOG`.
    pub cli_filter: Option<String>,
    /// Filter directive used when neither the flag nor `RUST_LOG` is set.
    pub fallback_filter: String,
    pub json: bool,
}

impl LogOptions {
    fn env_filter(&self) -> EnvFilter {
        if let Some(directive) = &self.cli_filter {
            return EnvFilter::new(directive);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.fallback_filter))
    }
}

/// Whether `KEEPSAKE_LOG_FORMAT` asks for JSON output.
pub fn json_format_requested() -> bool {
    std::env::var("KEEPSAKE_LOG_FORMAT").as_deref() == Ok("json")
}

/// Install the global subscriber.
///
/// Must run before the Tokio runtime is built: the OTLP exporter uses a
/// blocking HTTP client that cannot be created inside an async context.
/// Hold the returned guard until the process exits.
pub fn init_tracing(service_name: &str, options: &LogOptions) -> TracerProviderGuard {
    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("keepsake")));

    let json_layer = options.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let compact_layer = (!options.json).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(options.env_filter())
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .init();

    TracerProviderGuard(provider)
}

/// Shuts the tracer provider down on drop, flushing pending spans.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[keepsake] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[keepsake] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
