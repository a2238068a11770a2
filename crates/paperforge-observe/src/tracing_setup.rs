//! Tracing subscriber initialization for the paper pipeline.
//!
//! The binary calls [`init`] once at startup and holds the returned
//! [`Telemetry`] guard for the life of the process; dropping the guard
//! flushes and shuts down the OpenTelemetry exporter when one was enabled.
//!
//! `RUST_LOG` always wins over the caller-supplied default filter, so a
//! deployed pipeline can be turned up to `trace` without a restart flag.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Keeps the OTel pipeline alive; dropping it flushes buffered spans.
#[must_use = "dropping the guard immediately shuts telemetry down"]
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("warning: telemetry shutdown error: {e}");
            }
        }
    }
}

/// Install the global tracing subscriber.
///
/// `default_filter` is a standard `EnvFilter` directive string (for example
/// `"info,paperforge=debug"`) applied when `RUST_LOG` is not set. When
/// `enable_otel` is true, tracing spans are additionally bridged to
/// OpenTelemetry with a stdout exporter; swap the exporter for OTLP when
/// wiring a real collector.
///
/// # Errors
///
/// Returns [`TelemetryError::AlreadyInitialized`] if a global subscriber has
/// already been set, which in practice means `init` was called twice.
pub fn init(default_filter: &str, enable_otel: bool) -> Result<Telemetry, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("paperforge");

        registry
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()
            .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

        opentelemetry::global::set_tracer_provider(provider.clone());
        Ok(Telemetry {
            provider: Some(provider),
        })
    } else {
        registry
            .try_init()
            .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;
        Ok(Telemetry { provider: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let _guard = init("warn", false).unwrap();
        assert!(matches!(
            init("warn", false),
            Err(TelemetryError::AlreadyInitialized(_))
        ));
    }
}
