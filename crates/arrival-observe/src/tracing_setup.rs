//! Tracing subscriber initialization with structured logging and optional
//! OpenTelemetry span export.
//!
//! ```no_run
//! use arrival_observe::tracing_setup::{default_directive, init_tracing};
//!
//! init_tracing(default_directive(1, false), false).unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Filter directive for a `-v` count. `quiet` wins over verbosity.
pub fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        _ if quiet => "error",
        0 => "warn",
        1 => "info,arrival=debug",
        _ => "trace",
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_directive` when set. With
/// `enable_otel`, spans are additionally bridged to OpenTelemetry and
/// exported to stdout.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(
    default_directive: &str,
    enable_otel: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);

    if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let otel_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer("arrival"));

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(otel_layer)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Flush buffered spans and shut the tracer provider down. No-op when
/// OpenTelemetry was never enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_directive() {
        assert_eq!(default_directive(0, false), "warn");
        assert_eq!(default_directive(1, false), "info,arrival=debug");
        assert_eq!(default_directive(3, false), "trace");
        assert_eq!(default_directive(2, true), "error");
    }

    #[test]
    fn directives_parse() {
        for verbose in 0..3 {
            EnvFilter::try_new(default_directive(verbose, false)).unwrap();
        }
    }

    #[test]
    fn shutdown_without_otel_is_noop() {
        shutdown_tracing();
    }
}
