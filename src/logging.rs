//! Structured logging initialization
//!
//! Installs a `tracing-subscriber` registry with:
//! - an `EnvFilter` built from the configured level (or `RUST_LOG`)
//! - a sampling layer (all, error-only, or sampled)
//! - a JSON or pretty `fmt` layer, optionally non-blocking via `tracing-appender`
//!
//! Handler console output is emitted under the `edgerun::console` target and
//! can be filtered separately, e.g. `EDGERUN_LOG_TARGET_FILTER=edgerun::console=off`.

use anyhow::{Context, Result};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::Level;
use tracing::subscriber::Interest;
use tracing::{Metadata, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Sampling mode: how to decide which logs to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Log everything
    All,
    /// Log only WARN and ERROR levels
    ErrorOnly,
    /// Sample below WARN, always log WARN and ERROR
    Sampled,
}

impl SamplingMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error-only" | "error_only" => SamplingMode::ErrorOnly,
            "sampled" => SamplingMode::Sampled,
            _ => SamplingMode::All,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    pub sampling_mode: SamplingMode,
    /// Sampling rate (0.0-1.0) for Sampled mode
    pub sampling_rate: f64,
    /// Write through a non-blocking background thread
    pub async_logging: bool,
    /// Extra filter directives (comma-separated)
    pub target_filter: Option<String>,
    /// Include file:line location
    pub include_location: bool,
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            log_level: lookup("EDGERUN_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: LogFormat::parse(
                &lookup("EDGERUN_LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
            ),
            sampling_mode: SamplingMode::parse(
                &lookup("EDGERUN_LOG_SAMPLING_MODE").unwrap_or_else(|| "all".to_string()),
            ),
            sampling_rate: lookup("EDGERUN_LOG_SAMPLING_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            async_logging: lookup("EDGERUN_LOG_ASYNC")
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            target_filter: lookup("EDGERUN_LOG_TARGET_FILTER"),
            include_location: lookup("EDGERUN_LOG_INCLUDE_LOCATION")
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        }
    }
}

/// Sampling layer: decides whether to emit a log based on sampling rules
pub struct SamplingLayer {
    mode: SamplingMode,
    sampling_rate: f64,
    counter: AtomicU64,
}

impl SamplingLayer {
    pub fn new(mode: SamplingMode, sampling_rate: f64) -> Self {
        Self {
            mode,
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
            counter: AtomicU64::new(0),
        }
    }

    fn should_sample(&self, level: Level) -> bool {
        let severe = matches!(level, Level::WARN | Level::ERROR);
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => severe,
            SamplingMode::Sampled => {
                if severe {
                    return true;
                }
                if self.sampling_rate <= 0.0 {
                    return false;
                }
                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                let sample_interval = (1.0 / self.sampling_rate) as u64;
                sample_interval > 0 && count % sample_interval == 0
            }
        }
    }
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn register_callsite(&self, metadata: &'static Metadata<'static>) -> Interest {
        if metadata.is_span() {
            return Interest::always();
        }
        let severe = matches!(*metadata.level(), Level::WARN | Level::ERROR);
        match self.mode {
            SamplingMode::All => Interest::always(),
            SamplingMode::ErrorOnly if severe => Interest::always(),
            SamplingMode::ErrorOnly => Interest::never(),
            // The per-event counter must be consulted every time.
            SamplingMode::Sampled if severe => Interest::always(),
            SamplingMode::Sampled => Interest::sometimes(),
        }
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        // Spans are never sampled out; dropping them would orphan their events.
        metadata.is_span() || self.should_sample(*metadata.level())
    }
}

fn level_from_str(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let level = level_from_str(&config.log_level);
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if let Some(target_filter) = &config.target_filter {
        for filter in target_filter.split(',') {
            let filter = filter.trim();
            if filter.is_empty() {
                continue;
            }
            match filter.parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(_) => eprintln!("Warning: Invalid log filter directive: {filter}"),
            }
        }
    }
    env_filter
}

/// Initialize logging with a complete configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<()> {
    // The filter sits outside the sampler so events it rejects are not counted.
    let registry = tracing_subscriber::registry()
        .with(SamplingLayer::new(config.sampling_mode, config.sampling_rate))
        .with(build_filter(config));

    if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());

        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(non_blocking)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(non_blocking)
                .boxed(),
        };

        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize async logging")?;

        // Keep the writer thread alive for the rest of the process.
        std::mem::forget(guard);
    } else {
        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
                .boxed(),
        };

        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize sync logging")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_log_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("EDGERUN_LOG_LEVEL", "warn"),
            ("EDGERUN_LOG_FORMAT", "pretty"),
            ("EDGERUN_LOG_SAMPLING_MODE", "error-only"),
            ("EDGERUN_LOG_ASYNC", "true"),
            ("EDGERUN_LOG_SAMPLING_RATE", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = LogConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.sampling_mode, SamplingMode::ErrorOnly);
        assert!(config.async_logging);
        assert_eq!(config.sampling_rate, 1.0);
        assert!(!config.include_location);
    }

    #[test]
    fn test_parsers_default() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Json);
        assert_eq!(SamplingMode::parse("error_only"), SamplingMode::ErrorOnly);
        assert_eq!(SamplingMode::parse("SAMPLED"), SamplingMode::Sampled);
        assert_eq!(SamplingMode::parse("whatever"), SamplingMode::All);
        assert_eq!(level_from_str("TRACE"), Level::TRACE);
        assert_eq!(level_from_str("bogus"), Level::INFO);
    }

    #[test]
    fn test_sampling_layer_keeps_severe_events() {
        let layer = SamplingLayer::new(SamplingMode::ErrorOnly, 1.0);
        assert!(!layer.should_sample(Level::INFO));
        assert!(layer.should_sample(Level::WARN));
        assert!(layer.should_sample(Level::ERROR));

        // One in four below WARN.
        let layer = SamplingLayer::new(SamplingMode::Sampled, 0.25);
        let kept = (0..8).filter(|_| layer.should_sample(Level::DEBUG)).count();
        assert_eq!(kept, 2);
        assert!(layer.should_sample(Level::ERROR));

        let layer = SamplingLayer::new(SamplingMode::Sampled, 0.0);
        assert!(!layer.should_sample(Level::INFO));
    }

    /// Counts every event that reaches it.
    #[derive(Clone, Default)]
    struct CountingLayer(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for CountingLayer {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_sampled_mode_thins_a_single_callsite() {
        let counter = CountingLayer::default();
        let subscriber = tracing_subscriber::registry()
            .with(SamplingLayer::new(SamplingMode::Sampled, 0.5))
            .with(counter.clone());

        tracing::subscriber::with_default(subscriber, || {
            for i in 0..10 {
                tracing::info!(i, "sampled event");
            }
            for _ in 0..3 {
                tracing::warn!("severe event");
            }
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 5 + 3);
    }

    #[test]
    fn test_error_only_mode_drops_info_callsites() {
        let counter = CountingLayer::default();
        let subscriber = tracing_subscriber::registry()
            .with(SamplingLayer::new(SamplingMode::ErrorOnly, 1.0))
            .with(counter.clone());

        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..4 {
                tracing::info!("dropped event");
                tracing::error!("kept event");
            }
        });

        assert_eq!(counter.0.load(Ordering::SeqCst), 4);
    }
}
