use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use crate::demos::{Demo, COUNTER_KEY};
use crate::dispatcher::{Dispatcher, Receipt};
use crate::logging::{init_logging_with_config, LogConfig};
use crate::middleware::{MetricsMiddleware, TracingMiddleware};
use crate::response::status_reason;
use crate::runtime_config::RuntimeConfig;
use crate::store::{DurabilityMode, KvStore};
use crate::worker_pool::{WorkerPool, WorkerPoolConfig};

/// Command-line interface for edgerun
#[derive(Parser, Debug)]
#[command(name = "edgerun", version)]
#[command(about = "Edge-function execution core", long_about = None)]
pub struct Cli {
    /// YAML runtime configuration file
    #[arg(long, global = true, env = "EDGERUN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Invoke a built-in handler and print one receipt per invocation
    Run {
        #[arg(long, value_enum, default_value_t = Demo::Counter)]
        handler: Demo,

        /// Number of invocations
        #[arg(short = 'n', long, default_value_t = 1)]
        requests: usize,

        /// Worker coroutines; above 1 the invocations run through a pool
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,

        /// Print only the summary line
        #[arg(short, long, default_value_t = false)]
        quiet: bool,
    },
    /// Inspect or edit a journal-backed store
    Kv {
        /// Journal file (default: store path from config)
        #[arg(long)]
        path: Option<PathBuf>,

        #[command(subcommand)]
        command: KvCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum KvCommand {
    /// Print the value stored under KEY
    Get { key: String },
    /// Store VALUE (JSON, or a plain string) under KEY
    Set { key: String, value: String },
    /// Remove KEY; prints whether it was present
    Delete { key: String },
    /// Print every key and value
    List,
    /// Rewrite the journal with one entry per live key
    Compact,
}

/// Parse the command line, initialize logging and run the command.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, the store cannot be
/// opened, or a `kv` operation fails. Handler faults are not errors; they
/// are reported on the receipts.
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if let Some(level) = &cli.log_level {
        log_config.log_level = level.clone();
    }
    init_logging_with_config(&log_config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(&cli, &mut out)
}

/// Run an already-parsed command, writing its output to `out`.
pub fn execute(cli: &Cli, out: &mut dyn Write) -> Result<()> {
    let config = RuntimeConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Run {
            handler,
            requests,
            concurrency,
            quiet,
        } => run_demo(&config, *handler, *requests, *concurrency, *quiet, out),
        Commands::Kv { path, command } => run_kv(&config, path.as_deref(), command, out),
    }
}

fn run_demo(
    config: &RuntimeConfig,
    demo: Demo,
    requests: usize,
    concurrency: usize,
    quiet: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let store = config.store.open_store()?;
    let metrics = Arc::new(MetricsMiddleware::new());

    let mut dispatcher = Dispatcher::new(store.clone());
    dispatcher.add_middleware(metrics.clone());
    dispatcher.add_middleware(Arc::new(TracingMiddleware));
    dispatcher.register_handler(demo.name(), demo.handler());

    info!(
        handler_name = demo.name(),
        requests = requests,
        concurrency = concurrency,
        store_mode = store.mode().description(),
        "Running demo handler"
    );

    let receipts = if concurrency <= 1 {
        (0..requests)
            .map(|_| {
                dispatcher
                    .invoke_named(demo.name())
                    .context("demo handler is not registered")
            })
            .collect::<Result<Vec<Receipt>>>()?
    } else {
        run_pooled(config, demo, Arc::new(dispatcher), requests, concurrency)?
    };

    if !quiet {
        for receipt in &receipts {
            serde_json::to_writer(&mut *out, receipt)?;
            writeln!(out)?;
        }
    }

    let summary = json!({
        "handler": demo.name(),
        "requests": requests,
        "completed": metrics.completed_count(),
        "faulted": metrics.faulted_count(),
        "invalid_results": metrics.invalid_result_count(),
        "average_latency_us": metrics.average_latency().as_micros() as u64,
        "counter": store.get(COUNTER_KEY)?,
    });
    writeln!(out, "{summary}")?;

    store.close()?;
    Ok(())
}

fn run_pooled(
    config: &RuntimeConfig,
    demo: Demo,
    dispatcher: Arc<Dispatcher>,
    requests: usize,
    concurrency: usize,
) -> Result<Vec<Receipt>> {
    may::config().set_stack_size(config.stack_size);
    let pool_config = WorkerPoolConfig::new(concurrency, config.stack_size);

    // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
    // Safe because: May runtime is configured above, handler is Send + Sync + 'static
    let pool = unsafe { WorkerPool::new(demo.name(), pool_config, dispatcher, demo.handler()) };

    let mut pending = Vec::with_capacity(requests);
    for _ in 0..requests {
        match pool.submit() {
            Ok(rx) => pending.push(rx),
            Err(res) => bail!(
                "worker pool rejected an invocation: {} {}",
                res.status(),
                status_reason(res.status())
            ),
        }
    }

    let mut receipts = Vec::with_capacity(requests);
    for rx in pending {
        receipts.push(rx.recv().context("worker dropped a reply channel")?);
    }
    pool.shutdown();
    Ok(receipts)
}

fn run_kv(
    config: &RuntimeConfig,
    path: Option<&Path>,
    command: &KvCommand,
    out: &mut dyn Write,
) -> Result<()> {
    let path = path.unwrap_or(config.store.path.as_path());
    let mode = match config.store.durability_mode()? {
        DurabilityMode::None => DurabilityMode::Strict,
        mode => mode,
    };
    let store = KvStore::open(path, mode)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;

    match command {
        KvCommand::Get { key } => match store.get(key)? {
            Some(value) => writeln!(out, "{value}")?,
            None => bail!("key '{key}' not found"),
        },
        KvCommand::Set { key, value } => {
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.clone()));
            store.set(key, value)?;
        }
        KvCommand::Delete { key } => {
            let existed = store.delete(key)?;
            writeln!(out, "{existed}")?;
        }
        KvCommand::List => {
            for key in store.keys() {
                if let Some(value) = store.get(&key)? {
                    writeln!(out, "{key}\t{value}")?;
                }
            }
        }
        KvCommand::Compact => {
            let written = store.compact()?;
            writeln!(out, "compacted {written} entries")?;
        }
    }

    store.close()?;
    Ok(())
}
