//! # CLI Module
//!
//! Command-line front end for the `edgerun` binary.
//!
//! ## Commands
//!
//! ### `run`
//!
//! Invoke a built-in handler against the configured store and print one JSON
//! receipt per invocation:
//!
//! ```bash
//! edgerun run --handler counter --requests 3
//! edgerun run --handler faulty-counter --requests 100 --concurrency 8
//! ```
//!
//! With `--concurrency` above 1 the invocations go through a worker pool.
//!
//! ### `kv`
//!
//! Inspect or edit a journal-backed store:
//!
//! ```bash
//! edgerun kv --path data/kv.journal list
//! edgerun kv get counter
//! edgerun kv set counter 41
//! edgerun kv delete counter
//! edgerun kv compact
//! ```
//!
//! `kv` always opens the store durably; an in-memory store would have
//! nothing to show. Values given to `set` are parsed as JSON, falling back to
//! a plain string.
//!
//! ## Global options
//!
//! - `--config <FILE>` - YAML runtime configuration (environment overrides it)
//! - `--log-level <LEVEL>` - overrides `EDGERUN_LOG_LEVEL`

mod commands;


pub use commands::{execute, run_cli, Cli, Commands, KvCommand};
