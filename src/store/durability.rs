//! Durability policy for the store journal.

use std::time::Duration;

/// How writes reach disk.
///
/// | Mode | Journal | fsync |
/// |------|---------|-------|
/// | `None` | no | never, contents are lost at exit |
/// | `Strict` | yes | before every write returns |
/// | `Batched` | yes | every `batch_size` writes or `interval_ms`, and on flush/close |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// In-memory only.
    None,

    /// Append and fsync on every `set`/`delete`.
    Strict,

    /// Buffered appends, synced when either threshold is reached.
    ///
    /// The interval is checked when a write lands; there is no background
    /// timer, so an idle store keeps its buffer until the next write, a
    /// `flush`, or `close`.
    Batched {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum writes between fsyncs
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// Whether this mode keeps a journal on disk.
    #[must_use]
    pub fn requires_journal(&self) -> bool {
        !matches!(self, DurabilityMode::None)
    }

    /// Whether a batched journal should sync now.
    #[must_use]
    pub fn should_sync(&self, pending: usize, since_last_sync: Duration) -> bool {
        match *self {
            DurabilityMode::None => false,
            DurabilityMode::Strict => pending > 0,
            DurabilityMode::Batched {
                interval_ms,
                batch_size,
            } => {
                pending > 0
                    && (pending >= batch_size
                        || since_last_sync >= Duration::from_millis(interval_ms))
            }
        }
    }

    /// Parse a mode name as used in config files and `EDGERUN_STORE_MODE`.
    ///
    /// `memory`/`none`, `strict`, `batched`. Batched takes the given thresholds.
    #[must_use]
    pub fn parse(s: &str, interval_ms: u64, batch_size: usize) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" | "memory" => Some(DurabilityMode::None),
            "strict" => Some(DurabilityMode::Strict),
            "batched" => Some(DurabilityMode::Batched {
                interval_ms,
                batch_size: batch_size.max(1),
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::None => "in-memory (contents lost at exit)",
            DurabilityMode::Strict => "journal, fsync per write",
            DurabilityMode::Batched { .. } => "journal, batched fsync",
        }
    }

    /// Batched with 100ms interval or 1000 writes.
    #[must_use]
    pub fn buffered_default() -> Self {
        DurabilityMode::Batched {
            interval_ms: 100,
            batch_size: 1000,
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        DurabilityMode::None
    }
}
