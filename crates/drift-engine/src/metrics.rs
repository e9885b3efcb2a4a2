//! Per-call execution metrics.

use drift_cache::CacheStats;

/// Timing and counters for one `execute` call.
///
/// Durations are in microseconds. Cache figures are cumulative over all
/// grids of the field set, read after the step ends.
#[derive(Clone, Debug, Default)]
pub struct ExecuteMetrics {
    /// Wall-clock time of the whole call.
    pub total_us: u64,
    /// Time spent running kernels, all passes.
    pub kernel_us: u64,
    /// Time spent in recovery functions.
    pub recovery_us: u64,
    /// Kernel passes run, the batch pass included, over all segments.
    pub passes: u32,
    /// Segments the call was split into at snapshot boundaries.
    pub segments: u32,
    /// Entities evaluated in the batch pass.
    pub entities_evaluated: usize,
    /// Recovery functions invoked.
    pub recovered: usize,
    /// Entities deleted and flushed during the call.
    pub deleted: usize,
    /// Entities deleted because no handler covered their error or the
    /// recovery pass cap was hit.
    pub forced_deletions: usize,
    /// Entities retried through `Repeat`.
    pub repeats: usize,
    /// Chunks evicted at the end of each segment's step.
    pub evicted: usize,
    /// Cache counters after the step.
    pub cache: CacheStats,
}
