//! Abstract memory budget interfaces.
//!
//! The concrete implementation lives in `spilljoin-mem`. Only the traits live
//! here so the frame pool, the join engine and tests can share the API without
//! pulling in allocator details.

/// A guard returned by a memory budget when bytes are acquired.
///
/// Must be RAII (releases on Drop) and `Send`: pooled frames carry their guard
/// across the producer threads of a join.
pub trait BudgetGuard: Send {
    /// Number of bytes currently accounted for by this guard.
    fn bytes(&self) -> usize;
    /// Optional debug tag for tracing.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A handle representing a hard memory cap.
///
/// Callers must `try_acquire` before allocating. `None` is the signal to
/// spill or block; it is never an error in itself.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Attempt to acquire `bytes` from the live budget. Returns a guard on success.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Approximate currently used bytes (advisory; not a correctness API).
    fn used_bytes(&self) -> usize;

    /// Bytes still available under the cap (advisory).
    fn available_bytes(&self) -> usize {
        self.capacity_bytes().saturating_sub(self.used_bytes())
    }
}
