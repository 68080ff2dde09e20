use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic ticket counter for one logical query.
///
/// Each fetch takes a ticket before suspending; on completion the result is
/// applied only if no later ticket was issued meanwhile.
#[derive(Debug, Default)]
pub struct RequestSequence {
    issued: AtomicU64,
}

impl RequestSequence {
    pub fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }
}
