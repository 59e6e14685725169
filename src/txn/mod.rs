use std::sync::atomic::{AtomicBool, Ordering};

pub type TxnId = u64;

/// Per-transaction state borrowed by every operator in its tree. The lock
/// manager and write-ahead log live outside this crate; what the executor
/// needs locally is the id and a cooperative abort flag, polled at every
/// `next` call.
#[derive(Debug)]
pub struct TransactionContext {
    id: TxnId,
    aborted: AtomicBool,
}

impl TransactionContext {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            aborted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }
}
