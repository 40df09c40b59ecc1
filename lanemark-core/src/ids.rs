/// Stable identifier allocation for lanes, cards and subtasks.
///
/// Identifiers written into a document (`^abc123`) are kept as-is; these
/// allocators only fill in the ones that are missing.
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

pub trait IdAllocator {
    fn allocate(&mut self) -> String;
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Default allocator: 8 hex chars from SHA-256 over a process-wide counter
/// and a nanosecond timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashedIds;

impl IdAllocator for HashedIds {
    fn allocate(&mut self) -> String {
        let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut hasher = Sha256::new();
        hasher.update(seq.to_le_bytes());
        hasher.update(ts.to_le_bytes());
        let hash = hasher.finalize();
        let id = hex::encode(&hash[..4]);
        log::debug!("[lanemark.ids] allocated {}", id);
        id
    }
}

/// Deterministic `<prefix><n>` identifiers, starting at 1.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next: 1,
        }
    }
}

impl IdAllocator for SequentialIds {
    fn allocate(&mut self) -> String {
        let id = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}
