// Library interface for testing

// Declare all modules
pub mod analysis;
pub mod chunk_store;
pub mod config;
pub mod constants;
pub mod db;
pub mod legacy_log;
pub mod lifecycle;
pub mod log_entry;
pub mod position;
pub mod queries;
pub mod schema;
pub mod serve;
pub mod sync;

// Re-export the expected schema version for convenience
pub use constants::SCHEMA_VERSION;

use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// Per-meeting write locks keyed by meeting uuid. Serializes the
/// read-decide-write cycle so concurrent uploads for one meeting cannot
/// interleave between the gap check and the position update.
pub type MeetingLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Get or create the lock for one meeting
pub fn get_meeting_lock(locks: &MeetingLocks, meeting_uuid: &str) -> Arc<Mutex<()>> {
    locks
        .entry(meeting_uuid.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}
