//! Persisted pipeline state.
//!
//! # Data Flow
//! ```text
//! startup: snapshot file → StateStore::load_from_file
//! scanner: capacity withdrawn → incr_by(epochCapacity:{epoch}, ttl = rest of epoch)
//! admission: get(epochCapacity:{epoch}) before deciding to pause
//! block scanner: set({name}:lastSeenBlockNumber) after each visited block
//! shutdown: StateStore::save_to_file → snapshot file
//! ```

pub mod state;

pub use state::{epoch_capacity_key, last_seen_block_key, StateStore, StoreError};
