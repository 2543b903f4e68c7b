//! Batch splitting for multi-target commands.
//!
//! The server rejects requests whose URL lists too many object ids, so a command that targets
//! more than [`BATCH_LIMIT`] objects is issued as several sequential requests, one per chunk.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`chunk_ranges`] | Contiguous index ranges of at most `size` elements |
//! | [`ObjectIdsGuard`] | Swaps chunks into a descriptor and restores the full id list on drop |

mod guard;
mod splitter;

pub use guard::ObjectIdsGuard;
pub use splitter::{chunk_ranges, BATCH_LIMIT};
