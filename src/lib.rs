//! Stable-slot collections for time-bounded, priority-ordered keyed
//! storage.
//!
//! Three cooperating structures over opaque byte keys and values:
//!
//! - [`ProbingTable`]: a linear-probing hash table whose deletions
//!   backward-shift the probe chain; every value keeps its slot (and
//!   therefore its [`ValueRef`]) until the entry is removed.
//! - [`MinHeap`]: a fixed-capacity binary min-heap whose payload
//!   slots never move, so a held [`ValueRef`] supports O(log n)
//!   in-place re-keying through [`MinHeap::change_key`].
//! - [`TimedTable`]: the two combined, where each key may join one of
//!   up to ten timeout classes and the earliest deadline is one call
//!   away.
//!
//! All structures are single-threaded; wrap a handle in a mutex if it
//! has to cross threads.

mod arena;
mod error;
mod hash;
mod hashtable;
mod heap;
mod timed;

pub use arena::ValueRef;
pub use error::Error;
pub use hashtable::{KeyValuePair, ProbingTable, TableConfig, TableStatus};
pub use heap::{HeapConfig, MinHeap};
pub use timed::{TimedConfig, TimedTable, MAX_TIMEOUT_SLOTS};
