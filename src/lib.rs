//! ptr-hash-table: a single-threaded, pointer-keyed hash table used as the
//! index of a sampling profiler's call tree. Given the identity of a
//! runtime object it finds or creates the record for that object.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep the per-sample lookup to one hash, one short chain walk
//!   and (rarely) one bump allocation, while letting callers hold on to
//!   slot handles for as long as the table lives.
//! - Layers:
//!   - Arena: word-addressed bump allocator. Buckets and nodes are carved
//!     out of it and never freed individually.
//!   - Recycler: bump cursor over the bucket array retired by the last
//!     resize; node allocations drain it before touching the arena.
//!   - PtrTable<V>: chained buckets of three-word nodes (`key`, `next`,
//!     `slot`) plus a slot map of `Option<V>` values addressed by
//!     `SlotHandle`.
//!
//! Constraints
//! - Single-threaded: the arena is shared through `Rc<RefCell<_>>`, so
//!   tables are `!Send`/`!Sync`. Callers that share a table across threads
//!   must wrap every call, lookups included, in one critical section: a
//!   lookup may resize.
//! - Nodes never move. A resize rewrites links and bucket heads only.
//! - One node per identity; there is no removal.
//! - Memory is never returned to the arena; capacity only grows.
//!
//! Find-or-create
//! - `find_or_create` returns `(handle, created)`. A new slot is unset;
//!   the caller populates it (or uses `get_or_insert_with`). This keeps
//!   value construction out of the table.
//! - New nodes are linked at the chain tail.
//! - Growth is evaluated after inserts only: the table doubles when more
//!   than 80% of buckets are occupied, the average chain exceeds 5 nodes,
//!   or any chain exceeds 10 nodes (see `GrowthPolicy`).
//!
//! Recycling
//! - After a resize the old bucket array is unreferenced. It becomes the
//!   recycling cursor and serves node allocations until padding plus one
//!   node no longer fits; then the cursor is dropped and the arena serves
//!   until the next resize. Only the most recent retired array is used.
//!
//! Walks
//! - `print_stats`, `flatten_to_array`, `reset_counters` and `iter` visit
//!   nodes in bucket order, then chain order. Values take part through the
//!   `Record` trait and may recurse into their own nested tables on the
//!   same arena; walks only borrow the arena shared.
//!
//! Failure model
//! - Bad construction parameters return `ConfigError`.
//! - A key that cannot be re-located right after a resize means the resize
//!   corrupted the table: the configured fault hook is called, the fault
//!   is logged through `tracing`, and the table panics.
//! - Walks over an empty table do nothing.

pub mod arena;
mod config;
pub mod identity;
mod ptr_table;
mod ptr_table_proptest;
mod record;
mod recycle;

// Public surface
pub use arena::{Addr, Arena, ArenaStats, SharedArena};
pub use config::{ConfigError, FaultHook, GrowthPolicy, TableConfig};
pub use identity::{hash_identity, Identity};
pub use ptr_table::{Iter, PtrTable, SlotHandle, TableStats};
pub use record::{Exported, Record};
