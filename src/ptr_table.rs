//! PtrTable: chained, pointer-keyed hash table with stable slot handles.
//!
//! Nodes are three arena words (`key`, `next`, `slot`) and are never moved
//! once written: a resize only rewrites `next` links and bucket heads.
//! Values live in a slot map beside the chains, so a [`SlotHandle`] stays
//! valid for the life of the table no matter how often it grows.

use crate::arena::{Addr, Arena, SharedArena, WORD};
use crate::config::{ConfigError, FaultHook, GrowthPolicy, TableConfig};
use crate::identity::{hash_identity, Identity};
use crate::record::{Exported, Record};
use crate::recycle::Recycler;
use core::cell::Ref;
use core::fmt;
use core::ops::Deref;
use slotmap::{Key, KeyData, SlotMap};

slotmap::new_key_type! {
    struct SlotKey;
}

/// Handle to a value slot. Stable across resizes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlotHandle(SlotKey);

impl SlotHandle {
    pub fn key<V>(&self, table: &PtrTable<V>) -> Option<Identity> {
        table.key(*self)
    }

    pub fn value<'a, V>(&self, table: &'a PtrTable<V>) -> Option<&'a V> {
        table.get(*self)
    }

    pub fn value_mut<'a, V>(&self, table: &'a mut PtrTable<V>) -> Option<&'a mut V> {
        table.get_mut(*self)
    }
}

const NODE_SIZE: usize = 3 * WORD;
const NODE_ALIGN: usize = WORD;
const KEY_OFFSET: usize = 0;
const NEXT_OFFSET: usize = WORD;
const SLOT_OFFSET: usize = 2 * WORD;

const MAX_STATS_INDENT: usize = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Node(Addr);

impl Node {
    fn from_link(word: u64) -> Option<Node> {
        let addr = Addr::from_word(word);
        (!addr.is_null()).then_some(Node(addr))
    }

    fn link(node: Option<Node>) -> u64 {
        node.map_or(Addr::NULL, |n| n.0).to_word()
    }

    fn init(self, arena: &mut Arena, key: Identity, slot: SlotKey) {
        arena.write(self.0.add(KEY_OFFSET), key.to_word());
        arena.write(self.0.add(NEXT_OFFSET), 0);
        arena.write(self.0.add(SLOT_OFFSET), slot.data().as_ffi());
    }

    fn key(self, arena: &Arena) -> Identity {
        Identity::from_word(arena.read(self.0.add(KEY_OFFSET)))
    }

    fn next(self, arena: &Arena) -> Option<Node> {
        Node::from_link(arena.read(self.0.add(NEXT_OFFSET)))
    }

    fn set_next(self, arena: &mut Arena, next: Option<Node>) {
        arena.write(self.0.add(NEXT_OFFSET), Node::link(next));
    }

    fn slot(self, arena: &Arena) -> SlotKey {
        KeyData::from_ffi(arena.read(self.0.add(SLOT_OFFSET))).into()
    }
}

fn bucket_head(arena: &Arena, buckets: Addr, bucket: usize) -> Option<Node> {
    Node::from_link(arena.read(buckets.add(bucket * WORD)))
}

/// Walks every node in bucket order, then chain order.
struct ChainWalk<A> {
    arena: A,
    buckets: Addr,
    capacity: usize,
    bucket: usize,
    cursor: Option<Node>,
}

impl<A> ChainWalk<A> {
    fn new(arena: A, buckets: Addr, capacity: usize) -> Self {
        Self {
            arena,
            buckets,
            capacity,
            bucket: 0,
            cursor: None,
        }
    }
}

impl<A: Deref<Target = Arena>> Iterator for ChainWalk<A> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        loop {
            if let Some(node) = self.cursor {
                self.cursor = node.next(&*self.arena);
                return Some(node);
            }
            if self.bucket >= self.capacity {
                return None;
            }
            self.cursor = bucket_head(&*self.arena, self.buckets, self.bucket);
            self.bucket += 1;
        }
    }
}

enum Probe {
    Hit(Node),
    Miss {
        bucket: usize,
        tail: Option<Node>,
        depth: usize,
    },
}

/// Bucket array, counters and recycling cursor.
struct Chains {
    buckets: Addr,
    capacity: usize,
    used: usize,
    total: usize,
    max_chain: usize,
    recycler: Option<Recycler>,
}

impl Chains {
    fn new(arena: &mut Arena, capacity: usize) -> Self {
        Self {
            buckets: arena.allocate(capacity * WORD, WORD),
            capacity,
            used: 0,
            total: 0,
            max_chain: 0,
            recycler: None,
        }
    }

    fn bucket_of(&self, key: Identity) -> usize {
        (hash_identity(key) % self.capacity as u64) as usize
    }

    fn head(&self, arena: &Arena, bucket: usize) -> Option<Node> {
        bucket_head(arena, self.buckets, bucket)
    }

    fn set_head(&self, arena: &mut Arena, bucket: usize, node: Option<Node>) {
        arena.write(self.buckets.add(bucket * WORD), Node::link(node));
    }

    fn walk<'a>(&self, arena: &'a Arena) -> ChainWalk<&'a Arena> {
        ChainWalk::new(arena, self.buckets, self.capacity)
    }

    /// Walk the key's chain. Every node visited counts towards
    /// `max_chain`, hit or miss.
    fn probe(&mut self, arena: &Arena, key: Identity) -> Probe {
        let bucket = self.bucket_of(key);
        let mut cursor = self.head(arena, bucket);
        let mut tail = None;
        let mut depth = 0;
        while let Some(node) = cursor {
            depth += 1;
            if depth > self.max_chain {
                self.max_chain = depth;
            }
            if node.key(arena) == key {
                return Probe::Hit(node);
            }
            tail = Some(node);
            cursor = node.next(arena);
        }
        Probe::Miss {
            bucket,
            tail,
            depth,
        }
    }

    fn locate(&self, arena: &Arena, key: Identity) -> Option<Node> {
        let mut cursor = self.head(arena, self.bucket_of(key));
        while let Some(node) = cursor {
            if node.key(arena) == key {
                return Some(node);
            }
            cursor = node.next(arena);
        }
        None
    }

    /// Link `node` after `tail`, or as the head of an empty bucket.
    ///
    /// `max_chain` counts the new node too, so the chain-length trigger
    /// fires one insert earlier than a walked-nodes-only count would.
    fn link(
        &mut self,
        arena: &mut Arena,
        bucket: usize,
        tail: Option<Node>,
        depth: usize,
        node: Node,
    ) {
        match tail {
            Some(tail) => tail.set_next(arena, Some(node)),
            None => {
                self.set_head(arena, bucket, Some(node));
                self.used += 1;
            }
        }
        self.total += 1;
        self.max_chain = self.max_chain.max(depth + 1);
    }

    fn append(&mut self, arena: &mut Arena, node: Node) {
        let bucket = self.bucket_of(node.key(arena));
        let mut tail = None;
        let mut depth = 0;
        let mut cursor = self.head(arena, bucket);
        while let Some(n) = cursor {
            depth += 1;
            tail = Some(n);
            cursor = n.next(arena);
        }
        self.link(arena, bucket, tail, depth, node);
    }

    fn alloc_node(&mut self, arena: &mut Arena) -> Node {
        if let Some(cursor) = self.recycler.as_mut() {
            if let Some(addr) = cursor.carve(NODE_SIZE, NODE_ALIGN) {
                return Node(addr);
            }
            if tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!(
                    leftover = cursor.remaining(),
                    "retired bucket array exhausted"
                );
            }
            self.recycler = None;
        }
        Node(arena.allocate(NODE_SIZE, NODE_ALIGN))
    }

    /// Double the bucket array and relink every node in place. The old
    /// array becomes the recycling cursor; any previous cursor is dropped.
    fn grow(&mut self, arena: &mut Arena) {
        let old_buckets = self.buckets;
        let old_capacity = self.capacity;

        self.capacity = old_capacity * 2;
        self.buckets = arena.allocate(self.capacity * WORD, WORD);
        self.used = 0;
        self.total = 0;
        self.max_chain = 0;

        for bucket in 0..old_capacity {
            let mut cursor = bucket_head(arena, old_buckets, bucket);
            while let Some(node) = cursor {
                cursor = node.next(arena);
                node.set_next(arena, None);
                self.append(arena, node);
            }
        }

        self.recycler = Some(Recycler::over(old_buckets, old_capacity * WORD));

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                old_capacity,
                new_capacity = self.capacity,
                records = self.total,
                used = self.used,
                max_chain = self.max_chain,
                "pointer table grown"
            );
        }
    }
}

#[derive(Debug)]
struct Slot<V> {
    key: Identity,
    value: Option<V>,
}

/// Point-in-time shape of a [`PtrTable`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TableStats {
    pub capacity: usize,
    /// Non-empty buckets.
    pub used_slots: usize,
    pub total_records: usize,
    pub max_chain_length: usize,
    /// Bytes of the retired bucket array still available for nodes.
    pub recycle_bytes_remaining: usize,
}

impl TableStats {
    /// Average chain length over non-empty buckets; zero when empty.
    pub fn probe_average(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.total_records as f64 / self.used_slots as f64
        }
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PtrTable stats: used = {} slots of total = {}, total records = {}, \
             max list records = {}, probe average = {:.3}",
            self.used_slots,
            self.capacity,
            self.total_records,
            self.max_chain_length,
            self.probe_average()
        )
    }
}

/// Iterator over `(identity, handle)` pairs in bucket order, then chain
/// order. Holds a shared borrow of the arena.
pub struct Iter<'a> {
    walk: ChainWalk<Ref<'a, Arena>>,
}

impl Iterator for Iter<'_> {
    type Item = (Identity, SlotHandle);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.walk.next()?;
        let arena = &*self.walk.arena;
        Some((node.key(arena), SlotHandle(node.slot(arena))))
    }
}

pub struct PtrTable<V> {
    arena: SharedArena,
    chains: Chains,
    slots: SlotMap<SlotKey, Slot<V>>,
    growth: GrowthPolicy,
    wait_on_mutex: bool,
    fault_hook: Option<FaultHook>,
}

impl<V> PtrTable<V> {
    /// Table with `initial_capacity` buckets and the default growth policy.
    pub fn new(arena: SharedArena, initial_capacity: usize) -> Result<Self, ConfigError> {
        Self::with_config(
            arena,
            TableConfig::new().with_initial_capacity(initial_capacity),
        )
    }

    pub fn with_config(arena: SharedArena, config: TableConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let chains = Chains::new(&mut arena.borrow_mut(), config.initial_capacity);
        Ok(Self {
            arena,
            chains,
            slots: SlotMap::with_key(),
            growth: config.growth,
            wait_on_mutex: config.wait_on_mutex,
            fault_hook: config.fault_hook,
        })
    }

    pub fn arena(&self) -> &SharedArena {
        &self.arena
    }

    pub fn len(&self) -> usize {
        self.chains.total
    }

    pub fn is_empty(&self) -> bool {
        self.chains.total == 0
    }

    pub fn capacity(&self) -> usize {
        self.chains.capacity
    }

    /// The reserved construction hint; it has no effect on behaviour.
    pub fn wait_on_mutex(&self) -> bool {
        self.wait_on_mutex
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            capacity: self.chains.capacity,
            used_slots: self.chains.used,
            total_records: self.chains.total,
            max_chain_length: self.chains.max_chain,
            recycle_bytes_remaining: self.chains.recycler.map_or(0, |r| r.remaining()),
        }
    }

    /// Return the slot handle for `key`, creating an unset slot if the key
    /// is new. The flag is `true` when this call created the slot.
    ///
    /// May grow the table. Growth is only considered after an insert.
    ///
    /// # Panics
    ///
    /// Panics if the arena is borrowed elsewhere, or if a freshly inserted
    /// key cannot be found again after growing (a corrupted table).
    pub fn find_or_create(&mut self, key: Identity) -> (SlotHandle, bool) {
        let mut arena = self.arena.borrow_mut();
        let (bucket, tail, depth) = match self.chains.probe(&arena, key) {
            Probe::Hit(node) => return (SlotHandle(node.slot(&arena)), false),
            Probe::Miss {
                bucket,
                tail,
                depth,
            } => (bucket, tail, depth),
        };

        let slot = self.slots.insert(Slot { key, value: None });
        let node = self.chains.alloc_node(&mut arena);
        node.init(&mut arena, key, slot);
        self.chains.link(&mut arena, bucket, tail, depth, node);

        let c = &self.chains;
        if !self
            .growth
            .should_grow(c.used, c.total, c.max_chain, c.capacity)
        {
            return (SlotHandle(slot), true);
        }

        self.chains.grow(&mut arena);
        (self.relocate(&arena, key), true)
    }

    /// Look `key` up without inserting or touching the counters.
    pub fn find(&self, key: Identity) -> Option<SlotHandle> {
        let arena = self.arena.borrow();
        self.chains
            .locate(&arena, key)
            .map(|node| SlotHandle(node.slot(&arena)))
    }

    /// Value for `key`, populating an unset slot with `init()` first.
    pub fn get_or_insert_with<F>(&mut self, key: Identity, init: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let (handle, _) = self.find_or_create(key);
        self.slots[handle.0].value.get_or_insert_with(init)
    }

    pub fn key(&self, handle: SlotHandle) -> Option<Identity> {
        self.slots.get(handle.0).map(|s| s.key)
    }

    /// The populated value behind `handle`, if any.
    pub fn get(&self, handle: SlotHandle) -> Option<&V> {
        self.slots.get(handle.0).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut V> {
        self.slots.get_mut(handle.0).and_then(|s| s.value.as_mut())
    }

    /// The raw slot behind `handle`; `None` inside means not yet populated.
    pub fn slot_mut(&mut self, handle: SlotHandle) -> Option<&mut Option<V>> {
        self.slots.get_mut(handle.0).map(|s| &mut s.value)
    }

    /// # Panics
    ///
    /// Panics if the arena is mutably borrowed elsewhere.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            walk: ChainWalk::new(
                self.arena.borrow(),
                self.chains.buckets,
                self.chains.capacity,
            ),
        }
    }

    fn relocate(&self, arena: &Arena, key: Identity) -> SlotHandle {
        match self.chains.locate(arena, key) {
            Some(node) => SlotHandle(node.slot(arena)),
            None => self.fault(&format!(
                "key {key} missing after growing to {} buckets",
                self.chains.capacity
            )),
        }
    }

    /// Recount the chains and check them against the stored counters.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let arena = self.arena.borrow();
        let mut used = 0;
        let mut total = 0;
        let mut longest = 0;
        for bucket in 0..self.chains.capacity {
            let mut len = 0;
            let mut cursor = self.chains.head(&arena, bucket);
            while let Some(node) = cursor {
                len += 1;
                let key = node.key(&arena);
                assert_eq!(self.chains.bucket_of(key), bucket, "node in wrong bucket");
                assert_eq!(self.key(SlotHandle(node.slot(&arena))), Some(key));
                cursor = node.next(&arena);
            }
            if len > 0 {
                used += 1;
            }
            total += len;
            longest = longest.max(len);
        }
        assert_eq!(used, self.chains.used, "used slot count");
        assert_eq!(total, self.chains.total, "total record count");
        assert_eq!(total, self.slots.len(), "one slot per node");
        assert!(self.chains.max_chain >= longest, "max chain below longest chain");
    }

    #[cold]
    fn fault(&self, detail: &str) -> ! {
        if let Some(hook) = &self.fault_hook {
            hook(detail);
        }
        tracing::error!(detail, "pointer table consistency fault");
        panic!("PtrTable: {detail}");
    }
}

impl<V: Record> PtrTable<V> {
    /// Emit a summary line for this table, then let every populated value
    /// print its own statistics one level deeper.
    pub fn print_stats(&self, header: &str, nesting_level: usize) {
        let indent = "  ".repeat(nesting_level.min(MAX_STATS_INDENT));
        let stats = self.stats();
        tracing::info!("{}{}{}", indent, header, stats);

        let arena = self.arena.borrow();
        for node in self.chains.walk(&arena) {
            if let Some(value) = self.get(SlotHandle(node.slot(&arena))) {
                value.print_stats(nesting_level + 1);
            }
        }
    }

    /// Copy every value reporting a non-zero record count into a vector,
    /// in traversal order. Shallow entries carry handles for later
    /// remapping; deep entries carry each value's own deep copy.
    pub fn flatten_to_array(&self, deep: bool) -> Vec<Exported<V::Snapshot>> {
        if self.chains.total == 0 {
            return Vec::new();
        }
        let arena = self.arena.borrow();
        let count = self.exportable(&arena).count();
        let mut out = Vec::with_capacity(count);
        for (handle, value) in self.exportable(&arena) {
            out.push(if deep {
                Exported::Deep(value.export_copy(true))
            } else {
                Exported::Shallow(handle)
            });
        }
        out
    }

    /// Reset the time-windowed counters of every populated value.
    pub fn reset_counters(&mut self, now: u64) {
        if self.chains.total == 0 {
            return;
        }
        let arena = self.arena.borrow();
        for node in self.chains.walk(&arena) {
            if let Some(value) = self
                .slots
                .get_mut(node.slot(&arena))
                .and_then(|s| s.value.as_mut())
            {
                value.reset_counters(now);
            }
        }
    }

    fn exportable<'a>(&'a self, arena: &'a Arena) -> impl Iterator<Item = (SlotHandle, &'a V)> + 'a {
        self.chains.walk(arena).filter_map(move |node| {
            let handle = SlotHandle(node.slot(arena));
            self.get(handle)
                .filter(|v| v.records_to_copy() > 0)
                .map(|v| (handle, v))
        })
    }
}

impl<V> fmt::Debug for PtrTable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtrTable")
            .field("stats", &self.stats())
            .field("wait_on_mutex", &self.wait_on_mutex)
            .finish()
    }
}
