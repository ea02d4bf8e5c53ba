//! Open-bucket hash tables with caller supplied hashing.
//!
//! [`Hash`] stores whole entries and asks a [`HashStrategy`] for the bucket key and for
//! equality, so only part of an entry needs to act as the key. [`HashMap`] builds a key/data
//! map on top of it.
//!
//! The bucket array is picked lazily on first insert ([`DEFAULT_BUCKETS`] buckets) and never
//! shrinks. Iteration order is unspecified and may change after any mutation. To remove
//! entries during a walk, use a [`Position`] and call [`Hash::stabilize`] after each removal.

mod map;

use std::fmt;
use std::marker::PhantomData;

pub use map::{HashMap, IdentityHash, KeyData, KeyHasher, StrHash};

/// Bucket count used when the first entry is inserted into an unsized table.
pub const DEFAULT_BUCKETS: usize = 31;

/// Hashing and equality for entries of type `D`.
pub trait HashStrategy<D: ?Sized> {
    fn gen_key(data: &D) -> u32;
    fn equals(a: &D, b: &D) -> bool;
}

/// Location of an entry inside a particular [`Hash`].
///
/// A position is only meaningful for the table that produced it and only until that table is
/// mutated, with the exception of [`Hash::remove`] followed by [`Hash::stabilize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    bucket: usize,
    slot: usize,
}

pub struct Hash<D, S> {
    buckets: Vec<Vec<D>>,
    count: usize,
    _strategy: PhantomData<fn() -> S>,
}

impl<D, S: HashStrategy<D>> Hash<D, S> {
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
            count: 0,
            _strategy: PhantomData,
        }
    }

    pub fn with_buckets(buckets: usize) -> Self {
        let mut hash = Self::new();
        hash.resize(buckets);
        hash
    }

    /// Number of entries reachable by iteration.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of buckets, which may be greater than [`count`](Self::count).
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Replace the bucket array with `buckets` empty buckets.
    ///
    /// # Panics
    ///
    /// Panics if the table holds any entry.
    pub fn resize(&mut self, buckets: usize) {
        assert!(self.count == 0, "Hash::resize called on a non-empty table");
        self.buckets.clear();
        self.buckets.resize_with(buckets, Vec::new);
    }

    fn bucket_of(&self, key: u32) -> usize {
        key as usize % self.buckets.len()
    }

    fn ensure_buckets(&mut self) {
        if self.buckets.is_empty() {
            self.buckets.resize_with(DEFAULT_BUCKETS, Vec::new);
        }
    }

    /// Find the entry in the bucket for `key` that satisfies `matches`.
    pub(crate) fn position_with(&self, key: u32, matches: impl Fn(&D) -> bool) -> Option<Position> {
        if self.count == 0 {
            return None;
        }
        let bucket = self.bucket_of(key);
        self.buckets[bucket]
            .iter()
            .position(matches)
            .map(|slot| Position { bucket, slot })
    }

    pub fn position(&self, key: &D) -> Option<Position> {
        self.position_with(S::gen_key(key), |d| S::equals(d, key))
    }

    /// Entry equal to `key`, comparing only what the strategy compares.
    pub fn find(&self, key: &D) -> Option<&D> {
        self.position(key).and_then(|pos| self.get(pos))
    }

    pub fn find_mut(&mut self, key: &D) -> Option<&mut D> {
        let pos = self.position(key)?;
        self.get_mut(pos)
    }

    /// Store `data`, replacing an equal entry if there is one.
    pub fn insert(&mut self, data: D) -> &mut D {
        self.ensure_buckets();
        let bucket = self.bucket_of(S::gen_key(&data));
        let entries = &mut self.buckets[bucket];
        match entries.iter().position(|d| S::equals(d, &data)) {
            Some(slot) => {
                entries[slot] = data;
                &mut entries[slot]
            }
            None => {
                self.count += 1;
                push(entries, data)
            }
        }
    }

    /// Store `data` unless an equal entry exists; either way return the stored entry.
    pub fn insert_once(&mut self, data: D) -> &mut D {
        self.ensure_buckets();
        let bucket = self.bucket_of(S::gen_key(&data));
        let entries = &mut self.buckets[bucket];
        match entries.iter().position(|d| S::equals(d, &data)) {
            Some(slot) => &mut entries[slot],
            None => {
                self.count += 1;
                push(entries, data)
            }
        }
    }

    /// Remove the entry at `pos`.
    ///
    /// Later entries of the same bucket move up by one, so `pos` now names the next entry of
    /// the walk or the end of its bucket; [`stabilize`](Self::stabilize) fixes the latter.
    ///
    /// # Panics
    ///
    /// Panics if `pos` does not name an entry of this table.
    pub fn remove(&mut self, pos: Position) -> D {
        assert!(
            self.get(pos).is_some(),
            "Hash::remove called with a position not owned by this table"
        );
        self.count -= 1;
        self.buckets[pos.bucket].remove(pos.slot)
    }

    /// Drop all entries, keeping bucket storage.
    pub fn erase(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.count = 0;
    }

    /// Drop all entries and the storage of every bucket, keeping the bucket array.
    pub fn reset(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = Vec::new();
        }
        self.count = 0;
    }

    /// Return to the state of a freshly constructed table; the next insert re-sizes it.
    pub fn release(&mut self) {
        self.buckets = Vec::new();
        self.count = 0;
    }

    /// Position of the first entry, or the end position when empty.
    pub fn first(&self) -> Position {
        self.skip_empty(0)
    }

    fn end(&self) -> Position {
        Position {
            bucket: self.buckets.len(),
            slot: 0,
        }
    }

    fn skip_empty(&self, from: usize) -> Position {
        (from..self.buckets.len())
            .find(|b| !self.buckets[*b].is_empty())
            .map(|bucket| Position { bucket, slot: 0 })
            .unwrap_or_else(|| self.end())
    }

    pub fn is_end(&self, pos: Position) -> bool {
        pos.bucket >= self.buckets.len()
    }

    pub fn get(&self, pos: Position) -> Option<&D> {
        self.buckets.get(pos.bucket)?.get(pos.slot)
    }

    pub fn get_mut(&mut self, pos: Position) -> Option<&mut D> {
        self.buckets.get_mut(pos.bucket)?.get_mut(pos.slot)
    }

    /// Move `pos` to the next entry.
    pub fn advance(&self, pos: &mut Position) {
        if self.is_end(*pos) {
            return;
        }
        pos.slot += 1;
        self.stabilize(pos);
    }

    /// Reposition `pos` if the slot it names has been vacated by a removal.
    pub fn stabilize(&self, pos: &mut Position) {
        if self.is_end(*pos) {
            return;
        }
        if pos.slot >= self.buckets[pos.bucket].len() {
            *pos = self.skip_empty(pos.bucket + 1);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.buckets.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut D> {
        self.buckets.iter_mut().flatten()
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&mut D) -> bool) {
        let mut pos = self.first();
        while let Some(entry) = self.get_mut(pos) {
            if keep(entry) {
                self.advance(&mut pos);
            } else {
                self.remove(pos);
                self.stabilize(&mut pos);
            }
        }
    }
}

fn push<D>(entries: &mut Vec<D>, data: D) -> &mut D {
    entries.push(data);
    let last = entries.len() - 1;
    &mut entries[last]
}

impl<D, S: HashStrategy<D>> Default for Hash<D, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Clone, S> Clone for Hash<D, S> {
    fn clone(&self) -> Self {
        Self {
            buckets: self.buckets.clone(),
            count: self.count,
            _strategy: PhantomData,
        }
    }
}

impl<D: fmt::Debug, S> fmt::Debug for Hash<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.buckets.iter().flatten()).finish()
    }
}
