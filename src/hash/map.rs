use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;

use super::{Hash, HashStrategy};

/// Hashing and equality for map keys of type `K`.
pub trait KeyHasher<K: ?Sized> {
    fn gen_key(key: &K) -> u32;
    fn equals(a: &K, b: &K) -> bool;
}

/// Integer keys hash to themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityHash;

macro_rules! identity_hash {
    ($($t:ty),*) => {
        $(
            impl KeyHasher<$t> for IdentityHash {
                #[inline]
                fn gen_key(key: &$t) -> u32 {
                    *key as u32
                }

                #[inline]
                fn equals(a: &$t, b: &$t) -> bool {
                    a == b
                }
            }
        )*
    };
}

identity_hash!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// String keys, hashed with 32-bit FNV-1a.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrHash;

impl StrHash {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    fn fnv1a(bytes: &[u8]) -> u32 {
        bytes.iter().fold(Self::OFFSET_BASIS, |hash, b| {
            (hash ^ u32::from(*b)).wrapping_mul(Self::PRIME)
        })
    }
}

impl KeyHasher<str> for StrHash {
    fn gen_key(key: &str) -> u32 {
        Self::fnv1a(key.as_bytes())
    }

    fn equals(a: &str, b: &str) -> bool {
        a == b
    }
}

impl KeyHasher<String> for StrHash {
    fn gen_key(key: &String) -> u32 {
        Self::fnv1a(key.as_bytes())
    }

    fn equals(a: &String, b: &String) -> bool {
        a == b
    }
}

/// A map entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyData<K, V> {
    key: K,
    data: V,
}

impl<K, V> KeyData<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn data(&self) -> &V {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut V {
        &mut self.data
    }

    pub fn into_data(self) -> V {
        self.data
    }
}

/// Entry strategy that only looks at the key.
struct ByKey<H>(PhantomData<H>);

impl<K, V, H: KeyHasher<K>> HashStrategy<KeyData<K, V>> for ByKey<H> {
    fn gen_key(entry: &KeyData<K, V>) -> u32 {
        H::gen_key(&entry.key)
    }

    fn equals(a: &KeyData<K, V>, b: &KeyData<K, V>) -> bool {
        H::equals(&a.key, &b.key)
    }
}

/// Key/data map with unique keys, built on [`Hash`].
///
/// Lookups accept any borrowed form of the key the hasher supports, so a
/// `HashMap<String, V, StrHash>` can be queried with a `&str`.
pub struct HashMap<K, V, H = IdentityHash> {
    entries: Hash<KeyData<K, V>, ByKey<H>>,
}

impl<K, V, H: KeyHasher<K>> HashMap<K, V, H> {
    pub fn new() -> Self {
        Self {
            entries: Hash::new(),
        }
    }

    pub fn with_buckets(buckets: usize) -> Self {
        Self {
            entries: Hash::with_buckets(buckets),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// # Panics
    ///
    /// Panics if the map holds any entry.
    pub fn resize(&mut self, buckets: usize) {
        self.entries.resize(buckets);
    }

    /// Store `data` under `key`, replacing any previous data.
    pub fn insert(&mut self, key: K, data: V) -> &mut V {
        self.entries.insert(KeyData { key, data }).data_mut()
    }

    /// Store `data` under `key` unless the key is present; return the stored data.
    pub fn insert_once(&mut self, key: K, data: V) -> &mut V {
        self.entries.insert_once(KeyData { key, data }).data_mut()
    }

    /// Default data under `key`, replacing any previous data.
    pub fn insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.insert(key, V::default())
    }

    /// Data stored under `key`, inserting the result of `make` first if the key is absent.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let hash = <H as KeyHasher<K>>::gen_key(&key);
        match self
            .entries
            .position_with(hash, |e| <H as KeyHasher<K>>::equals(&e.key, &key))
        {
            Some(pos) => self.entries.buckets[pos.bucket][pos.slot].data_mut(),
            None => self.insert(key, make()),
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized,
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        self.find(key).is_some()
    }

    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        let pos = self.lookup(key)?;
        self.entries.get(pos).map(KeyData::data)
    }

    pub fn find_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        let pos = self.lookup(key)?;
        self.entries.get_mut(pos).map(KeyData::data_mut)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        let pos = self.lookup(key)?;
        Some(self.entries.remove(pos).into_data())
    }

    fn lookup<Q>(&self, key: &Q) -> Option<super::Position>
    where
        Q: ?Sized,
        K: Borrow<Q>,
        H: KeyHasher<Q>,
    {
        self.entries.position_with(<H as KeyHasher<Q>>::gen_key(key), |e| {
            <H as KeyHasher<Q>>::equals(e.key.borrow(), key)
        })
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        self.entries.retain(|e| keep(&e.key, &mut e.data));
    }

    pub fn erase(&mut self) {
        self.entries.erase();
    }

    pub fn reset(&mut self) {
        self.entries.reset();
    }

    pub fn release(&mut self) {
        self.entries.release();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|e| (&e.key, &e.data))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
        self.entries.iter_mut().map(|e| (&e.key, &mut e.data))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(KeyData::key)
    }
}

impl<K, V, H: KeyHasher<K>> Default for HashMap<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone, V: Clone, H> Clone for HashMap<K, V, H> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for HashMap<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.buckets.iter().flatten().map(|e| (&e.key, &e.data)))
            .finish()
    }
}

impl<K, V, H: KeyHasher<K>> FromIterator<(K, V)> for HashMap<K, V, H> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, data) in iter {
            map.insert(key, data);
        }
        map
    }
}
