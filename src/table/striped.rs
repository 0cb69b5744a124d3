use crate::sync::rwlock::RwLock;

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::vec;

const DEFAULT_STRIPES: usize = 16;

type Stripe<K, V> = RwLock<HashMap<K, V>>;

///
/// Hash map sharded into a fixed number of stripes, each an independent `HashMap`
/// behind its own fair [`RwLock`].
///
/// Single-key operations lock only the stripe the key routes to, so operations on
/// keys living in different stripes never wait on each other.
///
/// Whole-map operations ([`len`](Self::len), [`clear`](Self::clear),
/// [`retain`](Self::retain), [`iter`](Self::iter), ...) visit the stripes one after
/// another and hold at most one stripe lock at a time. They are **not** atomic across
/// the map: their result is stitched together from per-stripe views taken at
/// different instants while writers keep going.
pub struct StripedMap<K, V, S = RandomState> {
    stripes: Vec<Stripe<K, V>>,
    hash_builder: S,
}

impl<K, V> StripedMap<K, V, RandomState>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub fn with_stripes(stripes: usize) -> Self {
        Self::with_stripes_and_hasher(stripes, RandomState::new())
    }

    ///
    /// Map whose stripes start out as the maps built by `factory`,
    /// e.g. `|| HashMap::with_capacity(64)`.
    pub fn with_factory<F>(stripes: usize, factory: F) -> Self
    where
        F: FnMut() -> HashMap<K, V>,
    {
        Self::with_factory_and_hasher(stripes, RandomState::new(), factory)
    }
}

impl<K, V, S> StripedMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Zero stripes are treated as one.
    pub fn with_stripes_and_hasher(stripes: usize, hasher: S) -> Self {
        Self::with_factory_and_hasher(stripes, hasher, HashMap::new)
    }

    pub fn with_factory_and_hasher<F>(stripes: usize, hasher: S, mut factory: F) -> Self
    where
        F: FnMut() -> HashMap<K, V>,
    {
        Self {
            stripes: (0..stripes.max(1))
                .map(|_| RwLock::new(factory()))
                .collect(),
            hash_builder: hasher,
        }
    }

    #[inline]
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    ///
    /// Index of the stripe `key` routes to. Pure function of the key's hash.
    #[inline]
    pub fn stripe_of<Q: ?Sized>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish() as usize % self.stripes.len()
    }

    #[inline]
    fn seek_stripe<Q: ?Sized>(&self, key: &Q) -> &Stripe<K, V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        &self.stripes[self.stripe_of(key)]
    }

    /// Entries in stripe `idx`, or `None` if there is no such stripe.
    pub fn stripe_len(&self, idx: usize) -> Option<usize> {
        self.stripes.get(idx).map(|s| s.read().len())
    }

    #[inline]
    pub fn insert(&self, k: K, v: V) -> Option<V> {
        self.seek_stripe(&k).write().insert(k, v)
    }

    #[inline]
    pub fn remove<Q: ?Sized>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.seek_stripe(k).write().remove(k)
    }

    #[inline]
    pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        V: Clone,
    {
        self.seek_stripe(k).read().get(k).cloned()
    }

    ///
    /// Runs `f` on the value of `k` under the stripe's read lock.
    #[inline]
    pub fn get_with<Q: ?Sized, R, F>(&self, k: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
        F: FnOnce(&V) -> R,
    {
        self.seek_stripe(k).read().get(k).map(f)
    }

    #[inline]
    pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        self.seek_stripe(k).read().contains_key(k)
    }

    ///
    /// Atomically replaces the value of `k` with `f(current)`, removing the entry when
    /// `f` returns `None`. Runs under the stripe's write lock and returns the previous
    /// value.
    pub fn compute<F>(&self, k: K, f: F) -> Option<V>
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let mut stripe = self.seek_stripe(&k).write();
        let previous = stripe.remove(&k);
        if let Some(next) = f(previous.as_ref()) {
            stripe.insert(k, next);
        }
        previous
    }

    ///
    /// Value of `k`, inserting `f()` first if the key is absent.
    pub fn get_or_insert_with<F>(&self, k: K, f: F) -> V
    where
        V: Clone,
        F: FnOnce() -> V,
    {
        let stripe = self.seek_stripe(&k);
        if let Some(v) = stripe.read().get(&k) {
            return v.clone();
        }
        stripe.write().entry(k).or_insert_with(f).clone()
    }

    ///
    /// Sum of the stripe sizes, each read at a different instant.
    pub fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stripes.iter().all(|s| s.read().is_empty())
    }

    ///
    /// Empties the stripes one by one. Entries inserted into an already cleared stripe
    /// while this runs survive.
    pub fn clear(&self) {
        self.stripes.iter().for_each(|s| s.write().clear());
    }

    ///
    /// Keeps only the entries for which `f` returns true, one stripe at a time.
    pub fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        for s in self.stripes.iter() {
            s.write().retain(|k, v| f(k, v));
        }
    }

    ///
    /// Weakly consistent iterator over cloned entries.
    ///
    /// The key set of a stripe is snapshotted under a short read lock when the iterator
    /// reaches that stripe, and every step takes the read lock again to fetch the key's
    /// current value. So, relative to writers running meanwhile:
    ///
    /// * a key removed after its stripe was snapshotted is skipped,
    /// * a key inserted into an already snapshotted stripe is not seen,
    /// * a key inserted into a stripe not reached yet is seen,
    /// * a value is the one present at the step that yielded it,
    /// * no key is yielded twice, and no key is yielded that was never in the map.
    pub fn iter(&self) -> Iter<'_, K, V, S>
    where
        K: Clone,
        V: Clone,
    {
        Iter {
            map: self,
            next_stripe: 0,
            current: 0,
            keys: Vec::new().into_iter(),
        }
    }

    pub fn keys<'table>(&'table self) -> impl Iterator<Item = K> + 'table
    where
        K: Clone,
        V: Clone,
    {
        self.iter().map(|(k, _)| k)
    }

    pub fn values<'table>(&'table self) -> impl Iterator<Item = V> + 'table
    where
        K: Clone,
        V: Clone,
    {
        self.iter().map(|(_, v)| v)
    }

    ///
    /// Calls `f` for each entry. No lock is held while `f` runs.
    pub fn for_each<F>(&self, mut f: F)
    where
        K: Clone,
        V: Clone,
        F: FnMut(&K, &V),
    {
        self.iter().for_each(|(k, v)| f(&k, &v));
    }
}

impl<K, V> Default for StripedMap<K, V, RandomState>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> fmt::Debug for StripedMap<K, V, S>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

///
/// Iterator returned by [`StripedMap::iter`].
pub struct Iter<'a, K, V, S> {
    map: &'a StripedMap<K, V, S>,
    next_stripe: usize,
    current: usize,
    keys: vec::IntoIter<K>,
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        loop {
            let stripe = &self.map.stripes[self.current];
            for k in &mut self.keys {
                let value = stripe.read().get(&k).cloned();
                if let Some(v) = value {
                    return Some((k, v));
                }
            }

            if self.next_stripe >= self.map.stripes.len() {
                return None;
            }
            self.current = self.next_stripe;
            self.next_stripe += 1;
            self.keys = self.map.stripes[self.current]
                .read()
                .keys()
                .cloned()
                .collect::<Vec<K>>()
                .into_iter();
        }
    }
}
