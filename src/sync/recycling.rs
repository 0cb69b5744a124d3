use super::treiber::{peek_node, pop_node, push_node, Node};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use log::*;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;

///
/// Counters of a [`NodePool`]. All of them are advisory snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Nodes the pool had to allocate.
    pub allocated: usize,
    /// Pushes served by a pooled node.
    pub reused: usize,
    /// Nodes handed back to the pool after a pop.
    pub recycled: usize,
    /// Nodes currently sitting in the pool.
    pub pooled: usize,
}

///
/// Free list of stack nodes, shareable between any number of [`RecyclingStack`]s.
///
/// Popped nodes only come back here after an epoch grace period, so a node is never
/// reissued while some pinned thread may still hold a pointer to it from the stack it
/// left. Without that, a reissued node landing back on top would let a stale CAS
/// succeed (ABA).
pub struct NodePool<T> {
    free: Atomic<Node<T>>,
    pooled: AtomicIsize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
    recycled: AtomicUsize,
}

impl<T> NodePool<T> {
    pub fn new() -> Self {
        Self {
            free: Atomic::null(),
            pooled: AtomicIsize::new(0),
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            recycled: AtomicUsize::new(0),
        }
    }

    ///
    /// Pool pre-populated with `cap` vacant nodes.
    pub fn with_capacity(cap: usize) -> Self {
        let pool = Self::new();
        let guard = epoch::pin();
        for _ in 0..cap {
            push_node(&pool.free, Owned::new(Node::vacant()), &guard);
        }
        pool.pooled.store(cap as isize, Ordering::Release);
        pool.allocated.store(cap, Ordering::Release);
        pool
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pooled.load(Ordering::Acquire).max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated.load(Ordering::Acquire),
            reused: self.reused.load(Ordering::Acquire),
            recycled: self.recycled.load(Ordering::Acquire),
            pooled: self.len(),
        }
    }

    // Exactly one CAS. Losing the race means the caller allocates instead.
    fn try_take(&self, guard: &Guard) -> Option<Owned<Node<T>>> {
        let top = self.free.load(Ordering::Acquire, guard);
        let node = unsafe { top.as_ref() }?;
        let next = node.next.load(Ordering::Relaxed, guard);

        match self
            .free
            .compare_exchange(top, next, Ordering::Acquire, Ordering::Relaxed, guard)
        {
            Ok(_) => {
                self.pooled.fetch_sub(1, Ordering::AcqRel);
                self.reused.fetch_add(1, Ordering::AcqRel);
                Some(unsafe { top.into_owned() })
            }
            Err(_) => {
                trace!("node_pool::try_take::contended");
                None
            }
        }
    }

    fn node_for(&self, value: T, guard: &Guard) -> Owned<Node<T>> {
        match self.try_take(guard) {
            Some(mut node) => {
                node.value = MaybeUninit::new(value);
                node
            }
            None => {
                debug!("node_pool::node_for::allocated");
                self.allocated.fetch_add(1, Ordering::AcqRel);
                Owned::new(Node::new(value))
            }
        }
    }

    // `node` must not be reachable from any stack anymore and its value slot must be
    // vacated.
    fn put(&self, node: Owned<Node<T>>) {
        let guard = epoch::pin();
        push_node(&self.free, node, &guard);
        self.pooled.fetch_add(1, Ordering::AcqRel);
        self.recycled.fetch_add(1, Ordering::AcqRel);
    }
}

impl<T> Default for NodePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for NodePool<T> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut cur = self.free.load(Ordering::Relaxed, guard);
            while !cur.is_null() {
                let node = cur.into_owned();
                cur = node.next.load(Ordering::Relaxed, guard);
            }
        }
    }
}

impl<T> fmt::Debug for NodePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("stats", &self.stats())
            .finish()
    }
}

///
/// Treiber stack that recycles its nodes through a [`NodePool`].
///
/// A push tries the pool once and allocates a fresh node if it loses the race for the
/// pool's top, so push latency stays bounded at the price of skipping some reuse.
///
/// As with [`TreiberStack`](super::treiber::TreiberStack), [`peek`](Self::peek) needs
/// `T: Copy`.
pub struct RecyclingStack<T: Send + 'static> {
    head: Atomic<Node<T>>,
    pool: Arc<NodePool<T>>,
}

impl<T: Send + 'static> RecyclingStack<T> {
    pub fn new() -> Self {
        Self::with_pool(Arc::new(NodePool::new()))
    }

    ///
    /// Stack drawing nodes from, and returning them to, the given pool.
    pub fn with_pool(pool: Arc<NodePool<T>>) -> Self {
        Self {
            head: Atomic::null(),
            pool,
        }
    }

    #[inline]
    pub fn pool(&self) -> &Arc<NodePool<T>> {
        &self.pool
    }

    ///
    /// Push a value on top of the stack.
    pub fn push(&self, value: T) {
        let guard = epoch::pin();
        let node = self.pool.node_for(value, &guard);
        push_node(&self.head, node, &guard);
    }

    ///
    /// Pop the top value, or `None` if the stack is empty. The node goes back to the
    /// pool once the current epoch has been left by every thread.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        pop_node(&self.head, &guard).map(|top| unsafe {
            let value = ptr::read(top.deref().value.as_ptr());
            let node = top.into_owned();
            let pool = self.pool.clone();
            guard.defer(move || pool.put(node));
            value
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }
}

impl<T: Send + Copy + 'static> RecyclingStack<T> {
    ///
    /// Copy of the top value. Advisory, see [`TreiberStack::peek`](super::treiber::TreiberStack::peek).
    pub fn peek(&self) -> Option<T> {
        let guard = epoch::pin();
        peek_node(&self.head, &guard)
    }
}

impl<T: Send + 'static> Default for RecyclingStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for RecyclingStack<T> {
    fn drop(&mut self) {
        // A thread racing in `try_take` on the shared pool may still see these nodes,
        // so they go back through the epoch like popped ones.
        let guard = epoch::pin();
        let mut cur = self.head.swap(epoch::Shared::null(), Ordering::Relaxed, &guard);
        while !cur.is_null() {
            unsafe {
                let mut node = cur.into_owned();
                cur = node.next.load(Ordering::Relaxed, &guard);
                ptr::drop_in_place(node.value.as_mut_ptr());
                let pool = self.pool.clone();
                guard.defer(move || pool.put(node));
            }
        }
    }
}

impl<T: Send + 'static> fmt::Debug for RecyclingStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecyclingStack")
            .field("empty", &self.is_empty())
            .field("pool", &self.pool)
            .finish()
    }
}
