use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::Ordering;

///
/// Link of a lock-free stack.
///
/// The value slot is only initialized while the node sits on a live stack. Nodes
/// never drop their value, whoever pops the node moves it out.
pub(crate) struct Node<T> {
    pub(crate) value: MaybeUninit<T>,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    #[inline]
    pub(crate) fn new(value: T) -> Self {
        Self {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        }
    }

    #[inline]
    pub(crate) fn vacant() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }
}

unsafe impl<T: Send> Send for Node<T> {}
unsafe impl<T: Send> Sync for Node<T> {}

/// Installs `node` as the new top of `head`, retrying until the CAS lands.
#[inline]
pub(crate) fn push_node<T>(head: &Atomic<Node<T>>, mut node: Owned<Node<T>>, guard: &Guard) {
    loop {
        let top = head.load(Ordering::Relaxed, guard);
        node.next.store(top, Ordering::Relaxed);

        match head.compare_exchange(top, node, Ordering::Release, Ordering::Relaxed, guard) {
            Ok(_) => break,
            Err(e) => node = e.new,
        }
    }
}

/// Unlinks the top of `head`, retrying until the CAS lands. The caller owns the
/// returned node's value and must retire the node through the epoch.
#[inline]
pub(crate) fn pop_node<'g, T>(head: &Atomic<Node<T>>, guard: &'g Guard) -> Option<Shared<'g, Node<T>>> {
    loop {
        let top = head.load(Ordering::Acquire, guard);
        let node = unsafe { top.as_ref() }?;
        let next = node.next.load(Ordering::Relaxed, guard);

        if head
            .compare_exchange(top, next, Ordering::Relaxed, Ordering::Relaxed, guard)
            .is_ok()
        {
            return Some(top);
        }
    }
}

/// Copies the value on top of `head` without unlinking it.
#[inline]
pub(crate) fn peek_node<T: Copy>(head: &Atomic<Node<T>>, guard: &Guard) -> Option<T> {
    let top = head.load(Ordering::Acquire, guard);
    // Safety: the node can't be freed or reissued while we stay pinned.
    unsafe { top.as_ref().map(|n| ptr::read(n.value.as_ptr())) }
}

///
/// Treiber stack.
///
/// Every push allocates a node and every pop retires one. Retired nodes are freed by
/// `crossbeam-epoch` once no pinned thread can still be looking at them.
///
/// [`peek`](Self::peek) is only available for `T: Copy`. A concurrent pop moves the top
/// value out of its node, so any non-`Copy` read of it could race with that move.
pub struct TreiberStack<T> {
    head: Atomic<Node<T>>,
}

impl<T> TreiberStack<T> {
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    ///
    /// Push a value on top of the stack.
    pub fn push(&self, value: T) {
        let guard = epoch::pin();
        push_node(&self.head, Owned::new(Node::new(value)), &guard);
    }

    ///
    /// Pop the top value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        pop_node(&self.head, &guard).map(|top| unsafe {
            let value = ptr::read(top.deref().value.as_ptr());
            guard.defer_destroy(top);
            value
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }
}

impl<T: Copy> TreiberStack<T> {
    ///
    /// Copy of the top value.
    ///
    /// Advisory only: a concurrent pop may already have taken it by the time the
    /// caller looks at the result.
    pub fn peek(&self) -> Option<T> {
        let guard = epoch::pin();
        peek_node(&self.head, &guard)
    }
}

impl<T> Default for TreiberStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for TreiberStack<T> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut cur = self.head.load(Ordering::Relaxed, guard);
            while !cur.is_null() {
                let mut node = cur.into_owned();
                cur = node.next.load(Ordering::Relaxed, guard);
                ptr::drop_in_place(node.value.as_mut_ptr());
            }
        }
    }
}

impl<T> fmt::Debug for TreiberStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreiberStack")
            .field("empty", &self.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod treiber_tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lifo_order() {
        let stack = TreiberStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None::<u32>);

        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.peek(), Some(3));
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.peek(), Some(1));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.peek(), None);
    }

    #[test]
    fn owned_values_survive_the_trip() {
        let stack = TreiberStack::new();
        stack.push(String::from("palisade"));
        stack.push(String::from("palisade"));

        assert_eq!(stack.pop().as_deref(), Some("palisade"));
        assert_eq!(stack.pop().as_deref(), Some("palisade"));
    }

    #[derive(Debug)]
    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn drop_releases_remaining_values_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let stack = TreiberStack::new();
            for _ in 0..10 {
                stack.push(Counted(drops.clone()));
            }
            drop(stack.pop());
            drop(stack.pop());
            assert_eq!(drops.load(Ordering::SeqCst), 2);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn concurrent_push_then_drain() {
        let stack = Arc::new(TreiberStack::new());
        let handles: Vec<_> = (0..8_u64)
            .map(|t| {
                let stack = stack.clone();
                thread::spawn(move || {
                    for i in 0..1_000 {
                        stack.push(t * 1_000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut seen: Vec<u64> = std::iter::from_fn(|| stack.pop()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8_000).collect::<Vec<u64>>());
    }
}
