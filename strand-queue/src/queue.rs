//! Michael-Scott two-pointer queue.
//!
//! The queue always holds a sentinel node at `head`. Real elements live
//! strictly after it, and popping an element turns its node into the next
//! sentinel. `tail` may lag one node behind the true last node; whichever
//! thread notices the lag swings it forward.

use std::fmt;
use std::iter::FusedIterator;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicIsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};
use tracing::{debug, trace};

struct Node<T> {
    /// Uninitialised for the sentinel created by `new`. For a node that has
    /// been popped, the value has already been moved out.
    data: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Owned<Self> {
        Owned::new(Self {
            data: MaybeUninit::uninit(),
            next: Atomic::null(),
        })
    }

    fn with(data: T) -> Owned<Self> {
        Owned::new(Self {
            data: MaybeUninit::new(data),
            next: Atomic::null(),
        })
    }
}

/// An unbounded multi-producer multi-consumer FIFO queue.
///
/// No operation takes a lock. Contending threads retry their CAS loop and
/// help each other along, so the queue is lock-free but not wait-free.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use strand_queue::LockFreeQueue;
///
/// let q = Arc::new(LockFreeQueue::new());
/// let producer = {
///     let q = q.clone();
///     thread::spawn(move || {
///         for i in 0..100 {
///             q.push(i);
///         }
///     })
/// };
/// producer.join().unwrap();
///
/// let drained: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
/// assert_eq!(drained, (0..100).collect::<Vec<_>>());
/// ```
pub struct LockFreeQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
    len: CachePadded<AtomicIsize>,
}

// SAFETY: elements are moved in by `push` and moved out by exactly one `pop`,
// so sharing the queue only ever transfers `T` between threads.
unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LockFreeQueue<T> {
    /// Creates an empty queue holding only its sentinel.
    pub fn new() -> LockFreeQueue<T> {
        let q = LockFreeQueue {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
            len: CachePadded::new(AtomicIsize::new(0)),
        };

        // SAFETY: nobody else can observe `q` yet.
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = Node::sentinel().into_shared(guard);
            q.head.store(sentinel, Ordering::Relaxed);
            q.tail.store(sentinel, Ordering::Relaxed);
        }

        q
    }

    /// Best-effort number of elements.
    ///
    /// The counter is updated right after the structural CAS, so under
    /// concurrent pushes and pops it can briefly disagree with the list.
    /// It is exact once the queue is quiescent.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed).max(0) as usize
    }

    /// Returns `true` if no element is linked after the sentinel.
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: head is never null and is protected by the guard.
        unsafe { head.deref() }
            .next
            .load(Ordering::Acquire, guard)
            .is_null()
    }

    /// Appends `data` at the tail.
    ///
    /// The element is reachable from `head` before this returns.
    pub fn push(&self, data: T) {
        let guard = &epoch::pin();
        let node = Node::with(data).into_shared(guard);
        self.push_node(node, guard);
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    fn push_node<'g>(&self, node: Shared<'g, Node<T>>, guard: &'g Guard) {
        let backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: tail is never null, and nodes reachable from tail are not
            // reclaimed while we are pinned.
            let t = unsafe { tail.deref() };
            let next = t.next.load(Ordering::Acquire, guard);

            if tail != self.tail.load(Ordering::Acquire, guard) {
                backoff.spin();
                continue;
            }

            if next.is_null() {
                if t
                    .next
                    .compare_exchange(
                        Shared::null(),
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                        guard,
                    )
                    .is_ok()
                {
                    // Another thread may beat us to it, which is fine.
                    let _ = self.tail.compare_exchange(
                        tail,
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                        guard,
                    );
                    return;
                }
            } else {
                trace!("push: tail lagging, helping it forward");
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
            }

            backoff.spin();
        }
    }

    /// Removes the oldest element, or returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = &epoch::pin();
        let data = self.pop_node(guard)?;
        self.len.fetch_sub(1, Ordering::Relaxed);
        Some(data)
    }

    fn pop_node(&self, guard: &Guard) -> Option<T> {
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: head is never null and protected by the guard.
            let h = unsafe { head.deref() };
            let next = h.next.load(Ordering::Acquire, guard);

            if head != self.head.load(Ordering::Acquire, guard) {
                backoff.spin();
                continue;
            }

            if head == tail {
                if next.is_null() {
                    return None;
                }
                // A push linked its node but has not swung tail yet.
                trace!("pop: tail lagging, helping it forward");
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    guard,
                );
            } else {
                // SAFETY: head != tail, so a real node follows head.
                let n = match unsafe { next.as_ref() } {
                    Some(n) => n,
                    None => continue,
                };

                if self
                    .head
                    .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, guard)
                    .is_ok()
                {
                    // SAFETY: winning the head CAS grants us exclusive ownership
                    // of `n.data`; the node stays allocated as the new sentinel
                    // and its data is never read again except through `peek`,
                    // which requires `T: Copy`.
                    let data = unsafe { ptr::read(n.data.as_ptr()) };
                    // SAFETY: the old sentinel is unlinked, tail has moved past
                    // it, and it is destroyed only after every pinned thread
                    // has moved on.
                    unsafe { guard.defer_destroy(head) };
                    return Some(data);
                }
            }

            backoff.spin();
        }
    }

    /// Returns a copy of the oldest element without removing it.
    ///
    /// This is an advisory read: a concurrent `pop` may remove the element
    /// before the caller looks at the result.
    ///
    /// Only available for `T: Copy`. A concurrent `pop` moves the element out
    /// of its node and may drop it while `peek` is still reading, so cloning
    /// a value that owns heap memory could observe it after it was freed.
    /// Plain `Copy` data stays valid for as long as the node is pinned.
    ///
    /// ```compile_fail
    /// use strand_queue::LockFreeQueue;
    ///
    /// let q = LockFreeQueue::new();
    /// q.push(String::from("owned"));
    /// let _ = q.peek();
    /// ```
    pub fn peek(&self) -> Option<T>
    where
        T: Copy,
    {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: head is never null and protected by the guard.
        let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);

        // SAFETY: a node after the sentinel has initialised data. A concurrent
        // pop may move the same bits out, which is harmless for `Copy` data,
        // and the node itself stays alive while we are pinned.
        unsafe { next.as_ref() }.map(|n| unsafe { n.data.assume_init_read() })
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out any concurrent access, so the
        // unprotected guard frees unlinked nodes immediately.
        unsafe {
            let guard = epoch::unprotected();

            let mut drained = 0usize;
            while let Some(data) = self.pop_node(guard) {
                drop(data);
                drained += 1;
            }
            if drained > 0 {
                debug!(drained, "dropped queue with pending elements");
            }

            let sentinel = self.head.load(Ordering::Relaxed, guard);
            drop(sentinel.into_owned());
        }
    }
}

impl<T> Extend<T> for LockFreeQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for data in iter {
            self.push(data);
        }
    }
}

impl<T> FromIterator<T> for LockFreeQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut q = LockFreeQueue::new();
        q.extend(iter);
        q
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Owning iterator over the elements of a [`LockFreeQueue`], oldest first.
pub struct IntoIter<T> {
    queue: LockFreeQueue<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.pop()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.queue.len();
        (len, Some(len))
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {}

impl<T> FusedIterator for IntoIter<T> {}

impl<T> IntoIterator for LockFreeQueue<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { queue: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tail_is_last<T>(q: &LockFreeQueue<T>) -> bool {
        let guard = &epoch::pin();
        let tail = q.tail.load(Ordering::Acquire, guard);
        unsafe { tail.deref() }
            .next
            .load(Ordering::Acquire, guard)
            .is_null()
    }

    #[test]
    fn sentinel_is_head_and_tail() {
        let q: LockFreeQueue<u8> = LockFreeQueue::new();
        let guard = &epoch::pin();
        let head = q.head.load(Ordering::Acquire, guard);
        let tail = q.tail.load(Ordering::Acquire, guard);
        assert!(!head.is_null());
        assert_eq!(head, tail);
        assert!(q.is_empty());
    }

    #[test]
    fn tail_settles_on_last_node() {
        let q = LockFreeQueue::new();
        for i in 0..10 {
            q.push(i);
            assert!(tail_is_last(&q));
        }
        for _ in 0..10 {
            q.pop();
        }
        assert!(tail_is_last(&q));

        let guard = &epoch::pin();
        assert_eq!(
            q.head.load(Ordering::Acquire, guard),
            q.tail.load(Ordering::Acquire, guard)
        );
    }

    #[test]
    fn popped_node_becomes_sentinel() {
        let q = LockFreeQueue::new();
        q.push(1);
        q.push(2);

        let first = {
            let guard = &epoch::pin();
            let head = q.head.load(Ordering::Acquire, guard);
            unsafe { head.deref() }.next.load(Ordering::Acquire, guard).as_raw()
        };

        assert_eq!(q.pop(), Some(1));

        let guard = &epoch::pin();
        assert_eq!(q.head.load(Ordering::Acquire, guard).as_raw(), first);
    }

    #[test]
    fn len_counter_tracks_push_and_pop() {
        let q = LockFreeQueue::new();
        q.push("a");
        q.push("b");
        assert_eq!(q.len.load(Ordering::Relaxed), 2);
        q.pop();
        assert_eq!(q.len.load(Ordering::Relaxed), 1);
        q.pop();
        q.pop();
        assert_eq!(q.len.load(Ordering::Relaxed), 0);
    }
}
