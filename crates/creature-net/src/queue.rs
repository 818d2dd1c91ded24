// ── Async blocking queue ──
//
// Unbounded FIFO used to stream server-originated records (log lines,
// counters) to consumers without polling. Consumers suspend in `dequeue`
// until an element arrives or the queue is cancelled.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// Unbounded multi-consumer FIFO with suspend-until-available dequeue.
///
/// All operations run inside one critical section. Suspended consumers are
/// served strictly in the order they started waiting. [`cancel`](Self::cancel)
/// is permanent: pending and future `dequeue` calls yield `None`, and
/// `enqueue` becomes a no-op.
///
/// Dropping a pending `dequeue` future forfeits its place in line; an
/// element already handed to that waiter is lost with it.
pub struct AsyncBlockingQueue<T> {
    inner: Mutex<QueueInner<T>>,
}

struct QueueInner<T> {
    buffer: VecDeque<T>,
    waiters: VecDeque<oneshot::Sender<Option<T>>>,
    cancelled: bool,
}

impl<T> AsyncBlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                buffer: VecDeque::new(),
                waiters: VecDeque::new(),
                cancelled: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand `item` to the oldest waiter, or buffer it if nobody is waiting.
    pub fn enqueue(&self, item: T) {
        let mut inner = self.lock();
        if inner.cancelled {
            return;
        }

        let mut item = item;
        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(Some(item)) {
                // Waiter went away before being served; try the next one.
                Err(Some(returned)) => item = returned,
                Ok(()) | Err(None) => return,
            }
        }
        inner.buffer.push_back(item);
    }

    /// Take the oldest element, suspending until one is available.
    ///
    /// Returns `None` once the queue has been cancelled and drained.
    pub async fn dequeue(&self) -> Option<T> {
        let rx = {
            let mut inner = self.lock();
            if let Some(item) = inner.buffer.pop_front() {
                return Some(item);
            }
            if inner.cancelled {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };

        rx.await.ok().flatten()
    }

    /// Non-suspending variant of [`dequeue`](Self::dequeue).
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().buffer.pop_front()
    }

    /// Permanently cancel the queue and release every suspended consumer.
    pub fn cancel(&self) {
        let waiters = {
            let mut inner = self.lock();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            std::mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(None);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Number of buffered (not yet consumed) elements.
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of consumers currently suspended in `dequeue`.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.iter().filter(|w| !w.is_closed()).count()
    }
}

impl<T> Default for AsyncBlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for AsyncBlockingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("AsyncBlockingQueue")
            .field("buffered", &inner.buffer.len())
            .field("waiters", &inner.waiters.len())
            .field("cancelled", &inner.cancelled)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[tokio::test]
    async fn buffered_items_come_out_in_order() {
        let queue = AsyncBlockingQueue::new();
        for i in 0..5 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            assert_eq!(queue.dequeue().await, Some(i));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn dequeue_suspends_until_enqueue() {
        let queue = AsyncBlockingQueue::new();
        let mut pending = task::spawn(queue.dequeue());

        assert_pending!(pending.poll());
        queue.enqueue("hello");
        assert!(pending.is_woken());
        assert_ready_eq!(pending.poll(), Some("hello"));
        assert!(queue.is_empty());
    }

    #[test]
    fn waiters_are_served_in_arrival_order() {
        let queue = AsyncBlockingQueue::new();
        let mut first = task::spawn(queue.dequeue());
        let mut second = task::spawn(queue.dequeue());

        assert_pending!(first.poll());
        assert_pending!(second.poll());
        assert_eq!(queue.waiting(), 2);

        queue.enqueue(1);
        queue.enqueue(2);

        assert_ready_eq!(second.poll(), Some(2));
        assert_ready_eq!(first.poll(), Some(1));
    }

    #[test]
    fn abandoned_waiter_does_not_swallow_items() {
        let queue = AsyncBlockingQueue::new();
        let mut abandoned = task::spawn(queue.dequeue());
        assert_pending!(abandoned.poll());
        drop(abandoned);

        let mut live = task::spawn(queue.dequeue());
        assert_pending!(live.poll());

        queue.enqueue(99);
        assert_ready_eq!(live.poll(), Some(99));
    }

    #[test]
    fn cancel_releases_all_waiters() {
        let queue = AsyncBlockingQueue::<u32>::new();
        let mut a = task::spawn(queue.dequeue());
        let mut b = task::spawn(queue.dequeue());
        assert_pending!(a.poll());
        assert_pending!(b.poll());

        queue.cancel();

        assert_ready_eq!(a.poll(), None);
        assert_ready_eq!(b.poll(), None);
    }

    #[test]
    fn cancelled_queue_is_terminal() {
        let queue = AsyncBlockingQueue::new();
        queue.cancel();
        queue.cancel();
        queue.enqueue(5);

        assert!(queue.is_cancelled());
        assert!(queue.is_empty());
        let mut after = task::spawn(queue.dequeue());
        assert_ready_eq!(after.poll(), None);
    }

    #[test]
    fn buffered_items_drain_after_cancel() {
        let queue = AsyncBlockingQueue::new();
        queue.enqueue('a');
        queue.cancel();

        let mut first = task::spawn(queue.dequeue());
        assert_ready_eq!(first.poll(), Some('a'));
        let mut second = task::spawn(queue.dequeue());
        assert_ready_eq!(second.poll(), None);
    }

    #[tokio::test]
    async fn cross_task_delivery() {
        let queue = std::sync::Arc::new(AsyncBlockingQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(v) = queue.dequeue().await {
                    seen.push(v);
                }
                seen
            })
        };

        for i in 0..100 {
            queue.enqueue(i);
            tokio::task::yield_now().await;
        }
        queue.cancel();

        let seen = consumer.await.unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}
