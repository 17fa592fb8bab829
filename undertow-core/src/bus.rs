//! Single-writer, multi-reader broadcast of values and terminal errors.
//!
//! Every write installs a fresh continuation cell at the tail of a linked
//! chain. Each subscription walks the chain at its own pace, so readers see
//! every value written after they subscribed, in order, with no loss and no
//! replay of earlier values. A terminal error or close is stored in the last
//! cell and observed by every current and future subscription.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

enum Link<T, E> {
    Value(T, Arc<Cell<T, E>>),
    Closed(Option<E>),
}

struct Cell<T, E> {
    slot: Mutex<Option<Link<T, E>>>,
    ready: Notify,
}

impl<T, E> Cell<T, E> {
    fn empty() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            ready: Notify::new(),
        })
    }
}

/// Why a subscription stopped yielding values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvError<E> {
    /// The writer or this subscription was closed without error
    Closed,
    /// The writer broadcast a terminal error
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for RecvError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "event bus closed"),
            Self::Failed(err) => write!(f, "event bus failed: {err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RecvError<E> {}

/// Creates a bus, returning its writer and a cloneable subscription source.
pub fn event_bus<T: Clone, E: Clone>() -> (EventWriter<T, E>, EventBus<T, E>) {
    let tail = Arc::new(Mutex::new(Cell::empty()));
    (
        EventWriter { tail: tail.clone() },
        EventBus { tail },
    )
}

/// Cloneable handle that opens new subscriptions.
pub struct EventBus<T, E> {
    tail: Arc<Mutex<Arc<Cell<T, E>>>>,
}

impl<T, E> Clone for EventBus<T, E> {
    fn clone(&self) -> Self {
        Self {
            tail: self.tail.clone(),
        }
    }
}

impl<T, E> fmt::Debug for EventBus<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl<T: Clone, E: Clone> EventBus<T, E> {
    /// Opens a subscription that sees values written from now on.
    pub fn subscribe(&self) -> Subscription<T, E> {
        Subscription {
            cell: self.tail.lock().clone(),
            closer: SubscriptionCloser {
                inner: Arc::new(CloseFlag {
                    closed: AtomicBool::new(false),
                    notify: Notify::new(),
                }),
            },
        }
    }
}

/// Producer side of the bus.
///
/// Methods take `&self` so the writer can be shared behind an `Arc`; writes
/// are serialized by the tail lock. Dropping the writer closes the bus.
pub struct EventWriter<T, E> {
    tail: Arc<Mutex<Arc<Cell<T, E>>>>,
}

impl<T, E> fmt::Debug for EventWriter<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T, E> EventWriter<T, E> {
    /// Broadcasts a value. Returns false once the bus is closed.
    pub fn write(&self, value: T) -> bool {
        let mut tail = self.tail.lock();
        let next = Cell::empty();
        {
            let mut slot = tail.slot.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(Link::Value(value, next.clone()));
        }
        tail.ready.notify_waiters();
        *tail = next;
        true
    }

    /// Broadcasts a terminal error to every current and future subscription.
    ///
    /// Only the first terminal broadcast takes effect.
    pub fn fail(&self, err: E) -> bool {
        self.terminate(Some(err))
    }

    /// Closes the bus without error.
    pub fn close(&self) -> bool {
        self.terminate(None)
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.tail.lock().slot.lock(), Some(Link::Closed(_)))
    }

    fn terminate(&self, err: Option<E>) -> bool {
        let tail = self.tail.lock();
        {
            let mut slot = tail.slot.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(Link::Closed(err));
        }
        tail.ready.notify_waiters();
        true
    }
}

impl<E> EventWriter<(), E> {
    /// Broadcasts a content-less signal.
    pub fn signal(&self) -> bool {
        self.write(())
    }
}

impl<T, E> Drop for EventWriter<T, E> {
    fn drop(&mut self) {
        self.terminate(None);
    }
}

struct CloseFlag {
    closed: AtomicBool,
    notify: Notify,
}

/// Stops a single subscription without affecting other readers.
#[derive(Clone)]
pub struct SubscriptionCloser {
    inner: Arc<CloseFlag>,
}

impl SubscriptionCloser {
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SubscriptionCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionCloser")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Independent read cursor into the bus.
pub struct Subscription<T, E> {
    cell: Arc<Cell<T, E>>,
    closer: SubscriptionCloser,
}

impl<T, E> fmt::Debug for Subscription<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.closer.is_closed())
            .finish()
    }
}

impl<T: Clone, E: Clone> Subscription<T, E> {
    /// Handle that closes this subscription from another task.
    pub fn closer(&self) -> SubscriptionCloser {
        self.closer.clone()
    }

    /// Closes this subscription.
    pub fn close(&self) {
        self.closer.close();
    }

    /// Returns the next value if one is already available.
    ///
    /// # Errors
    /// - `RecvError::Closed` - Bus or subscription closed
    /// - `RecvError::Failed` - Writer broadcast a terminal error
    pub fn try_recv(&mut self) -> Result<Option<T>, RecvError<E>> {
        if self.closer.is_closed() {
            return Err(RecvError::Closed);
        }

        let (value, next) = {
            let slot = self.cell.slot.lock();
            match &*slot {
                None => return Ok(None),
                Some(Link::Closed(None)) => return Err(RecvError::Closed),
                Some(Link::Closed(Some(err))) => return Err(RecvError::Failed(err.clone())),
                Some(Link::Value(value, next)) => (value.clone(), next.clone()),
            }
        };
        self.cell = next;
        Ok(Some(value))
    }

    /// Waits for the next value.
    ///
    /// Terminal states are sticky: once an error is returned every later
    /// call returns it again.
    ///
    /// # Errors
    /// - `RecvError::Closed` - Bus or subscription closed
    /// - `RecvError::Failed` - Writer broadcast a terminal error
    pub async fn recv(&mut self) -> Result<T, RecvError<E>> {
        loop {
            let cell = self.cell.clone();
            let flag = self.closer.inner.clone();

            let ready = cell.ready.notified();
            let closed = flag.notify.notified();
            tokio::pin!(ready, closed);
            // Register interest before checking so a concurrent write is not missed.
            ready.as_mut().enable();
            closed.as_mut().enable();

            if let Some(value) = self.try_recv()? {
                return Ok(value);
            }

            tokio::select! {
                _ = &mut ready => {}
                _ = &mut closed => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready, assert_ready_eq, task};

    use super::*;

    #[tokio::test]
    async fn test_values_arrive_in_order() {
        let (writer, bus) = event_bus::<u32, String>();
        let mut sub = bus.subscribe();

        for i in 0..5 {
            assert!(writer.write(i));
        }
        for i in 0..5 {
            assert_eq!(sub.recv().await, Ok(i));
        }
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_values() {
        let (writer, bus) = event_bus::<u32, String>();
        let mut early = bus.subscribe();
        writer.write(1);
        let mut late = bus.subscribe();
        writer.write(2);

        assert_eq!(early.recv().await, Ok(1));
        assert_eq!(early.recv().await, Ok(2));
        assert_eq!(late.recv().await, Ok(2));
        assert_eq!(late.try_recv(), Ok(None));
    }

    #[test]
    fn test_recv_wakes_on_write() {
        let (writer, bus) = event_bus::<(), String>();
        let mut sub = bus.subscribe();
        let mut recv = task::spawn(async move { sub.recv().await });

        assert_pending!(recv.poll());
        writer.signal();
        assert!(recv.is_woken());
        assert_ready_eq!(recv.poll(), Ok(()));
    }

    #[test]
    fn test_failure_reaches_all_current_and_future_subscribers() {
        let (writer, bus) = event_bus::<u32, String>();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let mut recv_a = task::spawn(async move { a.recv().await });
        assert_pending!(recv_a.poll());

        writer.write(7);
        assert!(writer.fail("disk full".to_string()));
        assert!(!writer.write(8));
        assert!(!writer.close());

        assert_ready_eq!(recv_a.poll(), Ok(7));
        assert_eq!(b.try_recv(), Ok(Some(7)));
        assert_eq!(b.try_recv(), Err(RecvError::Failed("disk full".to_string())));
        assert_eq!(b.try_recv(), Err(RecvError::Failed("disk full".to_string())));

        let mut late = bus.subscribe();
        assert_eq!(late.try_recv(), Err(RecvError::Failed("disk full".to_string())));
    }

    #[test]
    fn test_closing_one_subscription_leaves_others() {
        let (writer, bus) = event_bus::<u32, String>();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let closer = a.closer();
        let mut recv_a = task::spawn(async move { a.recv().await });
        assert_pending!(recv_a.poll());

        closer.close();
        assert!(recv_a.is_woken());
        assert_ready_eq!(recv_a.poll(), Err(RecvError::Closed));

        writer.write(3);
        assert_eq!(b.try_recv(), Ok(Some(3)));
        assert!(!writer.is_closed());
    }

    #[test]
    fn test_dropping_writer_closes_bus() {
        let (writer, bus) = event_bus::<u32, String>();
        let mut sub = bus.subscribe();
        let mut recv = task::spawn(async move { sub.recv().await });
        assert_pending!(recv.poll());

        drop(writer);
        let result = assert_ready!(recv.poll());
        assert_eq!(result, Err(RecvError::Closed));
    }

    #[tokio::test]
    async fn test_independent_readers_on_separate_tasks() {
        let (writer, bus) = event_bus::<u32, String>();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let mut sub = bus.subscribe();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Ok(value) = sub.recv().await {
                        seen.push(value);
                    }
                    seen
                })
            })
            .collect();

        for i in 0..100 {
            writer.write(i);
            if i % 10 == 0 {
                tokio::task::yield_now().await;
            }
        }
        writer.close();

        for reader in readers {
            assert_eq!(reader.await.unwrap(), (0..100).collect::<Vec<_>>());
        }
    }
}
