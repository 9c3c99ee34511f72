// the single-value channel.

use super::{
    api::Channel,
    callback::{CallbackId, Claim, Listener, OnClosed, Receiver},
    error::{ClosedError, SealedError},
};
use std::{
    fmt::{self, Formatter, Debug},
    mem::take,
    sync::{
        atomic::{
            Ordering::{Acquire, Release},
            AtomicBool,
        },
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};


/// Create a constant channel
///
/// Shorthand for [`ConstantChannel::new`].
pub fn constant_channel<T>() -> ConstantChannel<T>
where
    T: Clone + Send + 'static,
{
    ConstantChannel::new()
}

/// Channel which holds at most one message, ever
///
/// The first enqueue completes the channel, and every later enqueue fails. Callbacks registered
/// before completion are invoked once when the value arrives. Callbacks registered after
/// completion are invoked immediately with the value, and are not retained. The value is never
/// consumed: every subscriber sees it, which is why a constant channel never reports itself
/// closed.
///
/// This is a cheap handle: clones refer to the same channel.
pub struct ConstantChannel<T>(Arc<Shared<T>>);

struct Shared<T> {
    lockable: Mutex<Lockable<T>>,
    // set once, together with Lockable.result.
    complete: AtomicBool,
}

struct Lockable<T> {
    result: Option<T>,
    // registrations waiting for the value. permanent and one-shot are the same thing here.
    listeners: Vec<Listener<T>>,
    receivers: Vec<Receiver<T>>,
}

impl<T> ConstantChannel<T>
where
    T: Clone + Send + 'static,
{
    /// Construct an incomplete constant channel
    pub fn new() -> Self {
        ConstantChannel(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                result: None,
                listeners: Vec::new(),
                receivers: Vec::new(),
            }),
            complete: AtomicBool::new(false),
        }))
    }

    /// Construct an already completed constant channel
    pub fn completed(value: T) -> Self {
        let ch = Self::new();
        ch.lock().result = Some(value);
        ch.0.complete.store(true, Release);
        ch
    }

    /// The value, if completed
    pub fn value(&self) -> Option<T> {
        if !self.is_complete() {
            return None;
        }
        self.lock().result.clone()
    }

    /// Whether the value has been set
    pub fn is_complete(&self) -> bool {
        self.0.complete.load(Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Lockable<T>> {
        self.0.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_listener(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        let mut lock = self.lock();
        match lock.result.clone() {
            Some(value) => {
                drop(lock);
                offer(&listener, value);
            }
            None => lock.listeners.push(listener),
        }
        Ok(())
    }

    fn add_receiver(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        let mut lock = self.lock();
        match lock.result.clone() {
            Some(value) => {
                drop(lock);
                receiver.deliver(value);
            }
            None => lock.receivers.push(receiver),
        }
        Ok(())
    }
}

// two-phase delivery to a listener.
fn offer<T>(listener: &Listener<T>, value: T) {
    if let Claim::Consume(consumer) = listener.offer(&value) {
        consumer(value);
    }
}

impl<T> Channel<T> for ConstantChannel<T>
where
    T: Clone + Send + 'static,
{
    fn listen(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        self.add_listener(listener)
    }

    fn listen_all(&self, listener: Listener<T>) -> Result<(), ClosedError> {
        self.add_listener(listener)
    }

    fn receive(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        self.add_receiver(receiver)
    }

    fn receive_all(&self, receiver: Receiver<T>) -> Result<(), ClosedError> {
        self.add_receiver(receiver)
    }

    fn cancel_callback(&self, id: CallbackId) {
        let mut lock = self.lock();
        lock.listeners.retain(|f| f.id() != id);
        lock.receivers.retain(|f| f.id() != id);
    }

    fn enqueue(&self, msg: T) -> Result<(), SealedError<T>> {
        let mut lock = self.lock();
        if lock.result.is_some() {
            return Err(SealedError(msg));
        }
        lock.result = Some(msg.clone());
        self.0.complete.store(true, Release);
        let listeners = take(&mut lock.listeners);
        let receivers = take(&mut lock.receivers);
        drop(lock);

        trace!(
            listeners = listeners.len(),
            receivers = receivers.len(),
            "constant channel completed"
        );
        for listener in &listeners {
            offer(listener, msg.clone());
        }
        for receiver in &receivers {
            receiver.deliver(msg.clone());
        }
        Ok(())
    }

    fn enqueue_and_close(&self, msg: T) -> Result<(), SealedError<T>> {
        self.enqueue(msg)
    }

    fn close(&self) {}

    fn is_sealed(&self) -> bool {
        self.is_complete()
    }

    fn is_closed(&self) -> bool {
        false
    }

    // never closes, so the callback can never fire.
    fn on_closed(&self, _: OnClosed) {}
}

impl<T> Clone for ConstantChannel<T> {
    fn clone(&self) -> Self {
        ConstantChannel(Arc::clone(&self.0))
    }
}

impl<T> Default for ConstantChannel<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for ConstantChannel<T>
where
    T: Clone + Send + Debug + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let lock = self.lock();
        f.debug_struct("ConstantChannel")
            .field("result", &lock.result)
            .field("callbacks", &(lock.listeners.len() + lock.receivers.len()))
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Receiver<T>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_2 = Arc::clone(&log);
        (log, Receiver::new(move |msg| log_2.lock().unwrap().push(msg)))
    }

    #[test]
    fn single_write() {
        let ch = constant_channel();
        assert!(!ch.is_sealed());
        assert_eq!(ch.value(), None);
        ch.enqueue(1).unwrap();
        assert_eq!(ch.enqueue(2), Err(SealedError(2)));
        assert_eq!(ch.enqueue_and_close(3), Err(SealedError(3)));
        assert!(ch.is_sealed());
        assert!(!ch.is_closed());
        assert_eq!(ch.value(), Some(1));
    }

    #[test]
    fn early_and_late_subscribers_see_value_once() {
        let ch = constant_channel();
        let (early, early_receiver) = collector();
        ch.receive_all(early_receiver).unwrap();
        ch.enqueue("v").unwrap();

        let (late, late_receiver) = collector();
        ch.receive(late_receiver).unwrap();
        ch.receive_all(Receiver::new(|_| ())).unwrap();

        assert_eq!(*early.lock().unwrap(), vec!["v"]);
        assert_eq!(*late.lock().unwrap(), vec!["v"]);
    }

    #[test]
    fn listener_two_phase() {
        let ch = constant_channel::<u32>();
        let claimed = Arc::new(Mutex::new(Vec::new()));

        let claimed_2 = Arc::clone(&claimed);
        ch.listen(Listener::new(move |_| {
            let claimed = Arc::clone(&claimed_2);
            Claim::consume(move |n| claimed.lock().unwrap().push(n))
        })).unwrap();
        ch.listen(Listener::new(|_| Claim::Decline)).unwrap();
        ch.enqueue(5).unwrap();
        assert_eq!(*claimed.lock().unwrap(), vec![5]);

        // the value isn't consumed by being claimed
        let claimed_3 = Arc::clone(&claimed);
        ch.listen(Listener::new(move |_| {
            let claimed = Arc::clone(&claimed_3);
            Claim::consume(move |n| claimed.lock().unwrap().push(n + 1))
        })).unwrap();
        assert_eq!(*claimed.lock().unwrap(), vec![5, 6]);
    }

    #[test]
    fn cancel_before_completion() {
        let ch = constant_channel();
        let (log, receiver) = collector();
        let id = receiver.id();
        ch.receive(receiver).unwrap();
        ch.cancel_callback(id);
        ch.enqueue(1).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn completed_constructor() {
        let ch = ConstantChannel::completed(9);
        assert!(ch.is_sealed());
        let (log, receiver) = collector();
        ch.receive(receiver).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![9]);
    }
}
