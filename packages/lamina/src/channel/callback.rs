// callback types which can be registered on channels.

use std::{
    fmt::{self, Formatter, Debug},
    sync::{
        atomic::{
            Ordering::Relaxed,
            AtomicU64,
        },
        Arc,
    },
};


/// Identity of a registered callback, used to cancel it
///
/// Ids are unique within the process. Every [`Listener`], [`Receiver`] and [`OnClosed`] has one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Allocate a fresh, never before used id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        CallbackId(NEXT.fetch_add(1, Relaxed))
    }
}


/// Consumer function returned by an advisory callback to claim a message
pub type Consumer<T> = Box<dyn FnOnce(T) + Send>;

/// Result of offering a message to a [`Listener`]
pub enum Claim<T> {
    /// The listener has no interest in this message, so it stays buffered unless another listener
    /// claims it
    Decline,
    /// The listener claims this message: it is removed from the channel and the consumer is
    /// invoked with it once the transition commits
    Consume(Consumer<T>),
}

impl<T> Claim<T> {
    /// Claim the message with the given consumer
    pub fn consume<F>(f: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Claim::Consume(Box::new(f))
    }

    /// Whether this is a claim
    pub fn is_consume(&self) -> bool {
        matches!(self, Claim::Consume(_))
    }
}

impl<T> Debug for Claim<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Claim::Decline => f.write_str("Decline"),
            Claim::Consume(_) => f.write_str("Consume(..)"),
        }
    }
}


/// Advisory callback, registered with `listen` or `listen_all`
///
/// A listener is offered candidate messages and decides whether to claim them by returning
/// [`Claim::Consume`]. Offers happen while the offering channel's state is held, so the callback
/// must not itself operate on that channel; anything which needs to do so belongs in the returned
/// consumer, which runs after the state is released.
///
/// Cloning a listener keeps its id.
pub struct Listener<T> {
    id: CallbackId,
    f: Arc<dyn Fn(&T) -> Claim<T> + Send + Sync>,
}

impl<T> Listener<T> {
    /// Construct with a fresh id
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T) -> Claim<T> + Send + Sync + 'static,
    {
        Self::with_id(CallbackId::next(), f)
    }

    /// Construct with a given id
    ///
    /// Useful for a callback which needs to know its own id, for example to cancel itself.
    pub fn with_id<F>(id: CallbackId, f: F) -> Self
    where
        F: Fn(&T) -> Claim<T> + Send + Sync + 'static,
    {
        Listener { id, f: Arc::new(f) }
    }

    /// This listener's id
    pub fn id(&self) -> CallbackId {
        self.id
    }

    // offer a message.
    pub(crate) fn offer(&self, msg: &T) -> Claim<T> {
        (self.f)(msg)
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Listener { id: self.id, f: Arc::clone(&self.f) }
    }
}

impl<T> Debug for Listener<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("Listener").field(&self.id).finish()
    }
}


/// Guaranteed callback, registered with `receive` or `receive_all`
///
/// Once a message has been assigned to a receiver, the receiver is always invoked with it. It is
/// invoked after the transition which assigned the message commits, so it may freely operate on
/// any channel.
///
/// Cloning a receiver keeps its id.
pub struct Receiver<T> {
    id: CallbackId,
    f: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T> Receiver<T> {
    /// Construct with a fresh id
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::with_id(CallbackId::next(), f)
    }

    /// Construct with a given id
    ///
    /// Useful for a callback which needs to know its own id, for example to cancel itself.
    pub fn with_id<F>(id: CallbackId, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Receiver { id, f: Arc::new(f) }
    }

    /// This receiver's id
    pub fn id(&self) -> CallbackId {
        self.id
    }

    // deliver a message.
    pub(crate) fn deliver(&self, msg: T) {
        (self.f)(msg)
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver { id: self.id, f: Arc::clone(&self.f) }
    }
}

impl<T> Debug for Receiver<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("Receiver").field(&self.id).finish()
    }
}


/// Callback invoked once when a channel becomes closed
pub struct OnClosed {
    id: CallbackId,
    f: Box<dyn FnOnce() + Send>,
}

impl OnClosed {
    /// Construct with a fresh id
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_id(CallbackId::next(), f)
    }

    /// Construct with a given id
    pub fn with_id<F>(id: CallbackId, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        OnClosed { id, f: Box::new(f) }
    }

    /// This callback's id
    pub fn id(&self) -> CallbackId {
        self.id
    }

    // invoke the callback, consuming it.
    pub(crate) fn fire(self) {
        (self.f)()
    }
}

impl Debug for OnClosed {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("OnClosed").field(&self.id).finish()
    }
}
