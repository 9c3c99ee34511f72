// channel error types.

use thiserror::Error;


// ==== base error types ====


/// Error for trying to enqueue into a channel which no longer accepts messages
///
/// This is returned for channels which have been sealed, for constant channels which have already
/// been completed, and for closed channels. The rejected message is handed back.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("channel sealed")]
pub struct SealedError<T>(pub T);

impl<T> SealedError<T> {
    /// Take back the message which could not be enqueued
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Error for trying to register a callback on a channel which is closed
///
/// A closed channel is sealed and fully drained, so no callback registered on it could ever be
/// invoked.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("channel closed")]
pub struct ClosedError;

/// Error for waiting on a channel and the deadline passing before any message arrived
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
#[error("timed out waiting for message")]
pub struct TimeoutError;


// ==== compound error types ====


macro_rules! compound_from {
    ($compound:ident {$(
        $variant:ident($inner:ty),
    )*})=>{$(
        impl From<$inner> for $compound {
            fn from(inner: $inner) -> Self {
                Self::$variant(inner)
            }
        }
    )*};
}

/// Error for blocking until a message arrives on a channel
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Error)]
pub enum WaitError {
    /// The channel is closed, and no message remains to be received
    #[error(transparent)]
    Closed(ClosedError),
    /// No message arrived before the deadline
    #[error(transparent)]
    Timeout(TimeoutError),
}

compound_from!(WaitError {
    Closed(ClosedError),
    Timeout(TimeoutError),
});
