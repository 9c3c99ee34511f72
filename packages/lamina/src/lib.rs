//! Callback-driven message channels.
//!
//! A [`BasicChannel`] is an unbounded, ordered queue which consumers subscribe to with callbacks
//! rather than by blocking. There are four ways of subscribing, along two axes:
//!
//! - **Advisory** ([`Channel::listen`], [`Channel::listen_all`]): the callback is offered a
//!   message and may [`Claim`] it or decline it, in which case it stays in the channel.
//! - **Guaranteed** ([`Channel::receive`], [`Channel::receive_all`]): the callback is given the
//!   message.
//! - **One-shot** or **permanent** (the `_all` variants).
//!
//! Every operation on a channel is one atomic transition, after which the callbacks it made due
//! are invoked on the calling thread, outside of any lock. A channel is closed once it has been
//! sealed and its backlog has been drained.
//!
//! On top of the [`Channel`] trait sit the combinators: racing several channels ([`poll`],
//! [`poll_star`]), blocking views ([`lazy_channel_seq`], [`channel_seq`], [`wait_for_message`]),
//! pumps ([`receive_in_order`], [`siphon`], [`wrap_channel`], [`wrap_endpoint`]), and a registry
//! of [named channels](named_channel).
//!
//! ```
//! use lamina::{channel, Channel, Receiver, wait_for_message, Timeout};
//!
//! let ch = channel();
//! ch.enqueue(1).unwrap();
//! ch.receive(Receiver::new(|n| assert_eq!(n, 1))).unwrap();
//!
//! ch.enqueue_and_close(2).unwrap();
//! assert_eq!(wait_for_message(&ch, Timeout::Never), Ok(2));
//! assert!(ch.is_closed());
//! ```

#[macro_use]
extern crate tracing;

mod channel;
mod util;
mod race;
mod seq;
mod pump;
mod named;
pub mod time;
pub mod future;

pub use crate::{
    channel::{
        api::{AnyChannel, Channel},
        basic::{channel, BasicChannel},
        callback::{CallbackId, Claim, Consumer, Listener, OnClosed, Receiver},
        closed::{closed_channel, ClosedChannel},
        constant::{constant_channel, ConstantChannel},
        splice::{channel_pair, splice, Splice},
    },
    future::read_channel,
    named::{named_channel, named_channel_with, release_named_channel, Registry},
    pump::{receive_in_order, siphon, siphon_when, wrap_channel, wrap_endpoint},
    race::{poll, poll_star},
    seq::{channel_seq, lazy_channel_seq, lazy_channel_seq_with, wait_for_message, LazyChannelSeq},
    time::Timeout,
};

/// Error types
pub mod error {
    pub use crate::channel::error::*;
}
