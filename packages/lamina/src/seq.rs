//! Blocking, iterator-shaped views of a channel.

use crate::{
    channel::{
        api::Channel,
        callback::Receiver,
        error::{ClosedError, TimeoutError, WaitError},
    },
    race::poll_star,
    time::Timeout,
    util::signal::Signal,
};
use std::{
    fmt::{self, Formatter, Debug},
    iter::FusedIterator,
    marker::PhantomData,
    sync::Arc,
    time::Duration,
};


/// Lazy sequence of a channel's messages, with the same timeout for each message
///
/// See [`lazy_channel_seq_with`].
pub fn lazy_channel_seq<T, C>(ch: C, timeout: Timeout) -> LazyChannelSeq<T, C>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
{
    lazy_channel_seq_with(ch, move || timeout)
}

/// Lazy sequence of a channel's messages, recomputing the timeout for each message
///
/// Each call to `next` blocks the calling thread until the channel delivers a message, or until
/// the timeout returned by `timeout` elapses, at which point the sequence ends for good. Passing
/// a function which returns the same [`Timeout::At`] every time puts a deadline on the whole
/// sequence.
///
/// Messages are taken with [`poll_star`], so this must be the channel's only consumer.
pub fn lazy_channel_seq_with<T, C, F>(ch: C, timeout: F) -> LazyChannelSeq<T, C>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
    F: FnMut() -> Timeout + Send + 'static,
{
    LazyChannelSeq {
        ch,
        timeout: Box::new(timeout),
        done: false,
        _p: PhantomData,
    }
}

/// Collect the channel's messages until a deadline `timeout` from now
///
/// A zero timeout collects exactly the messages which are already buffered.
pub fn channel_seq<T, C>(ch: &C, timeout: Duration) -> Vec<T>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
{
    lazy_channel_seq(ch.clone(), Timeout::After(timeout).fix()).collect()
}

/// Block until the channel delivers one message
///
/// Fails with [`WaitError::Closed`] if the channel is or becomes closed with no message left, and
/// with [`WaitError::Timeout`] if the timeout elapses first.
pub fn wait_for_message<T, C>(ch: &C, timeout: Timeout) -> Result<T, WaitError>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
{
    match next_message(ch, timeout) {
        Some(msg) => Ok(msg),
        None if ch.is_closed() => Err(ClosedError.into()),
        None => Err(TimeoutError.into()),
    }
}

// block on a poll_star of just this channel.
fn next_message<T, C>(ch: &C, timeout: Timeout) -> Option<T>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
{
    let result = poll_star([((), ch.clone())], timeout);
    let signal = Arc::new(Signal::<Option<((), T)>>::new());
    let signal_2 = Arc::clone(&signal);
    // the race resolves on its own timeout, so wait for it without one
    let _ = result.receive(Receiver::new(move |outcome| signal_2.put(outcome)));
    signal
        .wait(Timeout::Never)
        .flatten()
        .map(|((), msg)| msg)
}


/// See [`lazy_channel_seq`] and [`lazy_channel_seq_with`]
pub struct LazyChannelSeq<T, C> {
    ch: C,
    timeout: Box<dyn FnMut() -> Timeout + Send>,
    done: bool,
    _p: PhantomData<fn() -> T>,
}

impl<T, C> Iterator for LazyChannelSeq<T, C>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        let msg = next_message(&self.ch, (self.timeout)());
        if msg.is_none() {
            trace!("channel sequence ended");
            self.done = true;
        }
        msg
    }
}

impl<T, C> FusedIterator for LazyChannelSeq<T, C>
where
    T: Clone + Send + 'static,
    C: Channel<T> + Clone + 'static,
{}

impl<T, C: Debug> Debug for LazyChannelSeq<T, C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("LazyChannelSeq")
            .field("ch", &self.ch)
            .field("done", &self.done)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::basic::BasicChannel;
    use std::{
        sync::atomic::{AtomicUsize, Ordering::Relaxed},
        thread,
        time::Instant,
    };

    #[test]
    fn zero_timeout_drains_buffered() {
        let ch = BasicChannel::new();
        for n in 0..5 {
            ch.enqueue(n).unwrap();
        }
        assert_eq!(channel_seq(&ch, Duration::ZERO), vec![0, 1, 2, 3, 4]);
        assert!(ch.is_empty());
        assert_eq!(channel_seq(&ch, Duration::ZERO), Vec::<i32>::new());
    }

    #[test]
    fn deadline_covers_whole_sequence() {
        let ch = BasicChannel::new();
        let ch_2 = ch.clone();
        let producer = thread::spawn(move || {
            for n in 0..100 {
                if ch_2.enqueue(n).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
        });

        let start = Instant::now();
        let msgs = channel_seq(&ch, Duration::from_millis(60));
        let elapsed = start.elapsed();
        ch.close();
        producer.join().unwrap();

        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_secs(2));
        assert!(!msgs.is_empty());
        assert!(msgs.windows(2).all(|pair| pair[0] + 1 == pair[1]));
        assert_eq!(msgs[0], 0);
    }

    #[test]
    fn lazy_seq_ends_on_close_and_stays_ended() {
        let ch = BasicChannel::new();
        ch.enqueue("a").unwrap();
        ch.enqueue_and_close("b").unwrap();
        let mut seq = lazy_channel_seq(ch.clone(), Timeout::Never);
        assert_eq!(seq.next(), Some("a"));
        assert_eq!(seq.next(), Some("b"));
        assert_eq!(seq.next(), None);
        assert_eq!(seq.next(), None);
    }

    #[test]
    fn lazy_seq_recomputes_timeout() {
        let ch = BasicChannel::new();
        ch.enqueue(1).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_2 = Arc::clone(&calls);
        let seq = lazy_channel_seq_with(ch.clone(), move || {
            calls_2.fetch_add(1, Relaxed);
            Timeout::After(Duration::from_millis(5))
        });
        assert_eq!(seq.collect::<Vec<_>>(), vec![1]);
        // once for the message, once for the wait that ended it
        assert_eq!(calls.load(Relaxed), 2);
    }

    #[test]
    fn wait_for_message_outcomes() {
        let ch = BasicChannel::new();
        ch.enqueue(1).unwrap();
        assert_eq!(wait_for_message(&ch, Timeout::Never), Ok(1));
        assert_eq!(
            wait_for_message(&ch, Duration::from_millis(10).into()),
            Err(WaitError::Timeout(TimeoutError)),
        );

        let ch_2 = ch.clone();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            ch_2.enqueue(2).unwrap();
        });
        assert_eq!(wait_for_message(&ch, Timeout::Never), Ok(2));
        producer.join().unwrap();
    }

    #[test]
    fn wait_for_message_on_close() {
        let ch = BasicChannel::<u8>::new();
        let ch_2 = ch.clone();
        let closer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            ch_2.close();
        });
        assert_eq!(
            wait_for_message(&ch, Timeout::Never),
            Err(WaitError::Closed(ClosedError)),
        );
        closer.join().unwrap();
        assert_eq!(
            wait_for_message(&ch, Timeout::Never),
            Err(WaitError::Closed(ClosedError)),
        );
    }
}
