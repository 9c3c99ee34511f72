// implementation of the lamina channel kinds.
//
// the basic architecture is as such:
//
// basic channel handles wrap around Arc<shared state>
//                                         |
//          /------------------------------/
//          v
//       shared state
//          |
//          |------ it contains an atomic state byte (open, sealed, closed), which may be read
//          |       without locking for cheap is_sealed / is_closed checks
//          |
//          \------ it contains a Mutex<lockable>, which holds the backlog of undelivered messages
//                  and the four callback sets: permanent and one-shot listeners, permanent and
//                  one-shot receivers. plus the close callbacks.
//
// every operation is one transition: lock, mutate, compute a delivery plan, publish the state byte,
// unlock, then run the plan. advisory listeners are offered messages while the plan is computed,
// which is why they must not touch the offering channel. everything else a user supplies runs
// after unlock.
//
// the organization of these modules is as such:
//
//      callback<--------------core: The transition engine. Safe, but panicky and inconvenient.
//                             ^
//                             |
//      api<-------------------basic: Wraps core into the defensive general channel.
//       ^
//       |-------------------- constant: One-value channel, with its own simpler state.
//       |-------------------- closed: Channel that is closed from the start.
//       \-------------------- splice: Read/write facade over two other channels.
//
// there is also the error module, which contains the relevant error types, which is also
// re-exported publically.

pub(crate) mod error;
pub(crate) mod api;
pub(crate) mod callback;
pub(crate) mod basic;
pub(crate) mod constant;
pub(crate) mod closed;
pub(crate) mod splice;

mod core;
