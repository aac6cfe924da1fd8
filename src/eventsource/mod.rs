//! The `EventSource` boundary (spec.md §1, §6): the kernel trace
//! subscription mechanism. Its internals (ETW provider session setup,
//! parsing raw kernel records) are explicitly out of scope — the core
//! only consumes a typed stream of `Event`s from it.

pub mod etw;

use crate::domain::{CoreError, Event};

/// A cloneable handle an `EventSource` implementation uses to hand
/// parsed events to the dispatcher. Backed by a bounded channel so a
/// slow dispatcher applies backpressure rather than letting a runaway
/// producer grow memory without bound.
pub type EventSink = crossbeam_channel::Sender<Event>;

/// Contract for the kernel trace subscription (spec.md §6).
///
/// `subscribe` is expected to block the calling thread until the
/// subscription is torn down (e.g. on Ctrl+C) or fails to start;
/// implementations must not block the *sink's* consumer, since
/// spec.md §5 requires dispatcher callbacks to "return promptly."
pub trait EventSource: Send {
    fn subscribe(self: Box<Self>, sink: EventSink) -> Result<(), CoreError>;
}

pub use etw::EtwEventSource;

/// Test double driven by a fixed sequence of events, used by
/// Scheduler/Dispatcher/Orchestrator unit tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::{CoreError, Event, EventSink, EventSource};

    pub struct ChannelEventSource {
        pub events: Vec<Event>,
    }

    impl ChannelEventSource {
        #[must_use]
        pub fn new(events: Vec<Event>) -> Self {
            ChannelEventSource { events }
        }
    }

    impl EventSource for ChannelEventSource {
        fn subscribe(self: Box<Self>, sink: EventSink) -> Result<(), CoreError> {
            for event in self.events {
                // A full channel here means the test itself is slow to
                // drain; treat it the same as a foreign-thread producer
                // would and just drop on send failure (receiver gone).
                let _ = sink.send(event);
            }
            Ok(())
        }
    }
}
