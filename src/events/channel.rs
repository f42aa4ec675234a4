//! Event channel implementation using crossbeam-channel.
//!
//! The store's duplicate-observer hook and the orchestrator's progress
//! reporting both travel over this channel, so any front end (CLI today)
//! can subscribe without the core knowing about it.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::Event;

/// Sends events from the core library.
///
/// A thin wrapper around crossbeam's Sender that can be cloned and sent
/// across threads. The store holds one of these as its injected
/// duplicate observer.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Create a new EventSender from a raw crossbeam sender.
    pub fn new(sender: Sender<Event>) -> Self {
        Self { inner: sender }
    }

    /// Send an event.
    ///
    /// If the receiver is dropped or a bounded channel is full, the event
    /// is silently discarded; observation is optional, classification is
    /// not. Never blocks - senders may hold the store lock.
    pub fn send(&self, event: Event) {
        let _ = self.inner.try_send(event);
    }
}

/// Receives events from the core library.
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Block until the next event is received
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Returns an iterator over received events
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// An event channel for communication between the core library and
/// whatever is watching the run.
pub struct EventChannel;

impl EventChannel {
    /// Create a new unbounded event channel.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }

    /// Create a bounded event channel with the specified capacity.
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = bounded(capacity);
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        EventChannel
    }
}

/// A no-op event sender for when nothing is observing the run.
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::book::BookUid;
    use std::thread;

    #[test]
    fn events_can_be_sent_across_threads() {
        let (sender, receiver) = EventChannel::new();

        let handle = thread::spawn(move || {
            sender.send(Event::Duplicate {
                original: BookUid::new("vol-2", "a.fb2"),
                duplicate: BookUid::new("vol-1", "a.fb2"),
            });
        });

        handle.join().unwrap();

        let event = receiver.recv().unwrap();
        match event {
            Event::Duplicate { original, .. } => assert_eq!(original.folder, "vol-2"),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn null_sender_does_not_panic() {
        let sender = null_sender();
        sender.send(Event::Merge(super::super::MergeEvent::Started { archives: 0 }));
    }

    #[test]
    fn bounded_channel_respects_capacity() {
        let (sender, receiver) = EventChannel::bounded(2);

        sender.send(Event::Merge(super::super::MergeEvent::Started { archives: 1 }));
        sender.send(Event::Merge(super::super::MergeEvent::Started { archives: 1 }));

        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn full_bounded_channel_drops_instead_of_blocking() {
        let (sender, receiver) = EventChannel::bounded(1);

        sender.send(Event::Merge(super::super::MergeEvent::Started { archives: 1 }));
        // Capacity is exhausted; this must return immediately and discard.
        sender.send(Event::Merge(super::super::MergeEvent::Started { archives: 2 }));

        match receiver.try_recv() {
            Some(Event::Merge(super::super::MergeEvent::Started { archives })) => {
                assert_eq!(archives, 1)
            }
            _ => panic!("Wrong event type"),
        }
        assert!(receiver.try_recv().is_none());
    }
}
