//! Subscription registry and inbound message fan-out.
//!
//! The table is assembled once at startup and handed to the engine; there is
//! no runtime add/remove. Every registered filter that matches an inbound
//! topic gets the message (fan-out, not first-match); the default handler
//! only runs when nothing matched.

use heapless::Vec;

use crate::error::Error;
use crate::message::InboundMessage;
use crate::topic;

/// Maximum number of registered subscriptions.
pub const MAX_SUBSCRIPTIONS: usize = 8;

/// Callback capability invoked for inbound publishes.
///
/// Heterogeneous handlers are expressed as an application enum implementing
/// this trait. The payload view in the message is only valid for the
/// duration of the call.
pub trait MessageHandler {
    /// Handles one inbound message published to `topic`.
    fn on_message(&mut self, topic: &str, message: &InboundMessage<'_>);
}

/// One registered subscription: a topic filter and its handler.
#[derive(Debug)]
pub struct Subscription<'a, H> {
    /// Topic filter, may contain `+` and `#` wildcards.
    pub filter: &'a str,
    /// Handler invoked for every matching message.
    pub handler: H,
}

/// Fixed-capacity filter-to-handler registry.
#[derive(Debug)]
pub struct SubscriptionTable<'a, H> {
    entries: Vec<Subscription<'a, H>, MAX_SUBSCRIPTIONS>,
    default_handler: Option<H>,
}

impl<'a, H: MessageHandler> SubscriptionTable<'a, H> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default_handler: None,
        }
    }

    /// Registers a subscription. Fails with [`Error::Overflow`] once
    /// [`MAX_SUBSCRIPTIONS`] entries exist.
    pub fn register(&mut self, filter: &'a str, handler: H) -> Result<(), Error> {
        self.entries
            .push(Subscription { filter, handler })
            .map_err(|_| Error::Overflow)
    }

    /// Sets the fallback handler invoked when no filter matched.
    pub fn set_default_handler(&mut self, handler: H) {
        self.default_handler = Some(handler);
    }

    /// Registered topic filters, in registration order.
    pub fn filters(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.entries.iter().map(|entry| entry.filter)
    }

    /// Delivers a message to every subscription whose filter matches
    /// `topic_name`, falling back to the default handler when none did.
    pub fn deliver(&mut self, topic_name: &str, message: &InboundMessage<'_>) {
        let mut matched = false;
        for entry in &mut self.entries {
            if entry.filter == topic_name || topic::matches(entry.filter, topic_name) {
                entry.handler.on_message(topic_name, message);
                matched = true;
            }
        }
        if !matched {
            if let Some(handler) = &mut self.default_handler {
                handler.on_message(topic_name, message);
            }
        }
    }
}

impl<'a, H: MessageHandler> Default for SubscriptionTable<'a, H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::QoS;

    use core::cell::Cell;

    struct CountingHandler {
        calls: Cell<usize>,
    }

    impl CountingHandler {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }
    }

    impl MessageHandler for &CountingHandler {
        fn on_message(&mut self, _topic: &str, _message: &InboundMessage<'_>) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    fn message(payload: &[u8]) -> InboundMessage<'_> {
        InboundMessage {
            qos: QoS::AtMostOnce,
            retained: false,
            dup: false,
            packet_id: 0,
            payload,
        }
    }

    #[test]
    fn fan_out_invokes_every_matching_handler() {
        let first = CountingHandler::new();
        let second = CountingHandler::new();
        let third = CountingHandler::new();

        let mut table = SubscriptionTable::new();
        table.register("sensors/+/temp", &first).unwrap();
        table.register("sensors/#", &second).unwrap();
        table.register("other/topic", &third).unwrap();

        table.deliver("sensors/kitchen/temp", &message(b"21"));

        assert_eq!(first.calls.get(), 1);
        assert_eq!(second.calls.get(), 1);
        assert_eq!(third.calls.get(), 0);
    }

    #[test]
    fn default_handler_only_when_nothing_matched() {
        let subscribed = CountingHandler::new();
        let fallback = CountingHandler::new();

        let mut table = SubscriptionTable::new();
        table.register("a/b", &subscribed).unwrap();
        table.set_default_handler(&fallback);

        table.deliver("a/b", &message(b"x"));
        table.deliver("c/d", &message(b"y"));

        assert_eq!(subscribed.calls.get(), 1);
        assert_eq!(fallback.calls.get(), 1);
    }

    #[test]
    fn registry_capacity_is_bounded() {
        struct Noop;
        impl MessageHandler for Noop {
            fn on_message(&mut self, _topic: &str, _message: &InboundMessage<'_>) {}
        }

        let mut table = SubscriptionTable::new();
        for _ in 0..MAX_SUBSCRIPTIONS {
            table.register("a", Noop).unwrap();
        }
        assert_eq!(table.register("a", Noop), Err(Error::Overflow));
    }
}
