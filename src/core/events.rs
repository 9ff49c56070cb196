//! Multi-subscriber notification bus for presentation-layer hooks.

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

/// Delivers each emitted event to every current subscriber, in
/// subscription order. Registering a handler never replaces another one.
pub struct EventBus<E> {
    handlers: Vec<(SubscriptionId, Handler<E>)>,
    next_id: u64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&E) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _)| *sid != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: &E) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn every_subscriber_receives_events() {
        let mut bus: EventBus<u32> = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let a = Rc::clone(&seen);
        bus.subscribe(move |e| a.borrow_mut().push(("a", *e)));
        let b = Rc::clone(&seen);
        bus.subscribe(move |e| b.borrow_mut().push(("b", *e)));

        bus.emit(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus: EventBus<u32> = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        let id = bus.subscribe(move |_| *c.borrow_mut() += 1);

        bus.emit(&1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&2);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
