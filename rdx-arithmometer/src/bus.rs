//! A synchronous, re-entrant publish/subscribe bus.
//!
//! Every state machine owns one `EventBus`, parameterised by its own event
//! kind enum `K` and payload type `P`. Delivery is synchronous and happens in
//! subscription order. A subscriber may attach a crossing [`Condition`]; such
//! a subscriber only hears emissions whose [`Cause`] interval strictly
//! straddles its threshold.
//!
//! Handlers may emit, subscribe and unsubscribe while an emission is in
//! progress. The subscriber list of an emission is snapshotted when it starts:
//! handlers added during delivery wait for the next emission, and handlers
//! removed during delivery are skipped.

use crate::common::SubscriptionId;
use crate::error::{MachineError, Result};
use slotmap::SlotMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

/// A subscriber callback. Errors returned here abort the emission and are
/// handed back to whoever called [`EventBus::emit`].
pub type Handler<P> = Rc<dyn Fn(&P) -> Result<()>>;

/// The `(last, next)` state pair an emission was caused by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cause {
    pub last: f64,
    pub next: f64,
}

impl Cause {
    pub fn new(last: f64, next: f64) -> Self {
        Self { last, next }
    }
}

/// A one-shot crossing detector.
///
/// This is not a level test: a state sitting exactly on the threshold, or
/// moving without passing it, does not fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    pub threshold: f64,
}

impl Condition {
    pub fn crossing(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Returns `true` if the threshold lies strictly between `cause.last` and
    /// `cause.next`, in either direction.
    pub fn compare(&self, cause: &Cause) -> bool {
        let t = self.threshold;
        (cause.last < t && t < cause.next) || (cause.next < t && t < cause.last)
    }
}

struct Subscriber<K, P> {
    kind: K,
    handler: Handler<P>,
    condition: Option<Condition>,
}

struct Registry<K, P> {
    subscribers: SlotMap<SubscriptionId, Subscriber<K, P>>,
    order: HashMap<K, Vec<SubscriptionId>>,
}

/// A typed event bus. Cloning yields another handle to the same bus.
pub struct EventBus<K, P> {
    registry: Rc<RefCell<Registry<K, P>>>,
}

impl<K, P> Clone for EventBus<K, P> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

/// A non-owning handle to an [`EventBus`].
pub struct WeakEventBus<K, P> {
    registry: Weak<RefCell<Registry<K, P>>>,
}

impl<K, P> Clone for WeakEventBus<K, P> {
    fn clone(&self) -> Self {
        Self {
            registry: Weak::clone(&self.registry),
        }
    }
}

impl<K, P> WeakEventBus<K, P> {
    pub fn upgrade(&self) -> Option<EventBus<K, P>> {
        self.registry.upgrade().map(|registry| EventBus { registry })
    }
}

impl<K, P> EventBus<K, P> {
    pub fn downgrade(&self) -> WeakEventBus<K, P> {
        WeakEventBus {
            registry: Rc::downgrade(&self.registry),
        }
    }
}

impl<K, P> Default for EventBus<K, P> {
    fn default() -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                subscribers: SlotMap::with_key(),
                order: HashMap::new(),
            })),
        }
    }
}

impl<K, P> fmt::Debug for EventBus<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.registry.borrow().subscribers.len())
            .finish()
    }
}

impl<K, P> EventBus<K, P>
where
    K: Copy + Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes an unconditional handler to `kind`.
    pub fn subscribe(
        &self,
        kind: K,
        handler: impl Fn(&P) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.insert(kind, Rc::new(handler), None)
    }

    /// Subscribes a handler that only hears emissions crossing `condition`.
    pub fn subscribe_when(
        &self,
        kind: K,
        condition: Condition,
        handler: impl Fn(&P) -> Result<()> + 'static,
    ) -> SubscriptionId {
        self.insert(kind, Rc::new(handler), Some(condition))
    }

    fn insert(&self, kind: K, handler: Handler<P>, condition: Option<Condition>) -> SubscriptionId {
        let mut registry = self.registry.borrow_mut();
        let id = registry.subscribers.insert(Subscriber {
            kind,
            handler,
            condition,
        });
        registry.order.entry(kind).or_default().push(id);
        id
    }

    /// Removes the subscription `id` from `kind`.
    ///
    /// Returns `true` if the subscription existed and belonged to `kind`.
    pub fn unsubscribe(&self, kind: K, id: SubscriptionId) -> bool {
        let mut registry = self.registry.borrow_mut();
        match registry.subscribers.get(id) {
            Some(subscriber) if subscriber.kind == kind => {}
            _ => return false,
        }
        registry.subscribers.remove(id);
        if let Some(ids) = registry.order.get_mut(&kind) {
            ids.retain(|existing| *existing != id);
        }
        true
    }

    /// Number of live subscriptions on `kind`.
    pub fn subscriber_count(&self, kind: K) -> usize {
        self.registry
            .borrow()
            .order
            .get(&kind)
            .map_or(0, |ids| ids.len())
    }

    /// Delivers `payload` to every subscriber of `kind`, in subscription order.
    ///
    /// Subscribers holding a condition are checked against `cause`; if one is
    /// reached while `cause` is `None` the emission fails with
    /// [`MachineError::MissingCause`].
    pub fn emit(&self, kind: K, payload: &P, cause: Option<Cause>) -> Result<()> {
        let snapshot: Vec<(SubscriptionId, Handler<P>, Option<Condition>)> = {
            let registry = self.registry.borrow();
            match registry.order.get(&kind) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| {
                        registry
                            .subscribers
                            .get(*id)
                            .map(|s| (*id, Rc::clone(&s.handler), s.condition))
                    })
                    .collect(),
                None => return Ok(()),
            }
        };

        for (id, handler, condition) in snapshot {
            if !self.registry.borrow().subscribers.contains_key(id) {
                continue;
            }
            if let Some(condition) = condition {
                let cause = cause.ok_or(MachineError::MissingCause(id))?;
                if !condition.compare(&cause) {
                    continue;
                }
            }
            handler(payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Ping,
        Pong,
    }

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus: EventBus<Kind, u32> = EventBus::new();
        let log = recorder();
        for name in ["first", "second", "third"] {
            let log = log.clone();
            bus.subscribe(Kind::Ping, move |_| {
                log.borrow_mut().push(name);
                Ok(())
            });
        }
        bus.emit(Kind::Ping, &1, None).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let bus: EventBus<Kind, u32> = EventBus::new();
        let log = recorder();
        let l = log.clone();
        bus.subscribe(Kind::Pong, move |_| {
            l.borrow_mut().push("pong");
            Ok(())
        });
        bus.emit(Kind::Ping, &1, None).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn crossing_fires_in_both_directions_only_when_strictly_inside() {
        let condition = Condition::crossing(0.5);
        assert!(condition.compare(&Cause::new(0.4, 0.6)));
        assert!(condition.compare(&Cause::new(0.6, 0.4)));
        assert!(!condition.compare(&Cause::new(0.5, 0.6)));
        assert!(!condition.compare(&Cause::new(0.4, 0.5)));
        assert!(!condition.compare(&Cause::new(0.1, 0.2)));
        assert!(!condition.compare(&Cause::new(0.5, 0.5)));
    }

    #[test]
    fn conditional_subscriber_is_filtered_by_cause() {
        let bus: EventBus<Kind, f64> = EventBus::new();
        let hits = Rc::new(RefCell::new(0));
        let h = hits.clone();
        bus.subscribe_when(Kind::Ping, Condition::crossing(1.0), move |_| {
            *h.borrow_mut() += 1;
            Ok(())
        });
        bus.emit(Kind::Ping, &0.8, Some(Cause::new(0.5, 0.8))).unwrap();
        bus.emit(Kind::Ping, &1.2, Some(Cause::new(0.8, 1.2))).unwrap();
        bus.emit(Kind::Ping, &0.9, Some(Cause::new(1.2, 0.9))).unwrap();
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn conditional_subscriber_without_cause_fails_loudly() {
        let bus: EventBus<Kind, f64> = EventBus::new();
        let id = bus.subscribe_when(Kind::Ping, Condition::crossing(1.0), |_| Ok(()));
        match bus.emit(Kind::Ping, &0.0, None) {
            Err(MachineError::MissingCause(failed)) => assert_eq!(failed, id),
            other => panic!("expected MissingCause, got {other:?}"),
        }
    }

    #[test]
    fn subscriptions_added_during_emission_wait_for_the_next_one() {
        let bus: EventBus<Kind, u32> = EventBus::new();
        let log = recorder();
        let inner_bus = bus.clone();
        let l = log.clone();
        bus.subscribe(Kind::Ping, move |_| {
            l.borrow_mut().push("outer");
            let l2 = l.clone();
            inner_bus.subscribe(Kind::Ping, move |_| {
                l2.borrow_mut().push("late");
                Ok(())
            });
            Ok(())
        });
        bus.emit(Kind::Ping, &0, None).unwrap();
        assert_eq!(*log.borrow(), vec!["outer"]);

        log.borrow_mut().clear();
        bus.emit(Kind::Ping, &0, None).unwrap();
        assert_eq!(*log.borrow(), vec!["outer", "late"]);
    }

    #[test]
    fn handlers_removed_during_emission_are_skipped() {
        let bus: EventBus<Kind, u32> = EventBus::new();
        let log = recorder();
        let victim: Rc<RefCell<Option<SubscriptionId>>> = Rc::new(RefCell::new(None));

        let killer_bus = bus.clone();
        let v = victim.clone();
        bus.subscribe(Kind::Ping, move |_| {
            if let Some(id) = *v.borrow() {
                killer_bus.unsubscribe(Kind::Ping, id);
            }
            Ok(())
        });
        let l = log.clone();
        let id = bus.subscribe(Kind::Ping, move |_| {
            l.borrow_mut().push("victim");
            Ok(())
        });
        *victim.borrow_mut() = Some(id);

        bus.emit(Kind::Ping, &0, None).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(bus.subscriber_count(Kind::Ping), 1);
    }

    #[test]
    fn handlers_may_emit_reentrantly() {
        let bus: EventBus<Kind, u32> = EventBus::new();
        let log = recorder();
        let inner = bus.clone();
        bus.subscribe(Kind::Ping, move |n| inner.emit(Kind::Pong, &(n + 1), None));
        let l = log.clone();
        bus.subscribe(Kind::Pong, move |_| {
            l.borrow_mut().push("pong");
            Ok(())
        });
        bus.emit(Kind::Ping, &0, None).unwrap();
        assert_eq!(*log.borrow(), vec!["pong"]);
    }

    #[test]
    fn unsubscribe_requires_matching_kind() {
        let bus: EventBus<Kind, u32> = EventBus::new();
        let id = bus.subscribe(Kind::Ping, |_| Ok(()));
        assert!(!bus.unsubscribe(Kind::Pong, id));
        assert!(bus.unsubscribe(Kind::Ping, id));
        assert!(!bus.unsubscribe(Kind::Ping, id));
        assert_eq!(bus.subscriber_count(Kind::Ping), 0);
    }

    #[test]
    fn handler_error_stops_delivery() {
        let bus: EventBus<Kind, u32> = EventBus::new();
        let log = recorder();
        bus.subscribe(Kind::Ping, |_| Err(MachineError::SelfSync));
        let l = log.clone();
        bus.subscribe(Kind::Ping, move |_| {
            l.borrow_mut().push("after");
            Ok(())
        });
        assert!(matches!(
            bus.emit(Kind::Ping, &0, None),
            Err(MachineError::SelfSync)
        ));
        assert!(log.borrow().is_empty());
    }
}
