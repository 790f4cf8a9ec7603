use log::warn;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

/// Identifies one subscription within a [DispatchList].  Unique for the
/// lifetime of the list.
pub type SubscriptionId = u64;

type Handler<V> = Rc<RefCell<dyn FnMut(&V)>>;

struct Entry<V> {
    id: SubscriptionId,
    once: bool,
    handler: Handler<V>,
}

/// An ordered registry of subscriber callbacks.  Handlers are notified in
/// registration order.  A panicking handler is caught and logged so that the
/// remaining handlers still run.  Mutating the list from inside a handler is
/// permitted; the in-progress pass iterates over a snapshot.
pub struct DispatchList<V> {
    entries: RefCell<SmallVec<[Entry<V>; 4]>>,
    next_id: Cell<SubscriptionId>,
}

impl<V> Default for DispatchList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DispatchList<V> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(SmallVec::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn add(&self, handler: impl FnMut(&V) + 'static) -> SubscriptionId {
        self.push(handler, false)
    }

    /// Registers a handler that is removed after its first invocation.  The
    /// entry is removed before the handler runs, so re-entrant removal cannot
    /// make it fire twice.
    pub fn add_once(&self, handler: impl FnMut(&V) + 'static) -> SubscriptionId {
        self.push(handler, true)
    }

    fn push(&self, handler: impl FnMut(&V) + 'static, once: bool) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push(Entry {
            id,
            once,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Invokes every registered handler with `value`, in registration order.
    pub fn notify(&self, value: &V) {
        let snapshot: SmallVec<[(SubscriptionId, bool, Handler<V>); 4]> = self
            .entries
            .borrow()
            .iter()
            .map(|entry| (entry.id, entry.once, entry.handler.clone()))
            .collect();
        for (id, once, handler) in snapshot {
            if once {
                if !self.remove(id) {
                    // already removed re-entrantly, must not fire again
                    continue;
                }
            } else if !self.contains(id) {
                // removed by an earlier handler in this pass
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                (handler.borrow_mut())(value);
            }));
            if outcome.is_err() {
                warn!(target: "rill", "subscriber {id} panicked during notify, continuing");
            }
        }
    }

    fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.borrow().iter().any(|entry| entry.id == id)
    }
}

/// Handle returned by subscribe operations.  Calling [Subscription::unsubscribe]
/// removes the handler; dropping the handle leaves the subscription active.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle that detaches nothing.  Used where a subscription was
    /// requested on an already-terminated source.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_in_registration_order() {
        let list: DispatchList<u32> = DispatchList::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            list.add(move |value: &u32| seen.borrow_mut().push(format!("{tag}{value}")));
        }
        list.notify(&1);
        assert_eq!(*seen.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn remove_stops_delivery() {
        let list: DispatchList<u32> = DispatchList::new();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let id = list.add(move |_| counter.set(counter.get() + 1));
        list.notify(&0);
        assert!(list.remove(id));
        assert!(!list.remove(id));
        list.notify(&0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn once_fires_exactly_once() {
        let list: DispatchList<u32> = DispatchList::new();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        list.add_once(move |_| counter.set(counter.get() + 1));
        list.notify(&0);
        list.notify(&0);
        assert_eq!(count.get(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn panicking_handler_does_not_block_others() {
        let list: DispatchList<u32> = DispatchList::new();
        let count = Rc::new(Cell::new(0));
        list.add(|_| panic!("boom"));
        let counter = count.clone();
        list.add(move |_| counter.set(counter.get() + 1));
        list.notify(&0);
        assert_eq!(count.get(), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn reentrant_removal_during_notify_is_tolerated() {
        let list: Rc<DispatchList<u32>> = Rc::new(DispatchList::new());
        let count = Rc::new(Cell::new(0));
        // first handler removes the second before it has run
        let victim_id = Rc::new(Cell::new(0u64));
        let victim_for_killer = victim_id.clone();
        let list_for_killer = list.clone();
        list.add(move |_| {
            list_for_killer.remove(victim_for_killer.get());
        });
        let counter = count.clone();
        victim_id.set(list.add(move |_| counter.set(counter.get() + 1)));
        list.notify(&0);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn clear_removes_everything() {
        let list: DispatchList<u32> = DispatchList::new();
        list.add(|_| {});
        list.add_once(|_| {});
        assert_eq!(list.len(), 2);
        list.clear();
        assert!(list.is_empty());
    }
}
