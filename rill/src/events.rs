//! Event collaborators consumed by the [event](crate::stream::event) source.
//!
//! Collaborator code exposes events through the [EventTarget] capability
//! trait rather than by structural shape-sniffing.  [NamedTargets] stands in
//! for selector-string resolution: lookups are eager and fail fast on an
//! unknown name.

use crate::dispatch::{DispatchList, SubscriptionId};
use crate::error::StreamError;
use crate::stream::Element;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The shape an event-producing collaborator must expose.
pub trait EventTarget<E: Element> {
    fn add_listener(&self, listener: Box<dyn FnMut(&E)>) -> SubscriptionId;
    fn remove_listener(&self, id: SubscriptionId);
}

/// A concrete in-process event target.
pub struct Emitter<E: Element> {
    listeners: DispatchList<E>,
}

impl<E: Element> Emitter<E> {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            listeners: DispatchList::new(),
        })
    }

    pub fn emit(&self, event: E) {
        self.listeners.notify(&event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: Element> EventTarget<E> for Emitter<E> {
    fn add_listener(&self, listener: Box<dyn FnMut(&E)>) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: SubscriptionId) {
        self.listeners.remove(id);
    }
}

/// A registry of named event targets.  Resolution happens eagerly at stream
/// construction so that a bad name fails there, never later.
#[derive(Default)]
pub struct NamedTargets<E: Element> {
    targets: RefCell<HashMap<String, Rc<dyn EventTarget<E>>>>,
}

impl<E: Element> NamedTargets<E> {
    pub fn new() -> Self {
        Self {
            targets: RefCell::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: &str, target: Rc<dyn EventTarget<E>>) {
        self.targets.borrow_mut().insert(name.to_string(), target);
    }

    pub fn resolve(&self, name: &str) -> Result<Rc<dyn EventTarget<E>>, StreamError> {
        self.targets
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| StreamError::UnknownTarget(name.to_string()))
    }
}
