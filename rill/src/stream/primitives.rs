use crate::dispatch::Subscription;
use crate::error::StreamError;
use crate::stream::core::StreamCore;
use crate::stream::{Element, Message, Reactive, Writable};

use std::rc::Rc;

/// A single-value stream with an equality gate: writing the value it already
/// holds is a silent no-op, so subscribers only ever see actual changes.
pub struct PrimitiveStream<V: Element> {
    core: Rc<StreamCore<V>>,
    eq: Box<dyn Fn(&V, &V) -> bool>,
}

/// Creates a [PrimitiveStream] gated by `PartialEq`.
pub fn primitive<V: Element + PartialEq>(initial: Option<V>) -> Rc<PrimitiveStream<V>> {
    PrimitiveStream::with_equality(initial, |a: &V, b: &V| a == b)
}

pub fn boolean(initial: bool) -> Rc<PrimitiveStream<bool>> {
    primitive(Some(initial))
}

pub fn number(initial: f64) -> Rc<PrimitiveStream<f64>> {
    primitive(Some(initial))
}

pub fn string(initial: &str) -> Rc<PrimitiveStream<String>> {
    primitive(Some(initial.to_string()))
}

impl<V: Element> PrimitiveStream<V> {
    /// Creates a stream gated by a caller-supplied equivalence, for types
    /// where `PartialEq` is too strict or not available.
    pub fn with_equality(
        initial: Option<V>,
        eq: impl Fn(&V, &V) -> bool + 'static,
    ) -> Rc<Self> {
        let core = StreamCore::new();
        if let Some(initial) = initial {
            // a fresh core with no subscribers cannot refuse a write
            let _ = core.set(initial);
        }
        Rc::new(Self {
            core,
            eq: Box::new(eq),
        })
    }
}

impl<V: Element> Reactive<V> for PrimitiveStream<V> {
    fn on(&self, handler: Box<dyn FnMut(&Message<V>)>) -> Subscription {
        self.core.on(handler)
    }

    fn on_value(&self, handler: Box<dyn FnMut(&V)>) -> Subscription {
        self.core.on_value(handler)
    }

    fn last(&self) -> Option<V> {
        self.core.last()
    }

    fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    fn dispose(&self, reason: &str) {
        self.core.dispose(reason);
    }
}

impl<V: Element> Writable<V> for PrimitiveStream<V> {
    fn set(&self, value: V) -> Result<(), StreamError> {
        if !self.core.is_disposed() {
            if let Some(last) = self.core.last() {
                if (self.eq)(&last, &value) {
                    return Ok(());
                }
            }
        }
        self.core.set(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn equal_writes_are_silent() {
        let stream = number(0.0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = stream.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        stream.set(0.0).unwrap();
        stream.set(1.5).unwrap();
        stream.set(1.5).unwrap();
        stream.set(0.0).unwrap();
        assert_eq!(*seen.borrow(), vec![1.5, 0.0]);
    }

    #[test]
    fn initial_value_is_cached() {
        let stream = string("idle");
        assert_eq!(stream.last().as_deref(), Some("idle"));
        let unseeded = primitive::<bool>(None);
        assert_eq!(unseeded.last(), None);
        unseeded.set(true).unwrap();
        assert_eq!(unseeded.last(), Some(true));
    }

    #[test]
    fn boolean_toggles_notify_each_change() {
        let stream = boolean(false);
        let flips = Rc::new(RefCell::new(0));
        let counter = flips.clone();
        let _sub = stream.on_value(Box::new(move |_| *counter.borrow_mut() += 1));
        stream.set(false).unwrap();
        stream.set(true).unwrap();
        stream.set(true).unwrap();
        stream.set(false).unwrap();
        assert_eq!(*flips.borrow(), 2);
    }

    #[test]
    fn custom_equality_widens_the_gate() {
        let stream = PrimitiveStream::with_equality(Some("Ready".to_string()), |a: &String, b: &String| {
            a.eq_ignore_ascii_case(b)
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = stream.on_value(Box::new(move |v: &String| sink.borrow_mut().push(v.clone())));
        stream.set("READY".to_string()).unwrap();
        stream.set("busy".to_string()).unwrap();
        assert_eq!(*seen.borrow(), vec!["busy"]);
    }

    #[test]
    fn set_after_dispose_fails() {
        let stream = boolean(true);
        stream.dispose("done");
        assert!(stream.set(false).is_err());
        // even the equal value is refused once disposed
        assert!(stream.set(true).is_err());
    }
}
