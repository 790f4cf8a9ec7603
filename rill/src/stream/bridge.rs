use crate::dispatch::Subscription;
use crate::stream::{Element, Message, Reactive, Signal, Writable};

use std::rc::Rc;

/// Bridges values from `source` into `target.set(...)`, mapping each value
/// through `transform` (pass the identity closure to forward unchanged).
/// Returns the bridge subscription; unsubscribing it severs the bridge.
/// With `close_target_on_source_close`, disposing the source also disposes
/// the target.
pub fn to<V: Element, O: Element>(
    source: &Rc<dyn Reactive<V>>,
    target: &Rc<dyn Writable<O>>,
    transform: impl Fn(V) -> O + 'static,
    close_target_on_source_close: bool,
) -> Subscription {
    let target = target.clone();
    source.on(Box::new(move |message| match message {
        Message::Value(value) => {
            // a disposed target just stops receiving; the bridge is passive
            let _ = target.set(transform(value.clone()));
        }
        Message::Signal(Signal::Done { reason }) => {
            if close_target_on_source_close {
                target.dispose(reason);
            }
        }
        Message::Signal(Signal::Warn { .. }) => {}
    }))
}

/// One stage of a [pipe]: consumes the previous stream, returns the next.
pub type Stage<V> = Box<dyn FnOnce(Rc<dyn Reactive<V>>) -> Rc<dyn Reactive<V>>>;

/// Wires a source through an ordered list of operator stages and returns the
/// terminal stream.  This is functional composition over streams; stages
/// that change the value type compose by method chaining instead.
pub fn pipe<V: Element>(source: Rc<dyn Reactive<V>>, stages: Vec<Stage<V>>) -> Rc<dyn Reactive<V>> {
    stages.into_iter().fold(source, |stream, stage| stage(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{AsReactive, AsWritable, ReactiveOperators, manual};
    use std::cell::RefCell;

    #[test]
    fn bridges_values_with_a_transform() {
        let source = manual::<u32>();
        let target = manual::<String>();
        let _bridge = to(
            &source.clone().as_reactive(),
            &target.clone().as_writable(),
            |v| format!("#{v}"),
            false,
        );
        source.set(7).unwrap();
        assert_eq!(target.last().as_deref(), Some("#7"));
    }

    #[test]
    fn unsubscribing_severs_the_bridge() {
        let source = manual::<u32>();
        let target = manual::<u32>();
        let bridge = to(
            &source.clone().as_reactive(),
            &target.clone().as_writable(),
            |v| v,
            false,
        );
        source.set(1).unwrap();
        bridge.unsubscribe();
        source.set(2).unwrap();
        assert_eq!(target.last(), Some(1));
    }

    #[test]
    fn close_flag_controls_target_disposal() {
        let source = manual::<u32>();
        let kept = manual::<u32>();
        let closed = manual::<u32>();
        let _a = to(
            &source.clone().as_reactive(),
            &kept.clone().as_writable(),
            |v| v,
            false,
        );
        let _b = to(
            &source.clone().as_reactive(),
            &closed.clone().as_writable(),
            |v| v,
            true,
        );
        source.dispose("finished");
        assert!(!kept.is_disposed());
        assert!(closed.is_disposed());
    }

    #[test]
    fn disposed_target_is_tolerated() {
        let source = manual::<u32>();
        let target = manual::<u32>();
        let _bridge = to(
            &source.clone().as_reactive(),
            &target.clone().as_writable(),
            |v| v,
            false,
        );
        target.dispose("gone early");
        source.set(3).unwrap();
        assert_eq!(source.last(), Some(3));
    }

    #[test]
    fn pipe_applies_stages_in_order() {
        let source = manual::<i32>();
        let out = pipe(
            source.clone().as_reactive(),
            vec![
                Box::new(|s: Rc<dyn Reactive<i32>>| s.filter(|v| *v > 0)),
                Box::new(|s: Rc<dyn Reactive<i32>>| s.transform(|v| v * 10)),
            ],
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = out.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        for v in [-1, 2, 3] {
            source.set(v).unwrap();
        }
        assert_eq!(*seen.borrow(), vec![20, 30]);
    }
}
