use crate::stream::core::StreamCore;
use crate::stream::{Element, Message, Reactive, Signal, Writable};

use std::rc::Rc;

/// Derives a stream that maps each upstream value through `func`.
/// Used by [transform](crate::stream::ReactiveOperators::transform).
pub(crate) fn transform<V: Element, O: Element>(
    source: &Rc<dyn Reactive<V>>,
    func: impl Fn(V) -> O + 'static,
) -> Rc<dyn Reactive<O>> {
    try_transform(source, move |value| Ok(func(value)))
}

/// Fallible variant: an `Err` from `func` is fatal to the derived stream,
/// which disposes with the error as its reason.
/// Used by [try_transform](crate::stream::ReactiveOperators::try_transform).
pub(crate) fn try_transform<V: Element, O: Element>(
    source: &Rc<dyn Reactive<V>>,
    func: impl Fn(V) -> anyhow::Result<O> + 'static,
) -> Rc<dyn Reactive<O>> {
    let out = StreamCore::<O>::new();
    let sink = out.clone();
    let sub = source.on(Box::new(move |message| match message {
        Message::Value(value) => match func(value.clone()) {
            Ok(mapped) => {
                let _ = sink.set(mapped);
            }
            Err(err) => sink.dispose(&format!("transform failed: {err:#}")),
        },
        Message::Signal(Signal::Done { reason }) => sink.dispose(reason),
        Message::Signal(Signal::Warn { message }) => sink.warn(message),
    }));
    // independent disposal of the derived stream detaches it from the source
    out.add_disposer(move |_| sub.unsubscribe());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{AsReactive, ReactiveOperators, manual};
    use anyhow::anyhow;
    use std::cell::RefCell;

    #[test]
    fn maps_one_to_one_synchronously() {
        let source = manual::<u32>();
        let doubled = source.clone().as_reactive().transform(|v| v * 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = doubled.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        source.set(1).unwrap();
        source.set(4).unwrap();
        assert_eq!(*seen.borrow(), vec![2, 8]);
        assert_eq!(doubled.last(), Some(8));
    }

    #[test]
    fn stages_chain() {
        let source = manual::<u32>();
        let formatted = source
            .clone()
            .as_reactive()
            .transform(|v| v + 1)
            .transform(|v| format!("value {v}"));
        source.set(9).unwrap();
        assert_eq!(formatted.last().as_deref(), Some("value 10"));
    }

    #[test]
    fn disposing_the_source_cascades() {
        let source = manual::<u32>();
        let mapped = source.clone().as_reactive().transform(|v| v);
        let dones = Rc::new(RefCell::new(Vec::new()));
        let sink = dones.clone();
        let _sub = mapped.on(Box::new(move |message| {
            if let Message::Signal(Signal::Done { reason }) = message {
                sink.borrow_mut().push(reason.clone());
            }
        }));
        source.dispose("finished");
        assert!(mapped.is_disposed());
        assert_eq!(*dones.borrow(), vec!["finished".to_string()]);
    }

    #[test]
    fn disposing_the_derived_stream_first_is_harmless() {
        let source = manual::<u32>();
        let mapped = source.clone().as_reactive().transform(|v| v);
        mapped.dispose("downstream gone");
        source.set(1).unwrap();
        source.dispose("finished");
        assert_eq!(mapped.last(), None);
    }

    #[test]
    fn failed_mapping_disposes_with_the_error_as_reason() {
        let source = manual::<i32>();
        let mapped = source
            .clone()
            .as_reactive()
            .try_transform(|v| {
                if v < 0 {
                    Err(anyhow!("negative input {v}"))
                } else {
                    Ok(v as u32)
                }
            });
        source.set(3).unwrap();
        assert_eq!(mapped.last(), Some(3));
        source.set(-1).unwrap();
        assert!(mapped.is_disposed());
        // the source itself stays live
        assert!(!source.is_disposed());
        source.set(5).unwrap();
        assert_eq!(mapped.last(), Some(3));
    }

    #[test]
    fn warnings_propagate_without_terminating() {
        let source = manual::<u32>();
        let mapped = source.clone().as_reactive().transform(|v| v);
        let warns = Rc::new(RefCell::new(Vec::new()));
        let sink = warns.clone();
        let _sub = mapped.on(Box::new(move |message| {
            if let Message::Signal(Signal::Warn { message }) = message {
                sink.borrow_mut().push(message.clone());
            }
        }));
        source.warn("slow producer");
        source.set(1).unwrap();
        assert_eq!(*warns.borrow(), vec!["slow producer".to_string()]);
        assert_eq!(mapped.last(), Some(1));
    }
}
