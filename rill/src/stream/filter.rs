use crate::stream::core::StreamCore;
use crate::stream::{Element, Message, Reactive, Signal, Writable};

use std::rc::Rc;

/// Derives a stream carrying only the upstream values the predicate accepts;
/// rejected values are dropped, not buffered.
/// Used by [filter](crate::stream::ReactiveOperators::filter).
pub(crate) fn filter<V: Element>(
    source: &Rc<dyn Reactive<V>>,
    predicate: impl Fn(&V) -> bool + 'static,
) -> Rc<dyn Reactive<V>> {
    try_filter(source, move |value| Ok(predicate(value)))
}

/// Fallible variant: an `Err` from the predicate is fatal to the derived
/// stream.  Used by [try_filter](crate::stream::ReactiveOperators::try_filter).
pub(crate) fn try_filter<V: Element>(
    source: &Rc<dyn Reactive<V>>,
    predicate: impl Fn(&V) -> anyhow::Result<bool> + 'static,
) -> Rc<dyn Reactive<V>> {
    let out = StreamCore::<V>::new();
    let sink = out.clone();
    let sub = source.on(Box::new(move |message| match message {
        Message::Value(value) => match predicate(value) {
            Ok(true) => {
                let _ = sink.set(value.clone());
            }
            Ok(false) => {}
            Err(err) => sink.dispose(&format!("filter failed: {err:#}")),
        },
        Message::Signal(Signal::Done { reason }) => sink.dispose(reason),
        Message::Signal(Signal::Warn { message }) => sink.warn(message),
    }));
    out.add_disposer(move |_| sub.unsubscribe());
    out
}
