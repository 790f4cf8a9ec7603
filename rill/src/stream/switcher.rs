use crate::dispatch::Subscription;
use crate::stream::core::StreamCore;
use crate::stream::{AsReactive, Element, Message, Reactive, Signal, Writable};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use strum_macros::Display;

/// How [switcher] routes a value that satisfies several cases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Match {
    /// Route to the first matching case only, in case declaration order.
    #[default]
    First,
    /// Route to every matching case.
    All,
}

pub type Predicate<V> = Box<dyn Fn(&V) -> bool>;

/// Routes each upstream value to per-case output streams.  Cases are
/// evaluated in declaration order; a value matching no case is dropped.
/// The case streams are owned by the switcher: disposing the source
/// disposes all of them en masse.
pub fn switcher<V: Element>(
    source: &Rc<dyn Reactive<V>>,
    cases: Vec<(&str, Predicate<V>)>,
    match_mode: Match,
) -> HashMap<String, Rc<dyn Reactive<V>>> {
    let mut routes: Vec<(Predicate<V>, Rc<StreamCore<V>>)> = Vec::with_capacity(cases.len());
    let mut outputs = HashMap::with_capacity(cases.len());
    for (label, predicate) in cases {
        let core = StreamCore::<V>::new();
        outputs.insert(label.to_string(), core.clone().as_reactive());
        routes.push((predicate, core));
    }

    // once every case stream is gone, detach from the source
    let gone = Rc::new(Cell::new(0usize));
    let total = routes.len();
    let upstream: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
    for (_, core) in &routes {
        let gone = gone.clone();
        let upstream = upstream.clone();
        core.add_disposer(move |_| {
            gone.set(gone.get() + 1);
            if gone.get() == total {
                if let Some(sub) = upstream.borrow_mut().take() {
                    sub.unsubscribe();
                }
            }
        });
    }

    let sub = source.on(Box::new(move |message| match message {
        Message::Value(value) => {
            for (predicate, core) in &routes {
                if predicate(value) {
                    if !core.is_disposed() {
                        let _ = core.set(value.clone());
                    }
                    if match_mode == Match::First {
                        break;
                    }
                }
            }
        }
        Message::Signal(Signal::Done { reason }) => {
            for (_, core) in &routes {
                core.dispose(reason);
            }
        }
        Message::Signal(Signal::Warn { message }) => {
            for (_, core) in &routes {
                core.warn(message);
            }
        }
    }));
    *upstream.borrow_mut() = Some(sub);
    outputs
}
