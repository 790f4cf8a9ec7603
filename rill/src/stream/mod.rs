//! The push-based reactive stream core and its operator library.
//!
//! Streams are shared as `Rc<dyn Reactive<V>>`.  Operators live on the
//! [ReactiveOperators] extension trait so pipelines read as method chains;
//! each stage derives a new stream that the upstream owns for disposal
//! cascading.

mod bridge;
mod core;
mod event;
mod filter;
mod object;
mod primitives;
mod pull;
mod switcher;
mod throttle;
mod transform;

pub use self::core::StreamCore;
pub use bridge::{Stage, pipe, to};
pub use event::{Trigger, TriggerOptions, event, event_by_name, event_trigger};
pub use object::{Change, ObjectStream, object};
pub use primitives::{PrimitiveStream, boolean, number, primitive, string};
pub use pull::{Pull, PullOptions, PullSource, WhenStopped, pull};
pub use switcher::{Match, Predicate, switcher};

use crate::dispatch::Subscription;
use crate::error::StreamError;
use crate::scheduler::Scheduler;

use log::Level;
use std::fmt::Debug;
use std::rc::Rc;
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Values carried by streams are constrained by this trait.  Wrap large
/// structs in an [Rc](std::rc::Rc) so they clone cheaply.
pub trait Element: Debug + Clone + 'static {}

impl<T> Element for T where T: Debug + Clone + 'static {}

/// A control signal carried by a [Message].
#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum Signal {
    /// Terminal.  No value messages follow.
    Done { reason: String },
    /// Advisory.  The stream stays live.
    Warn { message: String },
}

/// What subscribers registered with [Reactive::on] receive: either a data
/// value or a control signal.
#[derive(Clone, Debug, PartialEq)]
pub enum Message<V> {
    Value(V),
    Signal(Signal),
}

/// When a source-backed stream starts (and stops) its underlying producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Lazy {
    /// Producer starts at construction and runs until disposal.
    Never,
    /// Producer starts at construction, stops when the last subscriber
    /// detaches, and is not restarted.
    Initial,
    /// Producer starts when the first subscriber attaches and stops when the
    /// last one detaches; it restarts on resubscription.
    Very,
}

/// The subscribable face of a stream.
pub trait Reactive<V: Element> {
    /// Subscribes to full messages, values and signals both.
    fn on(&self, handler: Box<dyn FnMut(&Message<V>)>) -> Subscription;
    /// Subscribes to data values only; signals are filtered out.
    fn on_value(&self, handler: Box<dyn FnMut(&V)>) -> Subscription;
    /// The cached last value, if the stream has seen one.
    fn last(&self) -> Option<V>;
    fn is_disposed(&self) -> bool;
    /// Idempotent.  Delivers one terminal [Signal::Done] to current message
    /// subscribers, clears all subscriptions and cascades to owned
    /// downstream streams.
    fn dispose(&self, reason: &str);
}

/// A stream that accepts externally produced values.
pub trait Writable<V: Element>: Reactive<V> {
    /// Caches the value, then notifies value subscribers and message
    /// subscribers, in registration order.  Fails once disposed.
    fn set(&self, value: V) -> Result<(), StreamError>;
}

/// Consumes a concrete stream and returns it as `Rc<dyn Reactive<V>>`.
pub trait AsReactive<V: Element> {
    fn as_reactive(self: Rc<Self>) -> Rc<dyn Reactive<V>>;
}

impl<V: Element, S: Reactive<V> + 'static> AsReactive<V> for S {
    fn as_reactive(self: Rc<Self>) -> Rc<dyn Reactive<V>> {
        self
    }
}

/// Consumes a concrete writable stream and returns it as
/// `Rc<dyn Writable<V>>`.
pub trait AsWritable<V: Element> {
    fn as_writable(self: Rc<Self>) -> Rc<dyn Writable<V>>;
}

impl<V: Element, S: Writable<V> + 'static> AsWritable<V> for S {
    fn as_writable(self: Rc<Self>) -> Rc<dyn Writable<V>> {
        self
    }
}

/// A bare writable stream with no backing producer.  The baseline building
/// block the other sources compose with.
pub fn manual<V: Element>() -> Rc<StreamCore<V>> {
    StreamCore::new()
}

/// Operators that can be chained onto any stream.
pub trait ReactiveOperators<V: Element> {
    /// Maps each value through `func`, one to one, synchronously.
    fn transform<O: Element>(
        self: &Rc<Self>,
        func: impl Fn(V) -> O + 'static,
    ) -> Rc<dyn Reactive<O>>;

    /// Like [transform](ReactiveOperators::transform), but a failed mapping
    /// is fatal: the derived stream disposes with the error as its reason.
    fn try_transform<O: Element>(
        self: &Rc<Self>,
        func: impl Fn(V) -> anyhow::Result<O> + 'static,
    ) -> Rc<dyn Reactive<O>>;

    /// Forwards only values for which the predicate holds; the rest are
    /// silently dropped.
    fn filter(self: &Rc<Self>, predicate: impl Fn(&V) -> bool + 'static) -> Rc<dyn Reactive<V>>;

    /// Like [filter](ReactiveOperators::filter), but a failed predicate is
    /// fatal to the derived stream.
    fn try_filter(
        self: &Rc<Self>,
        predicate: impl Fn(&V) -> anyhow::Result<bool> + 'static,
    ) -> Rc<dyn Reactive<V>>;

    /// Leading-edge rate limit: the first value in a window passes
    /// immediately, later values within the window are dropped.
    fn throttle(
        self: &Rc<Self>,
        scheduler: &Rc<Scheduler>,
        window: Duration,
    ) -> Rc<dyn Reactive<V>>;

    /// Logs each value at `level` and propagates it unchanged.
    fn logged(self: &Rc<Self>, label: &str, level: Level) -> Rc<dyn Reactive<V>>;
}

impl<V: Element> ReactiveOperators<V> for dyn Reactive<V> {
    fn transform<O: Element>(
        self: &Rc<Self>,
        func: impl Fn(V) -> O + 'static,
    ) -> Rc<dyn Reactive<O>> {
        transform::transform(self, func)
    }

    fn try_transform<O: Element>(
        self: &Rc<Self>,
        func: impl Fn(V) -> anyhow::Result<O> + 'static,
    ) -> Rc<dyn Reactive<O>> {
        transform::try_transform(self, func)
    }

    fn filter(self: &Rc<Self>, predicate: impl Fn(&V) -> bool + 'static) -> Rc<dyn Reactive<V>> {
        filter::filter(self, predicate)
    }

    fn try_filter(
        self: &Rc<Self>,
        predicate: impl Fn(&V) -> anyhow::Result<bool> + 'static,
    ) -> Rc<dyn Reactive<V>> {
        filter::try_filter(self, predicate)
    }

    fn throttle(
        self: &Rc<Self>,
        scheduler: &Rc<Scheduler>,
        window: Duration,
    ) -> Rc<dyn Reactive<V>> {
        throttle::throttle(self, scheduler, window)
    }

    fn logged(self: &Rc<Self>, label: &str, level: Level) -> Rc<dyn Reactive<V>> {
        if log::log_enabled!(level) {
            let label = label.to_string();
            self.transform(move |value| {
                log::log!(target: "rill", level, "{label} {value:?}");
                value
            })
        } else {
            self.clone()
        }
    }
}

impl<V: Element> ReactiveOperators<V> for dyn Writable<V> {
    fn transform<O: Element>(
        self: &Rc<Self>,
        func: impl Fn(V) -> O + 'static,
    ) -> Rc<dyn Reactive<O>> {
        self.upcast().transform(func)
    }
    fn try_transform<O: Element>(
        self: &Rc<Self>,
        func: impl Fn(V) -> anyhow::Result<O> + 'static,
    ) -> Rc<dyn Reactive<O>> {
        self.upcast().try_transform(func)
    }
    fn filter(self: &Rc<Self>, predicate: impl Fn(&V) -> bool + 'static) -> Rc<dyn Reactive<V>> {
        self.upcast().filter(predicate)
    }
    fn try_filter(
        self: &Rc<Self>,
        predicate: impl Fn(&V) -> anyhow::Result<bool> + 'static,
    ) -> Rc<dyn Reactive<V>> {
        self.upcast().try_filter(predicate)
    }
    fn throttle(
        self: &Rc<Self>,
        scheduler: &Rc<Scheduler>,
        window: Duration,
    ) -> Rc<dyn Reactive<V>> {
        self.upcast().throttle(scheduler, window)
    }
    fn logged(self: &Rc<Self>, label: &str, level: Level) -> Rc<dyn Reactive<V>> {
        self.upcast().logged(label, level)
    }
}

/// Upcasts `Rc<dyn Writable<V>>` to its [Reactive] face.
pub trait Upcast<V: Element> {
    fn upcast(self: &Rc<Self>) -> Rc<dyn Reactive<V>>;
}

impl<V: Element> Upcast<V> for dyn Writable<V> {
    fn upcast(self: &Rc<Self>) -> Rc<dyn Reactive<V>> {
        self.clone()
    }
}
