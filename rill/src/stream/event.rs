use crate::dispatch::SubscriptionId;
use crate::error::StreamError;
use crate::events::{EventTarget, NamedTargets};
use crate::scheduler::Scheduler;
use crate::stream::core::StreamCore;
use crate::stream::{Element, Lazy, Reactive, Writable};
use crate::time::NanoTime;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Turns an event target into a stream of its event payloads.  The listener
/// is attached per the laziness policy and detached when the producer stops
/// or the stream disposes.  Target resolution is always eager; see
/// [event_by_name] for the fail-fast named variant.
pub fn event<E: Element>(
    target: &Rc<dyn EventTarget<E>>,
    initial: Option<E>,
    lazy: Lazy,
) -> Rc<dyn Reactive<E>> {
    let core = StreamCore::<E>::new();
    if let Some(initial) = initial {
        let _ = core.set(initial);
    }
    let listener_id: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));

    let start_target = target.clone();
    let sink = Rc::downgrade(&core);
    let start_id = listener_id.clone();
    let start = move || {
        let sink = sink.clone();
        let id = start_target.add_listener(Box::new(move |event| {
            if let Some(core) = sink.upgrade() {
                let _ = core.set(event.clone());
            }
        }));
        start_id.set(Some(id));
    };

    let stop_target = target.clone();
    let stop = move || {
        if let Some(id) = listener_id.take() {
            stop_target.remove_listener(id);
        }
    };

    core.set_producer(lazy, start, stop);
    core
}

/// Resolves a target by name against a registry, then behaves as [event].
/// An unknown name fails here, at construction.
pub fn event_by_name<E: Element>(
    targets: &NamedTargets<E>,
    name: &str,
    initial: Option<E>,
    lazy: Lazy,
) -> Result<Rc<dyn Reactive<E>>, StreamError> {
    let target = targets.resolve(name)?;
    Ok(event(&target, initial, lazy))
}

/// Emitted by [event_trigger] on every event occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    /// Monotonic occurrence count, starting at 1.
    pub total: u64,
    /// Time since the previous occurrence on the scheduler clock.
    pub since_last: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct TriggerOptions {
    /// Emit one `{ total: 1, since_last: 0 }` immediately, without waiting
    /// for a real event.
    pub fire_initial: bool,
    pub lazy: Lazy,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            fire_initial: false,
            lazy: Lazy::Never,
        }
    }
}

/// Counts event occurrences rather than carrying their payloads.
pub fn event_trigger<E: Element>(
    scheduler: &Rc<Scheduler>,
    target: &Rc<dyn EventTarget<E>>,
    options: TriggerOptions,
) -> Rc<dyn Reactive<Trigger>> {
    let core = StreamCore::<Trigger>::new();
    let total: Rc<Cell<u64>> = Rc::new(Cell::new(0));
    let last_at: Rc<Cell<Option<NanoTime>>> = Rc::new(Cell::new(None));
    if options.fire_initial {
        total.set(1);
        last_at.set(Some(scheduler.now()));
        let _ = core.set(Trigger {
            total: 1,
            since_last: Duration::ZERO,
        });
    }
    let listener_id: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));

    let start_target = target.clone();
    let sink = Rc::downgrade(&core);
    let start_id = listener_id.clone();
    let clock = scheduler.clone();
    let start = move || {
        let sink = sink.clone();
        let total = total.clone();
        let last_at = last_at.clone();
        let clock = clock.clone();
        let id = start_target.add_listener(Box::new(move |_| {
            let now = clock.now();
            total.set(total.get() + 1);
            let since_last = match last_at.replace(Some(now)) {
                Some(previous) => now.since(previous),
                None => Duration::ZERO,
            };
            if let Some(core) = sink.upgrade() {
                let _ = core.set(Trigger {
                    total: total.get(),
                    since_last,
                });
            }
        }));
        start_id.set(Some(id));
    };

    let stop_target = target.clone();
    let stop = move || {
        if let Some(id) = listener_id.take() {
            stop_target.remove_listener(id);
        }
    };

    core.set_producer(options.lazy, start, stop);
    core
}
