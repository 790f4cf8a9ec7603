use crate::scheduler::Scheduler;
use crate::stream::core::StreamCore;
use crate::stream::{Element, Message, Reactive, Signal, Writable};
use crate::time::NanoTime;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Derives a leading-edge rate-limited stream: the first value in a window
/// passes immediately, later values within the window are dropped.
/// Used by [throttle](crate::stream::ReactiveOperators::throttle).
pub(crate) fn throttle<V: Element>(
    source: &Rc<dyn Reactive<V>>,
    scheduler: &Rc<Scheduler>,
    window: Duration,
) -> Rc<dyn Reactive<V>> {
    let out = StreamCore::<V>::new();
    let sink = out.clone();
    let clock = scheduler.clone();
    let window: NanoTime = window.into();
    let last_emit: Cell<Option<NanoTime>> = Cell::new(None);
    let sub = source.on(Box::new(move |message| match message {
        Message::Value(value) => {
            let now = clock.now();
            let open = match last_emit.get() {
                None => true,
                Some(last) => now - last >= window,
            };
            if open {
                last_emit.set(Some(now));
                let _ = sink.set(value.clone());
            }
        }
        Message::Signal(Signal::Done { reason }) => sink.dispose(reason),
        Message::Signal(Signal::Warn { message }) => sink.warn(message),
    }));
    out.add_disposer(move |_| sub.unsubscribe());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{AsReactive, ReactiveOperators, manual};
    use std::cell::RefCell;

    #[test]
    fn throttle_suppresses_fast_values() {
        // Values land every 10ns, window is 25ns:
        // t=0 emit, t=10 drop, t=20 drop, t=30 emit, t=40 drop, t=50 drop, t=60 emit
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let source = manual::<u64>();
        let throttled = source
            .clone()
            .as_reactive()
            .throttle(&scheduler, Duration::from_nanos(25));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = throttled.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        for i in 0..7u64 {
            source.set(i + 1).unwrap();
            scheduler.run_for(Duration::from_nanos(10));
        }
        assert_eq!(*seen.borrow(), vec![1, 4, 7]);
    }

    #[test]
    fn throttle_zero_window_passes_all() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let source = manual::<u64>();
        let throttled = source
            .clone()
            .as_reactive()
            .throttle(&scheduler, Duration::ZERO);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = throttled.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        for i in 1..=3u64 {
            source.set(i).unwrap();
        }
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn throttle_exact_window_boundary_emits() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let source = manual::<u64>();
        let throttled = source
            .clone()
            .as_reactive()
            .throttle(&scheduler, Duration::from_nanos(10));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = throttled.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        for i in 1..=3u64 {
            source.set(i).unwrap();
            scheduler.run_for(Duration::from_nanos(10));
        }
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }
}
