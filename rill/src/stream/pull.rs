use crate::scheduler::{AbortFlag, Scheduler, TaskId};
use crate::stream::core::StreamCore;
use crate::stream::{Element, Lazy, Reactive, Writable};
use crate::time::NanoTime;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use strum_macros::Display;

/// One read from a [PullSource].
#[derive(Debug)]
pub enum Pull<V> {
    /// A value is available.
    Ready(V),
    /// Nothing yet; the source may produce later.
    Pending,
    /// The source is exhausted and will never produce again.
    Done,
}

/// Anything that can be polled for values.  Every [Iterator] is a
/// `PullSource` that never goes [Pull::Pending].
pub trait PullSource<V: Element> {
    fn pull(&mut self) -> Pull<V>;
}

impl<V: Element, I: Iterator<Item = V>> PullSource<V> for I {
    fn pull(&mut self) -> Pull<V> {
        match self.next() {
            Some(value) => Pull::Ready(value),
            None => Pull::Done,
        }
    }
}

/// What a lazy [pull] stream does with its source when the last subscriber
/// leaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WhenStopped {
    /// Keep the source; resume where it left off on restart.
    #[default]
    Continue,
    /// Drop the source; a restart rebuilds it from the factory.
    Reset,
}

#[derive(Clone)]
pub struct PullOptions {
    pub lazy: Lazy,
    /// Delay between reads.
    pub read_interval: Duration,
    /// Dispose with "read timeout" after this long of consecutive
    /// [Pull::Pending] reads.  `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub when_stopped: WhenStopped,
    /// Cooperative shutdown; an aborted flag disposes the stream with the
    /// abort reason on the next read.
    pub abort: Option<AbortFlag>,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            lazy: Lazy::Very,
            read_interval: Duration::ZERO,
            read_timeout: None,
            when_stopped: WhenStopped::default(),
            abort: None,
        }
    }
}

struct PullState<S> {
    source: Option<S>,
    timer: Option<TaskId>,
    pending_since: Option<NanoTime>,
}

/// Adapts a polled source into a stream.  Reads happen on the scheduler at
/// `read_interval`; the stream disposes itself when the source reports
/// [Pull::Done], when the pending timeout lapses, or when the abort flag
/// trips.  The factory is invoked lazily, and again after a
/// [WhenStopped::Reset] restart.
pub fn pull<V: Element, S: PullSource<V> + 'static>(
    scheduler: &Rc<Scheduler>,
    factory: impl Fn() -> S + 'static,
    options: PullOptions,
) -> Rc<dyn Reactive<V>> {
    let core = StreamCore::<V>::new();
    let state = Rc::new(RefCell::new(PullState::<S> {
        source: None,
        timer: None,
        pending_since: None,
    }));
    let factory: Rc<dyn Fn() -> S> = Rc::new(factory);
    let lazy = options.lazy;

    let start = {
        let scheduler = scheduler.clone();
        let sink = Rc::downgrade(&core);
        let state = state.clone();
        let factory = factory.clone();
        let options = options.clone();
        move || schedule_read(&scheduler, &sink, &state, &factory, &options)
    };

    let stop = {
        let scheduler = scheduler.clone();
        let state = state.clone();
        let when_stopped = options.when_stopped;
        move || {
            let mut state = state.borrow_mut();
            if let Some(timer) = state.timer.take() {
                scheduler.cancel(timer);
            }
            state.pending_since = None;
            if when_stopped == WhenStopped::Reset {
                state.source = None;
            }
        }
    };

    core.set_producer(lazy, start, stop);
    core
}

fn schedule_read<V: Element, S: PullSource<V> + 'static>(
    scheduler: &Rc<Scheduler>,
    sink: &Weak<StreamCore<V>>,
    state: &Rc<RefCell<PullState<S>>>,
    factory: &Rc<dyn Fn() -> S>,
    options: &PullOptions,
) {
    let tick = {
        let scheduler = scheduler.clone();
        let sink = sink.clone();
        let state = state.clone();
        let factory = factory.clone();
        let options = options.clone();
        move || {
            let Some(core) = sink.upgrade() else { return };
            if core.is_disposed() {
                return;
            }
            if let Some(flag) = &options.abort {
                if let Some(reason) = flag.reason() {
                    core.dispose(&reason);
                    return;
                }
            }
            let read = {
                let mut state = state.borrow_mut();
                state.timer = None;
                let factory = factory.as_ref();
                state.source.get_or_insert_with(factory).pull()
            };
            match read {
                Pull::Ready(value) => {
                    state.borrow_mut().pending_since = None;
                    if core.set(value).is_err() {
                        return;
                    }
                    schedule_read(&scheduler, &sink, &state, &factory, &options);
                }
                Pull::Pending => {
                    let now = scheduler.now();
                    let since = *state.borrow_mut().pending_since.get_or_insert(now);
                    if let Some(timeout) = options.read_timeout {
                        if now.since(since) >= timeout {
                            core.dispose("read timeout");
                            return;
                        }
                    }
                    schedule_read(&scheduler, &sink, &state, &factory, &options);
                }
                Pull::Done => core.dispose("source exhausted"),
            }
        }
    };
    let id = scheduler.schedule_in(options.read_interval, tick);
    state.borrow_mut().timer = Some(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<V: Element>(stream: &Rc<dyn Reactive<V>>) -> Rc<RefCell<Vec<V>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = stream.on_value(Box::new(move |v| sink.borrow_mut().push(v.clone())));
        seen
    }

    fn eager_every_10ns() -> PullOptions {
        PullOptions {
            lazy: Lazy::Never,
            read_interval: Duration::from_nanos(10),
            ..PullOptions::default()
        }
    }

    #[test]
    fn drains_an_iterator_then_disposes() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let stream = pull(&scheduler, || 1..=3u32, eager_every_10ns());
        let seen = collect(&stream);
        scheduler.run_until_idle();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
        assert!(stream.is_disposed());
    }

    #[test]
    fn lazy_stream_reads_nothing_without_subscribers() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let stream = pull(
            &scheduler,
            || 1..=3u32,
            PullOptions {
                read_interval: Duration::from_nanos(10),
                ..PullOptions::default()
            },
        );
        scheduler.run_until_idle();
        assert_eq!(stream.last(), None);
        let seen = collect(&stream);
        scheduler.run_until_idle();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn reset_restarts_from_the_factory() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let stream = pull(
            &scheduler,
            || 1..=9u32,
            PullOptions {
                read_interval: Duration::from_nanos(10),
                when_stopped: WhenStopped::Reset,
                ..PullOptions::default()
            },
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = stream.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        scheduler.run_for(Duration::from_nanos(25));
        sub.unsubscribe();
        assert_eq!(*seen.borrow(), vec![1, 2]);
        let sink = seen.clone();
        let _sub = stream.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        scheduler.run_for(Duration::from_nanos(25));
        assert_eq!(*seen.borrow(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn continue_resumes_where_it_left_off() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let stream = pull(
            &scheduler,
            || 1..=9u32,
            PullOptions {
                read_interval: Duration::from_nanos(10),
                when_stopped: WhenStopped::Continue,
                ..PullOptions::default()
            },
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = stream.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        scheduler.run_for(Duration::from_nanos(25));
        sub.unsubscribe();
        let sink = seen.clone();
        let _sub = stream.on_value(Box::new(move |v| sink.borrow_mut().push(*v)));
        scheduler.run_for(Duration::from_nanos(25));
        assert_eq!(*seen.borrow(), vec![1, 2, 3, 4]);
    }

    struct NeverReady;

    impl PullSource<u32> for NeverReady {
        fn pull(&mut self) -> Pull<u32> {
            Pull::Pending
        }
    }

    #[test]
    fn consecutive_pending_reads_time_out() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let stream = pull(
            &scheduler,
            || NeverReady,
            PullOptions {
                read_timeout: Some(Duration::from_nanos(30)),
                ..eager_every_10ns()
            },
        );
        scheduler.run_until_idle();
        assert!(stream.is_disposed());
        assert_eq!(stream.last(), None);
    }

    struct Stutter {
        reads: u32,
    }

    impl PullSource<u32> for Stutter {
        // pending twice, then a value, repeating
        fn pull(&mut self) -> Pull<u32> {
            self.reads += 1;
            if self.reads % 3 == 0 {
                Pull::Ready(self.reads)
            } else {
                Pull::Pending
            }
        }
    }

    #[test]
    fn a_value_resets_the_pending_timeout() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let stream = pull(
            &scheduler,
            || Stutter { reads: 0 },
            PullOptions {
                read_timeout: Some(Duration::from_nanos(25)),
                ..eager_every_10ns()
            },
        );
        let seen = collect(&stream);
        scheduler.run_for(Duration::from_nanos(100));
        assert!(!stream.is_disposed());
        assert_eq!(*seen.borrow(), vec![3, 6, 9]);
    }

    #[test]
    fn abort_disposes_with_the_abort_reason() {
        let scheduler = Scheduler::historical(NanoTime::ZERO);
        let abort = AbortFlag::new();
        let stream = pull(
            &scheduler,
            || 1..=100u32,
            PullOptions {
                abort: Some(abort.clone()),
                ..eager_every_10ns()
            },
        );
        let seen = collect(&stream);
        let done = Rc::new(RefCell::new(None));
        let reason_sink = done.clone();
        let _sub = stream.on(Box::new(move |message| {
            if let crate::stream::Message::Signal(crate::stream::Signal::Done { reason }) = message
            {
                *reason_sink.borrow_mut() = Some(reason.clone());
            }
        }));
        scheduler.run_for(Duration::from_nanos(25));
        abort.abort("operator shutdown");
        scheduler.run_until_idle();
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert!(stream.is_disposed());
        assert_eq!(done.borrow().as_deref(), Some("operator shutdown"));
    }
}
