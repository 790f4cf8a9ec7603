use crate::dispatch::{DispatchList, Subscription};
use crate::error::StreamError;
use crate::stream::{Element, Lazy, Message, Reactive, Signal, Writable};

use log::debug;
use scopeguard::guard;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

struct Producer {
    lazy: Lazy,
    started: bool,
    // an Initial producer is never restarted after going idle
    retired: bool,
    start: Option<Rc<dyn Fn()>>,
    stop: Option<Rc<dyn Fn()>>,
}

struct CoreState<V> {
    last: Option<V>,
    disposed: Option<String>,
    notifying: bool,
    pending: VecDeque<V>,
    producer: Producer,
    disposers: Vec<Box<dyn FnOnce(&str)>>,
}

/// The reactive stream engine: a last-value cache, one dispatch list of
/// value subscribers and one of message subscribers, and an optional backing
/// producer governed by a [Lazy] policy.
///
/// `set` notifies synchronously, so observers see values in strict emission
/// order; a re-entrant `set` from inside a handler queues behind the pass in
/// progress.  Disposal is idempotent and cascades to derived streams the
/// core owns.
pub struct StreamCore<V: Element> {
    me: Weak<StreamCore<V>>,
    values: DispatchList<V>,
    messages: DispatchList<Message<V>>,
    state: RefCell<CoreState<V>>,
}

impl<V: Element> StreamCore<V> {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            values: DispatchList::new(),
            messages: DispatchList::new(),
            state: RefCell::new(CoreState {
                last: None,
                disposed: None,
                notifying: false,
                pending: VecDeque::new(),
                producer: Producer {
                    lazy: Lazy::Never,
                    started: false,
                    retired: false,
                    start: None,
                    stop: None,
                },
                disposers: Vec::new(),
            }),
        })
    }

    /// Installs the backing producer.  `Never` and `Initial` producers start
    /// here and now; a `Very` producer waits for the first subscriber.
    pub(crate) fn set_producer(
        &self,
        lazy: Lazy,
        start: impl Fn() + 'static,
        stop: impl Fn() + 'static,
    ) {
        let start_now = {
            let mut state = self.state.borrow_mut();
            let producer = &mut state.producer;
            producer.lazy = lazy;
            producer.start = Some(Rc::new(start));
            producer.stop = Some(Rc::new(stop));
            if lazy == Lazy::Very {
                false
            } else {
                producer.started = true;
                true
            }
        };
        if start_now {
            let start = self.state.borrow().producer.start.clone();
            if let Some(start) = start {
                start();
            }
        }
    }

    /// Registers a teardown to run when this stream disposes; used to
    /// cascade disposal into derived streams this one owns.
    pub(crate) fn add_disposer(&self, disposer: impl FnOnce(&str) + 'static) {
        self.state.borrow_mut().disposers.push(Box::new(disposer));
    }

    /// Emits an advisory [Signal::Warn] to message subscribers.  The stream
    /// stays live.  No-op once disposed.
    pub fn warn(&self, message: &str) {
        if self.is_disposed() {
            return;
        }
        self.messages.notify(&Message::Signal(Signal::Warn {
            message: message.to_string(),
        }));
    }

    pub fn dispose_reason(&self) -> Option<String> {
        self.state.borrow().disposed.clone()
    }

    fn subscriber_count(&self) -> usize {
        self.values.len() + self.messages.len()
    }

    fn producer_on_subscribe(&self) {
        let start = {
            let mut state = self.state.borrow_mut();
            let producer = &mut state.producer;
            if producer.started || producer.retired || producer.lazy != Lazy::Very {
                None
            } else {
                producer.started = true;
                producer.start.clone()
            }
        };
        if let Some(start) = start {
            start();
        }
    }

    fn producer_on_idle(&self) {
        if self.subscriber_count() > 0 {
            return;
        }
        let stop = {
            let mut state = self.state.borrow_mut();
            let producer = &mut state.producer;
            if !producer.started || producer.lazy == Lazy::Never {
                None
            } else {
                producer.started = false;
                if producer.lazy == Lazy::Initial {
                    producer.retired = true;
                }
                producer.stop.clone()
            }
        };
        if let Some(stop) = stop {
            stop();
        }
    }

    fn deliver(&self, value: V) {
        self.state.borrow_mut().last = Some(value.clone());
        self.values.notify(&value);
        self.messages.notify(&Message::Value(value));
    }
}

impl<V: Element> Reactive<V> for StreamCore<V> {
    fn on(&self, handler: Box<dyn FnMut(&Message<V>)>) -> Subscription {
        if self.is_disposed() {
            return Subscription::noop();
        }
        self.producer_on_subscribe();
        let id = self.messages.add(handler);
        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(core) = me.upgrade() {
                core.messages.remove(id);
                core.producer_on_idle();
            }
        })
    }

    fn on_value(&self, handler: Box<dyn FnMut(&V)>) -> Subscription {
        if self.is_disposed() {
            return Subscription::noop();
        }
        self.producer_on_subscribe();
        let id = self.values.add(handler);
        let me = self.me.clone();
        Subscription::new(move || {
            if let Some(core) = me.upgrade() {
                core.values.remove(id);
                core.producer_on_idle();
            }
        })
    }

    fn last(&self) -> Option<V> {
        self.state.borrow().last.clone()
    }

    fn is_disposed(&self) -> bool {
        self.state.borrow().disposed.is_some()
    }

    fn dispose(&self, reason: &str) {
        let (stop, disposers) = {
            let mut state = self.state.borrow_mut();
            if state.disposed.is_some() {
                return;
            }
            state.disposed = Some(reason.to_string());
            state.pending.clear();
            let producer = &mut state.producer;
            let stop = if producer.started {
                producer.started = false;
                producer.stop.clone()
            } else {
                None
            };
            (stop, std::mem::take(&mut state.disposers))
        };
        debug!(target: "rill", "stream disposed: {reason}");
        self.messages.notify(&Message::Signal(Signal::Done {
            reason: reason.to_string(),
        }));
        self.values.clear();
        self.messages.clear();
        if let Some(stop) = stop {
            stop();
        }
        for disposer in disposers {
            disposer(reason);
        }
    }
}

impl<V: Element> Writable<V> for StreamCore<V> {
    fn set(&self, value: V) -> Result<(), StreamError> {
        {
            let mut state = self.state.borrow_mut();
            if let Some(reason) = &state.disposed {
                return Err(StreamError::Disposed {
                    reason: reason.clone(),
                });
            }
            if state.notifying {
                state.pending.push_back(value);
                return Ok(());
            }
            state.notifying = true;
        }
        let pass = guard(self, |core| {
            core.state.borrow_mut().notifying = false;
        });
        pass.deliver(value);
        loop {
            let next = {
                let mut state = pass.state.borrow_mut();
                if state.disposed.is_some() {
                    break;
                }
                state.pending.pop_front()
            };
            match next {
                Some(queued) => pass.deliver(queued),
                None => break,
            }
        }
        Ok(())
    }
}
