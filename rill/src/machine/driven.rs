use crate::dispatch::{DispatchList, Subscription};
use crate::error::MachineError;
use crate::machine::{self, MachineDescription, MachineState};
use crate::scheduler::{Scheduler, TaskId};
use crate::time::NanoTime;

use log::debug;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Payload of a change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateChange {
    pub prior: String,
    pub current: String,
}

struct DrivenInner {
    state: MachineState,
    initial: MachineState,
    changed_at: NanoTime,
    pending_stop: Option<TaskId>,
    stop_latched: bool,
}

/// Wraps the pure machine with event delivery.  Change and stop
/// notifications are never synchronous with the transition: they are posted
/// to the [Scheduler] as deferred tasks, so assigning a new state from
/// inside a change handler cannot recurse.  A stop notification pending
/// delivery is cancelled by [DrivenMachine::reset].
pub struct DrivenMachine {
    scheduler: Rc<Scheduler>,
    inner: RefCell<DrivenInner>,
    changes: DispatchList<StateChange>,
    stops: DispatchList<String>,
}

impl DrivenMachine {
    pub fn new(
        scheduler: Rc<Scheduler>,
        machine: Rc<MachineDescription>,
        initial: Option<&str>,
    ) -> Result<Rc<Self>, MachineError> {
        let state = machine::init(machine, initial)?;
        let changed_at = scheduler.now();
        Ok(Rc::new(Self {
            scheduler,
            inner: RefCell::new(DrivenInner {
                initial: state.clone(),
                state,
                changed_at,
                pending_stop: None,
                stop_latched: false,
            }),
            changes: DispatchList::new(),
            stops: DispatchList::new(),
        }))
    }

    /// Name of the current state.
    pub fn state(&self) -> String {
        self.inner.borrow().state.value().to_string()
    }

    /// Legal next states from the current state, in description order.
    pub fn possible(&self) -> Vec<String> {
        machine::possible(&self.inner.borrow().state).to_vec()
    }

    pub fn is_done(&self) -> bool {
        machine::done(&self.inner.borrow().state)
    }

    /// Time of the last successful transition on the scheduler clock.
    pub fn changed_at(&self) -> NanoTime {
        self.inner.borrow().changed_at
    }

    /// Time since the last successful transition.
    pub fn elapsed(&self) -> Duration {
        self.scheduler.now().since(self.changed_at())
    }

    /// Transitions to `target`.  Setting the current state again is a silent
    /// no-op.  An invalid transition is a synchronous error, never an event.
    pub fn set_state(self: &Rc<Self>, target: &str) -> Result<(), MachineError> {
        let (change, became_done) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.value() == target {
                return Ok(());
            }
            let next = machine::to(&inner.state, target)?;
            let prior = inner.state.value().to_string();
            debug!(target: "rill", "machine transition {prior} -> {target}");
            inner.state = next;
            inner.changed_at = self.scheduler.now();
            let became_done = machine::done(&inner.state) && !inner.stop_latched;
            if became_done {
                inner.stop_latched = true;
            }
            (
                StateChange {
                    prior,
                    current: target.to_string(),
                },
                became_done,
            )
        };
        let weak = Rc::downgrade(self);
        self.scheduler.defer(move || {
            if let Some(machine) = weak.upgrade() {
                machine.changes.notify(&change);
            }
        });
        if became_done {
            self.post_stop();
        }
        Ok(())
    }

    fn post_stop(self: &Rc<Self>) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let id = self.scheduler.defer(move || {
            if let Some(machine) = weak.upgrade() {
                machine.inner.borrow_mut().pending_stop = None;
                let terminal = machine.state();
                debug!(target: "rill", "machine stopped at {terminal}");
                machine.stops.notify(&terminal);
            }
        });
        self.inner.borrow_mut().pending_stop = Some(id);
    }

    /// Transitions to the first possible state.  Returns the new state name,
    /// or None at a terminal state.  Never fails.
    pub fn next(self: &Rc<Self>) -> Result<Option<String>, MachineError> {
        let target = match self.possible().first() {
            Some(target) => target.clone(),
            None => return Ok(None),
        };
        self.set_state(&target)?;
        Ok(Some(target))
    }

    /// Restores the construction-time snapshot, clears the done latch and the
    /// elapsed counter, and cancels any stop notification not yet delivered.
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(id) = inner.pending_stop.take() {
            self.scheduler.cancel(id);
        }
        inner.state = inner.initial.clone();
        inner.stop_latched = false;
        inner.changed_at = self.scheduler.now();
        debug!(target: "rill", "machine reset to {}", inner.state.value());
    }

    pub fn on_change(self: &Rc<Self>, handler: impl FnMut(&StateChange) + 'static) -> Subscription {
        let id = self.changes.add(handler);
        let weak = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(machine) = weak.upgrade() {
                machine.changes.remove(id);
            }
        })
    }

    /// Fired once, with the terminal state name, when the machine becomes
    /// done.  A reset before delivery cancels the notification.
    pub fn on_stop(self: &Rc<Self>, handler: impl FnMut(&String) + 'static) -> Subscription {
        let id = self.stops.add(handler);
        let weak = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(machine) = weak.upgrade() {
                machine.stops.remove(id);
            }
        })
    }
}
