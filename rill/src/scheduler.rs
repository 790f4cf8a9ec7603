//! A single-threaded cooperative scheduler.
//!
//! Streams and the driven state machine never notify re-entrantly from
//! arbitrary call stacks; anything that must be asynchronous is posted here
//! as a deferred task or a timer.  Historical mode advances virtual time
//! instantly to the next due timer, which keeps unit tests deterministic.
//! RealTime mode sleeps until timers fall due.

use crate::time::NanoTime;

use log::trace;
use priority_queue::PriorityQueue;
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// Identifies a deferred task or timer.  Can be used to [Scheduler::cancel]
/// it before it runs.
pub type TaskId = u64;

type Task = Box<dyn FnOnce()>;

/// Whether the [Scheduler] runs against the wall clock or virtual time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RunMode {
    RealTime,
    HistoricalFrom(NanoTime),
}

struct SchedulerInner {
    mode: RunMode,
    now: NanoTime,
    deferred: VecDeque<TaskId>,
    // min-queue on (due time, task id): same-instant timers run in schedule order
    timers: PriorityQueue<TaskId, Reverse<(NanoTime, TaskId)>>,
    tasks: HashMap<TaskId, Task>,
    next_id: TaskId,
}

impl SchedulerInner {
    fn register(&mut self, task: Task) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(id, task);
        id
    }

    fn time(&self) -> NanoTime {
        match self.mode {
            RunMode::RealTime => NanoTime::now(),
            RunMode::HistoricalFrom(_) => self.now,
        }
    }
}

/// The cooperative event loop shared by every time-dependent source and by
/// the driven state machine.
pub struct Scheduler {
    inner: RefCell<SchedulerInner>,
}

impl Scheduler {
    pub fn real_time() -> Rc<Self> {
        Self::with_mode(RunMode::RealTime, NanoTime::now())
    }

    pub fn historical(start: NanoTime) -> Rc<Self> {
        Self::with_mode(RunMode::HistoricalFrom(start), start)
    }

    fn with_mode(mode: RunMode, now: NanoTime) -> Rc<Self> {
        Rc::new(Self {
            inner: RefCell::new(SchedulerInner {
                mode,
                now,
                deferred: VecDeque::new(),
                timers: PriorityQueue::new(),
                tasks: HashMap::new(),
                next_id: 0,
            }),
        })
    }

    /// Current time on the scheduler clock.
    pub fn now(&self) -> NanoTime {
        self.inner.borrow().time()
    }

    /// Enqueues a task to run on the next drain, ahead of any timer.
    pub fn defer(&self, task: impl FnOnce() + 'static) -> TaskId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.register(Box::new(task));
        inner.deferred.push_back(id);
        id
    }

    pub fn schedule_in(&self, delay: Duration, task: impl FnOnce() + 'static) -> TaskId {
        let at = self.now() + delay;
        self.schedule_at(at, task)
    }

    pub fn schedule_at(&self, at: NanoTime, task: impl FnOnce() + 'static) -> TaskId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.register(Box::new(task));
        inner.timers.push(id, Reverse((at, id)));
        id
    }

    /// Cancels a pending task or timer.  Returns false if it already ran or
    /// was already cancelled.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.timers.remove(&id);
        inner.tasks.remove(&id).is_some()
    }

    pub fn has_pending(&self) -> bool {
        let inner = self.inner.borrow();
        !inner.deferred.is_empty() || !inner.timers.is_empty()
    }

    /// Drains deferred tasks and timers until nothing is pending.
    pub fn run_until_idle(&self) {
        self.run(None);
    }

    /// Drains deferred tasks and any timer due within `duration` of the
    /// current time.  Timers beyond the deadline stay queued.  In historical
    /// mode the clock finishes exactly at the deadline.
    pub fn run_for(&self, duration: Duration) {
        let deadline = self.now() + duration;
        self.run(Some(deadline));
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.mode, RunMode::HistoricalFrom(_)) && inner.now < deadline {
            inner.now = deadline;
        }
    }

    fn run(&self, deadline: Option<NanoTime>) {
        loop {
            if self.drain_deferred() {
                continue;
            }
            let next = {
                let mut inner = self.inner.borrow_mut();
                let Some((_, Reverse((at, _)))) = inner.timers.peek() else {
                    return;
                };
                let at = *at;
                if let Some(deadline) = deadline {
                    if at > deadline {
                        return;
                    }
                }
                match inner.mode {
                    RunMode::HistoricalFrom(_) => {
                        if at > inner.now {
                            inner.now = at;
                        }
                    }
                    RunMode::RealTime => {
                        let now = NanoTime::now();
                        if at > now {
                            drop(inner);
                            std::thread::sleep(at.since(now));
                            inner = self.inner.borrow_mut();
                        }
                    }
                }
                match inner.timers.pop() {
                    Some((id, _)) => inner.tasks.remove(&id),
                    None => return,
                }
            };
            if let Some(task) = next {
                trace!(target: "rill", "running timer task");
                task();
            }
        }
    }

    /// Runs queued deferred tasks, including ones enqueued while draining.
    /// Returns true if any ran.
    fn drain_deferred(&self) -> bool {
        let mut ran = false;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                match inner.deferred.pop_front() {
                    Some(id) => inner.tasks.remove(&id),
                    None => break,
                }
            };
            if let Some(task) = next {
                ran = true;
                task();
            }
        }
        ran
    }
}

/// A cooperative cancellation flag handed to timer- and pull-backed sources.
/// Aborting records a reason; the source disposes promptly with that reason.
#[derive(Clone, Default)]
pub struct AbortFlag {
    reason: Rc<RefCell<Option<String>>>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self, reason: &str) {
        let mut slot = self.reason.borrow_mut();
        if slot.is_none() {
            *slot = Some(reason.to_string());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.reason.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.borrow().clone()
    }
}
