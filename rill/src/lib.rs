#![warn(clippy::perf)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_doctest_main)]
#![doc = include_str!("../README.md")]

pub mod dispatch;
pub mod error;
pub mod events;
pub mod machine;
pub mod scheduler;
pub mod stream;
pub mod time;

pub use dispatch::{DispatchList, Subscription, SubscriptionId};
pub use error::{MachineError, StreamError};
pub use events::{Emitter, EventTarget, NamedTargets};
pub use machine::{DrivenMachine, MachineDescription, MachineState, Next, StateChange};
pub use scheduler::{AbortFlag, RunMode, Scheduler, TaskId};
pub use stream::*;
pub use time::NanoTime;
