//! A string-named state machine.
//!
//! A [MachineDescription] maps each state to the states legally reachable
//! from it.  Transitions are pure: [to] consumes nothing and returns a fresh
//! [MachineState] snapshot, so callers own independent immutable snapshots
//! and swap references on transition.  [driven::DrivenMachine] wraps this
//! core with asynchronous change/stop notifications.

mod driven;

pub use driven::{DrivenMachine, StateChange};

use crate::error::MachineError;

use std::collections::HashMap;
use std::rc::Rc;

/// Legal next states for one state of a [MachineDescription].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    /// Exactly one legal next state.
    One(String),
    /// Several legal next states; the first entry is the deterministic
    /// tie-break for "just go to the next state".
    Any(Vec<String>),
    /// No legal next state.
    Terminal,
}

impl Next {
    fn targets(&self) -> &[String] {
        match self {
            Next::One(target) => std::slice::from_ref(target),
            Next::Any(targets) => targets.as_slice(),
            Next::Terminal => &[],
        }
    }
}

impl From<&str> for Next {
    fn from(target: &str) -> Self {
        Next::One(target.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for Next {
    fn from(targets: [&str; N]) -> Self {
        Next::Any(targets.iter().map(|t| t.to_string()).collect())
    }
}

/// An immutable mapping from state name to its legal next states.
/// Declaration order is preserved: the first state is the default initial
/// state.  Transition targets are validated lazily, at transition time.
#[derive(Debug)]
pub struct MachineDescription {
    order: Vec<String>,
    states: HashMap<String, Next>,
}

impl MachineDescription {
    pub fn new(entries: impl IntoIterator<Item = (impl Into<String>, Next)>) -> Rc<Self> {
        let mut order = Vec::new();
        let mut states = HashMap::new();
        for (name, next) in entries {
            let name = name.into();
            if states.insert(name.clone(), next).is_none() {
                order.push(name);
            }
        }
        Rc::new(Self { order, states })
    }

    pub fn contains(&self, state: &str) -> bool {
        self.states.contains_key(state)
    }

    pub fn first_state(&self) -> Option<&str> {
        self.order.first().map(String::as_str)
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn next_of(&self, state: &str) -> Result<&Next, MachineError> {
        self.states
            .get(state)
            .ok_or_else(|| MachineError::UnknownState(state.to_string()))
    }
}

/// An immutable snapshot of a machine at one state.  Cloning it is the
/// defensive copy used to support reset.
#[derive(Clone, Debug)]
pub struct MachineState {
    value: String,
    machine: Rc<MachineDescription>,
}

impl MachineState {
    /// Name of the current state.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn machine(&self) -> &Rc<MachineDescription> {
        &self.machine
    }
}

/// Creates the initial [MachineState].  When `initial` is omitted the first
/// declared state is used.  An explicit unknown initial state is an error.
pub fn init(
    machine: Rc<MachineDescription>,
    initial: Option<&str>,
) -> Result<MachineState, MachineError> {
    let value = match initial {
        Some(name) => {
            if !machine.contains(name) {
                return Err(MachineError::UnknownState(name.to_string()));
            }
            name.to_string()
        }
        None => machine
            .first_state()
            .ok_or(MachineError::EmptyDescription)?
            .to_string(),
    };
    Ok(MachineState { value, machine })
}

/// Legal next states from the current state, in description order.
/// Empty iff the state is terminal.
pub fn possible(state: &MachineState) -> &[String] {
    state
        .machine
        .next_of(&state.value)
        .map(Next::targets)
        .unwrap_or(&[])
}

/// True iff no transitions are possible from the current state.
pub fn done(state: &MachineState) -> bool {
    possible(state).is_empty()
}

pub fn is_valid_transition(state: &MachineState, target: &str) -> bool {
    validate_transition(state, target).is_ok()
}

/// Distinguishes unknown target state, terminal current state and a target
/// that is simply not reachable from here.
pub fn validate_transition(state: &MachineState, target: &str) -> Result<(), MachineError> {
    if !state.machine.contains(target) {
        return Err(MachineError::UnknownState(target.to_string()));
    }
    let targets = possible(state);
    if targets.is_empty() {
        return Err(MachineError::Terminal(state.value.clone()));
    }
    if targets.iter().any(|t| t == target) {
        Ok(())
    } else {
        Err(MachineError::Unreachable {
            from: state.value.clone(),
            to: target.to_string(),
            possible: targets.to_vec(),
        })
    }
}

/// Pure transition: returns a new snapshot at `target`, or fails per
/// [validate_transition].  The input snapshot is untouched.
pub fn to(state: &MachineState, target: &str) -> Result<MachineState, MachineError> {
    validate_transition(state, target)?;
    Ok(MachineState {
        value: target.to_string(),
        machine: state.machine.clone(),
    })
}

/// Transitions to the first possible state, or returns None at a terminal
/// state.  Does not fail.
pub fn forward(state: &MachineState) -> Option<MachineState> {
    let target = possible(state).first()?.clone();
    Some(MachineState {
        value: target,
        machine: state.machine.clone(),
    })
}
