//! The holder lifecycle state machine.

use std::{
    fmt,
    sync::{Mutex, RwLock},
};

use serde::Serialize;

use crate::error::{Error, Result};

/// The lifecycle states of a holder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HolderState {
    /// Owned by the pool and available for acquisition.
    InPool,

    /// Checked out and callable.
    Accessible,

    /// Checked out but suspended, typically because the ambient transaction
    /// is suspended.
    NotAccessible,

    /// Terminal; the underlying connections have been released.
    Closed,
}

impl fmt::Display for HolderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HolderState::InPool => "in_pool",
            HolderState::Accessible => "accessible",
            HolderState::NotAccessible => "not_accessible",
            HolderState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Observes transitions of a [`StateMachine`].
///
/// The pre hook runs to completion before the new state becomes visible to
/// any reader; the post hook runs after the change.
pub(crate) trait TransitionListener {
    fn before_transition(&self, old: HolderState, new: HolderState);

    fn after_transition(&self, old: HolderState, new: HolderState);
}

/// Holder state with guarded transitions.
///
/// Reads never wait on a transition in progress; transitions are serialized
/// by a dedicated lock so listener hooks observe them in order.
#[derive(Debug)]
pub(crate) struct StateMachine {
    current: RwLock<HolderState>,
    transition: Mutex<()>,
}

impl StateMachine {
    pub(crate) fn new(initial: HolderState) -> Self {
        Self {
            current: RwLock::new(initial),
            transition: Mutex::new(()),
        }
    }

    pub(crate) fn state(&self) -> HolderState {
        *self.current.read().unwrap()
    }

    /// Drives the machine to `new`, invoking `listener` around the change.
    /// Returns the state that was replaced.
    pub(crate) fn try_transition(
        &self,
        new: HolderState,
        listener: &dyn TransitionListener,
    ) -> Result<HolderState> {
        let _guard = self.transition.lock().unwrap();
        let old = *self.current.read().unwrap();
        if !transition_allowed(old, new) {
            return Err(Error::invalid_transition(old, new));
        }
        listener.before_transition(old, new);
        *self.current.write().unwrap() = new;
        listener.after_transition(old, new);
        Ok(old)
    }
}

/// The transition table. Requests for the current state are rejected;
/// shared re-entry on an accessible holder skips the transition request
/// instead of asking for one.
fn transition_allowed(old: HolderState, new: HolderState) -> bool {
    use HolderState::*;
    matches!(
        (old, new),
        (InPool, Accessible)
            | (Accessible, InPool)
            | (Accessible, NotAccessible)
            | (NotAccessible, Accessible)
            | (InPool, Closed)
            | (Accessible, Closed)
    )
}
