//! Action goal status, events, and the server-side state machine.

pub mod client;
pub mod server;

/// Status of an action goal, shared by client-side bookkeeping and the
/// server-side state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    Unknown = 0,
    Accepted = 1,
    Executing = 2,
    Canceling = 3,
    Succeeded = 4,
    Canceled = 5,
    Aborted = 6,
}

impl GoalStatus {
    /// `Succeeded`, `Canceled` and `Aborted` are terminal: the goal's
    /// slot is released on the next terminal-cleanup sweep.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoalStatus::Succeeded | GoalStatus::Canceled | GoalStatus::Aborted
        )
    }
}

/// Events driving the server-side goal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalEvent {
    Accept,
    Reject,
    Execute,
    CancelGoal,
    Succeed,
    Abort,
    Canceled,
}

/// A transition the state machine refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: GoalStatus,
    pub event: GoalEvent,
}

/// Advances `status` through `event`, or rejects the transition.
///
/// States: `Unknown -> Accepted -> Executing -> {Succeeded, Canceled,
/// Aborted}`, with `Executing -> Canceling -> {Canceled, Aborted,
/// Succeeded}` as the cancel branch.
pub fn transition(
    status: GoalStatus,
    event: GoalEvent,
) -> Result<GoalStatus, IllegalTransition> {
    use GoalEvent::*;
    use GoalStatus::*;
    let next = match (status, event) {
        (Unknown, Accept) => Accepted,
        (Unknown, Reject) => return Err(IllegalTransition { from: status, event }),
        (Accepted, Execute) => Executing,
        (Executing, CancelGoal) => Canceling,
        (Executing, Succeed) => Succeeded,
        (Executing, Abort) => Aborted,
        (Canceling, Canceled) => Canceled,
        (Canceling, Abort) => Aborted,
        (Canceling, Succeed) => Succeeded,
        _ => return Err(IllegalTransition { from: status, event }),
    };
    Ok(next)
}

/// Fixed-capacity free-list pool. The arena-plus-index pattern for goal
/// handles: the pool is owned by the action endpoint's binding; goal
/// handles never outlive it and never own a reference back to it.
pub struct Pool<T> {
    slots: Vec<Option<T>>,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Claims the first free slot. `None` when the pool is exhausted —
    /// callers treat this the same as a middleware-level goal-handle
    /// exhaustion (the request is left untaken until capacity frees up).
    pub fn acquire(&mut self, value: T) -> Option<usize> {
        let index = self.slots.iter().position(|s| s.is_none())?;
        self.slots[index] = Some(value);
        Some(index)
    }

    pub fn release(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index)?.take()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (i, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (i, v)))
    }

    pub fn find_index(&self, mut pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.as_ref().is_some_and(|v| pred(v)))
            .map(|(i, _)| i)
    }
}
