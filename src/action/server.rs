//! Action-server goal state machine and the type-erased binding the
//! handle table stores one of per registered action server.

use std::any::Any;
use std::marker::PhantomData;

use super::{transition, GoalEvent, GoalStatus, Pool};
use crate::error::{ExecutorError, Result};
use crate::middleware::{ActionServerLike, ActionServerReadyFlags, CancelRejectReason, GoalUuid};

/// What a user-supplied goal callback decided for an incoming goal
/// request. Errors raised by the callback's own logic are the caller's
/// responsibility to map to `Rejected` before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalDecision {
    Accepted,
    Rejected,
}

/// Terminal state a long-running user task drives an accepted goal to
/// from outside the executor's own take/execute passes, mirroring the
/// original's exposure of `rclc_action_goal_handle_t*` to that task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalOutcome {
    Succeeded,
    Aborted,
    Canceled,
}

/// Per-goal bookkeeping tracked by an action server. Acquired on an
/// inbound goal request, moved through [`GoalStatus`] by the executor's
/// take/execute passes, released once terminal.
pub struct ActionServerGoalHandle<Goal, Res> {
    goal_uuid: GoalUuid,
    pub goal_request: Goal,
    status: GoalStatus,
    goal_ended: bool,
    cancel_pending: bool,
    _res: PhantomData<fn(Res)>,
}

impl<Goal, Res> ActionServerGoalHandle<Goal, Res> {
    pub fn goal_uuid(&self) -> GoalUuid {
        self.goal_uuid
    }

    pub fn status(&self) -> GoalStatus {
        self.status
    }

    /// True once a terminal-outcome helper below has run; the
    /// provenance rule this crate picked for the open `goal_ended`
    /// question in the executor design.
    pub fn goal_ended(&self) -> bool {
        self.goal_ended
    }

    pub fn succeed(&mut self) {
        self.status = GoalStatus::Succeeded;
        self.goal_ended = true;
    }

    pub fn abort(&mut self) {
        self.status = GoalStatus::Aborted;
        self.goal_ended = true;
    }

    pub fn canceled(&mut self) {
        self.status = GoalStatus::Canceled;
        self.goal_ended = true;
    }
}

/// Type-erased operations the executor drives on every action-server
/// handle regardless of its `Goal`/`Res` message types.
pub(crate) trait ActionServerBindingOps: Send {
    fn endpoint_id(&self) -> usize;
    fn mark_readiness(&mut self, flags: ActionServerReadyFlags);
    /// OR of the four request-ready sub-flags plus whether any pooled
    /// goal has `goal_ended` set (spec.md's consolidated action-handle
    /// readiness predicate; `executor.c`'s equivalent check ORs in
    /// `handle->action_server->goal_ended`).
    fn data_available(&self) -> bool;
    fn take(&mut self) -> Result<()>;
    fn execute(&mut self) -> Result<()>;
    /// Drives the goal identified by `uuid` to a terminal state from
    /// outside the take/execute passes, sending its result response
    /// directly (the original's long-running task does this itself,
    /// rather than the executor's own sweep). `result` must be this
    /// binding's `Res` type; a mismatch is `InvalidArgument`.
    fn complete_goal(&mut self, uuid: GoalUuid, outcome: GoalOutcome, result: Box<dyn Any + Send>) -> Result<()>;
}

pub(crate) struct ActionServerBinding<Goal, Res, Sv, C>
where
    Sv: ActionServerLike<Goal, Res>,
{
    pub endpoint: Sv,
    goals: Pool<ActionServerGoalHandle<Goal, Res>>,
    ready: ActionServerReadyFlags,
    ctx: C,
    goal_callback: Box<dyn FnMut(&ActionServerGoalHandle<Goal, Res>, &mut C) -> GoalDecision + Send>,
    cancel_callback: Option<Box<dyn FnMut(&ActionServerGoalHandle<Goal, Res>, &mut C) -> bool + Send>>,
    _res: PhantomData<fn(Res)>,
}

impl<Goal, Res, Sv, C> ActionServerBinding<Goal, Res, Sv, C>
where
    Sv: ActionServerLike<Goal, Res>,
{
    pub fn new(
        endpoint: Sv,
        max_concurrent_goals: usize,
        ctx: C,
        goal_callback: Box<
            dyn FnMut(&ActionServerGoalHandle<Goal, Res>, &mut C) -> GoalDecision + Send,
        >,
        cancel_callback: Option<
            Box<dyn FnMut(&ActionServerGoalHandle<Goal, Res>, &mut C) -> bool + Send>,
        >,
    ) -> Self {
        Self {
            endpoint,
            goals: Pool::new(max_concurrent_goals),
            ready: ActionServerReadyFlags::default(),
            ctx,
            goal_callback,
            cancel_callback,
            _res: PhantomData,
        }
    }
}

impl<Goal, Res, Sv, C> ActionServerBindingOps for ActionServerBinding<Goal, Res, Sv, C>
where
    Goal: Send + 'static,
    Res: Send + 'static,
    Sv: ActionServerLike<Goal, Res>,
    C: Send + 'static,
{
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn mark_readiness(&mut self, flags: ActionServerReadyFlags) {
        self.ready = flags;
    }

    fn data_available(&self) -> bool {
        self.ready.any() || self.goals.iter().any(|(_, g)| g.goal_ended)
    }

    fn complete_goal(&mut self, uuid: GoalUuid, outcome: GoalOutcome, result: Box<dyn Any + Send>) -> Result<()> {
        let result = *result
            .downcast::<Res>()
            .map_err(|_| ExecutorError::InvalidArgument)?;
        let idx = self
            .goals
            .find_index(|g| g.goal_uuid == uuid)
            .ok_or(ExecutorError::NotFound)?;
        let g = self.goals.get_mut(idx).expect("index just found");
        match outcome {
            GoalOutcome::Succeeded => g.succeed(),
            GoalOutcome::Aborted => g.abort(),
            GoalOutcome::Canceled => g.canceled(),
        }
        self.endpoint.send_result_response(uuid, result)
    }

    fn take(&mut self) -> Result<()> {
        if self.ready.goal_request && self.goals.len() < self.goals.capacity() {
            if let Some((uuid, goal)) = self.endpoint.take_goal_request()? {
                self.goals.acquire(ActionServerGoalHandle {
                    goal_uuid: uuid,
                    goal_request: goal,
                    status: GoalStatus::Unknown,
                    goal_ended: false,
                    cancel_pending: false,
                    _res: PhantomData,
                });
            }
        }

        if self.ready.result_request {
            if let Some(uuid) = self.endpoint.take_result_request()? {
                if let Some(idx) = self.goals.find_index(|g| g.goal_uuid == uuid) {
                    let g = self.goals.get_mut(idx).unwrap();
                    if let Ok(next) = transition(g.status, GoalEvent::Execute) {
                        g.status = next;
                    }
                }
            }
        }

        if self.ready.cancel_request {
            if let Some(uuid) = self.endpoint.take_cancel_request()? {
                match self.goals.find_index(|g| g.goal_uuid == uuid) {
                    Some(idx) => {
                        let g = self.goals.get_mut(idx).unwrap();
                        match transition(g.status, GoalEvent::CancelGoal) {
                            Ok(next) => {
                                g.status = next;
                                g.cancel_pending = true;
                            }
                            Err(_) => {
                                self.endpoint.send_cancel_response(
                                    uuid,
                                    false,
                                    Some(CancelRejectReason::Terminated),
                                )?;
                            }
                        }
                    }
                    None => {
                        self.endpoint.send_cancel_response(
                            uuid,
                            false,
                            Some(CancelRejectReason::UnknownGoal),
                        )?;
                    }
                }
            }
        }

        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let Self {
            endpoint,
            goals,
            ctx,
            goal_callback,
            cancel_callback,
            ..
        } = self;

        // 1. terminal cleanup: release the slot only. The result
        // response itself is sent directly by `complete_goal`, the
        // long-running task that drove the goal terminal in the first
        // place — this sweep never sends anything.
        let idxs: Vec<usize> = goals
            .iter_mut()
            .filter(|(_, g)| g.status.is_terminal())
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            goals.release(idx);
        }

        // 2. goal requests
        let idxs: Vec<usize> = goals
            .iter_mut()
            .filter(|(_, g)| g.status == GoalStatus::Unknown)
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            let decision = match goals.get(idx) {
                Some(g) => goal_callback(g, ctx),
                None => continue,
            };
            let uuid = goals.get(idx).unwrap().goal_uuid;
            match decision {
                GoalDecision::Accepted => {
                    endpoint.send_goal_response(uuid, true)?;
                    if let Some(g) = goals.get_mut(idx) {
                        g.status = GoalStatus::Accepted;
                    }
                }
                GoalDecision::Rejected => {
                    endpoint.send_goal_response(uuid, false)?;
                    goals.release(idx);
                }
            }
        }

        // 3. cancel requests
        let idxs: Vec<usize> = goals
            .iter_mut()
            .filter(|(_, g)| g.status == GoalStatus::Canceling && g.cancel_pending)
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            let accept = match (cancel_callback.as_mut(), goals.get(idx)) {
                (Some(cb), Some(g)) => cb(g, ctx),
                _ => false,
            };
            if let Some(g) = goals.get_mut(idx) {
                g.cancel_pending = false;
            }
            let uuid = goals.get(idx).unwrap().goal_uuid;
            if accept {
                endpoint.send_cancel_response(uuid, true, None)?;
            } else {
                endpoint.send_cancel_response(uuid, false, Some(CancelRejectReason::Rejected))?;
                if let Some(g) = goals.get_mut(idx) {
                    g.status = GoalStatus::Executing;
                }
            }
        }
        Ok(())
    }
}
