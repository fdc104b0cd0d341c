//! Action-client goal bookkeeping and the type-erased binding the
//! handle table stores one of per registered action client.

use std::any::Any;
use std::marker::PhantomData;

use super::{GoalStatus, Pool};
use crate::error::{ExecutorError, Result};
use crate::middleware::{ActionClientLike, ActionClientReadyFlags, GoalUuid};

/// Per-goal bookkeeping tracked by an action client. Acquired from the
/// binding's fixed free-list when the user issues a goal (`send_goal`);
/// released when the final result response is delivered, or earlier if
/// the goal is rejected or the follow-on result request fails to send.
#[derive(Debug, Clone, Copy)]
pub struct ActionClientGoalHandle {
    goal_uuid: GoalUuid,
    goal_request_seq: Option<crate::middleware::RequestId>,
    cancel_request_seq: Option<crate::middleware::RequestId>,
    result_request_seq: Option<crate::middleware::RequestId>,
    available_goal_response: bool,
    available_feedback: bool,
    available_cancel_response: bool,
    available_result_response: bool,
    accepted: bool,
    cancelled: bool,
    status: GoalStatus,
}

impl ActionClientGoalHandle {
    fn new(goal_uuid: GoalUuid, goal_request_seq: crate::middleware::RequestId) -> Self {
        Self {
            goal_uuid,
            goal_request_seq: Some(goal_request_seq),
            cancel_request_seq: None,
            result_request_seq: None,
            available_goal_response: false,
            available_feedback: false,
            available_cancel_response: false,
            available_result_response: false,
            accepted: false,
            cancelled: false,
            status: GoalStatus::Unknown,
        }
    }

    pub fn goal_uuid(&self) -> GoalUuid {
        self.goal_uuid
    }

    pub fn accepted(&self) -> bool {
        self.accepted
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn status(&self) -> GoalStatus {
        self.status
    }
}

/// Type-erased operations the executor drives on every action-client
/// handle regardless of its `Goal`/`Feedback`/`Res` message types.
pub(crate) trait ActionClientBindingOps: Send {
    fn endpoint_id(&self) -> usize;
    fn mark_readiness(&mut self, flags: ActionClientReadyFlags);
    fn data_available(&self) -> bool;
    fn take(&mut self) -> Result<()>;
    fn execute(&mut self);
    /// Issues a new goal. `goal` must downcast to this binding's `Goal`
    /// type; a mismatch is an `InvalidArgument`, never a panic.
    fn send_goal(&mut self, goal: Box<dyn Any + Send>) -> Result<GoalUuid>;
    fn request_cancel(&mut self, uuid: GoalUuid) -> Result<()>;
}

pub(crate) struct ActionClientBinding<Goal, Feedback, Res, Cl, C>
where
    Cl: ActionClientLike<Goal, Feedback, Res>,
{
    pub endpoint: Cl,
    goals: Pool<ActionClientGoalHandle>,
    ready: ActionClientReadyFlags,
    ctx: C,
    pending_feedback: Option<(usize, Feedback)>,
    pending_result: Option<(usize, Res)>,
    goal_callback: Box<dyn FnMut(&ActionClientGoalHandle, bool, &mut C) + Send>,
    feedback_callback: Option<Box<dyn FnMut(GoalUuid, &Feedback, &mut C) + Send>>,
    cancel_callback: Option<Box<dyn FnMut(&ActionClientGoalHandle, &mut C) + Send>>,
    result_callback: Box<dyn FnMut(GoalUuid, &Res, &mut C) + Send>,
    _goal: PhantomData<fn(Goal)>,
}

impl<Goal, Feedback, Res, Cl, C> ActionClientBinding<Goal, Feedback, Res, Cl, C>
where
    Cl: ActionClientLike<Goal, Feedback, Res>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint: Cl,
        max_concurrent_goals: usize,
        ctx: C,
        goal_callback: Box<dyn FnMut(&ActionClientGoalHandle, bool, &mut C) + Send>,
        feedback_callback: Option<Box<dyn FnMut(GoalUuid, &Feedback, &mut C) + Send>>,
        cancel_callback: Option<Box<dyn FnMut(&ActionClientGoalHandle, &mut C) + Send>>,
        result_callback: Box<dyn FnMut(GoalUuid, &Res, &mut C) + Send>,
    ) -> Self {
        Self {
            endpoint,
            goals: Pool::new(max_concurrent_goals),
            ready: ActionClientReadyFlags::default(),
            ctx,
            pending_feedback: None,
            pending_result: None,
            goal_callback,
            feedback_callback,
            cancel_callback,
            result_callback,
            _goal: PhantomData,
        }
    }
}

impl<Goal, Feedback, Res, Cl, C> ActionClientBindingOps
    for ActionClientBinding<Goal, Feedback, Res, Cl, C>
where
    Goal: Send + 'static,
    Feedback: Send + 'static,
    Res: Send + 'static,
    Cl: ActionClientLike<Goal, Feedback, Res>,
    C: Send + 'static,
{
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn mark_readiness(&mut self, flags: ActionClientReadyFlags) {
        self.ready = flags;
    }

    fn data_available(&self) -> bool {
        self.ready.any()
    }

    fn take(&mut self) -> Result<()> {
        if self.ready.goal_response {
            if let Some((rid, accepted)) = self.endpoint.take_goal_response()? {
                if let Some(idx) = self.goals.find_index(|g| g.goal_request_seq == Some(rid)) {
                    let g = self.goals.get_mut(idx).unwrap();
                    g.available_goal_response = true;
                    g.accepted = accepted;
                }
            }
        }

        if self.ready.feedback {
            if let Some((uuid, fb)) = self.endpoint.take_feedback()? {
                if let Some(idx) = self.goals.find_index(|g| g.goal_uuid == uuid) {
                    self.goals.get_mut(idx).unwrap().available_feedback = true;
                    self.pending_feedback = Some((idx, fb));
                }
            }
        }

        if self.ready.cancel_response {
            if let Some((rid, in_canceling_list)) = self.endpoint.take_cancel_response()? {
                if let Some(idx) = self.goals.find_index(|g| g.cancel_request_seq == Some(rid)) {
                    let g = self.goals.get_mut(idx).unwrap();
                    g.available_cancel_response = true;
                    g.cancelled = in_canceling_list;
                }
            }
        }

        if self.ready.result_response {
            if let Some((rid, res)) = self.endpoint.take_result_response()? {
                if let Some(idx) = self.goals.find_index(|g| g.result_request_seq == Some(rid)) {
                    self.goals.get_mut(idx).unwrap().available_result_response = true;
                    self.pending_result = Some((idx, res));
                }
            }
        }

        Ok(())
    }

    fn execute(&mut self) {
        let Self {
            endpoint,
            goals,
            ctx,
            pending_feedback,
            pending_result,
            goal_callback,
            feedback_callback,
            cancel_callback,
            result_callback,
            ..
        } = self;

        // 1. goal responses
        let idxs: Vec<usize> = goals
            .iter_mut()
            .filter(|(_, g)| g.available_goal_response)
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            let accepted = {
                let g = goals.get_mut(idx).unwrap();
                g.available_goal_response = false;
                g.accepted
            };
            if let Some(g) = goals.get(idx) {
                goal_callback(g, accepted, ctx);
            }
            if !accepted {
                goals.release(idx);
                continue;
            }
            let uuid = goals.get(idx).unwrap().goal_uuid;
            match endpoint.send_result_request(uuid) {
                Ok(rid) => {
                    let g = goals.get_mut(idx).unwrap();
                    g.result_request_seq = Some(rid);
                    g.status = GoalStatus::Accepted;
                }
                Err(_) => {
                    goals.release(idx);
                }
            }
        }

        // 2. feedback
        let idxs: Vec<usize> = goals
            .iter_mut()
            .filter(|(_, g)| g.available_feedback)
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            if let Some(g) = goals.get_mut(idx) {
                g.available_feedback = false;
            }
            if let (Some(cb), Some((fb_idx, fb))) =
                (feedback_callback.as_mut(), pending_feedback.as_ref())
            {
                if *fb_idx == idx {
                    if let Some(g) = goals.get(idx) {
                        cb(g.goal_uuid, fb, ctx);
                    }
                }
            }
        }
        *pending_feedback = None;

        // 3. cancel responses
        let idxs: Vec<usize> = goals
            .iter_mut()
            .filter(|(_, g)| g.available_cancel_response)
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            if let Some(g) = goals.get_mut(idx) {
                g.available_cancel_response = false;
            }
            if let (Some(cb), Some(g)) = (cancel_callback.as_mut(), goals.get(idx)) {
                cb(g, ctx);
            }
        }

        // 4. result responses
        let idxs: Vec<usize> = goals
            .iter_mut()
            .filter(|(_, g)| g.available_result_response)
            .map(|(i, _)| i)
            .collect();
        for idx in idxs {
            if let Some((res_idx, res)) = pending_result.as_ref() {
                if *res_idx == idx {
                    if let Some(g) = goals.get(idx) {
                        result_callback(g.goal_uuid, res, ctx);
                    }
                }
            }
            goals.release(idx);
        }
        *pending_result = None;
    }

    fn send_goal(&mut self, goal: Box<dyn Any + Send>) -> Result<GoalUuid> {
        let goal = *goal
            .downcast::<Goal>()
            .map_err(|_| ExecutorError::InvalidArgument)?;
        let uuid = *uuid::Uuid::new_v4().as_bytes();
        let rid = self.endpoint.send_goal_request(uuid, goal)?;
        self.goals
            .acquire(ActionClientGoalHandle::new(uuid, rid))
            .ok_or(ExecutorError::Overflow)?;
        Ok(uuid)
    }

    fn request_cancel(&mut self, uuid: GoalUuid) -> Result<()> {
        let idx = self
            .goals
            .find_index(|g| g.goal_uuid == uuid)
            .ok_or(ExecutorError::NotFound)?;
        let rid = self.endpoint.send_cancel_request(uuid)?;
        self.goals.get_mut(idx).unwrap().cancel_request_seq = Some(rid);
        Ok(())
    }
}
