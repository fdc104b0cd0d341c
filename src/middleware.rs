//! The black-box middleware boundary.
//!
//! Everything in this module is a trait. Node/endpoint construction,
//! message (de)serialization, and DDS transport are supplied by whatever
//! implements these traits — a real rcl/DDS binding, or a test double
//! (see `tests/common`). The executor only ever calls through these
//! traits; it never reaches into a concrete transport.

use crate::error::Result;
use std::time::Duration;

/// Trait for entities an executor can place into a wait set.
pub trait Waitable: Send {
    /// A stable identifier for this endpoint, used by the `one(target)`
    /// trigger and by `remove_*` lookups.
    fn id(&self) -> usize;
}

/// Opaque identifier correlating a service/client request with its
/// eventual response, or an action request with its eventual response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// A subscription endpoint: zero or one message can be taken per round.
pub trait SubscriptionLike<T>: Waitable {
    /// Attempts to take one message. `Ok(None)` is a `TakeFailed` —
    /// recoverable, not an error.
    fn take(&mut self) -> Result<Option<T>>;
}

/// A service endpoint: takes requests, sends responses keyed by
/// [`RequestId`].
pub trait ServiceLike<Req, Resp>: Waitable {
    fn take_request(&mut self) -> Result<Option<(Req, RequestId)>>;
    fn send_response(&mut self, request_id: RequestId, response: Resp) -> Result<()>;
}

/// A client endpoint: sends requests, takes responses keyed by
/// [`RequestId`].
pub trait ClientLike<Req, Resp>: Waitable {
    fn send_request(&mut self, request: Req) -> Result<RequestId>;
    fn take_response(&mut self) -> Result<Option<(RequestId, Resp)>>;
}

/// Outcome of invoking a timer's call primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCallOutcome {
    Called,
    Canceled,
}

/// A periodic or one-shot timer.
pub trait TimerLike: Waitable {
    /// Invokes the middleware's timer-call primitive. A canceled timer
    /// is a recoverable outcome, not an error.
    fn call(&mut self) -> Result<TimerCallOutcome>;
}

/// An externally-signalled guard condition, used to wake the wait set.
pub trait GuardConditionLike: Waitable {
    fn trigger(&self) -> Result<()>;
}

/// 128-bit goal identifier, matching the UUID used to correlate action
/// requests and responses.
pub type GoalUuid = [u8; 16];

/// Reason attached to a rejected cancel response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelRejectReason {
    /// The goal exists but is not in a cancelable state.
    Rejected,
    /// The goal handle was already released or never existed.
    UnknownGoal,
    /// The executor (not the user callback) rejected the cancel because
    /// the goal's state machine forbade the transition.
    Terminated,
}

/// Counts of a composite action endpoint's internal middleware
/// sub-entities (the subscriptions, guard conditions, timers, clients
/// and services it uses under the hood), folded into the executor's
/// coarse per-kind counters at registration time alongside the
/// endpoint's own `action_clients`/`action_servers` tally — the
/// analogue of `rcl_action_client_wait_set_get_num_entities`/
/// `rcl_action_server_wait_set_get_num_entities`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubEntityCounts {
    pub subscriptions: usize,
    pub timers: usize,
    pub clients: usize,
    pub services: usize,
    pub guard_conditions: usize,
}

/// Action client endpoint. One instance backs every outstanding goal
/// tracked against this client.
pub trait ActionClientLike<Goal, Feedback, Res>: Waitable {
    fn send_goal_request(&mut self, uuid: GoalUuid, goal: Goal) -> Result<RequestId>;
    fn send_cancel_request(&mut self, uuid: GoalUuid) -> Result<RequestId>;
    fn send_result_request(&mut self, uuid: GoalUuid) -> Result<RequestId>;

    fn take_goal_response(&mut self) -> Result<Option<(RequestId, bool)>>;
    fn take_feedback(&mut self) -> Result<Option<(GoalUuid, Feedback)>>;
    /// `bool` is whether `uuid` appeared in the response's
    /// goals-canceling list.
    fn take_cancel_response(&mut self) -> Result<Option<(RequestId, bool)>>;
    fn take_result_response(&mut self) -> Result<Option<(RequestId, Res)>>;

    /// Sub-entity counts this client's middleware backend reports, to
    /// fold into the executor's wait-set budget. Defaults to all-zero
    /// for backends that don't compose over the generic kinds.
    fn sub_entity_counts(&self) -> SubEntityCounts {
        SubEntityCounts::default()
    }
}

/// Action server endpoint. One instance backs every outstanding goal
/// accepted by this server.
pub trait ActionServerLike<Goal, Res>: Waitable {
    fn take_goal_request(&mut self) -> Result<Option<(GoalUuid, Goal)>>;
    fn take_cancel_request(&mut self) -> Result<Option<GoalUuid>>;
    fn take_result_request(&mut self) -> Result<Option<GoalUuid>>;

    fn send_goal_response(&mut self, uuid: GoalUuid, accepted: bool) -> Result<()>;
    fn send_cancel_response(
        &mut self,
        uuid: GoalUuid,
        accepted: bool,
        reason: Option<CancelRejectReason>,
    ) -> Result<()>;
    fn send_result_response(&mut self, uuid: GoalUuid, result: Res) -> Result<()>;

    /// See [`ActionClientLike::sub_entity_counts`].
    fn sub_entity_counts(&self) -> SubEntityCounts {
        SubEntityCounts::default()
    }
}

/// Per-round readiness of an action client's five sub-entities, the
/// analogue of `rcl_action_client_wait_set_get_entities_ready`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActionClientReadyFlags {
    pub feedback: bool,
    pub status: bool,
    pub goal_response: bool,
    pub cancel_response: bool,
    pub result_response: bool,
}

impl ActionClientReadyFlags {
    pub fn any(self) -> bool {
        self.feedback || self.status || self.goal_response || self.cancel_response
            || self.result_response
    }
}

/// Per-round readiness of an action server's four sub-entities, the
/// analogue of `rcl_action_server_wait_set_get_entities_ready`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActionServerReadyFlags {
    pub goal_request: bool,
    pub cancel_request: bool,
    pub result_request: bool,
    pub goal_expired: bool,
}

impl ActionServerReadyFlags {
    pub fn any(self) -> bool {
        self.goal_request || self.cancel_request || self.result_request || self.goal_expired
    }
}

/// Per-kind capacities handed to [`WaitSet::prepare`], drawn from the
/// executor's counter block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WaitSetCounts {
    pub subscriptions: usize,
    pub timers: usize,
    pub clients: usize,
    pub services: usize,
    pub guard_conditions: usize,
    pub action_clients: usize,
    pub action_servers: usize,
}

/// A slot assigned to one handle inside a prepared wait set.
pub type SlotIndex = usize;

/// Owns the underlying wait primitive. Rebuilt whenever the handle
/// table's counters change; the executor itself decides when that
/// happens and marks the wait set invalid (see `Executor::prepare`).
pub trait WaitSet: Send {
    /// (Re)initializes the wait set with per-kind capacities. Called
    /// only when the wait set is currently invalid.
    fn prepare(&mut self, counts: WaitSetCounts) -> Result<()>;

    /// Drops all registered endpoints from the current wait-set
    /// instance without deallocating it; called before re-registering
    /// every handle ahead of a `wait`.
    fn clear(&mut self);

    fn add_subscription(&mut self, id: usize) -> Result<SlotIndex>;
    fn add_timer(&mut self, id: usize) -> Result<SlotIndex>;
    fn add_client(&mut self, id: usize) -> Result<SlotIndex>;
    fn add_service(&mut self, id: usize) -> Result<SlotIndex>;
    fn add_guard_condition(&mut self, id: usize) -> Result<SlotIndex>;
    fn add_action_client(&mut self, id: usize) -> Result<SlotIndex>;
    fn add_action_server(&mut self, id: usize) -> Result<SlotIndex>;

    /// Blocks until some registered endpoint is ready or `timeout`
    /// elapses. Returns `false` on timeout, `true` if something became
    /// ready.
    fn wait(&mut self, timeout: Duration) -> Result<bool>;

    fn is_subscription_ready(&self, slot: SlotIndex) -> bool;
    fn is_timer_ready(&self, slot: SlotIndex) -> bool;
    fn is_client_ready(&self, slot: SlotIndex) -> bool;
    fn is_service_ready(&self, slot: SlotIndex) -> bool;
    fn is_guard_condition_ready(&self, slot: SlotIndex) -> bool;
    fn is_action_client_ready(&self, slot: SlotIndex) -> bool;
    fn is_action_server_ready(&self, slot: SlotIndex) -> bool;

    /// Detailed per-sub-entity readiness for an action client slot.
    /// Default implementation derives a single aggregate flag from
    /// [`WaitSet::is_action_client_ready`]; a real binding overrides this
    /// with the middleware's entities-ready query.
    fn action_client_ready_flags(&self, slot: SlotIndex) -> ActionClientReadyFlags {
        let ready = self.is_action_client_ready(slot);
        ActionClientReadyFlags {
            feedback: ready,
            status: ready,
            goal_response: ready,
            cancel_response: ready,
            result_response: ready,
        }
    }

    /// Detailed per-sub-entity readiness for an action server slot. See
    /// [`WaitSet::action_client_ready_flags`].
    fn action_server_ready_flags(&self, slot: SlotIndex) -> ActionServerReadyFlags {
        let ready = self.is_action_server_ready(slot);
        ActionServerReadyFlags {
            goal_request: ready,
            cancel_request: ready,
            result_request: ready,
            goal_expired: false,
        }
    }

    /// True while the underlying middleware context is usable. `spin`
    /// stops looping once this goes false.
    fn context_is_valid(&self) -> bool;
}
