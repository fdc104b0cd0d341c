//! Single-threaded callback executor for bounded pub/sub, service, and
//! action middleware.
//!
//! The crate has two halves: [`middleware`] is the black-box trait
//! boundary a concrete transport implements, and [`executor`] is the
//! fixed-capacity scheduler that multiplexes a [`handle::HandleTable`]
//! of registered endpoints through a readiness/take/execute pipeline
//! each round. [`action`] holds the goal state machine shared by both
//! the action-client and action-server sides of that table.

pub mod action;
pub mod error;
pub mod executor;
pub mod handle;
pub mod middleware;
pub mod trigger;

pub use action::client::ActionClientGoalHandle;
pub use action::server::{ActionServerGoalHandle, GoalDecision, GoalOutcome};
pub use action::{transition, GoalEvent, GoalStatus, IllegalTransition, Pool};
pub use error::{DynError, ExecutorError, Result};
pub use executor::{Executor, Semantics};
pub use handle::{HandleCounters, HandleKind, Invocation};
pub use middleware::{
    ActionClientLike, ActionClientReadyFlags, ActionServerLike, ActionServerReadyFlags,
    CancelRejectReason, ClientLike, GoalUuid, GuardConditionLike, RequestId, ServiceLike,
    SlotIndex, SubEntityCounts, SubscriptionLike, TimerCallOutcome, TimerLike, Waitable, WaitSet,
    WaitSetCounts,
};
pub use trigger::TriggerPredicate;
