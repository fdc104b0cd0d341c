//! The executor itself: registration surface, wait-set orchestration,
//! and the readiness/take/execute pipeline.

use std::time::{Duration, Instant};

use crate::action::client::{ActionClientBinding, ActionClientBindingOps, ActionClientGoalHandle};
use crate::action::server::{
    ActionServerBinding, ActionServerBindingOps, ActionServerGoalHandle, GoalDecision, GoalOutcome,
};
use crate::error::{ExecutorError, Result};
use crate::handle::{
    ClientBinding, ClientOps, ClientWithRequestIdBinding, GuardConditionBinding,
    GuardConditionOps, HandleKind, HandleTable, Invocation, Payload, ServiceBinding, ServiceOps,
    ServiceWithContextBinding, ServiceWithRequestIdBinding, SubscriptionBinding,
    SubscriptionCtxBinding, SubscriptionOps, TimerBinding, TimerOps,
};
use crate::middleware::{
    ActionClientLike, ActionServerLike, ClientLike, GoalUuid, GuardConditionLike, RequestId,
    ServiceLike, SubEntityCounts, SubscriptionLike, TimerLike, WaitSet, WaitSetCounts,
};
use crate::trigger::TriggerPredicate;

/// Data-communication semantics for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantics {
    /// Take then execute, handle by handle, in registration order.
    Default,
    /// All takes complete before any execute runs: every callback in a
    /// round observes the same snapshot of inputs.
    Let,
}

/// Single-threaded callback executor.
///
/// Owns a fixed-capacity [`HandleTable`] and one [`WaitSet`] instance
/// `W`. Dropping an `Executor` drops its handle table and wait set
/// through ordinary Rust `Drop` — there is no reachable "already
/// dropped" or "zero-initialized" state to guard against, unlike the C
/// original this crate is modeled on.
pub struct Executor<W: WaitSet> {
    table: HandleTable,
    wait_set: W,
    wait_set_valid: bool,
    timeout: Duration,
    semantics: Semantics,
    trigger: TriggerPredicate,
    last_invocation_time: Option<Instant>,
}

impl<W: WaitSet> Executor<W> {
    /// Default wait timeout, matching the original's `10^9` ns.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_nanos(1_000_000_000);

    pub fn new(wait_set: W, capacity: usize) -> Result<Self> {
        Ok(Self {
            table: HandleTable::new(capacity)?,
            wait_set,
            wait_set_valid: false,
            timeout: Self::DEFAULT_TIMEOUT,
            semantics: Semantics::Default,
            trigger: TriggerPredicate::default(),
            last_invocation_time: None,
        })
    }

    pub fn set_timeout(&mut self, ns: u64) {
        self.timeout = Duration::from_nanos(ns);
    }

    pub fn set_semantics(&mut self, semantics: Semantics) {
        self.semantics = semantics;
    }

    pub fn set_trigger(&mut self, trigger: TriggerPredicate) {
        self.trigger = trigger;
    }

    pub fn handle_count(&self) -> usize {
        self.table.len()
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Live handle count broken down by kind (P1), with each action
    /// client/server's reported sub-entity counts folded into the
    /// generic fields (I3) — see [`crate::handle::HandleCounters`].
    pub fn counters(&self) -> crate::handle::HandleCounters {
        self.table.counters()
    }

    // ---- registration -----------------------------------------------

    pub fn add_subscription<T, S>(
        &mut self,
        endpoint: S,
        invocation: Invocation,
        callback: Box<dyn FnMut(Option<&T>) + Send>,
    ) -> Result<usize>
    where
        T: Send + 'static,
        S: SubscriptionLike<T> + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Subscription(Box::new(SubscriptionBinding::new(
            endpoint, callback,
        )));
        self.table.insert(
            HandleKind::Subscription,
            invocation,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_subscription_with_context<T, S, C>(
        &mut self,
        endpoint: S,
        invocation: Invocation,
        ctx: C,
        callback: Box<dyn FnMut(Option<&T>, &mut C) + Send>,
    ) -> Result<usize>
    where
        T: Send + 'static,
        S: SubscriptionLike<T> + 'static,
        C: Send + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Subscription(Box::new(SubscriptionCtxBinding::new(
            endpoint, ctx, callback,
        )));
        self.table.insert(
            HandleKind::SubscriptionWithContext,
            invocation,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_timer<Ti>(&mut self, endpoint: Ti) -> Result<usize>
    where
        Ti: TimerLike + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Timer(Box::new(TimerBinding { endpoint }));
        self.table.insert(
            HandleKind::Timer,
            Invocation::OnNewData,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_client<Req, Resp, Cl>(
        &mut self,
        endpoint: Cl,
        callback: Box<dyn FnMut(&Resp) + Send>,
    ) -> Result<usize>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Cl: ClientLike<Req, Resp> + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Client(Box::new(ClientBinding::new(endpoint, callback)));
        self.table.insert(
            HandleKind::Client,
            Invocation::OnNewData,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_client_with_request_id<Req, Resp, Cl>(
        &mut self,
        endpoint: Cl,
        callback: Box<dyn FnMut(&Resp, RequestId) + Send>,
    ) -> Result<usize>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        Cl: ClientLike<Req, Resp> + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Client(Box::new(ClientWithRequestIdBinding::new(
            endpoint, callback,
        )));
        self.table.insert(
            HandleKind::ClientWithRequestId,
            Invocation::OnNewData,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_service<Req, Resp, S>(
        &mut self,
        endpoint: S,
        callback: Box<dyn FnMut(&Req, &mut Resp) + Send>,
    ) -> Result<usize>
    where
        Req: Send + 'static,
        Resp: Default + Send + 'static,
        S: ServiceLike<Req, Resp> + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Service(Box::new(ServiceBinding::new(endpoint, callback)));
        self.table.insert(
            HandleKind::Service,
            Invocation::OnNewData,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_service_with_request_id<Req, Resp, S>(
        &mut self,
        endpoint: S,
        callback: Box<dyn FnMut(&Req, RequestId, &mut Resp) + Send>,
    ) -> Result<usize>
    where
        Req: Send + 'static,
        Resp: Default + Send + 'static,
        S: ServiceLike<Req, Resp> + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Service(Box::new(ServiceWithRequestIdBinding::new(
            endpoint, callback,
        )));
        self.table.insert(
            HandleKind::ServiceWithRequestId,
            Invocation::OnNewData,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_service_with_context<Req, Resp, S, C>(
        &mut self,
        endpoint: S,
        ctx: C,
        callback: Box<dyn FnMut(&Req, &mut Resp, &mut C) + Send>,
    ) -> Result<usize>
    where
        Req: Send + 'static,
        Resp: Default + Send + 'static,
        S: ServiceLike<Req, Resp> + 'static,
        C: Send + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::Service(Box::new(ServiceWithContextBinding::new(
            endpoint, ctx, callback,
        )));
        self.table.insert(
            HandleKind::ServiceWithContext,
            Invocation::OnNewData,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_guard_condition<G>(
        &mut self,
        endpoint: G,
        callback: Box<dyn FnMut() + Send>,
    ) -> Result<usize>
    where
        G: GuardConditionLike + 'static,
    {
        let endpoint_id = endpoint.id();
        let payload = Payload::GuardCondition(Box::new(GuardConditionBinding::new(
            endpoint, callback,
        )));
        self.table.insert(
            HandleKind::GuardCondition,
            Invocation::OnNewData,
            payload,
            SubEntityCounts::default(),
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_action_client<Goal, Feedback, Res, Cl, C>(
        &mut self,
        endpoint: Cl,
        max_concurrent_goals: usize,
        ctx: C,
        goal_callback: Box<dyn FnMut(&ActionClientGoalHandle, bool, &mut C) + Send>,
        feedback_callback: Option<Box<dyn FnMut(GoalUuid, &Feedback, &mut C) + Send>>,
        cancel_callback: Option<Box<dyn FnMut(&ActionClientGoalHandle, &mut C) + Send>>,
        result_callback: Box<dyn FnMut(GoalUuid, &Res, &mut C) + Send>,
    ) -> Result<usize>
    where
        Goal: Send + 'static,
        Feedback: Send + 'static,
        Res: Send + 'static,
        Cl: ActionClientLike<Goal, Feedback, Res> + 'static,
        C: Send + 'static,
    {
        if max_concurrent_goals == 0 {
            return Err(ExecutorError::InvalidArgument);
        }
        let endpoint_id = endpoint.id();
        let extra_counts = endpoint.sub_entity_counts();
        let binding = ActionClientBinding::new(
            endpoint,
            max_concurrent_goals,
            ctx,
            goal_callback,
            feedback_callback,
            cancel_callback,
            result_callback,
        );
        let payload = Payload::ActionClient(Box::new(binding));
        self.table.insert(
            HandleKind::ActionClient,
            Invocation::OnNewData,
            payload,
            extra_counts,
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    pub fn add_action_server<Goal, Res, Sv, C>(
        &mut self,
        endpoint: Sv,
        max_concurrent_goals: usize,
        ctx: C,
        goal_callback: Box<
            dyn FnMut(&ActionServerGoalHandle<Goal, Res>, &mut C) -> GoalDecision + Send,
        >,
        cancel_callback: Option<
            Box<dyn FnMut(&ActionServerGoalHandle<Goal, Res>, &mut C) -> bool + Send>,
        >,
    ) -> Result<usize>
    where
        Goal: Send + 'static,
        Res: Send + 'static,
        Sv: ActionServerLike<Goal, Res> + 'static,
        C: Send + 'static,
    {
        if max_concurrent_goals == 0 {
            return Err(ExecutorError::InvalidArgument);
        }
        let endpoint_id = endpoint.id();
        let extra_counts = endpoint.sub_entity_counts();
        let binding = ActionServerBinding::new(
            endpoint,
            max_concurrent_goals,
            ctx,
            goal_callback,
            cancel_callback,
        );
        let payload = Payload::ActionServer(Box::new(binding));
        self.table.insert(
            HandleKind::ActionServer,
            Invocation::OnNewData,
            payload,
            extra_counts,
        )?;
        self.wait_set_valid = false;
        Ok(endpoint_id)
    }

    /// Removes the handle registered against `endpoint_id` (the value
    /// returned by the matching `add_*` call). `NotFound` if no such
    /// handle is registered.
    pub fn remove(&mut self, endpoint_id: usize) -> Result<()> {
        self.table.remove_by_endpoint_id(endpoint_id)?;
        self.wait_set_valid = false;
        Ok(())
    }

    pub fn remove_subscription(&mut self, endpoint_id: usize) -> Result<()> {
        self.remove(endpoint_id)
    }

    pub fn remove_timer(&mut self, endpoint_id: usize) -> Result<()> {
        self.remove(endpoint_id)
    }

    pub fn remove_client(&mut self, endpoint_id: usize) -> Result<()> {
        self.remove(endpoint_id)
    }

    pub fn remove_service(&mut self, endpoint_id: usize) -> Result<()> {
        self.remove(endpoint_id)
    }

    pub fn remove_guard_condition(&mut self, endpoint_id: usize) -> Result<()> {
        self.remove(endpoint_id)
    }

    pub fn remove_action_client(&mut self, endpoint_id: usize) -> Result<()> {
        self.remove(endpoint_id)
    }

    pub fn remove_action_server(&mut self, endpoint_id: usize) -> Result<()> {
        self.remove(endpoint_id)
    }

    /// Issues a new goal against the action client registered at
    /// `endpoint_id`. `goal` must be that client's `Goal` message type;
    /// a mismatch is `InvalidArgument`, never a panic.
    pub fn send_action_goal<Goal: Send + 'static>(
        &mut self,
        endpoint_id: usize,
        goal: Goal,
    ) -> Result<GoalUuid> {
        let handle = self
            .table
            .iter_mut()
            .find(|h| h.endpoint_id() == endpoint_id)
            .ok_or(ExecutorError::NotFound)?;
        match &mut handle.payload {
            Payload::ActionClient(binding) => binding.send_goal(Box::new(goal)),
            _ => Err(ExecutorError::InvalidArgument),
        }
    }

    /// Requests cancellation of an outstanding goal tracked by the
    /// action client registered at `endpoint_id`.
    pub fn cancel_action_goal(&mut self, endpoint_id: usize, goal_uuid: GoalUuid) -> Result<()> {
        let handle = self
            .table
            .iter_mut()
            .find(|h| h.endpoint_id() == endpoint_id)
            .ok_or(ExecutorError::NotFound)?;
        match &mut handle.payload {
            Payload::ActionClient(binding) => binding.request_cancel(goal_uuid),
            _ => Err(ExecutorError::InvalidArgument),
        }
    }

    /// Drives a goal accepted by the action server registered at
    /// `endpoint_id` to a terminal state, the external API a
    /// long-running user task calls once its work on that goal is
    /// done. Sends the result response immediately; the following
    /// round's terminal-cleanup sweep only releases the goal's pool
    /// slot.
    pub fn complete_action_goal<Res: Send + 'static>(
        &mut self,
        endpoint_id: usize,
        goal_uuid: GoalUuid,
        outcome: GoalOutcome,
        result: Res,
    ) -> Result<()> {
        let handle = self
            .table
            .iter_mut()
            .find(|h| h.endpoint_id() == endpoint_id)
            .ok_or(ExecutorError::NotFound)?;
        match &mut handle.payload {
            Payload::ActionServer(binding) => {
                binding.complete_goal(goal_uuid, outcome, Box::new(result))
            }
            _ => Err(ExecutorError::InvalidArgument),
        }
    }

    // ---- wait-set manager --------------------------------------------

    /// (Re)initializes the wait set if it was invalidated by a prior
    /// registration/removal. A no-op when already valid — calling this
    /// twice in a row with no table change between is idempotent.
    pub fn prepare(&mut self) -> Result<()> {
        if self.wait_set_valid {
            return Ok(());
        }
        let counters = self.table.counters();
        let counts = WaitSetCounts {
            subscriptions: counters.subscriptions,
            timers: counters.timers,
            clients: counters.clients,
            services: counters.services,
            guard_conditions: counters.guard_conditions,
            action_clients: counters.action_clients,
            action_servers: counters.action_servers,
        };
        self.wait_set.prepare(counts)?;
        self.wait_set_valid = true;
        Ok(())
    }

    // ---- round orchestration ------------------------------------------

    pub fn spin_some(&mut self, timeout: Duration) -> Result<()> {
        if !self.wait_set.context_is_valid() {
            return Err(ExecutorError::middleware(ContextInvalid));
        }

        self.prepare()?;

        let Self { table, wait_set, .. } = self;
        wait_set.clear();
        for h in table.iter_mut() {
            let id = h.endpoint_id();
            let slot = match h.kind {
                HandleKind::Subscription | HandleKind::SubscriptionWithContext => {
                    wait_set.add_subscription(id)?
                }
                HandleKind::Timer => wait_set.add_timer(id)?,
                HandleKind::Client | HandleKind::ClientWithRequestId => {
                    wait_set.add_client(id)?
                }
                HandleKind::Service
                | HandleKind::ServiceWithRequestId
                | HandleKind::ServiceWithContext => wait_set.add_service(id)?,
                HandleKind::GuardCondition => wait_set.add_guard_condition(id)?,
                HandleKind::ActionClient => wait_set.add_action_client(id)?,
                HandleKind::ActionServer => wait_set.add_action_server(id)?,
            };
            h.slot_index = slot;
        }

        let became_ready = self.wait_set.wait(timeout)?;
        if !became_ready {
            tracing::debug!("spin_some: wait timed out with nothing ready");
            return Err(ExecutorError::Timeout);
        }

        self.readiness_pass();

        if !self.trigger.evaluate(&self.table) {
            tracing::debug!("spin_some: trigger predicate did not fire, skipping round");
            return Ok(());
        }

        match self.semantics {
            Semantics::Default => self.run_default_round(),
            Semantics::Let => self.run_let_round(),
        }
    }

    pub fn spin(&mut self) -> Result<()> {
        while self.wait_set.context_is_valid() {
            match self.spin_some(self.timeout) {
                Ok(()) | Err(ExecutorError::Timeout) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn spin_period(&mut self, period: Duration) -> Result<()> {
        while self.wait_set.context_is_valid() {
            self.spin_one_period(period)?;
        }
        Ok(())
    }

    /// One period of `spin_period`, split out so jitter/drift behavior
    /// can be unit tested without an unbounded loop.
    pub fn spin_one_period(&mut self, period: Duration) -> Result<()> {
        let now = Instant::now();
        let last = *self.last_invocation_time.get_or_insert(now);

        match self.spin_some(self.timeout) {
            Ok(()) | Err(ExecutorError::Timeout) => {}
            Err(e) => return Err(e),
        }

        let target = last + period;
        let after_round = Instant::now();
        if target > after_round {
            std::thread::sleep(target - after_round);
        } else {
            tracing::warn!("spin_one_period: round overran its period, no catch-up sleep");
        }
        self.last_invocation_time = Some(last + period);
        Ok(())
    }

    // ---- readiness / take / execute ------------------------------------

    fn readiness_pass(&mut self) {
        let Self { table, wait_set, .. } = self;
        for h in table.iter_mut() {
            let slot = h.slot_index;
            let data_available = match &mut h.payload {
                Payload::Subscription(_) => wait_set.is_subscription_ready(slot),
                Payload::Timer(_) => wait_set.is_timer_ready(slot),
                Payload::Client(_) => wait_set.is_client_ready(slot),
                Payload::Service(_) => wait_set.is_service_ready(slot),
                Payload::GuardCondition(_) => wait_set.is_guard_condition_ready(slot),
                Payload::ActionClient(a) => {
                    let flags = wait_set.action_client_ready_flags(slot);
                    a.mark_readiness(flags);
                    a.data_available()
                }
                Payload::ActionServer(a) => {
                    let flags = wait_set.action_server_ready_flags(slot);
                    a.mark_readiness(flags);
                    a.data_available()
                }
            };
            h.data_available = data_available;
        }
    }

    fn take_handle(&mut self, index: usize) -> Result<()> {
        let h = self.table.get_mut(index).expect("index in range");
        if !h.data_available {
            return Ok(());
        }
        let came_up_empty = match &mut h.payload {
            Payload::Subscription(s) => !s.take()?,
            Payload::Timer(_) => false,
            Payload::Client(c) => !c.take()?,
            Payload::Service(s) => !s.take()?,
            Payload::GuardCondition(_) => false,
            Payload::ActionClient(a) => {
                a.take()?;
                false
            }
            Payload::ActionServer(a) => {
                a.take()?;
                false
            }
        };
        if came_up_empty {
            h.data_available = false;
        }
        Ok(())
    }

    fn execute_handle(&mut self, index: usize) -> Result<()> {
        let h = self.table.get_mut(index).expect("index in range");
        let had_data = h.data_available;
        let should_fire = match h.invocation {
            Invocation::Always => true,
            Invocation::OnNewData => had_data,
        };
        match &mut h.payload {
            Payload::Subscription(s) => {
                if should_fire {
                    s.invoke(had_data);
                }
            }
            Payload::Timer(t) => {
                if should_fire {
                    t.call()?;
                }
            }
            Payload::Client(c) => {
                if should_fire {
                    c.invoke();
                }
            }
            Payload::Service(s) => {
                if should_fire {
                    s.invoke_and_respond()?;
                }
            }
            Payload::GuardCondition(g) => {
                if should_fire {
                    g.invoke();
                }
            }
            Payload::ActionClient(a) => a.execute(),
            Payload::ActionServer(a) => a.execute()?,
        }
        Ok(())
    }

    fn run_default_round(&mut self) -> Result<()> {
        for i in 0..self.table.len() {
            self.take_handle(i)?;
            self.execute_handle(i)?;
        }
        Ok(())
    }

    fn run_let_round(&mut self) -> Result<()> {
        for i in 0..self.table.len() {
            self.take_handle(i)?;
        }
        for i in 0..self.table.len() {
            self.execute_handle(i)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ContextInvalid;

impl std::fmt::Display for ContextInvalid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "middleware context is no longer valid")
    }
}

impl std::error::Error for ContextInvalid {}
