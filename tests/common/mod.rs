#![allow(dead_code)]

//! In-memory middleware test doubles. Each mock implements exactly the
//! `rclc_executor::middleware` trait its name suggests, plus a handful
//! of `push_*`/`sent_*` helpers a test uses to script inbound data and
//! assert on outbound sends. No real transport, no threads.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rclc_executor::{
    ActionClientLike, ActionClientReadyFlags, ActionServerLike, ActionServerReadyFlags,
    CancelRejectReason, ClientLike, GoalUuid, GuardConditionLike, RequestId, Result, ServiceLike,
    SlotIndex, SubscriptionLike, TimerCallOutcome, TimerLike, Waitable, WaitSet, WaitSetCounts,
};

pub struct MockSubscription<T> {
    id: usize,
    queue: VecDeque<T>,
}

impl<T> MockSubscription<T> {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, msg: T) {
        self.queue.push_back(msg);
    }
}

impl<T: Send> Waitable for MockSubscription<T> {
    fn id(&self) -> usize {
        self.id
    }
}

impl<T: Send> SubscriptionLike<T> for MockSubscription<T> {
    fn take(&mut self) -> Result<Option<T>> {
        Ok(self.queue.pop_front())
    }
}

/// Registration moves a timer's endpoint into the handle table, so a
/// test that needs to observe how many times it fired keeps a clone of
/// `calls` from [`MockTimer::call_count`] taken before registering.
pub struct MockTimer {
    id: usize,
    pub outcome: TimerCallOutcome,
    calls: Arc<AtomicUsize>,
}

impl MockTimer {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            outcome: TimerCallOutcome::Called,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Waitable for MockTimer {
    fn id(&self) -> usize {
        self.id
    }
}

impl TimerLike for MockTimer {
    fn call(&mut self) -> Result<TimerCallOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome)
    }
}

pub struct MockClient<Req, Resp> {
    id: usize,
    next_rid: u64,
    sent: Vec<Req>,
    responses: VecDeque<(RequestId, Resp)>,
}

impl<Req, Resp> MockClient<Req, Resp> {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            next_rid: 0,
            sent: Vec::new(),
            responses: VecDeque::new(),
        }
    }

    pub fn push_response(&mut self, rid: RequestId, resp: Resp) {
        self.responses.push_back((rid, resp));
    }

    pub fn sent(&self) -> &[Req] {
        &self.sent
    }
}

impl<Req: Send, Resp: Send> Waitable for MockClient<Req, Resp> {
    fn id(&self) -> usize {
        self.id
    }
}

impl<Req: Send, Resp: Send> ClientLike<Req, Resp> for MockClient<Req, Resp> {
    fn send_request(&mut self, request: Req) -> Result<RequestId> {
        self.sent.push(request);
        let rid = RequestId(self.next_rid);
        self.next_rid += 1;
        Ok(rid)
    }

    fn take_response(&mut self) -> Result<Option<(RequestId, Resp)>> {
        Ok(self.responses.pop_front())
    }
}

pub struct MockService<Req, Resp> {
    id: usize,
    requests: VecDeque<(Req, RequestId)>,
    responses_sent: Arc<Mutex<Vec<(RequestId, Resp)>>>,
}

impl<Req, Resp> MockService<Req, Resp> {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            requests: VecDeque::new(),
            responses_sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_request(&mut self, req: Req, rid: RequestId) {
        self.requests.push_back((req, rid));
    }

    /// A cloneable handle for reading back sent responses after this
    /// mock has been moved into an `Executor`, the same pattern
    /// [`ActionServerProbe`] uses.
    pub fn responses_sent(&self) -> Arc<Mutex<Vec<(RequestId, Resp)>>> {
        self.responses_sent.clone()
    }
}

impl<Req: Send, Resp: Send> Waitable for MockService<Req, Resp> {
    fn id(&self) -> usize {
        self.id
    }
}

impl<Req: Send, Resp: Send> ServiceLike<Req, Resp> for MockService<Req, Resp> {
    fn take_request(&mut self) -> Result<Option<(Req, RequestId)>> {
        Ok(self.requests.pop_front())
    }

    fn send_response(&mut self, request_id: RequestId, response: Resp) -> Result<()> {
        self.responses_sent.lock().unwrap().push((request_id, response));
        Ok(())
    }
}

pub struct MockGuardCondition {
    id: usize,
}

impl MockGuardCondition {
    pub fn new(id: usize) -> Self {
        Self { id }
    }
}

impl Waitable for MockGuardCondition {
    fn id(&self) -> usize {
        self.id
    }
}

impl GuardConditionLike for MockGuardCondition {
    fn trigger(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentCancelResponse {
    Accepted,
    Rejected(Option<CancelRejectReason>),
}

/// Outgoing-response log shared with a [`MockActionServer`] via
/// [`MockActionServer::probe`], readable after the server's endpoint has
/// been moved into an `Executor`.
#[derive(Clone)]
pub struct ActionServerProbe<Res> {
    goal_responses: Arc<Mutex<Vec<(GoalUuid, bool)>>>,
    cancel_responses: Arc<Mutex<Vec<(GoalUuid, SentCancelResponse)>>>,
    result_responses: Arc<Mutex<Vec<(GoalUuid, Res)>>>,
}

impl<Res: Clone> ActionServerProbe<Res> {
    pub fn goal_responses_sent(&self) -> Vec<(GoalUuid, bool)> {
        self.goal_responses.lock().unwrap().clone()
    }

    pub fn cancel_responses_sent(&self) -> Vec<(GoalUuid, SentCancelResponse)> {
        self.cancel_responses.lock().unwrap().clone()
    }

    pub fn result_responses_sent(&self) -> Vec<(GoalUuid, Res)> {
        self.result_responses.lock().unwrap().clone()
    }
}

pub struct MockActionServer<Goal, Res> {
    id: usize,
    goal_requests: VecDeque<(GoalUuid, Goal)>,
    cancel_requests: VecDeque<GoalUuid>,
    result_requests: VecDeque<GoalUuid>,
    goal_responses_sent: Arc<Mutex<Vec<(GoalUuid, bool)>>>,
    cancel_responses_sent: Arc<Mutex<Vec<(GoalUuid, SentCancelResponse)>>>,
    result_responses_sent: Arc<Mutex<Vec<(GoalUuid, Res)>>>,
}

impl<Goal, Res> MockActionServer<Goal, Res> {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            goal_requests: VecDeque::new(),
            cancel_requests: VecDeque::new(),
            result_requests: VecDeque::new(),
            goal_responses_sent: Arc::new(Mutex::new(Vec::new())),
            cancel_responses_sent: Arc::new(Mutex::new(Vec::new())),
            result_responses_sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push_goal_request(&mut self, uuid: GoalUuid, goal: Goal) {
        self.goal_requests.push_back((uuid, goal));
    }

    pub fn push_cancel_request(&mut self, uuid: GoalUuid) {
        self.cancel_requests.push_back(uuid);
    }

    pub fn push_result_request(&mut self, uuid: GoalUuid) {
        self.result_requests.push_back(uuid);
    }

    pub fn probe(&self) -> ActionServerProbe<Res> {
        ActionServerProbe {
            goal_responses: self.goal_responses_sent.clone(),
            cancel_responses: self.cancel_responses_sent.clone(),
            result_responses: self.result_responses_sent.clone(),
        }
    }
}

impl<Goal: Send, Res: Send> Waitable for MockActionServer<Goal, Res> {
    fn id(&self) -> usize {
        self.id
    }
}

impl<Goal: Send, Res: Send> ActionServerLike<Goal, Res> for MockActionServer<Goal, Res> {
    fn take_goal_request(&mut self) -> Result<Option<(GoalUuid, Goal)>> {
        Ok(self.goal_requests.pop_front())
    }

    fn take_cancel_request(&mut self) -> Result<Option<GoalUuid>> {
        Ok(self.cancel_requests.pop_front())
    }

    fn take_result_request(&mut self) -> Result<Option<GoalUuid>> {
        Ok(self.result_requests.pop_front())
    }

    fn send_goal_response(&mut self, uuid: GoalUuid, accepted: bool) -> Result<()> {
        self.goal_responses_sent.lock().unwrap().push((uuid, accepted));
        Ok(())
    }

    fn send_cancel_response(
        &mut self,
        uuid: GoalUuid,
        accepted: bool,
        reason: Option<CancelRejectReason>,
    ) -> Result<()> {
        let outcome = if accepted {
            SentCancelResponse::Accepted
        } else {
            SentCancelResponse::Rejected(reason)
        };
        self.cancel_responses_sent.lock().unwrap().push((uuid, outcome));
        Ok(())
    }

    fn send_result_response(&mut self, uuid: GoalUuid, result: Res) -> Result<()> {
        self.result_responses_sent.lock().unwrap().push((uuid, result));
        Ok(())
    }
}

/// Shared inbound-response queues for a [`MockActionClient`], cloned out
/// via [`MockActionClient::scripts`] before the mock is moved into an
/// `Executor`, the same pattern [`ActionServerProbe`] uses for outbound
/// sends — here it's the inbound side that needs scripting after the
/// goal UUID the executor generates becomes known.
#[derive(Clone)]
pub struct ActionClientScripts<Feedback, Res> {
    goal_responses: Arc<Mutex<VecDeque<(RequestId, bool)>>>,
    feedback: Arc<Mutex<VecDeque<(GoalUuid, Feedback)>>>,
    cancel_responses: Arc<Mutex<VecDeque<(RequestId, bool)>>>,
    result_responses: Arc<Mutex<VecDeque<(RequestId, Res)>>>,
    next_rid: Arc<AtomicUsize>,
}

impl<Feedback, Res> ActionClientScripts<Feedback, Res> {
    /// The `RequestId` the mock assigned to its most recently sent
    /// goal/cancel/result request (they share one counter).
    pub fn last_request_id(&self) -> RequestId {
        RequestId(self.next_rid.load(Ordering::SeqCst) as u64 - 1)
    }

    pub fn push_goal_response(&self, rid: RequestId, accepted: bool) {
        self.goal_responses.lock().unwrap().push_back((rid, accepted));
    }

    pub fn push_feedback(&self, uuid: GoalUuid, fb: Feedback) {
        self.feedback.lock().unwrap().push_back((uuid, fb));
    }

    pub fn push_cancel_response(&self, rid: RequestId, in_canceling_list: bool) {
        self.cancel_responses
            .lock()
            .unwrap()
            .push_back((rid, in_canceling_list));
    }

    pub fn push_result_response(&self, rid: RequestId, res: Res) {
        self.result_responses.lock().unwrap().push_back((rid, res));
    }
}

pub struct MockActionClient<Goal, Feedback, Res> {
    id: usize,
    next_rid: Arc<AtomicUsize>,
    pub goal_requests_sent: Vec<(GoalUuid, Goal)>,
    pub cancel_requests_sent: Vec<GoalUuid>,
    pub result_requests_sent: Vec<GoalUuid>,
    goal_responses: Arc<Mutex<VecDeque<(RequestId, bool)>>>,
    feedback: Arc<Mutex<VecDeque<(GoalUuid, Feedback)>>>,
    cancel_responses: Arc<Mutex<VecDeque<(RequestId, bool)>>>,
    result_responses: Arc<Mutex<VecDeque<(RequestId, Res)>>>,
}

impl<Goal, Feedback, Res> MockActionClient<Goal, Feedback, Res> {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            next_rid: Arc::new(AtomicUsize::new(0)),
            goal_requests_sent: Vec::new(),
            cancel_requests_sent: Vec::new(),
            result_requests_sent: Vec::new(),
            goal_responses: Arc::new(Mutex::new(VecDeque::new())),
            feedback: Arc::new(Mutex::new(VecDeque::new())),
            cancel_responses: Arc::new(Mutex::new(VecDeque::new())),
            result_responses: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn fresh_rid(&mut self) -> RequestId {
        let rid = self.next_rid.fetch_add(1, Ordering::SeqCst);
        RequestId(rid as u64)
    }

    /// A cloneable handle for scripting inbound responses after this
    /// mock has been moved into an `Executor`.
    pub fn scripts(&self) -> ActionClientScripts<Feedback, Res> {
        ActionClientScripts {
            goal_responses: self.goal_responses.clone(),
            feedback: self.feedback.clone(),
            cancel_responses: self.cancel_responses.clone(),
            result_responses: self.result_responses.clone(),
            next_rid: self.next_rid.clone(),
        }
    }
}

impl<Goal: Send, Feedback: Send, Res: Send> Waitable for MockActionClient<Goal, Feedback, Res> {
    fn id(&self) -> usize {
        self.id
    }
}

impl<Goal: Send, Feedback: Send, Res: Send> ActionClientLike<Goal, Feedback, Res>
    for MockActionClient<Goal, Feedback, Res>
{
    fn send_goal_request(&mut self, uuid: GoalUuid, goal: Goal) -> Result<RequestId> {
        self.goal_requests_sent.push((uuid, goal));
        Ok(self.fresh_rid())
    }

    fn send_cancel_request(&mut self, uuid: GoalUuid) -> Result<RequestId> {
        self.cancel_requests_sent.push(uuid);
        Ok(self.fresh_rid())
    }

    fn send_result_request(&mut self, uuid: GoalUuid) -> Result<RequestId> {
        self.result_requests_sent.push(uuid);
        Ok(self.fresh_rid())
    }

    fn take_goal_response(&mut self) -> Result<Option<(RequestId, bool)>> {
        Ok(self.goal_responses.lock().unwrap().pop_front())
    }

    fn take_feedback(&mut self) -> Result<Option<(GoalUuid, Feedback)>> {
        Ok(self.feedback.lock().unwrap().pop_front())
    }

    fn take_cancel_response(&mut self) -> Result<Option<(RequestId, bool)>> {
        Ok(self.cancel_responses.lock().unwrap().pop_front())
    }

    fn take_result_response(&mut self) -> Result<Option<(RequestId, Res)>> {
        Ok(self.result_responses.lock().unwrap().pop_front())
    }
}

#[derive(Default)]
struct ReadinessBusInner {
    context_valid: bool,
    wait_result: bool,
    ready: HashMap<usize, bool>,
    action_client_flags: HashMap<usize, ActionClientReadyFlags>,
    action_server_flags: HashMap<usize, ActionServerReadyFlags>,
}

/// A shared handle a test keeps after its [`MockWaitSet`] has been moved
/// into an `Executor`, so it can still script per-round readiness.
/// Cloning shares the same underlying state (`Arc<Mutex<..>>`), the same
/// relationship a real wait set has to whatever notifies it.
#[derive(Clone)]
pub struct ReadinessBus(std::sync::Arc<std::sync::Mutex<ReadinessBusInner>>);

impl ReadinessBus {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(std::sync::Mutex::new(
            ReadinessBusInner {
                context_valid: true,
                wait_result: true,
                ready: HashMap::new(),
                action_client_flags: HashMap::new(),
                action_server_flags: HashMap::new(),
            },
        )))
    }

    pub fn set_ready(&self, endpoint_id: usize, ready: bool) {
        self.0.lock().unwrap().ready.insert(endpoint_id, ready);
    }

    pub fn set_action_client_flags(&self, endpoint_id: usize, flags: ActionClientReadyFlags) {
        self.0
            .lock()
            .unwrap()
            .action_client_flags
            .insert(endpoint_id, flags);
    }

    pub fn set_action_server_flags(&self, endpoint_id: usize, flags: ActionServerReadyFlags) {
        self.0
            .lock()
            .unwrap()
            .action_server_flags
            .insert(endpoint_id, flags);
    }

    pub fn invalidate_context(&self) {
        self.0.lock().unwrap().context_valid = false;
    }

    pub fn set_wait_result(&self, ready: bool) {
        self.0.lock().unwrap().wait_result = ready;
    }
}

impl Default for ReadinessBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Scripted wait set: a test marks endpoints ready by id through a
/// shared [`ReadinessBus`] before calling `spin_some`, instead of a
/// real wait primitive blocking on I/O.
///
/// Readiness is keyed by endpoint id across every kind, so a test must
/// give every mock endpoint it registers a distinct id, not just a
/// distinct id within its own kind.
pub struct MockWaitSet {
    bus: ReadinessBus,
    subs: Vec<usize>,
    timers: Vec<usize>,
    clients: Vec<usize>,
    services: Vec<usize>,
    guards: Vec<usize>,
    action_clients: Vec<usize>,
    action_servers: Vec<usize>,
}

impl MockWaitSet {
    pub fn new(bus: ReadinessBus) -> Self {
        Self {
            bus,
            subs: Vec::new(),
            timers: Vec::new(),
            clients: Vec::new(),
            services: Vec::new(),
            guards: Vec::new(),
            action_clients: Vec::new(),
            action_servers: Vec::new(),
        }
    }

    fn ready_at(&self, ids: &[usize], slot: SlotIndex) -> bool {
        let Some(&id) = ids.get(slot) else {
            return false;
        };
        self.bus
            .0
            .lock()
            .unwrap()
            .ready
            .get(&id)
            .copied()
            .unwrap_or(false)
    }
}

impl WaitSet for MockWaitSet {
    fn prepare(&mut self, _counts: WaitSetCounts) -> Result<()> {
        Ok(())
    }

    fn clear(&mut self) {
        self.subs.clear();
        self.timers.clear();
        self.clients.clear();
        self.services.clear();
        self.guards.clear();
        self.action_clients.clear();
        self.action_servers.clear();
    }

    fn add_subscription(&mut self, id: usize) -> Result<SlotIndex> {
        self.subs.push(id);
        Ok(self.subs.len() - 1)
    }

    fn add_timer(&mut self, id: usize) -> Result<SlotIndex> {
        self.timers.push(id);
        Ok(self.timers.len() - 1)
    }

    fn add_client(&mut self, id: usize) -> Result<SlotIndex> {
        self.clients.push(id);
        Ok(self.clients.len() - 1)
    }

    fn add_service(&mut self, id: usize) -> Result<SlotIndex> {
        self.services.push(id);
        Ok(self.services.len() - 1)
    }

    fn add_guard_condition(&mut self, id: usize) -> Result<SlotIndex> {
        self.guards.push(id);
        Ok(self.guards.len() - 1)
    }

    fn add_action_client(&mut self, id: usize) -> Result<SlotIndex> {
        self.action_clients.push(id);
        Ok(self.action_clients.len() - 1)
    }

    fn add_action_server(&mut self, id: usize) -> Result<SlotIndex> {
        self.action_servers.push(id);
        Ok(self.action_servers.len() - 1)
    }

    fn wait(&mut self, _timeout: std::time::Duration) -> Result<bool> {
        Ok(self.bus.0.lock().unwrap().wait_result)
    }

    fn is_subscription_ready(&self, slot: SlotIndex) -> bool {
        self.ready_at(&self.subs, slot)
    }

    fn is_timer_ready(&self, slot: SlotIndex) -> bool {
        self.ready_at(&self.timers, slot)
    }

    fn is_client_ready(&self, slot: SlotIndex) -> bool {
        self.ready_at(&self.clients, slot)
    }

    fn is_service_ready(&self, slot: SlotIndex) -> bool {
        self.ready_at(&self.services, slot)
    }

    fn is_guard_condition_ready(&self, slot: SlotIndex) -> bool {
        self.ready_at(&self.guards, slot)
    }

    fn is_action_client_ready(&self, slot: SlotIndex) -> bool {
        self.ready_at(&self.action_clients, slot)
    }

    fn is_action_server_ready(&self, slot: SlotIndex) -> bool {
        self.ready_at(&self.action_servers, slot)
    }

    fn action_client_ready_flags(&self, slot: SlotIndex) -> ActionClientReadyFlags {
        let Some(&id) = self.action_clients.get(slot) else {
            return ActionClientReadyFlags::default();
        };
        self.bus
            .0
            .lock()
            .unwrap()
            .action_client_flags
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    fn action_server_ready_flags(&self, slot: SlotIndex) -> ActionServerReadyFlags {
        let Some(&id) = self.action_servers.get(slot) else {
            return ActionServerReadyFlags::default();
        };
        self.bus
            .0
            .lock()
            .unwrap()
            .action_server_flags
            .get(&id)
            .copied()
            .unwrap_or_default()
    }

    fn context_is_valid(&self) -> bool {
        self.bus.0.lock().unwrap().context_valid
    }
}
