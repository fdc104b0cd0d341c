//! Handle records and the fixed-capacity handle table.
//!
//! A [`Handle`] is a tagged union over the event-source kinds the
//! executor multiplexes. Dispatch throughout the executor is a `match`
//! over this tag — no trait-object downcasting, no virtual dispatch.

use crate::action::client::ActionClientBindingOps;
use crate::action::server::ActionServerBindingOps;
use crate::error::{ExecutorError, Result};
use crate::middleware::{
    ClientLike, GuardConditionLike, RequestId, ServiceLike, SubEntityCounts, SubscriptionLike,
    TimerCallOutcome, TimerLike,
};

/// Whether a callback fires only on fresh data, or every round once the
/// handle has been waited on at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    OnNewData,
    Always,
}

/// The tag distinguishing every handle kind the executor knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandleKind {
    Subscription,
    SubscriptionWithContext,
    Timer,
    Client,
    ClientWithRequestId,
    Service,
    ServiceWithRequestId,
    ServiceWithContext,
    GuardCondition,
    ActionClient,
    ActionServer,
}

/// Counts of live handles, broken down by kind. `sum() == count` is
/// invariant P1/I2 only for kinds with no composite sub-entities; an
/// action client/server also folds its reported
/// [`SubEntityCounts`](crate::middleware::SubEntityCounts) into the
/// generic fields here (I3), so those fields can run ahead of the raw
/// handle-table row count.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandleCounters {
    pub subscriptions: usize,
    pub timers: usize,
    pub clients: usize,
    pub services: usize,
    pub guard_conditions: usize,
    pub action_clients: usize,
    pub action_servers: usize,
}

impl HandleCounters {
    fn bump(&mut self, kind: HandleKind, delta: i64) {
        let field = match kind {
            HandleKind::Subscription | HandleKind::SubscriptionWithContext => {
                &mut self.subscriptions
            }
            HandleKind::Timer => &mut self.timers,
            HandleKind::Client | HandleKind::ClientWithRequestId => &mut self.clients,
            HandleKind::Service
            | HandleKind::ServiceWithRequestId
            | HandleKind::ServiceWithContext => &mut self.services,
            HandleKind::GuardCondition => &mut self.guard_conditions,
            HandleKind::ActionClient => &mut self.action_clients,
            HandleKind::ActionServer => &mut self.action_servers,
        };
        *field = (*field as i64 + delta) as usize;
    }

    /// Folds (or un-folds, with `delta == -1`) an action endpoint's
    /// reported sub-entity counts into the matching generic fields,
    /// mirroring `rcl_action_{client,server}_wait_set_get_num_entities`.
    fn bump_extra(&mut self, extra: SubEntityCounts, delta: i64) {
        self.subscriptions =
            (self.subscriptions as i64 + delta * extra.subscriptions as i64) as usize;
        self.timers = (self.timers as i64 + delta * extra.timers as i64) as usize;
        self.clients = (self.clients as i64 + delta * extra.clients as i64) as usize;
        self.services = (self.services as i64 + delta * extra.services as i64) as usize;
        self.guard_conditions =
            (self.guard_conditions as i64 + delta * extra.guard_conditions as i64) as usize;
    }
}

/// Internal, type-erased operations shared by every subscription-family
/// binding (plain or with-context). Concrete bindings are monomorphized
/// per `add_subscription[_with_context]::<T, ..>` call site and boxed
/// here so the handle table can hold heterogeneous message types.
pub(crate) trait SubscriptionOps: Send {
    fn endpoint_id(&self) -> usize;
    /// Attempts one take; `Ok(true)` means new data is now buffered.
    fn take(&mut self) -> Result<bool>;
    /// Invokes the user callback. `had_data` selects between the
    /// buffered message and `None` (ALWAYS semantics firing dry).
    fn invoke(&mut self, had_data: bool);
}

pub(crate) struct SubscriptionBinding<T, S: SubscriptionLike<T>> {
    pub endpoint: S,
    buffer: Option<T>,
    callback: Box<dyn FnMut(Option<&T>) + Send>,
}

impl<T: Send, S: SubscriptionLike<T>> SubscriptionBinding<T, S> {
    pub fn new(endpoint: S, callback: Box<dyn FnMut(Option<&T>) + Send>) -> Self {
        Self {
            endpoint,
            buffer: None,
            callback,
        }
    }
}

impl<T: Send, S: SubscriptionLike<T>> SubscriptionOps for SubscriptionBinding<T, S> {
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn take(&mut self) -> Result<bool> {
        match self.endpoint.take() {
            Ok(Some(msg)) => {
                self.buffer = Some(msg);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn invoke(&mut self, had_data: bool) {
        if had_data {
            (self.callback)(self.buffer.as_ref());
        } else {
            (self.callback)(None);
        }
    }
}

pub(crate) struct SubscriptionCtxBinding<T, S: SubscriptionLike<T>, C> {
    pub endpoint: S,
    buffer: Option<T>,
    ctx: C,
    callback: Box<dyn FnMut(Option<&T>, &mut C) + Send>,
}

impl<T: Send, S: SubscriptionLike<T>, C: Send> SubscriptionCtxBinding<T, S, C> {
    pub fn new(endpoint: S, ctx: C, callback: Box<dyn FnMut(Option<&T>, &mut C) + Send>) -> Self {
        Self {
            endpoint,
            buffer: None,
            ctx,
            callback,
        }
    }
}

impl<T: Send, S: SubscriptionLike<T>, C: Send> SubscriptionOps for SubscriptionCtxBinding<T, S, C> {
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn take(&mut self) -> Result<bool> {
        match self.endpoint.take() {
            Ok(Some(msg)) => {
                self.buffer = Some(msg);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn invoke(&mut self, had_data: bool) {
        let data = if had_data { self.buffer.as_ref() } else { None };
        (self.callback)(data, &mut self.ctx);
    }
}

/// Type-erased timer binding. The user callback lives inside the
/// middleware-constructed endpoint itself (the registration surface
/// for timers takes no callback argument), so this wrapper only needs
/// to forward the call primitive.
pub(crate) trait TimerOps: Send {
    fn endpoint_id(&self) -> usize;
    fn call(&mut self) -> Result<()>;
}

pub(crate) struct TimerBinding<Ti: TimerLike> {
    pub endpoint: Ti,
}

impl<Ti: TimerLike> TimerOps for TimerBinding<Ti> {
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn call(&mut self) -> Result<()> {
        match self.endpoint.call()? {
            TimerCallOutcome::Called | TimerCallOutcome::Canceled => Ok(()),
        }
    }
}

/// Type-erased client-family binding (plain or with-request-id).
pub(crate) trait ClientOps: Send {
    fn endpoint_id(&self) -> usize;
    fn take(&mut self) -> Result<bool>;
    fn invoke(&mut self);
}

pub(crate) struct ClientBinding<Req, Resp, Cl: ClientLike<Req, Resp>> {
    pub endpoint: Cl,
    pending: Option<(RequestId, Resp)>,
    callback: Box<dyn FnMut(&Resp) + Send>,
    _req: std::marker::PhantomData<Req>,
}

impl<Req, Resp, Cl: ClientLike<Req, Resp>> ClientBinding<Req, Resp, Cl> {
    pub fn new(endpoint: Cl, callback: Box<dyn FnMut(&Resp) + Send>) -> Self {
        Self {
            endpoint,
            pending: None,
            callback,
            _req: std::marker::PhantomData,
        }
    }
}

impl<Req: Send, Resp: Send, Cl: ClientLike<Req, Resp>> ClientOps for ClientBinding<Req, Resp, Cl> {
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn take(&mut self) -> Result<bool> {
        match self.endpoint.take_response() {
            Ok(Some((rid, resp))) => {
                self.pending = Some((rid, resp));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn invoke(&mut self) {
        if let Some((_, resp)) = self.pending.take() {
            (self.callback)(&resp);
        }
    }
}

pub(crate) struct ClientWithRequestIdBinding<Req, Resp, Cl: ClientLike<Req, Resp>> {
    pub endpoint: Cl,
    pending: Option<(RequestId, Resp)>,
    callback: Box<dyn FnMut(&Resp, RequestId) + Send>,
    _req: std::marker::PhantomData<Req>,
}

impl<Req, Resp, Cl: ClientLike<Req, Resp>> ClientWithRequestIdBinding<Req, Resp, Cl> {
    pub fn new(endpoint: Cl, callback: Box<dyn FnMut(&Resp, RequestId) + Send>) -> Self {
        Self {
            endpoint,
            pending: None,
            callback,
            _req: std::marker::PhantomData,
        }
    }
}

impl<Req: Send, Resp: Send, Cl: ClientLike<Req, Resp>> ClientOps
    for ClientWithRequestIdBinding<Req, Resp, Cl>
{
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn take(&mut self) -> Result<bool> {
        match self.endpoint.take_response() {
            Ok(Some((rid, resp))) => {
                self.pending = Some((rid, resp));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn invoke(&mut self) {
        if let Some((rid, resp)) = self.pending.take() {
            (self.callback)(&resp, rid);
        }
    }
}

/// Type-erased service-family binding (plain, with-request-id, or
/// with-context). The response buffer is seeded with `Resp::default()`
/// for each in-flight request rather than persisted across rounds —
/// an at-most-one-in-flight buffer is equivalent for this executor's
/// single-threaded, one-round-at-a-time contract.
pub(crate) trait ServiceOps: Send {
    fn endpoint_id(&self) -> usize;
    fn take(&mut self) -> Result<bool>;
    fn invoke_and_respond(&mut self) -> Result<()>;
}

pub(crate) struct ServiceBinding<Req, Resp: Default, S: ServiceLike<Req, Resp>> {
    pub endpoint: S,
    pending: Option<(Req, RequestId)>,
    callback: Box<dyn FnMut(&Req, &mut Resp) + Send>,
}

impl<Req, Resp: Default, S: ServiceLike<Req, Resp>> ServiceBinding<Req, Resp, S> {
    pub fn new(endpoint: S, callback: Box<dyn FnMut(&Req, &mut Resp) + Send>) -> Self {
        Self {
            endpoint,
            pending: None,
            callback,
        }
    }
}

impl<Req: Send, Resp: Default + Send, S: ServiceLike<Req, Resp>> ServiceOps
    for ServiceBinding<Req, Resp, S>
{
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn take(&mut self) -> Result<bool> {
        match self.endpoint.take_request() {
            Ok(Some((req, rid))) => {
                self.pending = Some((req, rid));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn invoke_and_respond(&mut self) -> Result<()> {
        let Some((req, rid)) = self.pending.take() else {
            return Ok(());
        };
        let mut resp = Resp::default();
        (self.callback)(&req, &mut resp);
        self.endpoint.send_response(rid, resp)
    }
}

pub(crate) struct ServiceWithRequestIdBinding<Req, Resp: Default, S: ServiceLike<Req, Resp>> {
    pub endpoint: S,
    pending: Option<(Req, RequestId)>,
    callback: Box<dyn FnMut(&Req, RequestId, &mut Resp) + Send>,
}

impl<Req, Resp: Default, S: ServiceLike<Req, Resp>> ServiceWithRequestIdBinding<Req, Resp, S> {
    pub fn new(endpoint: S, callback: Box<dyn FnMut(&Req, RequestId, &mut Resp) + Send>) -> Self {
        Self {
            endpoint,
            pending: None,
            callback,
        }
    }
}

impl<Req: Send, Resp: Default + Send, S: ServiceLike<Req, Resp>> ServiceOps
    for ServiceWithRequestIdBinding<Req, Resp, S>
{
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn take(&mut self) -> Result<bool> {
        match self.endpoint.take_request() {
            Ok(Some((req, rid))) => {
                self.pending = Some((req, rid));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn invoke_and_respond(&mut self) -> Result<()> {
        let Some((req, rid)) = self.pending.take() else {
            return Ok(());
        };
        let mut resp = Resp::default();
        (self.callback)(&req, rid, &mut resp);
        self.endpoint.send_response(rid, resp)
    }
}

pub(crate) struct ServiceWithContextBinding<Req, Resp: Default, S: ServiceLike<Req, Resp>, C> {
    pub endpoint: S,
    pending: Option<(Req, RequestId)>,
    ctx: C,
    callback: Box<dyn FnMut(&Req, &mut Resp, &mut C) + Send>,
}

impl<Req, Resp: Default, S: ServiceLike<Req, Resp>, C> ServiceWithContextBinding<Req, Resp, S, C> {
    pub fn new(
        endpoint: S,
        ctx: C,
        callback: Box<dyn FnMut(&Req, &mut Resp, &mut C) + Send>,
    ) -> Self {
        Self {
            endpoint,
            pending: None,
            ctx,
            callback,
        }
    }
}

impl<Req: Send, Resp: Default + Send, S: ServiceLike<Req, Resp>, C: Send> ServiceOps
    for ServiceWithContextBinding<Req, Resp, S, C>
{
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn take(&mut self) -> Result<bool> {
        match self.endpoint.take_request() {
            Ok(Some((req, rid))) => {
                self.pending = Some((req, rid));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn invoke_and_respond(&mut self) -> Result<()> {
        let Some((req, rid)) = self.pending.take() else {
            return Ok(());
        };
        let mut resp = Resp::default();
        (self.callback)(&req, &mut resp, &mut self.ctx);
        self.endpoint.send_response(rid, resp)
    }
}

/// Type-erased guard-condition binding.
pub(crate) trait GuardConditionOps: Send {
    fn endpoint_id(&self) -> usize;
    fn invoke(&mut self);
}

pub(crate) struct GuardConditionBinding<G: GuardConditionLike> {
    pub endpoint: G,
    callback: Box<dyn FnMut() + Send>,
}

impl<G: GuardConditionLike> GuardConditionBinding<G> {
    pub fn new(endpoint: G, callback: Box<dyn FnMut() + Send>) -> Self {
        Self { endpoint, callback }
    }
}

impl<G: GuardConditionLike> GuardConditionOps for GuardConditionBinding<G> {
    fn endpoint_id(&self) -> usize {
        self.endpoint.id()
    }

    fn invoke(&mut self) {
        (self.callback)()
    }
}

/// One slot in the handle table.
///
/// `invocation`, `data_available` and `slot_index` are common to every
/// kind that participates in the wait set; the payload is the
/// per-kind, type-erased binding.
pub struct Handle {
    pub kind: HandleKind,
    pub invocation: Invocation,
    pub slot_index: usize,
    pub data_available: bool,
    pub(crate) payload: Payload,
    /// Sub-entity counts this handle folded into the table's counters
    /// on insertion (non-zero only for action client/server kinds),
    /// un-folded again on removal.
    pub(crate) extra_counts: SubEntityCounts,
}

pub(crate) enum Payload {
    Subscription(Box<dyn SubscriptionOps>),
    Timer(Box<dyn TimerOps>),
    Client(Box<dyn ClientOps>),
    Service(Box<dyn ServiceOps>),
    GuardCondition(Box<dyn GuardConditionOps>),
    ActionClient(Box<dyn ActionClientBindingOps>),
    ActionServer(Box<dyn ActionServerBindingOps>),
}

impl Handle {
    /// Identity used by `remove_*` lookups and the `one(target)` trigger.
    pub fn endpoint_id(&self) -> usize {
        match &self.payload {
            Payload::Subscription(s) => s.endpoint_id(),
            Payload::Timer(t) => t.endpoint_id(),
            Payload::Client(c) => c.endpoint_id(),
            Payload::Service(s) => s.endpoint_id(),
            Payload::GuardCondition(g) => g.endpoint_id(),
            Payload::ActionClient(a) => a.endpoint_id(),
            Payload::ActionServer(a) => a.endpoint_id(),
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind)
            .field("invocation", &self.invocation)
            .field("slot_index", &self.slot_index)
            .field("data_available", &self.data_available)
            .field("endpoint_id", &self.endpoint_id())
            .finish()
    }
}

/// Fixed-capacity, order-preserving sequence of [`Handle`]s.
///
/// Capacity is reserved once, at construction, and never grown
/// afterward — the Rust-level analogue of the handle table's "no
/// dynamic growth after spin begins" contract.
pub struct HandleTable {
    capacity: usize,
    handles: Vec<Handle>,
    counters: HandleCounters,
}

impl HandleTable {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ExecutorError::InvalidArgument);
        }
        Ok(Self {
            capacity,
            handles: Vec::with_capacity(capacity),
            counters: HandleCounters::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn counters(&self) -> HandleCounters {
        self.counters
    }

    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.handles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Handle> {
        self.handles.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Handle> {
        self.handles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Handle> {
        self.handles.get_mut(index)
    }

    /// Appends a handle in the next free slot. `Overflow` once the
    /// table is at `capacity`. `extra_counts` is non-zero only for
    /// action client/server kinds (see [`HandleCounters::bump_extra`]).
    pub(crate) fn insert(
        &mut self,
        kind: HandleKind,
        invocation: Invocation,
        payload: Payload,
        extra_counts: SubEntityCounts,
    ) -> Result<usize> {
        if self.handles.len() >= self.capacity {
            return Err(ExecutorError::Overflow);
        }
        self.handles.push(Handle {
            kind,
            invocation,
            // Sentinel for "not yet assigned a position in the wait
            // set" is the table's capacity (spec.md's `index =
            // max_handles` convention), not an out-of-band value.
            slot_index: self.capacity,
            data_available: false,
            payload,
            extra_counts,
        });
        self.counters.bump(kind, 1);
        self.counters.bump_extra(extra_counts, 1);
        Ok(self.handles.len() - 1)
    }

    /// Removes the handle whose endpoint id matches `endpoint_id`,
    /// shifting the tail left to preserve registration order (P3).
    pub(crate) fn remove_by_endpoint_id(&mut self, endpoint_id: usize) -> Result<Handle> {
        let pos = self
            .handles
            .iter()
            .position(|h| h.endpoint_id() == endpoint_id)
            .ok_or(ExecutorError::NotFound)?;
        let removed = self.handles.remove(pos);
        self.counters.bump(removed.kind, -1);
        self.counters.bump_extra(removed.extra_counts, -1);
        Ok(removed)
    }
}
