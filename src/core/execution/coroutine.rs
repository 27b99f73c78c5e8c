//! Execution contexts for activity modules.
//!
//! Each activity runs its procedure on a dedicated thread. Control passes
//! between kernel and context strictly by rendezvous: zero-capacity channels
//! carry every transfer, so at any moment exactly one side is running.
//! While a context runs, the kernel only serves the requests it makes
//! (schedule, send, emit, ...) until the context suspends or ends.

use crate::core::components::component::ActivityFn;
use crate::core::components::context::SimContext;
use crate::core::components::params::ParamValue;
use crate::core::components::signals::{SignalListener, SignalValue};
use crate::core::errors::{Interrupt, SimError, SimResult};
use crate::core::event::Message;
use crate::core::rng::Draw;
use crate::core::time::TimeValue;
use crate::core::types::{ComponentId, EventId};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    NotStarted,
    Running,
    Suspended,
    Finished,
    Faulted,
}

/// Kernel services an activity can ask for
pub(crate) enum Request {
    ScheduleAt { time: TimeValue, msg: Message },
    Cancel(EventId),
    Send { msg: Message, gate: String, index: Option<u32>, delay: TimeValue },
    SendDirect { msg: Message, target: ComponentId, delay: TimeValue },
    Emit { signal: String, value: SignalValue },
    Par(String),
    SetPar { name: String, value: ParamValue },
    Subscribe { signal: String, listener: Box<dyn SignalListener> },
    Draw(Draw),
    Create { type_name: String, name: String, parent: Option<ComponentId> },
    Delete(ComponentId),
    Drop(ComponentId),
    Take(ComponentId),
    Find(String),
}

pub(crate) enum Reply {
    Done,
    EventId(EventId),
    Cancelled(Option<Message>),
    Param(ParamValue),
    Number(f64),
    Component(Option<ComponentId>),
}

enum ToContext {
    Start { now: TimeValue },
    Resume(Message),
    Reply(SimResult<Reply>),
}

enum FromContext {
    Request(Request),
    Suspend,
    Finished,
    Faulted(Interrupt),
}

/// Kernel-side handle of an activity's execution context
pub struct ExecutionContext {
    component: ComponentId,
    state: ContextState,
    to_ctx: Option<Sender<ToContext>>,
    from_ctx: Receiver<FromContext>,
    thread: Option<JoinHandle<()>>,
    suspended_at: Option<TimeValue>,
    last_message: Option<EventId>,
}

impl ExecutionContext {
    /// Create the context thread; the procedure does not run until `start`
    pub(crate) fn spawn(
        component: ComponentId,
        name: &str,
        body: ActivityFn,
        stack_size: usize,
    ) -> Result<Self, SimError> {
        let (to_ctx, from_kernel) = bounded::<ToContext>(0);
        let (to_kernel, from_ctx) = bounded::<FromContext>(0);
        let thread = thread::Builder::new()
            .name(format!("activity-{}", name))
            .stack_size(stack_size)
            .spawn(move || {
                let now = match from_kernel.recv() {
                    Ok(ToContext::Start { now }) => now,
                    _ => return,
                };
                let mut ctx = ActivityContext {
                    component,
                    now,
                    to_kernel,
                    from_kernel,
                };
                let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(&mut ctx))) {
                    Ok(Ok(())) => FromContext::Finished,
                    Ok(Err(interrupt)) => FromContext::Faulted(interrupt),
                    Err(payload) => FromContext::Faulted(Interrupt::Failed(SimError::runtime(
                        format!("activity panicked: {}", panic_message(payload.as_ref())),
                    ))),
                };
                let _ = ctx.to_kernel.send(outcome);
            })
            .map_err(|e| SimError::runtime(format!("cannot create execution context: {}", e)))?;
        Ok(Self {
            component,
            state: ContextState::NotStarted,
            to_ctx: Some(to_ctx),
            from_ctx,
            thread: Some(thread),
            suspended_at: None,
            last_message: None,
        })
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Simulation time at which the context last suspended
    pub fn suspended_at(&self) -> Option<TimeValue> {
        self.suspended_at
    }

    /// Event id of the message that last resumed the context
    pub fn last_message(&self) -> Option<EventId> {
        self.last_message
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self.state, ContextState::Finished | ContextState::Faulted)
    }

    /// Run the procedure from its beginning until it first suspends or ends
    pub(crate) fn start<F>(&mut self, now: TimeValue, service: F) -> SimResult
    where
        F: FnMut(Request) -> SimResult<Reply>,
    {
        if self.state != ContextState::NotStarted {
            return Err(SimError::internal(format!(
                "execution context of {} started twice",
                self.component
            ))
            .into());
        }
        self.transfer(ToContext::Start { now }, now, service)
    }

    /// Hand `msg` to the suspended procedure and run it until it next
    /// suspends or ends
    pub(crate) fn resume<F>(&mut self, msg: Message, service: F) -> SimResult
    where
        F: FnMut(Request) -> SimResult<Reply>,
    {
        if self.state != ContextState::Suspended {
            return Err(SimError::internal(format!(
                "cannot resume execution context of {} in state {:?}",
                self.component, self.state
            ))
            .into());
        }
        let now = msg.arrival_time();
        self.last_message = msg.event_id();
        self.transfer(ToContext::Resume(msg), now, service)
    }

    fn transfer<F>(&mut self, first: ToContext, now: TimeValue, mut service: F) -> SimResult
    where
        F: FnMut(Request) -> SimResult<Reply>,
    {
        self.send(first)?;
        self.state = ContextState::Running;
        loop {
            match self.from_ctx.recv() {
                Ok(FromContext::Request(req)) => {
                    let reply = service(req);
                    self.send(ToContext::Reply(reply))?;
                }
                Ok(FromContext::Suspend) => {
                    self.state = ContextState::Suspended;
                    self.suspended_at = Some(now);
                    return Ok(());
                }
                Ok(FromContext::Finished) => {
                    self.state = ContextState::Finished;
                    self.join();
                    return Ok(());
                }
                Ok(FromContext::Faulted(interrupt)) => {
                    self.state = ContextState::Faulted;
                    self.join();
                    return Err(interrupt);
                }
                Err(_) => {
                    self.state = ContextState::Faulted;
                    self.join();
                    return Err(SimError::internal(format!(
                        "execution context of {} vanished",
                        self.component
                    ))
                    .into());
                }
            }
        }
    }

    fn send(&mut self, msg: ToContext) -> SimResult {
        let tx = self.to_ctx.as_ref().ok_or_else(|| {
            Interrupt::Failed(SimError::internal("execution context already killed"))
        })?;
        tx.send(msg).map_err(|_| {
            self.state = ContextState::Faulted;
            Interrupt::Failed(SimError::internal(format!(
                "execution context of {} is gone",
                self.component
            )))
        })
    }

    /// Unwind the procedure and release its thread. Any blocking call the
    /// procedure is in returns `Interrupt::Killed`.
    pub(crate) fn kill(&mut self) {
        if self.to_ctx.take().is_none() {
            return;
        }
        if self.state == ContextState::Running {
            warn!("killing execution context of {} while it runs", self.component);
        }
        loop {
            match self.from_ctx.recv() {
                Ok(FromContext::Finished) | Ok(FromContext::Faulted(_)) | Err(_) => break,
                Ok(FromContext::Request(_)) | Ok(FromContext::Suspend) => continue,
            }
        }
        self.join();
        if self.is_alive() {
            self.state = ContextState::Finished;
        }
        debug!("execution context of {} killed", self.component);
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("execution context thread of {} panicked", self.component);
            }
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.kill();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn unexpected_reply() -> Interrupt {
    Interrupt::Failed(SimError::internal("unexpected reply from the kernel"))
}

/// The procedure side of an execution context: what an activity sees
pub struct ActivityContext {
    component: ComponentId,
    now: TimeValue,
    to_kernel: Sender<FromContext>,
    from_kernel: Receiver<ToContext>,
}

impl ActivityContext {
    fn request(&mut self, req: Request) -> SimResult<Reply> {
        self.to_kernel
            .send(FromContext::Request(req))
            .map_err(|_| Interrupt::Killed)?;
        match self.from_kernel.recv() {
            Ok(ToContext::Reply(reply)) => reply,
            Ok(_) => Err(SimError::internal("unexpected transfer while awaiting a reply").into()),
            Err(_) => Err(Interrupt::Killed),
        }
    }

    /// Suspend until the next message for this component arrives
    pub fn receive(&mut self) -> SimResult<Message> {
        self.to_kernel
            .send(FromContext::Suspend)
            .map_err(|_| Interrupt::Killed)?;
        match self.from_kernel.recv() {
            Ok(ToContext::Resume(msg)) => {
                self.now = msg.arrival_time();
                Ok(msg)
            }
            Ok(_) => Err(SimError::internal("unexpected transfer while suspended").into()),
            Err(_) => Err(Interrupt::Killed),
        }
    }

    /// Let `delay` simulation time pass. Any other message arriving in the
    /// meantime is an error.
    pub fn wait(&mut self, delay: TimeValue) -> SimResult {
        let timer = self.schedule_after(delay, Message::new("wait-timer"))?;
        let msg = self.receive()?;
        if msg.event_id() == Some(timer) {
            Ok(())
        } else {
            Err(SimError::runtime(format!(
                "message '{}' arrived during wait(); use receive_timeout() to accept messages while waiting",
                msg.name()
            ))
            .into())
        }
    }

    /// Receive a message, giving up after `timeout`
    pub fn receive_timeout(&mut self, timeout: TimeValue) -> SimResult<Option<Message>> {
        let timer = self.schedule_after(timeout, Message::new("timeout-timer"))?;
        let msg = self.receive()?;
        if msg.event_id() == Some(timer) {
            return Ok(None);
        }
        self.cancel_event(timer)?;
        Ok(Some(msg))
    }
}

impl SimContext for ActivityContext {
    fn component_id(&self) -> ComponentId {
        self.component
    }

    fn now(&self) -> TimeValue {
        self.now
    }

    fn schedule_at(&mut self, time: TimeValue, msg: Message) -> SimResult<EventId> {
        match self.request(Request::ScheduleAt { time, msg })? {
            Reply::EventId(id) => Ok(id),
            _ => Err(unexpected_reply()),
        }
    }

    fn cancel_event(&mut self, id: EventId) -> SimResult<Option<Message>> {
        match self.request(Request::Cancel(id))? {
            Reply::Cancelled(msg) => Ok(msg),
            _ => Err(unexpected_reply()),
        }
    }

    fn send_via(
        &mut self,
        msg: Message,
        gate: &str,
        index: Option<u32>,
        delay: TimeValue,
    ) -> SimResult {
        self.request(Request::Send {
            msg,
            gate: gate.to_string(),
            index,
            delay,
        })
        .map(|_| ())
    }

    fn send_direct(&mut self, msg: Message, target: ComponentId, delay: TimeValue) -> SimResult {
        self.request(Request::SendDirect { msg, target, delay }).map(|_| ())
    }

    fn emit(&mut self, signal: &str, value: SignalValue) -> SimResult {
        self.request(Request::Emit {
            signal: signal.to_string(),
            value,
        })
        .map(|_| ())
    }

    fn par(&mut self, name: &str) -> SimResult<ParamValue> {
        match self.request(Request::Par(name.to_string()))? {
            Reply::Param(v) => Ok(v),
            _ => Err(unexpected_reply()),
        }
    }

    fn set_par(&mut self, name: &str, value: ParamValue) -> SimResult {
        self.request(Request::SetPar {
            name: name.to_string(),
            value,
        })
        .map(|_| ())
    }

    fn subscribe(&mut self, signal: &str, listener: Box<dyn SignalListener>) -> SimResult {
        self.request(Request::Subscribe {
            signal: signal.to_string(),
            listener,
        })
        .map(|_| ())
    }

    fn draw(&mut self, draw: Draw) -> SimResult<f64> {
        match self.request(Request::Draw(draw))? {
            Reply::Number(x) => Ok(x),
            _ => Err(unexpected_reply()),
        }
    }

    fn create_component(
        &mut self,
        type_name: &str,
        name: &str,
        parent: Option<ComponentId>,
    ) -> SimResult<ComponentId> {
        match self.request(Request::Create {
            type_name: type_name.to_string(),
            name: name.to_string(),
            parent,
        })? {
            Reply::Component(Some(id)) => Ok(id),
            _ => Err(unexpected_reply()),
        }
    }

    fn delete_component(&mut self, id: ComponentId) -> SimResult {
        self.request(Request::Delete(id)).map(|_| ())
    }

    fn drop_component(&mut self, id: ComponentId) -> SimResult {
        self.request(Request::Drop(id)).map(|_| ())
    }

    fn take_component(&mut self, id: ComponentId) -> SimResult {
        self.request(Request::Take(id)).map(|_| ())
    }

    fn find_component(&mut self, path: &str) -> SimResult<Option<ComponentId>> {
        match self.request(Request::Find(path.to_string()))? {
            Reply::Component(id) => Ok(id),
            _ => Err(unexpected_reply()),
        }
    }
}
