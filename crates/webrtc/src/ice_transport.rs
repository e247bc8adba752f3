//! ICE transport proxy
//!
//! ICE transports are reached through their DTLS transport, which pins its
//! ICE proxy for its own lifetime. The ICE proxy stops when the DTLS
//! transport above it stops.

use crate::context::Context;
use crate::engine::{
    invoke, IceGatheringState, IceTransportObserver, IceTransportState, NativeIceTransport,
};
use crate::key::HandleKey;
use crate::listener::Listener;
use hostloop_core::{
    Dispatcher, EventLoop, EventTarget, HostContext, HostRefCount, LoopState, RefCounted,
};
use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notifications from the native transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceTransportNotification {
    StateChange(IceTransportState),
    GatheringStateChange(IceGatheringState),
}

/// Events delivered to the host listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IceTransportEvent {
    StateChange { state: IceTransportState },
    GatheringStateChange { state: IceGatheringState },
}

struct IceObserverRelay {
    dispatcher: Dispatcher<IceTransport>,
}

impl IceTransportObserver for IceObserverRelay {
    fn on_state_change(&self, state: IceTransportState) {
        self.dispatcher
            .notify(IceTransportNotification::StateChange(state));
    }

    fn on_gathering_state_change(&self, state: IceGatheringState) {
        self.dispatcher
            .notify(IceTransportNotification::GatheringStateChange(state));
    }
}

/// Constructor arguments for [`IceTransport`]
pub struct IceTransportArgs {
    pub host: HostContext,
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeIceTransport>,
}

/// Host-visible ICE transport
pub struct IceTransport {
    events: EventLoop<IceTransport>,
    context: Rc<Context>,
    native: Arc<dyn NativeIceTransport>,
    key: HandleKey,
    refs: HostRefCount,
    state: Cell<IceTransportState>,
    gathering_state: Cell<IceGatheringState>,
    listener: Listener<IceTransportEvent>,
}

impl IceTransport {
    /// Cache factory; see [`Context::ice_transports`]
    pub fn create(args: IceTransportArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let IceTransportArgs {
            host,
            context,
            native,
        } = args;

        let transport = Rc::new_cyclic(|weak| Self {
            events: EventLoop::new(&host, "RTCIceTransport", weak.clone(), context.loop_config()),
            context: Rc::clone(&context),
            native: Arc::clone(&native),
            key,
            refs: HostRefCount::new(),
            state: Cell::new(IceTransportState::New),
            gathering_state: Cell::new(IceGatheringState::New),
            listener: Listener::new(),
        });
        transport.events.retain_target(Rc::clone(&transport));

        let observer = Arc::new(IceObserverRelay {
            dispatcher: transport.events.dispatcher(),
        });
        let worker = context.native().worker_thread();
        let registered = Arc::clone(&native);
        let initial = invoke(worker.as_ref(), move || {
            registered.register_observer(observer);
            (registered.state(), registered.gathering_state())
        });
        let (state, gathering_state) = match initial {
            Ok(initial) => initial,
            Err(e) => {
                transport.events.stop();
                return Err(hostloop_core::Error::Construction(e.to_string()));
            }
        };
        transport.state.set(state);
        transport.gathering_state.set(gathering_state);
        debug!(?key, %state, "ICE transport proxy created");

        if state == IceTransportState::Closed {
            transport.on_dtls_transport_stopped();
        }
        Ok(transport)
    }

    /// Install the host listener
    pub fn on_event(&self, callback: impl FnMut(&IceTransportEvent) + 'static) {
        self.listener.set(callback);
    }

    /// Stop observing once the DTLS transport above has stopped
    pub fn on_dtls_transport_stopped(&self) {
        if self.events.should_stop() {
            return;
        }
        let native = Arc::clone(&self.native);
        let worker = self.context.native().worker_thread();
        if let Err(e) = worker.post(Box::new(move || native.unregister_observer())) {
            warn!(error = %e, "could not unregister ICE transport observer");
        }
        self.events.stop();
    }

    pub fn state(&self) -> IceTransportState {
        self.state.get()
    }

    pub fn gathering_state(&self) -> IceGatheringState {
        self.gathering_state.get()
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn loop_state(&self) -> LoopState {
        self.events.state()
    }
}

impl EventTarget for IceTransport {
    type Notification = IceTransportNotification;

    fn handle(&self, _ctx: &HostContext, notification: IceTransportNotification) {
        match notification {
            IceTransportNotification::StateChange(state) => {
                self.state.set(state);
                self.listener.emit(&IceTransportEvent::StateChange { state });
            }
            IceTransportNotification::GatheringStateChange(state) => {
                self.gathering_state.set(state);
                self.listener
                    .emit(&IceTransportEvent::GatheringStateChange { state });
            }
        }
    }
}

impl RefCounted for IceTransport {
    fn add_ref(&self) {
        self.refs.add_ref();
    }

    fn release_ref(&self) {
        self.refs.release_ref();
    }

    fn ref_count(&self) -> u32 {
        self.refs.ref_count()
    }
}

impl Drop for IceTransport {
    fn drop(&mut self) {
        self.context.ice_transports().release(self);
    }
}

impl fmt::Debug for IceTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IceTransport")
            .field("state", &self.state.get())
            .field("refs", &self.refs.get())
            .field("loop", &self.events.state())
            .finish()
    }
}
