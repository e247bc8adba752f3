//! DTLS transport proxy
//!
//! A DTLS transport owns the proxy of the ICE transport beneath it through
//! an [`OwnedWrap`], so the ICE proxy lives at least as long as the DTLS
//! proxy does. Observer registration happens on the engine's worker thread.

use crate::context::Context;
use crate::engine::{invoke, DtlsState, DtlsTransportObserver, NativeDtlsTransport};
use crate::ice_transport::{IceTransport, IceTransportArgs};
use crate::key::HandleKey;
use crate::listener::Listener;
use crate::{Error, Result};
use hostloop_core::{
    Dispatcher, EventLoop, EventTarget, HostContext, HostRefCount, LoopState, OwnedWrap,
    RefCounted, RefPtr,
};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notifications from the native transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtlsTransportNotification {
    StateChange {
        state: DtlsState,
        remote_certificates: Vec<Vec<u8>>,
    },
    Error(String),
}

/// Events delivered to the host listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DtlsTransportEvent {
    StateChange { state: DtlsState },
    Error { message: String },
}

struct DtlsObserverRelay {
    dispatcher: Dispatcher<DtlsTransport>,
}

impl DtlsTransportObserver for DtlsObserverRelay {
    fn on_state_change(&self, state: DtlsState, remote_certificates: Vec<Vec<u8>>) {
        self.dispatcher.notify(DtlsTransportNotification::StateChange {
            state,
            remote_certificates,
        });
    }

    fn on_error(&self, message: String) {
        self.dispatcher
            .notify(DtlsTransportNotification::Error(message));
    }
}

/// Constructor arguments for [`DtlsTransport`]
pub struct DtlsTransportArgs {
    pub host: HostContext,
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeDtlsTransport>,
}

/// Host-visible DTLS transport
pub struct DtlsTransport {
    events: EventLoop<DtlsTransport>,
    context: Rc<Context>,
    native: Arc<dyn NativeDtlsTransport>,
    key: HandleKey,
    refs: HostRefCount,
    ice: OwnedWrap<HandleKey, IceTransport, IceTransportArgs>,
    ice_key: HandleKey,
    state: Cell<DtlsState>,
    remote_certificates: RefCell<Vec<Vec<u8>>>,
    listener: Listener<DtlsTransportEvent>,
}

impl DtlsTransport {
    /// Cache factory; see [`Context::dtls_transports`]
    pub fn create(args: DtlsTransportArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let DtlsTransportArgs {
            host,
            context,
            native,
        } = args;

        let ice = OwnedWrap::new(Rc::clone(context.ice_transports()));
        let native_ice = native.ice_transport();
        let ice_key = HandleKey::of(&native_ice);
        ice.get_or_create(
            IceTransportArgs {
                host: host.clone(),
                context: Rc::clone(&context),
                native: native_ice,
            },
            ice_key,
        )?;

        let transport = Rc::new_cyclic(|weak| Self {
            events: EventLoop::new(&host, "RTCDtlsTransport", weak.clone(), context.loop_config()),
            context: Rc::clone(&context),
            native: Arc::clone(&native),
            key,
            refs: HostRefCount::new(),
            ice,
            ice_key,
            state: Cell::new(DtlsState::New),
            remote_certificates: RefCell::new(Vec::new()),
            listener: Listener::new(),
        });
        transport.events.retain_target(Rc::clone(&transport));

        let observer = Arc::new(DtlsObserverRelay {
            dispatcher: transport.events.dispatcher(),
        });
        let worker = context.native().worker_thread();
        let registered = Arc::clone(&native);
        let initial = invoke(worker.as_ref(), move || {
            registered.register_observer(observer);
            (registered.state(), registered.remote_certificates())
        });
        let (state, certificates) = match initial {
            Ok(initial) => initial,
            Err(e) => {
                transport.events.stop();
                return Err(hostloop_core::Error::Construction(e.to_string()));
            }
        };
        transport.state.set(state);
        *transport.remote_certificates.borrow_mut() = certificates;
        debug!(?key, ?ice_key, %state, "DTLS transport proxy created");

        if state == DtlsState::Closed {
            transport.stop_transport();
        }
        Ok(transport)
    }

    /// Install the host listener
    pub fn on_event(&self, callback: impl FnMut(&DtlsTransportEvent) + 'static) {
        self.listener.set(callback);
    }

    /// Stop observing the native transport and the ICE transport beneath it
    ///
    /// Idempotent.
    pub fn stop_transport(&self) {
        if self.events.should_stop() {
            return;
        }
        let native = Arc::clone(&self.native);
        let worker = self.context.native().worker_thread();
        if let Err(e) = worker.post(Box::new(move || native.unregister_observer())) {
            warn!(error = %e, "could not unregister DTLS transport observer");
        }
        if let Some(ice) = self.ice.get(&self.ice_key) {
            if let Some(ice) = ice.get() {
                ice.on_dtls_transport_stopped();
            }
        }
        self.events.stop();
    }

    /// The ICE transport beneath this one
    pub fn ice_transport(&self, host: &HostContext) -> Result<RefPtr<IceTransport>> {
        if let Some(ice) = self.ice.get(&self.ice_key) {
            return Ok(ice);
        }
        if self.events.should_stop() {
            return Err(Error::InvalidState("RTCDtlsTransport is stopped".to_string()));
        }
        let native_ice = self.native.ice_transport();
        let ice_key = HandleKey::of(&native_ice);
        let ice = self.ice.get_or_create(
            IceTransportArgs {
                host: host.clone(),
                context: Rc::clone(&self.context),
                native: native_ice,
            },
            ice_key,
        )?;
        Ok(ice)
    }

    pub fn state(&self) -> DtlsState {
        self.state.get()
    }

    /// DER-encoded certificates presented by the remote peer
    pub fn remote_certificates(&self) -> Vec<Vec<u8>> {
        self.remote_certificates.borrow().clone()
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn loop_state(&self) -> LoopState {
        self.events.state()
    }
}

impl EventTarget for DtlsTransport {
    type Notification = DtlsTransportNotification;

    fn handle(&self, _ctx: &HostContext, notification: DtlsTransportNotification) {
        match notification {
            DtlsTransportNotification::StateChange {
                state,
                remote_certificates,
            } => {
                self.state.set(state);
                *self.remote_certificates.borrow_mut() = remote_certificates;
                if state == DtlsState::Closed {
                    self.stop_transport();
                }
                self.listener.emit(&DtlsTransportEvent::StateChange { state });
            }
            DtlsTransportNotification::Error(message) => {
                warn!(%message, "DTLS transport error");
                self.listener.emit(&DtlsTransportEvent::Error { message });
            }
        }
    }
}

impl RefCounted for DtlsTransport {
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

impl Drop for DtlsTransport {
    fn drop(&mut self) {
        self.context.dtls_transports().release(self);
    }
}

impl fmt::Debug for DtlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsTransport")
            .field("state", &self.state.get())
            .field("ice", &self.ice_key)
            .field("loop", &self.events.state())
            .finish()
    }
}
