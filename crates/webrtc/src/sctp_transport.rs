//! SCTP transport proxy
//!
//! The SCTP transport runs over a DTLS transport and pins that transport's
//! proxy for its own lifetime. Both the DTLS lookup and observer
//! registration happen on the engine's worker thread.

use crate::context::{unpin, Context};
use crate::dtls_transport::{DtlsTransport, DtlsTransportArgs};
use crate::engine::{
    invoke, NativeSctpTransport, SctpTransportInformation, SctpTransportObserver,
    SctpTransportState,
};
use crate::key::HandleKey;
use crate::listener::Listener;
use crate::Result;
use hostloop_core::{
    Dispatcher, EventLoop, EventTarget, HostContext, HostRefCount, LoopState, OwnedWrap,
    RefCounted,
};
use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notifications from the native transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SctpTransportNotification {
    StateChange(SctpTransportInformation),
}

/// Events delivered to the host listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SctpTransportEvent {
    StateChange { state: SctpTransportState },
}

struct SctpObserverRelay {
    dispatcher: Dispatcher<SctpTransport>,
}

impl SctpTransportObserver for SctpObserverRelay {
    fn on_state_change(&self, information: SctpTransportInformation) {
        self.dispatcher
            .notify(SctpTransportNotification::StateChange(information));
    }
}

/// Constructor arguments for [`SctpTransport`]
pub struct SctpTransportArgs {
    pub host: HostContext,
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeSctpTransport>,
}

/// Host-visible SCTP transport
pub struct SctpTransport {
    events: EventLoop<SctpTransport>,
    context: Rc<Context>,
    native: Arc<dyn NativeSctpTransport>,
    key: HandleKey,
    refs: HostRefCount,
    dtls: OwnedWrap<HandleKey, DtlsTransport, DtlsTransportArgs>,
    dtls_key: HandleKey,
    information: Cell<SctpTransportInformation>,
    listener: Listener<SctpTransportEvent>,
}

impl SctpTransport {
    /// Cache factory; see [`Context::sctp_transports`]
    pub fn create(args: SctpTransportArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let SctpTransportArgs {
            host,
            context,
            native,
        } = args;
        let worker = context.native().worker_thread();

        let looked_up = Arc::clone(&native);
        let native_dtls = invoke(worker.as_ref(), move || looked_up.dtls_transport())
            .map_err(|e| hostloop_core::Error::Construction(e.to_string()))?;
        let dtls = OwnedWrap::new(Rc::clone(context.dtls_transports()));
        let dtls_key = HandleKey::of(&native_dtls);
        dtls.get_or_create(
            DtlsTransportArgs {
                host: host.clone(),
                context: Rc::clone(&context),
                native: native_dtls,
            },
            dtls_key,
        )?;

        let transport = Rc::new_cyclic(|weak| Self {
            events: EventLoop::new(&host, "RTCSctpTransport", weak.clone(), context.loop_config()),
            context: Rc::clone(&context),
            native: Arc::clone(&native),
            key,
            refs: HostRefCount::new(),
            dtls,
            dtls_key,
            information: Cell::new(SctpTransportInformation {
                state: SctpTransportState::New,
                max_message_size: None,
                max_channels: None,
            }),
            listener: Listener::new(),
        });
        transport.events.retain_target(Rc::clone(&transport));

        let observer = Arc::new(SctpObserverRelay {
            dispatcher: transport.events.dispatcher(),
        });
        let registered = Arc::clone(&native);
        let initial = invoke(worker.as_ref(), move || {
            registered.register_observer(observer);
            registered.information()
        });
        let information = match initial {
            Ok(information) => information,
            Err(e) => {
                transport.events.stop();
                return Err(hostloop_core::Error::Construction(e.to_string()));
            }
        };
        transport.information.set(information);
        debug!(?key, ?dtls_key, state = %information.state, "SCTP transport proxy created");

        if information.state == SctpTransportState::Closed {
            transport.stop_transport();
        }
        Ok(transport)
    }

    /// Install the host listener
    pub fn on_event(&self, callback: impl FnMut(&SctpTransportEvent) + 'static) {
        self.listener.set(callback);
    }

    /// Stop observing the native transport
    ///
    /// The DTLS transport beneath keeps running. Idempotent.
    pub fn stop_transport(&self) {
        if self.events.should_stop() {
            return;
        }
        let native = Arc::clone(&self.native);
        let worker = self.context.native().worker_thread();
        if let Err(e) = worker.post(Box::new(move || native.unregister_observer())) {
            warn!(error = %e, "could not unregister SCTP transport observer");
        }
        self.events.stop();
    }

    /// The DTLS transport this one runs over
    pub fn transport(&self) -> Result<Rc<DtlsTransport>> {
        match self.dtls.get(&self.dtls_key) {
            Some(pinned) => unpin(pinned, "RTCDtlsTransport"),
            None => Err(crate::Error::InvalidState(
                "RTCSctpTransport has no DTLS transport".to_string(),
            )),
        }
    }

    pub fn state(&self) -> SctpTransportState {
        self.information.get().state
    }

    /// Largest message the remote side accepts, once connected
    pub fn max_message_size(&self) -> Option<u64> {
        self.information.get().max_message_size
    }

    pub fn max_channels(&self) -> Option<u16> {
        self.information.get().max_channels
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn loop_state(&self) -> LoopState {
        self.events.state()
    }
}

impl EventTarget for SctpTransport {
    type Notification = SctpTransportNotification;

    fn handle(&self, _ctx: &HostContext, notification: SctpTransportNotification) {
        let SctpTransportNotification::StateChange(information) = notification;
        self.information.set(information);
        if information.state == SctpTransportState::Closed {
            self.stop_transport();
        }
        self.listener.emit(&SctpTransportEvent::StateChange {
            state: information.state,
        });
    }
}

impl RefCounted for SctpTransport {
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

impl Drop for SctpTransport {
    fn drop(&mut self) {
        self.context.sctp_transports().release(self);
    }
}

impl fmt::Debug for SctpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SctpTransport")
            .field("state", &self.information.get().state)
            .field("dtls", &self.dtls_key)
            .field("loop", &self.events.state())
            .finish()
    }
}
