//! Media track proxy
//!
//! Remote tracks are observed on the engine's signaling thread. A track
//! stops observing when it ends, when its peer connection closes, or when
//! the context is disposed.

use crate::context::Context;
use crate::engine::{NativeTrack, TrackKind, TrackObserver, TrackState};
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

/// Notifications from the native track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackNotification {
    Changed(TrackState),
}

/// Events delivered to the host listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrackEvent {
    Ended,
}

struct TrackObserverRelay {
    dispatcher: Dispatcher<MediaStreamTrack>,
}

impl TrackObserver for TrackObserverRelay {
    fn on_changed(&self, state: TrackState) {
        self.dispatcher.notify(TrackNotification::Changed(state));
    }
}

/// Constructor arguments for [`MediaStreamTrack`]
pub struct TrackArgs {
    pub host: HostContext,
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeTrack>,
}

/// Host-visible media track
pub struct MediaStreamTrack {
    events: EventLoop<MediaStreamTrack>,
    context: Rc<Context>,
    native: Arc<dyn NativeTrack>,
    key: HandleKey,
    refs: HostRefCount,
    id: String,
    kind: TrackKind,
    ended: Cell<bool>,
    enabled: Cell<bool>,
    listener: Listener<TrackEvent>,
}

impl MediaStreamTrack {
    /// Cache factory; see [`Context::tracks`]
    pub fn create(args: TrackArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let TrackArgs {
            host,
            context,
            native,
        } = args;

        let id = native.id();
        let kind = native.kind();
        let track = Rc::new_cyclic(|weak| Self {
            events: EventLoop::new(
                &host,
                format!("MediaStreamTrack({id})"),
                weak.clone(),
                context.loop_config(),
            ),
            context: Rc::clone(&context),
            native: Arc::clone(&native),
            key,
            refs: HostRefCount::new(),
            id: id.clone(),
            kind,
            ended: Cell::new(false),
            enabled: Cell::new(native.enabled()),
            listener: Listener::new(),
        });
        track.events.retain_target(Rc::clone(&track));

        native.register_observer(Arc::new(TrackObserverRelay {
            dispatcher: track.events.dispatcher(),
        }));
        debug!(%id, %kind, ?key, "track proxy created");

        if native.state() == TrackState::Ended {
            track.stop();
        }
        Ok(track)
    }

    /// Install the host listener
    pub fn on_event(&self, callback: impl FnMut(&TrackEvent) + 'static) {
        self.listener.set(callback);
    }

    /// Stop observing the native track and mark it ended
    ///
    /// Idempotent; no `ended` event is emitted.
    pub fn stop(&self) {
        if self.ended.replace(true) {
            return;
        }
        self.enabled.set(self.native.enabled());

        let native = Arc::clone(&self.native);
        let signaling = self.context.native().signaling_thread();
        if let Err(e) = signaling.post(Box::new(move || native.unregister_observer())) {
            warn!(error = %e, "could not unregister track observer");
        }
        self.events.stop();
    }

    /// Called by the owning peer connection when it closes
    pub fn on_peer_connection_closed(&self) {
        self.stop();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        if self.ended.get() {
            return self.enabled.get();
        }
        self.native.enabled()
    }

    /// Toggle the track; ignored once ended
    pub fn set_enabled(&self, enabled: bool) {
        if self.ended.get() {
            return;
        }
        self.native.set_enabled(enabled);
        self.enabled.set(enabled);
    }

    pub fn ready_state(&self) -> TrackState {
        if self.ended.get() {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    /// The native track, for handing back to the engine
    pub fn native(&self) -> &Arc<dyn NativeTrack> {
        &self.native
    }

    pub fn loop_state(&self) -> LoopState {
        self.events.state()
    }
}

impl EventTarget for MediaStreamTrack {
    type Notification = TrackNotification;

    fn handle(&self, _ctx: &HostContext, notification: TrackNotification) {
        let TrackNotification::Changed(state) = notification;
        if state == TrackState::Ended && !self.ended.get() {
            self.stop();
            self.listener.emit(&TrackEvent::Ended);
        }
    }
}

impl RefCounted for MediaStreamTrack {
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

impl Drop for MediaStreamTrack {
    fn drop(&mut self) {
        self.context.tracks().release(self);
    }
}

impl fmt::Debug for MediaStreamTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("ended", &self.ended.get())
            .field("loop", &self.events.state())
            .finish()
    }
}
