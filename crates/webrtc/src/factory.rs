//! The peer connection factory proxy
//!
//! One default factory is shared by every peer connection created through a
//! [`Context`](crate::Context). Peer connections hold it through a
//! [`RefPtr`](hostloop_core::RefPtr).

use crate::engine::{EngineThread, NativeFactory};
use hostloop_core::{HostRefCount, RefCounted};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Host-side handle to the native engine
pub struct PeerConnectionFactory {
    native: Arc<dyn NativeFactory>,
    worker: Arc<dyn EngineThread>,
    signaling: Arc<dyn EngineThread>,
    refs: HostRefCount,
}

impl PeerConnectionFactory {
    /// Wrap the engine entry point, caching its worker and signaling threads
    pub fn new(native: Arc<dyn NativeFactory>) -> Rc<Self> {
        let worker = native.worker_thread();
        let signaling = native.signaling_thread();
        debug!(worker = worker.name(), signaling = signaling.name(), "factory created");
        Rc::new(Self {
            native,
            worker,
            signaling,
            refs: HostRefCount::new(),
        })
    }

    /// The engine entry point peer connections are created on
    pub fn native(&self) -> &Arc<dyn NativeFactory> {
        &self.native
    }

    /// Thread owning transport observers
    pub fn worker_thread(&self) -> &Arc<dyn EngineThread> {
        &self.worker
    }

    /// Thread owning signaling state and track observers
    pub fn signaling_thread(&self) -> &Arc<dyn EngineThread> {
        &self.signaling
    }
}

impl RefCounted for PeerConnectionFactory {
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

impl Drop for PeerConnectionFactory {
    fn drop(&mut self) {
        debug!("factory dropped");
    }
}

impl fmt::Debug for PeerConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnectionFactory")
            .field("worker", &self.worker.name())
            .field("signaling", &self.signaling.name())
            .field("refs", &self.refs.get())
            .finish()
    }
}
