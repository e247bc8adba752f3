//! RTP sender proxy

use crate::context::Context;
use crate::dtls_transport::DtlsTransport;
use crate::engine::NativeRtpSender;
use crate::key::HandleKey;
use crate::media_stream_track::MediaStreamTrack;
use crate::Result;
use hostloop_core::{HostContext, HostRefCount, RefCounted};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Constructor arguments for [`RtpSender`]
pub struct RtpSenderArgs {
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeRtpSender>,
}

/// Host-visible RTP sender
pub struct RtpSender {
    context: Rc<Context>,
    native: Arc<dyn NativeRtpSender>,
    key: HandleKey,
    refs: HostRefCount,
    id: String,
}

impl RtpSender {
    /// Cache factory; see [`Context::senders`]
    pub fn create(args: RtpSenderArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let RtpSenderArgs { context, native } = args;
        let id = native.id();
        debug!(%id, ?key, "RTP sender proxy created");
        Ok(Rc::new(Self {
            context,
            native,
            key,
            refs: HostRefCount::new(),
            id,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Track being sent, if any
    pub fn track(&self, host: &HostContext) -> Result<Option<Rc<MediaStreamTrack>>> {
        self.native
            .track()
            .map(|track| self.context.resolve_track(host, track))
            .transpose()
    }

    pub fn stream_ids(&self) -> Vec<String> {
        self.native.stream_ids()
    }

    /// Transport carrying the sender's media, once negotiated
    pub fn transport(&self, host: &HostContext) -> Result<Option<Rc<DtlsTransport>>> {
        self.native
            .dtls_transport()
            .map(|transport| self.context.resolve_dtls_transport(host, transport))
            .transpose()
    }

    /// Swap the outgoing track without renegotiating; `None` stops sending
    pub fn replace_track(&self, track: Option<&MediaStreamTrack>) -> Result<()> {
        let native = track.map(|track| Arc::clone(track.native()));
        self.native.replace_track(native)?;
        Ok(())
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    /// The native sender, for handing back to the engine
    pub fn native(&self) -> &Arc<dyn NativeRtpSender> {
        &self.native
    }
}

impl RefCounted for RtpSender {
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

impl Drop for RtpSender {
    fn drop(&mut self) {
        self.context.senders().release(self);
    }
}

impl fmt::Debug for RtpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpSender")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}
