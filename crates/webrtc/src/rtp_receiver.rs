//! RTP receiver proxy
//!
//! A receiver pins the proxy of its track, so the track proxy stays cached
//! at least as long as the receiver's does.

use crate::context::{unpin, Context};
use crate::dtls_transport::DtlsTransport;
use crate::engine::NativeRtpReceiver;
use crate::key::HandleKey;
use crate::media_stream::MediaStream;
use crate::media_stream_track::{MediaStreamTrack, TrackArgs};
use crate::Result;
use hostloop_core::{HostContext, HostRefCount, OwnedWrap, RefCounted};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Constructor arguments for [`RtpReceiver`]
pub struct RtpReceiverArgs {
    pub host: HostContext,
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeRtpReceiver>,
}

/// Host-visible RTP receiver
pub struct RtpReceiver {
    context: Rc<Context>,
    native: Arc<dyn NativeRtpReceiver>,
    key: HandleKey,
    refs: HostRefCount,
    track: OwnedWrap<HandleKey, MediaStreamTrack, TrackArgs>,
    track_key: HandleKey,
    id: String,
}

impl RtpReceiver {
    /// Cache factory; see [`Context::receivers`]
    pub fn create(args: RtpReceiverArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let RtpReceiverArgs {
            host,
            context,
            native,
        } = args;

        let track = OwnedWrap::new(Rc::clone(context.tracks()));
        let native_track = native.track();
        let track_key = HandleKey::of(&native_track);
        track.get_or_create(
            TrackArgs {
                host,
                context: Rc::clone(&context),
                native: native_track,
            },
            track_key,
        )?;

        let id = native.id();
        debug!(%id, ?key, ?track_key, "RTP receiver proxy created");
        Ok(Rc::new(Self {
            context,
            native,
            key,
            refs: HostRefCount::new(),
            track,
            track_key,
            id,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Track the receiver delivers media into
    pub fn track(&self, host: &HostContext) -> Result<Rc<MediaStreamTrack>> {
        if let Some(pinned) = self.track.get(&self.track_key) {
            return unpin(pinned, "MediaStreamTrack");
        }
        let pinned = self.track.get_or_create(
            TrackArgs {
                host: host.clone(),
                context: Rc::clone(&self.context),
                native: self.native.track(),
            },
            self.track_key,
        )?;
        unpin(pinned, "MediaStreamTrack")
    }

    /// Streams the remote sender associated with the track
    pub fn streams(&self) -> Result<Vec<Rc<MediaStream>>> {
        self.native
            .streams()
            .into_iter()
            .map(|stream| self.context.resolve_media_stream(stream))
            .collect()
    }

    /// Transport carrying the receiver's media, once negotiated
    pub fn transport(&self, host: &HostContext) -> Result<Option<Rc<DtlsTransport>>> {
        self.native
            .dtls_transport()
            .map(|transport| self.context.resolve_dtls_transport(host, transport))
            .transpose()
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    pub fn native(&self) -> &Arc<dyn NativeRtpReceiver> {
        &self.native
    }
}

impl RefCounted for RtpReceiver {
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

impl Drop for RtpReceiver {
    fn drop(&mut self) {
        self.context.receivers().release(self);
    }
}

impl fmt::Debug for RtpReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpReceiver")
            .field("id", &self.id)
            .field("track", &self.track_key)
            .finish()
    }
}
