//! Media stream proxy
//!
//! Streams group the tracks a remote sender associated with one stream id.
//! They carry no events of their own; their tracks are resolved through the
//! context's track cache on every call.

use crate::context::Context;
use crate::engine::{NativeMediaStream, TrackKind, TrackState};
use crate::key::HandleKey;
use crate::media_stream_track::MediaStreamTrack;
use crate::Result;
use hostloop_core::HostContext;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Constructor arguments for [`MediaStream`]
pub struct MediaStreamArgs {
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeMediaStream>,
}

/// Host-visible media stream
pub struct MediaStream {
    context: Rc<Context>,
    native: Arc<dyn NativeMediaStream>,
    key: HandleKey,
    id: String,
}

impl MediaStream {
    /// Cache factory; see [`Context::media_streams`]
    pub fn create(args: MediaStreamArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let MediaStreamArgs { context, native } = args;
        let id = native.id();
        Ok(Rc::new(Self {
            context,
            native,
            key,
            id,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether any track of the stream is still live
    pub fn active(&self) -> bool {
        self.native
            .tracks()
            .iter()
            .any(|track| track.state() == TrackState::Live)
    }

    /// Every track of the stream
    pub fn tracks(&self, host: &HostContext) -> Result<Vec<Rc<MediaStreamTrack>>> {
        self.native
            .tracks()
            .into_iter()
            .map(|track| self.context.resolve_track(host, track))
            .collect()
    }

    pub fn audio_tracks(&self, host: &HostContext) -> Result<Vec<Rc<MediaStreamTrack>>> {
        self.tracks_of_kind(host, TrackKind::Audio)
    }

    pub fn video_tracks(&self, host: &HostContext) -> Result<Vec<Rc<MediaStreamTrack>>> {
        self.tracks_of_kind(host, TrackKind::Video)
    }

    /// Track with the given id, if the stream holds one
    pub fn track_by_id(&self, host: &HostContext, id: &str) -> Result<Option<Rc<MediaStreamTrack>>> {
        let found = self.native.tracks().into_iter().find(|track| track.id() == id);
        found
            .map(|track| self.context.resolve_track(host, track))
            .transpose()
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }

    fn tracks_of_kind(&self, host: &HostContext, kind: TrackKind) -> Result<Vec<Rc<MediaStreamTrack>>> {
        self.native
            .tracks()
            .into_iter()
            .filter(|track| track.kind() == kind)
            .map(|track| self.context.resolve_track(host, track))
            .collect()
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.context.media_streams().release(self);
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}
