//! Explicit registry shared by every proxy
//!
//! A [`Context`] is created once on the host thread and handed to every proxy
//! by `Rc`. It owns the weak identity caches for engine-created objects and
//! the shared default [`PeerConnectionFactory`].
//!
//! Teardown order is explicit: [`Context::dispose`] stops tracks, then data
//! channels, then SCTP, DTLS and ICE transports, and finally drops the
//! factory.

use crate::data_channel::{DataChannel, DataChannelArgs};
use crate::dtls_transport::{DtlsTransport, DtlsTransportArgs};
use crate::engine::{NativeDtlsTransport, NativeFactory, NativeMediaStream, NativeTrack};
use crate::factory::PeerConnectionFactory;
use crate::ice_transport::{IceTransport, IceTransportArgs};
use crate::key::HandleKey;
use crate::media_stream::{MediaStream, MediaStreamArgs};
use crate::media_stream_track::{MediaStreamTrack, TrackArgs};
use crate::rtp_receiver::{RtpReceiver, RtpReceiverArgs};
use crate::rtp_sender::{RtpSender, RtpSenderArgs};
use crate::rtp_transceiver::{RtpTransceiver, RtpTransceiverArgs};
use crate::sctp_transport::{SctpTransport, SctpTransportArgs};
use crate::{Error, Result};
use hostloop_core::{HostContext, LoopConfig, RefCounted, RefPtr, Wrap};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity cache of data channel proxies
pub type DataChannelCache = Wrap<HandleKey, DataChannel, DataChannelArgs>;
/// Identity cache of DTLS transport proxies
pub type DtlsTransportCache = Wrap<HandleKey, DtlsTransport, DtlsTransportArgs>;
/// Identity cache of ICE transport proxies
pub type IceTransportCache = Wrap<HandleKey, IceTransport, IceTransportArgs>;
/// Identity cache of SCTP transport proxies
pub type SctpTransportCache = Wrap<HandleKey, SctpTransport, SctpTransportArgs>;
/// Identity cache of media track proxies
pub type TrackCache = Wrap<HandleKey, MediaStreamTrack, TrackArgs>;
/// Identity cache of media stream proxies
pub type MediaStreamCache = Wrap<HandleKey, MediaStream, MediaStreamArgs>;
/// Identity cache of RTP sender proxies
pub type RtpSenderCache = Wrap<HandleKey, RtpSender, RtpSenderArgs>;
/// Identity cache of RTP receiver proxies
pub type RtpReceiverCache = Wrap<HandleKey, RtpReceiver, RtpReceiverArgs>;
/// Identity cache of transceiver proxies
pub type RtpTransceiverCache = Wrap<HandleKey, RtpTransceiver, RtpTransceiverArgs>;

/// Turn a pin handed out by an [`OwnedWrap`](hostloop_core::OwnedWrap) into a plain handle
pub(crate) fn unpin<T: RefCounted>(pinned: RefPtr<T>, what: &str) -> Result<Rc<T>> {
    pinned
        .get()
        .cloned()
        .ok_or_else(|| Error::InvalidState(format!("{what} is not available")))
}

/// Registry of caches and the default factory
pub struct Context {
    native: Arc<dyn NativeFactory>,
    loop_config: LoopConfig,
    data_channels: Rc<DataChannelCache>,
    dtls_transports: Rc<DtlsTransportCache>,
    ice_transports: Rc<IceTransportCache>,
    sctp_transports: Rc<SctpTransportCache>,
    tracks: Rc<TrackCache>,
    media_streams: Rc<MediaStreamCache>,
    senders: Rc<RtpSenderCache>,
    receivers: Rc<RtpReceiverCache>,
    transceivers: Rc<RtpTransceiverCache>,
    factory: RefCell<Option<Rc<PeerConnectionFactory>>>,
    factory_refs: Cell<u32>,
    disposed: Cell<bool>,
}

impl Context {
    /// Create a registry over `native`
    pub fn new(native: Arc<dyn NativeFactory>, loop_config: LoopConfig) -> Rc<Self> {
        debug!("creating WebRTC context");
        Rc::new(Self {
            native,
            loop_config,
            data_channels: Rc::new(Wrap::new("RTCDataChannel", DataChannel::create)),
            dtls_transports: Rc::new(Wrap::new("RTCDtlsTransport", DtlsTransport::create)),
            ice_transports: Rc::new(Wrap::new("RTCIceTransport", IceTransport::create)),
            sctp_transports: Rc::new(Wrap::new("RTCSctpTransport", SctpTransport::create)),
            tracks: Rc::new(Wrap::new("MediaStreamTrack", MediaStreamTrack::create)),
            media_streams: Rc::new(Wrap::new("MediaStream", MediaStream::create)),
            senders: Rc::new(Wrap::new("RTCRtpSender", RtpSender::create)),
            receivers: Rc::new(Wrap::new("RTCRtpReceiver", RtpReceiver::create)),
            transceivers: Rc::new(Wrap::new("RTCRtpTransceiver", RtpTransceiver::create)),
            factory: RefCell::new(None),
            factory_refs: Cell::new(0),
            disposed: Cell::new(false),
        })
    }

    /// The native engine
    pub fn native(&self) -> &Arc<dyn NativeFactory> {
        &self.native
    }

    /// Settings for every proxy's event loop
    pub fn loop_config(&self) -> &LoopConfig {
        &self.loop_config
    }

    /// Data channel proxies, keyed by native channel
    pub fn data_channels(&self) -> &Rc<DataChannelCache> {
        &self.data_channels
    }

    /// DTLS transport proxies, keyed by native transport
    pub fn dtls_transports(&self) -> &Rc<DtlsTransportCache> {
        &self.dtls_transports
    }

    /// ICE transport proxies; pinned by the DTLS transports above them
    pub fn ice_transports(&self) -> &Rc<IceTransportCache> {
        &self.ice_transports
    }

    /// SCTP transport proxies, keyed by native transport
    pub fn sctp_transports(&self) -> &Rc<SctpTransportCache> {
        &self.sctp_transports
    }

    /// Media track proxies, keyed by native track
    pub fn tracks(&self) -> &Rc<TrackCache> {
        &self.tracks
    }

    /// Media stream proxies, keyed by native stream
    pub fn media_streams(&self) -> &Rc<MediaStreamCache> {
        &self.media_streams
    }

    /// RTP sender proxies, keyed by native sender
    pub fn senders(&self) -> &Rc<RtpSenderCache> {
        &self.senders
    }

    /// RTP receiver proxies, keyed by native receiver
    pub fn receivers(&self) -> &Rc<RtpReceiverCache> {
        &self.receivers
    }

    /// Transceiver proxies, keyed by native transceiver
    pub fn transceivers(&self) -> &Rc<RtpTransceiverCache> {
        &self.transceivers
    }

    /// Proxy for `native`, created on first sight
    pub fn resolve_track(
        self: &Rc<Self>,
        host: &HostContext,
        native: Arc<dyn NativeTrack>,
    ) -> Result<Rc<MediaStreamTrack>> {
        let key = HandleKey::of(&native);
        let args = TrackArgs {
            host: host.clone(),
            context: Rc::clone(self),
            native,
        };
        Ok(self.tracks.get_or_create(args, key)?)
    }

    /// Proxy for `native`, created on first sight
    pub fn resolve_dtls_transport(
        self: &Rc<Self>,
        host: &HostContext,
        native: Arc<dyn NativeDtlsTransport>,
    ) -> Result<Rc<DtlsTransport>> {
        let key = HandleKey::of(&native);
        let args = DtlsTransportArgs {
            host: host.clone(),
            context: Rc::clone(self),
            native,
        };
        Ok(self.dtls_transports.get_or_create(args, key)?)
    }

    /// Proxy for `native`, created on first sight
    pub fn resolve_media_stream(
        self: &Rc<Self>,
        native: Arc<dyn NativeMediaStream>,
    ) -> Result<Rc<MediaStream>> {
        let key = HandleKey::of(&native);
        let args = MediaStreamArgs {
            context: Rc::clone(self),
            native,
        };
        Ok(self.media_streams.get_or_create(args, key)?)
    }

    /// Take a reference on the default factory, creating it if needed
    pub fn acquire_factory(&self) -> Result<Rc<PeerConnectionFactory>> {
        if self.disposed.get() {
            return Err(Error::InvalidState("context has been disposed".to_string()));
        }

        let mut slot = self.factory.borrow_mut();
        let factory = match slot.as_ref() {
            Some(factory) => Rc::clone(factory),
            None => {
                info!("creating default peer connection factory");
                let factory = PeerConnectionFactory::new(Arc::clone(&self.native));
                *slot = Some(Rc::clone(&factory));
                factory
            }
        };
        self.factory_refs.set(self.factory_refs.get() + 1);
        Ok(factory)
    }

    /// Drop a reference taken with [`acquire_factory`](Self::acquire_factory)
    ///
    /// The default factory is released when the last reference goes.
    pub fn release_factory(&self) {
        let refs = self.factory_refs.get();
        if refs == 0 {
            warn!("release_factory called without a matching acquire");
            return;
        }
        self.factory_refs.set(refs - 1);
        if refs == 1 {
            let released = self.factory.borrow_mut().take();
            if released.is_some() {
                info!("releasing default peer connection factory");
            }
            drop(released);
        }
    }

    /// Outstanding references on the default factory
    pub fn factory_refs(&self) -> u32 {
        self.factory_refs.get()
    }

    /// Whether the default factory currently exists
    pub fn has_factory(&self) -> bool {
        self.factory.borrow().is_some()
    }

    /// Whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Stop every live proxy and release the default factory
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }

        for track in self.tracks.live() {
            track.stop();
        }
        for channel in self.data_channels.live() {
            channel.on_peer_connection_closed();
        }
        for transport in self.sctp_transports.live() {
            transport.stop_transport();
        }
        for transport in self.dtls_transports.live() {
            transport.stop_transport();
        }
        for transport in self.ice_transports.live() {
            transport.on_dtls_transport_stopped();
        }

        let leaked = self.factory_refs.replace(0);
        if leaked > 0 {
            warn!(references = leaked, "disposing context with factory still referenced");
        }
        let factory = self.factory.borrow_mut().take();
        drop(factory);
        info!("WebRTC context disposed");
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("data_channels", &self.data_channels.len())
            .field("dtls_transports", &self.dtls_transports.len())
            .field("ice_transports", &self.ice_transports.len())
            .field("sctp_transports", &self.sctp_transports.len())
            .field("tracks", &self.tracks.len())
            .field("media_streams", &self.media_streams.len())
            .field("senders", &self.senders.len())
            .field("receivers", &self.receivers.len())
            .field("transceivers", &self.transceivers.len())
            .field("factory_refs", &self.factory_refs.get())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
