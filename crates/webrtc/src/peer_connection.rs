//! Peer connection proxy
//!
//! The host creates peer connections directly; they are not cached. Each
//! one holds a reference on the context's default factory until it is
//! closed or dropped, and resolves the data channels, tracks, RTP objects
//! and transports the engine hands it through the context's identity
//! caches.
//!
//! Offer/answer operations complete on an engine thread. Their host
//! callbacks are parked in [`PendingRequests`] and settled once the
//! engine's answer has been dispatched back onto the connection's loop.
//! Requests still parked when the loop stops are rejected.

use crate::context::Context;
use crate::data_channel::{DataChannel, DataChannelArgs, ObserverRelay};
use crate::dtls_transport::DtlsTransport;
use crate::engine::{
    AnswerOptions, CreateDescriptionObserver, DataChannelInit, EngineError, IceCandidate,
    IceCandidateError, IceConnectionState, IceGatheringState, NativeDataChannel,
    NativePeerConnection, NativeRtpReceiver, NativeRtpSender, NativeRtpTransceiver, OfferOptions,
    PeerConnectionObserver, PeerConnectionState, RtcConfiguration, RtpTransceiverInit,
    SessionDescription, SetDescriptionObserver, SignalingState, TrackKind,
};
use crate::factory::PeerConnectionFactory;
use crate::key::HandleKey;
use crate::listener::Listener;
use crate::media_stream::MediaStream;
use crate::media_stream_track::MediaStreamTrack;
use crate::request::{PendingRequests, RequestId};
use crate::rtp_receiver::{RtpReceiver, RtpReceiverArgs};
use crate::rtp_sender::{RtpSender, RtpSenderArgs};
use crate::rtp_transceiver::{RtpTransceiver, RtpTransceiverArgs};
use crate::sctp_transport::{SctpTransport, SctpTransportArgs};
use crate::{Error, Result};
use hostloop_core::{Dispatcher, EventLoop, EventTarget, HostContext, LoopState, RefPtr};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notifications from the native peer connection
pub enum PeerConnectionNotification {
    SignalingChange(SignalingState),
    IceConnectionChange(IceConnectionState, PeerConnectionState),
    IceGatheringChange(IceGatheringState),
    IceCandidate(IceCandidate),
    IceCandidateError(IceCandidateError),
    DataChannel(Arc<dyn NativeDataChannel>, Arc<ObserverRelay>),
    Track(Arc<dyn NativeRtpTransceiver>),
    RenegotiationNeeded,
}

impl fmt::Debug for PeerConnectionNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignalingChange(state) => write!(f, "SignalingChange({state})"),
            Self::IceConnectionChange(ice, pc) => write!(f, "IceConnectionChange({ice}, {pc})"),
            Self::IceGatheringChange(state) => write!(f, "IceGatheringChange({state})"),
            Self::IceCandidate(candidate) => write!(f, "IceCandidate({})", candidate.candidate),
            Self::IceCandidateError(error) => write!(f, "IceCandidateError({})", error.error_code),
            Self::DataChannel(channel, _) => write!(f, "DataChannel({})", channel.label()),
            Self::Track(transceiver) => write!(f, "Track({})", transceiver.kind()),
            Self::RenegotiationNeeded => f.write_str("RenegotiationNeeded"),
        }
    }
}

/// Payload of the `track` event
#[derive(Debug, Clone)]
pub struct RtcTrackEvent {
    pub track: Rc<MediaStreamTrack>,
    pub receiver: Rc<RtpReceiver>,
    pub transceiver: Rc<RtpTransceiver>,
    pub streams: Vec<Rc<MediaStream>>,
}

/// Events delivered to the host listener
#[derive(Debug, Clone)]
pub enum PeerConnectionEvent {
    SignalingStateChange(SignalingState),
    IceConnectionStateChange(IceConnectionState),
    ConnectionStateChange(PeerConnectionState),
    IceGatheringStateChange(IceGatheringState),
    /// `None` marks the end of candidate gathering
    IceCandidate(Option<IceCandidate>),
    IceCandidateError(IceCandidateError),
    DataChannel(Rc<DataChannel>),
    Track(RtcTrackEvent),
    NegotiationNeeded,
}

impl PeerConnectionEvent {
    /// Host-facing event name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignalingStateChange(_) => "signalingstatechange",
            Self::IceConnectionStateChange(_) => "iceconnectionstatechange",
            Self::ConnectionStateChange(_) => "connectionstatechange",
            Self::IceGatheringStateChange(_) => "icegatheringstatechange",
            Self::IceCandidate(_) => "icecandidate",
            Self::IceCandidateError(_) => "icecandidateerror",
            Self::DataChannel(_) => "datachannel",
            Self::Track(_) => "track",
            Self::NegotiationNeeded => "negotiationneeded",
        }
    }
}

// ============================================================================
// Observer relay
// ============================================================================

struct PeerConnectionObserverRelay {
    dispatcher: Dispatcher<PeerConnection>,
}

impl PeerConnectionObserver for PeerConnectionObserverRelay {
    fn on_signaling_change(&self, state: SignalingState) {
        self.dispatcher
            .notify(PeerConnectionNotification::SignalingChange(state));
    }

    fn on_ice_connection_change(&self, state: IceConnectionState, connection: PeerConnectionState) {
        self.dispatcher
            .notify(PeerConnectionNotification::IceConnectionChange(state, connection));
    }

    fn on_ice_gathering_change(&self, state: IceGatheringState) {
        self.dispatcher
            .notify(PeerConnectionNotification::IceGatheringChange(state));
    }

    fn on_ice_candidate(&self, candidate: IceCandidate) {
        self.dispatcher
            .notify(PeerConnectionNotification::IceCandidate(candidate));
    }

    fn on_ice_candidate_error(&self, error: IceCandidateError) {
        self.dispatcher
            .notify(PeerConnectionNotification::IceCandidateError(error));
    }

    fn on_data_channel(&self, channel: Arc<dyn NativeDataChannel>) {
        // Observe the channel now; its proxy is only built on the host thread.
        let relay = ObserverRelay::register(&channel);
        let dispatched = self.dispatcher.notify(PeerConnectionNotification::DataChannel(
            Arc::clone(&channel),
            relay,
        ));
        if !dispatched {
            channel.unregister_observer();
        }
    }

    fn on_track(&self, transceiver: Arc<dyn NativeRtpTransceiver>) {
        self.dispatcher
            .notify(PeerConnectionNotification::Track(transceiver));
    }

    fn on_renegotiation_needed(&self) {
        self.dispatcher
            .notify(PeerConnectionNotification::RenegotiationNeeded);
    }
}

struct CreateDescriptionRelay {
    dispatcher: Dispatcher<PeerConnection>,
    request: RequestId,
}

impl CreateDescriptionObserver for CreateDescriptionRelay {
    fn on_success(&self, description: SessionDescription) {
        let request = self.request;
        self.dispatcher
            .call(move |pc, _| pc.description_created(request, Ok(description)));
    }

    fn on_failure(&self, error: EngineError) {
        let request = self.request;
        self.dispatcher
            .call(move |pc, _| pc.description_created(request, Err(error)));
    }
}

struct SetDescriptionRelay {
    dispatcher: Dispatcher<PeerConnection>,
    request: RequestId,
}

impl SetDescriptionObserver for SetDescriptionRelay {
    fn on_success(&self) {
        let request = self.request;
        self.dispatcher
            .call(move |pc, _| pc.request_completed(request, Ok(())));
    }

    fn on_failure(&self, error: EngineError) {
        let request = self.request;
        self.dispatcher
            .call(move |pc, _| pc.request_completed(request, Err(error)));
    }
}

fn closed_signaling_error(operation: &str) -> Error {
    Error::InvalidState(format!(
        "Failed to execute '{operation}' on 'RTCPeerConnection': The RTCPeerConnection's signalingState is 'closed'."
    ))
}

fn closed_error() -> Error {
    Error::InvalidState("RTCPeerConnection is closed".to_string())
}

// ============================================================================
// Proxy
// ============================================================================

/// Host-visible peer connection
pub struct PeerConnection {
    events: EventLoop<PeerConnection>,
    context: Rc<Context>,
    factory: RefCell<RefPtr<PeerConnectionFactory>>,
    native: RefCell<Option<Arc<dyn NativePeerConnection>>>,
    channels: RefCell<Vec<Rc<DataChannel>>>,
    configuration: RtcConfiguration,
    created: PendingRequests<SessionDescription>,
    completed: PendingRequests<()>,
    last_created: RefCell<Option<SessionDescription>>,
    listener: Listener<PeerConnectionEvent>,
}

impl PeerConnection {
    /// Create a peer connection on the context's default factory
    pub fn new(
        host: &HostContext,
        context: &Rc<Context>,
        configuration: RtcConfiguration,
    ) -> Result<Rc<Self>> {
        configuration.validate()?;
        let factory = context.acquire_factory()?;

        let pc = Rc::new_cyclic(|weak| Self {
            events: EventLoop::new(host, "RTCPeerConnection", weak.clone(), context.loop_config()),
            context: Rc::clone(context),
            factory: RefCell::new(RefPtr::new(Rc::clone(&factory))),
            native: RefCell::new(None),
            channels: RefCell::new(Vec::new()),
            configuration,
            created: PendingRequests::new(),
            completed: PendingRequests::new(),
            last_created: RefCell::new(None),
            listener: Listener::new(),
        });

        let observer = Arc::new(PeerConnectionObserverRelay {
            dispatcher: pc.events.dispatcher(),
        });
        let native = match factory
            .native()
            .create_peer_connection(&pc.configuration, observer)
        {
            Ok(native) => native,
            Err(e) => {
                warn!(error = %e, "native peer connection creation failed");
                pc.events.stop();
                pc.release_factory();
                return Err(e.into());
            }
        };
        *pc.native.borrow_mut() = Some(native);
        pc.events.retain_target(Rc::clone(&pc));
        info!("peer connection created");
        Ok(pc)
    }

    /// Install the host listener
    pub fn on_event(&self, callback: impl FnMut(&PeerConnectionEvent) + 'static) {
        self.listener.set(callback);
    }

    /// Open a data channel
    pub fn create_data_channel(
        &self,
        host: &HostContext,
        label: &str,
        init: DataChannelInit,
    ) -> Result<Rc<DataChannel>> {
        let native = self.native()?;
        init.validate()?;

        let channel = native.create_data_channel(label, &init)?;
        let relay = ObserverRelay::register(&channel);
        let key = HandleKey::of(&channel);
        let proxy = self.context.data_channels().get_or_create(
            DataChannelArgs {
                host: host.clone(),
                context: Rc::clone(&self.context),
                native: channel,
                relay,
            },
            key,
        )?;
        self.channels.borrow_mut().push(Rc::clone(&proxy));
        debug!(%label, "data channel created");
        Ok(proxy)
    }

    /// Ask the engine for an offer
    ///
    /// `on_complete` runs on the host thread, immediately if the connection
    /// is already closed.
    pub fn create_offer(
        &self,
        options: &OfferOptions,
        on_complete: impl FnOnce(Result<SessionDescription>) + 'static,
    ) {
        let Ok(native) = self.native() else {
            on_complete(Err(closed_signaling_error("createOffer")));
            return;
        };
        let request = self.created.register(on_complete);
        native.create_offer(options, self.create_relay(request));
    }

    /// Ask the engine for an answer to the remote offer
    pub fn create_answer(
        &self,
        options: &AnswerOptions,
        on_complete: impl FnOnce(Result<SessionDescription>) + 'static,
    ) {
        let Ok(native) = self.native() else {
            on_complete(Err(closed_signaling_error("createAnswer")));
            return;
        };
        let request = self.created.register(on_complete);
        native.create_answer(options, self.create_relay(request));
    }

    /// Apply a local description
    ///
    /// An empty `sdp` stands for the last offer or answer this connection
    /// created.
    pub fn set_local_description(
        &self,
        description: SessionDescription,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) {
        let Ok(native) = self.native() else {
            on_complete(Err(closed_signaling_error("setLocalDescription")));
            return;
        };
        let description = match (&*self.last_created.borrow(), description.sdp.is_empty()) {
            (Some(last), true) => SessionDescription::new(description.sdp_type, last.sdp.clone()),
            _ => description,
        };
        let request = self.completed.register(on_complete);
        native.set_local_description(description, self.set_relay(request));
    }

    /// Apply the remote peer's description
    pub fn set_remote_description(
        &self,
        description: SessionDescription,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) {
        let Ok(native) = self.native() else {
            on_complete(Err(closed_signaling_error("setRemoteDescription")));
            return;
        };
        let request = self.completed.register(on_complete);
        native.set_remote_description(description, self.set_relay(request));
    }

    /// Queue a remote candidate; it is applied on a later turn of the loop
    pub fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
        on_complete: impl FnOnce(Result<()>) + 'static,
    ) {
        if self.is_closed() {
            on_complete(Err(Error::InvalidState(
                "Failed to set ICE candidate; RTCPeerConnection is closed.".to_string(),
            )));
            return;
        }
        let request = self.completed.register(on_complete);
        let queued = self
            .events
            .call(move |pc, _| pc.apply_ice_candidate(request, candidate));
        if !queued {
            self.completed.settle(request, Err(closed_error()));
        }
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.native.borrow().as_ref()?.local_description()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.native.borrow().as_ref()?.remote_description()
    }

    /// Start sending `track`, associated with `stream_ids`
    pub fn add_track(
        &self,
        track: &MediaStreamTrack,
        stream_ids: &[String],
    ) -> Result<Rc<RtpSender>> {
        let native = self.native()?;
        let sender = native.add_track(Arc::clone(track.native()), stream_ids)?;
        debug!(track = track.id(), "track added");
        self.resolve_sender(sender)
    }

    /// Add a transceiver for media of `kind`
    pub fn add_transceiver(
        &self,
        host: &HostContext,
        kind: TrackKind,
        init: &RtpTransceiverInit,
    ) -> Result<Rc<RtpTransceiver>> {
        let native = self.native()?;
        let transceiver = native.add_transceiver(kind, init)?;
        debug!(%kind, direction = %init.direction, "transceiver added");
        self.resolve_transceiver(host, transceiver)
    }

    /// Stop sending the sender's track
    pub fn remove_track(&self, sender: &RtpSender) -> Result<()> {
        let native = self.native()?;
        native.remove_track(sender.native())?;
        Ok(())
    }

    pub fn senders(&self) -> Result<Vec<Rc<RtpSender>>> {
        let Some(native) = self.native.borrow().clone() else {
            return Ok(Vec::new());
        };
        native
            .senders()
            .into_iter()
            .map(|sender| self.resolve_sender(sender))
            .collect()
    }

    pub fn receivers(&self, host: &HostContext) -> Result<Vec<Rc<RtpReceiver>>> {
        let Some(native) = self.native.borrow().clone() else {
            return Ok(Vec::new());
        };
        native
            .receivers()
            .into_iter()
            .map(|receiver| self.resolve_receiver(host, receiver))
            .collect()
    }

    pub fn transceivers(&self, host: &HostContext) -> Result<Vec<Rc<RtpTransceiver>>> {
        let Some(native) = self.native.borrow().clone() else {
            return Ok(Vec::new());
        };
        native
            .transceivers()
            .into_iter()
            .map(|transceiver| self.resolve_transceiver(host, transceiver))
            .collect()
    }

    /// Proxies for the tracks of every receiver
    pub fn receiver_tracks(&self, host: &HostContext) -> Result<Vec<Rc<MediaStreamTrack>>> {
        self.receivers(host)?
            .iter()
            .map(|receiver| receiver.track(host))
            .collect()
    }

    /// DTLS transport carrying the data channels, once negotiated
    pub fn dtls_transport(&self, host: &HostContext) -> Result<Option<Rc<DtlsTransport>>> {
        let Some(native) = self.native.borrow().clone() else {
            return Ok(None);
        };
        native
            .dtls_transport()
            .map(|transport| self.context.resolve_dtls_transport(host, transport))
            .transpose()
    }

    /// SCTP transport carrying the data channels, once negotiated
    pub fn sctp(&self, host: &HostContext) -> Result<Option<Rc<SctpTransport>>> {
        let Some(native) = self.native.borrow().clone() else {
            return Ok(None);
        };
        let Some(transport) = native.sctp_transport() else {
            return Ok(None);
        };
        let key = HandleKey::of(&transport);
        let proxy = self.context.sctp_transports().get_or_create(
            SctpTransportArgs {
                host: host.clone(),
                context: Rc::clone(&self.context),
                native: transport,
            },
            key,
        )?;
        Ok(Some(proxy))
    }

    /// Close the connection
    ///
    /// Data channels and receiver tracks are closed with it, the factory
    /// reference is released and the event loop stops. Parked requests are
    /// rejected once the loop finishes. Idempotent.
    pub fn close(&self) {
        let Some(native) = self.native.borrow_mut().take() else {
            return;
        };
        let receivers = native.receivers();
        native.close();

        for receiver in receivers {
            let key = HandleKey::of(&receiver.track());
            if let Some(proxy) = self.context.tracks().get(&key) {
                proxy.on_peer_connection_closed();
            }
        }
        self.close_channels();
        self.release_factory();
        self.events.stop();
        info!("peer connection closed");
    }

    pub fn signaling_state(&self) -> SignalingState {
        self.native
            .borrow()
            .as_ref()
            .map_or(SignalingState::Closed, |native| native.signaling_state())
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.native
            .borrow()
            .as_ref()
            .map_or(IceConnectionState::Closed, |native| native.ice_connection_state())
    }

    pub fn connection_state(&self) -> PeerConnectionState {
        self.native
            .borrow()
            .as_ref()
            .map_or(PeerConnectionState::Closed, |native| native.peer_connection_state())
    }

    pub fn ice_gathering_state(&self) -> IceGatheringState {
        self.native
            .borrow()
            .as_ref()
            .map_or(IceGatheringState::Complete, |native| native.ice_gathering_state())
    }

    pub fn configuration(&self) -> &RtcConfiguration {
        &self.configuration
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.native.borrow().is_none()
    }

    pub fn loop_state(&self) -> LoopState {
        self.events.state()
    }

    fn native(&self) -> Result<Arc<dyn NativePeerConnection>> {
        self.native
            .borrow()
            .clone()
            .ok_or_else(|| Error::InvalidState("RTCPeerConnection is closed".to_string()))
    }

    fn create_relay(&self, request: RequestId) -> Arc<CreateDescriptionRelay> {
        Arc::new(CreateDescriptionRelay {
            dispatcher: self.events.dispatcher(),
            request,
        })
    }

    fn set_relay(&self, request: RequestId) -> Arc<SetDescriptionRelay> {
        Arc::new(SetDescriptionRelay {
            dispatcher: self.events.dispatcher(),
            request,
        })
    }

    fn description_created(
        &self,
        request: RequestId,
        result: std::result::Result<SessionDescription, EngineError>,
    ) {
        if let Ok(description) = &result {
            *self.last_created.borrow_mut() = Some(description.clone());
        }
        self.created.settle(request, result.map_err(Error::from));
    }

    fn request_completed(&self, request: RequestId, result: std::result::Result<(), EngineError>) {
        self.completed.settle(request, result.map_err(Error::from));
    }

    fn apply_ice_candidate(&self, request: RequestId, candidate: IceCandidate) {
        let result = match self.native.borrow().clone() {
            Some(native) => native.add_ice_candidate(&candidate).map_err(Error::from),
            None => Err(Error::InvalidState(
                "Failed to set ICE candidate; RTCPeerConnection is closed.".to_string(),
            )),
        };
        self.completed.settle(request, result);
    }

    fn resolve_sender(&self, sender: Arc<dyn NativeRtpSender>) -> Result<Rc<RtpSender>> {
        let key = HandleKey::of(&sender);
        let proxy = self.context.senders().get_or_create(
            RtpSenderArgs {
                context: Rc::clone(&self.context),
                native: sender,
            },
            key,
        )?;
        Ok(proxy)
    }

    fn resolve_receiver(
        &self,
        host: &HostContext,
        receiver: Arc<dyn NativeRtpReceiver>,
    ) -> Result<Rc<RtpReceiver>> {
        let key = HandleKey::of(&receiver);
        let proxy = self.context.receivers().get_or_create(
            RtpReceiverArgs {
                host: host.clone(),
                context: Rc::clone(&self.context),
                native: receiver,
            },
            key,
        )?;
        Ok(proxy)
    }

    fn resolve_transceiver(
        &self,
        host: &HostContext,
        transceiver: Arc<dyn NativeRtpTransceiver>,
    ) -> Result<Rc<RtpTransceiver>> {
        let key = HandleKey::of(&transceiver);
        let proxy = self.context.transceivers().get_or_create(
            RtpTransceiverArgs {
                host: host.clone(),
                context: Rc::clone(&self.context),
                native: transceiver,
            },
            key,
        )?;
        Ok(proxy)
    }

    fn close_channels(&self) {
        let channels = std::mem::take(&mut *self.channels.borrow_mut());
        for channel in channels {
            channel.on_peer_connection_closed();
        }
    }

    fn release_factory(&self) {
        let released = self.factory.borrow_mut().take();
        if !released.is_null() {
            drop(released);
            self.context.release_factory();
        }
    }

    fn on_data_channel(
        &self,
        host: &HostContext,
        channel: Arc<dyn NativeDataChannel>,
        relay: Arc<ObserverRelay>,
    ) {
        if self.is_closed() {
            channel.unregister_observer();
            return;
        }
        let key = HandleKey::of(&channel);
        let resolved = self.context.data_channels().get_or_create(
            DataChannelArgs {
                host: host.clone(),
                context: Rc::clone(&self.context),
                native: channel,
                relay,
            },
            key,
        );
        match resolved {
            Ok(proxy) => {
                self.channels.borrow_mut().push(Rc::clone(&proxy));
                self.listener.emit(&PeerConnectionEvent::DataChannel(proxy));
            }
            Err(e) => warn!(error = %e, "could not wrap remote data channel"),
        }
    }

    fn on_track(&self, host: &HostContext, transceiver: Arc<dyn NativeRtpTransceiver>) {
        if self.is_closed() {
            return;
        }
        match self.track_event(host, transceiver) {
            Ok(event) => {
                self.listener.emit(&PeerConnectionEvent::Track(event));
            }
            Err(e) => warn!(error = %e, "could not wrap remote track"),
        }
    }

    fn track_event(
        &self,
        host: &HostContext,
        transceiver: Arc<dyn NativeRtpTransceiver>,
    ) -> Result<RtcTrackEvent> {
        let transceiver = self.resolve_transceiver(host, transceiver)?;
        let receiver = transceiver.receiver(host)?;
        let track = receiver.track(host)?;
        let streams = receiver.streams()?;
        Ok(RtcTrackEvent {
            track,
            receiver,
            transceiver,
            streams,
        })
    }
}

impl EventTarget for PeerConnection {
    type Notification = PeerConnectionNotification;

    fn handle(&self, ctx: &HostContext, notification: PeerConnectionNotification) {
        match notification {
            PeerConnectionNotification::SignalingChange(state) => {
                self.listener
                    .emit(&PeerConnectionEvent::SignalingStateChange(state));
                if state == SignalingState::Closed {
                    self.close();
                }
            }
            PeerConnectionNotification::IceConnectionChange(ice, connection) => {
                self.listener
                    .emit(&PeerConnectionEvent::IceConnectionStateChange(ice));
                self.listener
                    .emit(&PeerConnectionEvent::ConnectionStateChange(connection));
            }
            PeerConnectionNotification::IceGatheringChange(state) => {
                self.listener
                    .emit(&PeerConnectionEvent::IceGatheringStateChange(state));
                if state == IceGatheringState::Complete {
                    self.listener.emit(&PeerConnectionEvent::IceCandidate(None));
                }
            }
            PeerConnectionNotification::IceCandidate(candidate) => {
                self.listener
                    .emit(&PeerConnectionEvent::IceCandidate(Some(candidate)));
            }
            PeerConnectionNotification::IceCandidateError(error) => {
                self.listener
                    .emit(&PeerConnectionEvent::IceCandidateError(error));
            }
            PeerConnectionNotification::DataChannel(channel, relay) => {
                self.on_data_channel(ctx, channel, relay);
            }
            PeerConnectionNotification::Track(transceiver) => {
                self.on_track(ctx, transceiver);
            }
            PeerConnectionNotification::RenegotiationNeeded => {
                self.listener.emit(&PeerConnectionEvent::NegotiationNeeded);
            }
        }
    }

    fn did_stop(&self, _ctx: &HostContext) {
        let rejected = self.created.reject_all(closed_error) + self.completed.reject_all(closed_error);
        debug!(rejected, "peer connection loop stopped");
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.release_factory();
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("closed", &self.is_closed())
            .field("channels", &self.channels.borrow().len())
            .field("pending", &(self.created.len() + self.completed.len()))
            .field("loop", &self.events.state())
            .finish()
    }
}
