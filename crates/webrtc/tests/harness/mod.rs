//! Fake native engine and host-thread fixture for WebRTC proxy tests
//!
//! The fake engine runs a real worker thread and a real signaling thread.
//! Test code fires observer callbacks on those threads and waits for them
//! to return, then settles the host thread so every resulting notification
//! has been handled.

#![allow(dead_code)]

use hostloop_core::{HostConfig, HostContext, HostThread, LoopConfig};
use hostloop_webrtc::engine::{
    invoke, AnswerOptions, CreateDescriptionObserver, DataBuffer, DataChannelInit,
    DataChannelObserver, DataState, DtlsState, DtlsTransportObserver, EngineError, EngineTask,
    EngineThread, IceCandidate, IceConnectionState, IceGatheringState, IceTransportObserver,
    IceTransportState, NativeDataChannel, NativeDtlsTransport, NativeFactory, NativeIceTransport,
    NativeMediaStream, NativePeerConnection, NativeRtpReceiver, NativeRtpSender,
    NativeRtpTransceiver, NativeSctpTransport, NativeTrack, OfferOptions, PeerConnectionObserver,
    PeerConnectionState, RtcConfiguration, RtpTransceiverDirection, RtpTransceiverInit,
    SctpTransportInformation, SctpTransportObserver, SctpTransportState, SdpType,
    SessionDescription, SetDescriptionObserver, SignalingState, TrackKind, TrackObserver,
    TrackState, WorkerThread,
};
use hostloop_webrtc::Context;
use parking_lot::Mutex;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub const WORKER: &str = "fake-worker";
pub const SIGNALING: &str = "fake-signaling";

fn current_thread() -> String {
    thread::current().name().unwrap_or("unnamed").to_string()
}

/// Listener output shared with the test thread
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// Engine
// ============================================================================

pub struct FakeEngine {
    worker: Arc<WorkerThread>,
    signaling: Arc<WorkerThread>,
    connections: Mutex<Vec<Arc<FakePeerConnection>>>,
    reject_next: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            worker: Arc::new(WorkerThread::spawn(WORKER).unwrap()),
            signaling: Arc::new(WorkerThread::spawn(SIGNALING).unwrap()),
            connections: Mutex::new(Vec::new()),
            reject_next: AtomicBool::new(false),
        })
    }

    /// Make the next `create_peer_connection` fail
    pub fn reject_next_connection(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    pub fn connection(&self, index: usize) -> Arc<FakePeerConnection> {
        Arc::clone(&self.connections.lock()[index])
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Wait until both engine threads have run everything posted so far
    pub fn sync_threads(&self) {
        invoke(&*self.worker, || ()).unwrap();
        invoke(&*self.signaling, || ()).unwrap();
    }
}

impl NativeFactory for FakeEngine {
    fn create_peer_connection(
        &self,
        _config: &RtcConfiguration,
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> Result<Arc<dyn NativePeerConnection>, EngineError> {
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Rejected("fake engine refused".to_string()));
        }
        let connection = Arc::new(FakePeerConnection {
            observer,
            worker: Arc::clone(&self.worker),
            signaling_thread: Arc::clone(&self.signaling),
            signaling: Mutex::new(SignalingState::Stable),
            transceivers: Mutex::new(Vec::new()),
            dtls: Mutex::new(None),
            sctp: Mutex::new(None),
            local_channels: Mutex::new(Vec::new()),
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            fail_descriptions: AtomicBool::new(false),
            hold_completions: AtomicBool::new(false),
            held: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            closes: AtomicUsize::new(0),
        });
        self.connections.lock().push(Arc::clone(&connection));
        Ok(connection)
    }

    fn worker_thread(&self) -> Arc<dyn EngineThread> {
        Arc::clone(&self.worker) as Arc<dyn EngineThread>
    }

    fn signaling_thread(&self) -> Arc<dyn EngineThread> {
        Arc::clone(&self.signaling) as Arc<dyn EngineThread>
    }
}

// ============================================================================
// Peer connection
// ============================================================================

pub struct FakePeerConnection {
    observer: Arc<dyn PeerConnectionObserver>,
    worker: Arc<WorkerThread>,
    signaling_thread: Arc<WorkerThread>,
    signaling: Mutex<SignalingState>,
    transceivers: Mutex<Vec<Arc<FakeTransceiver>>>,
    dtls: Mutex<Option<Arc<FakeDtlsTransport>>>,
    sctp: Mutex<Option<Arc<FakeSctpTransport>>>,
    local_channels: Mutex<Vec<Arc<FakeDataChannel>>>,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    fail_descriptions: AtomicBool,
    hold_completions: AtomicBool,
    held: Mutex<Vec<EngineTask>>,
    next_id: AtomicU64,
    closes: AtomicUsize,
}

impl FakePeerConnection {
    /// Announce a channel opened by the remote peer
    pub fn open_remote_channel(&self, label: &str) -> Arc<FakeDataChannel> {
        let channel = FakeDataChannel::new(label, None, Arc::clone(&self.worker));
        let native: Arc<dyn NativeDataChannel> = channel.clone();
        let observer = Arc::clone(&self.observer);
        invoke(&*self.signaling_thread, move || observer.on_data_channel(native)).unwrap();
        channel
    }

    /// Announce a track added by the remote peer, carried in stream `remote-stream`
    pub fn add_remote_track(&self, id: &str, kind: TrackKind) -> Arc<FakeTrack> {
        let track = FakeTrack::new(id, kind, Arc::clone(&self.signaling_thread));
        let stream = FakeMediaStream::new("remote-stream", vec![Arc::clone(&track)]);
        let transceiver = self.push_transceiver(kind, None, Arc::clone(&track), vec![stream]);
        let native: Arc<dyn NativeRtpTransceiver> = transceiver;
        let observer = Arc::clone(&self.observer);
        invoke(&*self.signaling_thread, move || observer.on_track(native)).unwrap();
        track
    }

    fn push_transceiver(
        &self,
        kind: TrackKind,
        sent: Option<Arc<dyn NativeTrack>>,
        received: Arc<FakeTrack>,
        streams: Vec<Arc<FakeMediaStream>>,
    ) -> Arc<FakeTransceiver> {
        let index = self.next_id.fetch_add(1, Ordering::SeqCst);
        let dtls = self.dtls.lock().clone();
        let sender = Arc::new(FakeRtpSender {
            id: format!("sender-{index}"),
            track: Mutex::new(sent),
            stream_ids: Vec::new(),
            dtls: dtls.clone(),
        });
        let receiver = Arc::new(FakeRtpReceiver {
            id: format!("receiver-{index}"),
            track: received,
            streams,
            dtls,
        });
        let transceiver = Arc::new(FakeTransceiver {
            mid: Some(index.to_string()),
            kind,
            sender,
            receiver,
            direction: Mutex::new(RtpTransceiverDirection::SendRecv),
            stopped: AtomicBool::new(false),
        });
        self.transceivers.lock().push(Arc::clone(&transceiver));
        transceiver
    }

    /// Fail every later offer, answer and description update
    pub fn fail_descriptions(&self) {
        self.fail_descriptions.store(true, Ordering::SeqCst);
    }

    /// Park description completions until [`release_completions`](Self::release_completions)
    pub fn hold_completions(&self) {
        self.hold_completions.store(true, Ordering::SeqCst);
    }

    /// Run parked completions on the signaling thread and wait for them
    pub fn release_completions(&self) {
        self.hold_completions.store(false, Ordering::SeqCst);
        let held = std::mem::take(&mut *self.held.lock());
        invoke(&*self.signaling_thread, move || {
            for task in held {
                task();
            }
        })
        .unwrap();
    }

    fn complete(&self, task: EngineTask) {
        if self.hold_completions.load(Ordering::SeqCst) {
            self.held.lock().push(task);
            return;
        }
        self.signaling_thread.post(task).unwrap();
    }

    fn complete_set(&self, observer: Arc<dyn SetDescriptionObserver>, outcome: Result<(), EngineError>) {
        self.complete(Box::new(move || match outcome {
            Ok(()) => observer.on_success(),
            Err(error) => observer.on_failure(error),
        }));
    }

    fn describe(&self, sdp_type: SdpType, observer: Arc<dyn CreateDescriptionObserver>) {
        let outcome = if self.fail_descriptions.load(Ordering::SeqCst) {
            Err(EngineError::Rejected(format!("cannot create {sdp_type}")))
        } else {
            let index = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(SessionDescription::new(sdp_type, format!("v=0 {sdp_type} {index}")))
        };
        self.complete(Box::new(move || match outcome {
            Ok(description) => observer.on_success(description),
            Err(error) => observer.on_failure(error),
        }));
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn transceiver(&self, index: usize) -> Arc<FakeTransceiver> {
        Arc::clone(&self.transceivers.lock()[index])
    }

    /// Give the connection a DTLS transport over a fresh ICE transport
    pub fn negotiate_transport(&self) -> Arc<FakeDtlsTransport> {
        let ice = FakeIceTransport::new(Arc::clone(&self.worker));
        let dtls = FakeDtlsTransport::new(ice, Arc::clone(&self.worker));
        *self.dtls.lock() = Some(Arc::clone(&dtls));
        dtls
    }

    /// Give the connection an SCTP association over its DTLS transport
    pub fn negotiate_sctp(&self, state: SctpTransportState) -> Arc<FakeSctpTransport> {
        let existing = self.dtls.lock().clone();
        let dtls = match existing {
            Some(dtls) => dtls,
            None => self.negotiate_transport(),
        };
        let sctp = FakeSctpTransport::new(dtls, state, Arc::clone(&self.worker));
        *self.sctp.lock() = Some(Arc::clone(&sctp));
        sctp
    }

    /// Drop the connection's transports, as after a failed renegotiation
    pub fn drop_transports(&self) {
        *self.sctp.lock() = None;
        *self.dtls.lock() = None;
    }

    pub fn fire_signaling(&self, state: SignalingState) {
        *self.signaling.lock() = state;
        let observer = Arc::clone(&self.observer);
        invoke(&*self.signaling_thread, move || observer.on_signaling_change(state)).unwrap();
    }

    pub fn fire_ice_connection(&self, state: IceConnectionState, connection: PeerConnectionState) {
        let observer = Arc::clone(&self.observer);
        invoke(&*self.worker, move || {
            observer.on_ice_connection_change(state, connection)
        })
        .unwrap();
    }

    pub fn fire_gathering(&self, state: IceGatheringState) {
        let observer = Arc::clone(&self.observer);
        invoke(&*self.worker, move || observer.on_ice_gathering_change(state)).unwrap();
    }

    pub fn fire_candidate(&self, candidate: &str) {
        let observer = Arc::clone(&self.observer);
        let candidate = IceCandidate {
            candidate: candidate.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        invoke(&*self.worker, move || observer.on_ice_candidate(candidate)).unwrap();
    }

    pub fn fire_renegotiation_needed(&self) {
        let observer = Arc::clone(&self.observer);
        invoke(&*self.signaling_thread, move || observer.on_renegotiation_needed()).unwrap();
    }

    pub fn local_channel(&self, index: usize) -> Arc<FakeDataChannel> {
        Arc::clone(&self.local_channels.lock()[index])
    }

    /// Release the engine's references to every local channel
    pub fn forget_local_channels(&self) {
        self.local_channels.lock().clear();
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl NativePeerConnection for FakePeerConnection {
    fn signaling_state(&self) -> SignalingState {
        *self.signaling.lock()
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        IceConnectionState::New
    }

    fn peer_connection_state(&self) -> PeerConnectionState {
        PeerConnectionState::New
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        IceGatheringState::New
    }

    fn create_data_channel(
        &self,
        label: &str,
        init: &DataChannelInit,
    ) -> Result<Arc<dyn NativeDataChannel>, EngineError> {
        if *self.signaling.lock() == SignalingState::Closed {
            return Err(EngineError::InvalidState("connection closed".to_string()));
        }
        let channel = FakeDataChannel::new(label, init.id, Arc::clone(&self.worker));
        self.local_channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }

    fn create_offer(&self, _options: &OfferOptions, observer: Arc<dyn CreateDescriptionObserver>) {
        self.describe(SdpType::Offer, observer);
    }

    fn create_answer(&self, _options: &AnswerOptions, observer: Arc<dyn CreateDescriptionObserver>) {
        if self.remote_description.lock().is_none() {
            let error = EngineError::InvalidState("no remote offer".to_string());
            self.complete(Box::new(move || observer.on_failure(error)));
            return;
        }
        self.describe(SdpType::Answer, observer);
    }

    fn set_local_description(
        &self,
        description: SessionDescription,
        observer: Arc<dyn SetDescriptionObserver>,
    ) {
        let outcome = if self.fail_descriptions.load(Ordering::SeqCst) || description.sdp.is_empty() {
            Err(EngineError::Rejected("unusable local description".to_string()))
        } else {
            *self.local_description.lock() = Some(description);
            Ok(())
        };
        self.complete_set(observer, outcome);
    }

    fn set_remote_description(
        &self,
        description: SessionDescription,
        observer: Arc<dyn SetDescriptionObserver>,
    ) {
        let outcome = if self.fail_descriptions.load(Ordering::SeqCst) {
            Err(EngineError::Rejected("unusable remote description".to_string()))
        } else {
            *self.remote_description.lock() = Some(description);
            Ok(())
        };
        self.complete_set(observer, outcome);
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.lock().clone()
    }

    fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), EngineError> {
        if self.remote_description.lock().is_none() {
            return Err(EngineError::InvalidState("no remote description".to_string()));
        }
        self.candidates.lock().push(candidate.clone());
        Ok(())
    }

    fn add_track(
        &self,
        track: Arc<dyn NativeTrack>,
        _stream_ids: &[String],
    ) -> Result<Arc<dyn NativeRtpSender>, EngineError> {
        let kind = track.kind();
        let received = FakeTrack::new("receiving", kind, Arc::clone(&self.signaling_thread));
        let transceiver = self.push_transceiver(kind, Some(track), received, Vec::new());
        Ok(Arc::clone(&transceiver.sender) as Arc<dyn NativeRtpSender>)
    }

    fn add_transceiver(
        &self,
        kind: TrackKind,
        init: &RtpTransceiverInit,
    ) -> Result<Arc<dyn NativeRtpTransceiver>, EngineError> {
        let received = FakeTrack::new("receiving", kind, Arc::clone(&self.signaling_thread));
        let transceiver = self.push_transceiver(kind, None, received, Vec::new());
        *transceiver.direction.lock() = init.direction;
        Ok(transceiver as Arc<dyn NativeRtpTransceiver>)
    }

    fn remove_track(&self, sender: &Arc<dyn NativeRtpSender>) -> Result<(), EngineError> {
        let id = sender.id();
        let transceivers = self.transceivers.lock();
        match transceivers.iter().find(|transceiver| transceiver.sender.id == id) {
            Some(transceiver) => {
                *transceiver.sender.track.lock() = None;
                Ok(())
            }
            None => Err(EngineError::InvalidState(format!("unknown sender {id}"))),
        }
    }

    fn senders(&self) -> Vec<Arc<dyn NativeRtpSender>> {
        self.transceivers
            .lock()
            .iter()
            .map(|transceiver| Arc::clone(&transceiver.sender) as Arc<dyn NativeRtpSender>)
            .collect()
    }

    fn receivers(&self) -> Vec<Arc<dyn NativeRtpReceiver>> {
        self.transceivers
            .lock()
            .iter()
            .map(|transceiver| Arc::clone(&transceiver.receiver) as Arc<dyn NativeRtpReceiver>)
            .collect()
    }

    fn transceivers(&self) -> Vec<Arc<dyn NativeRtpTransceiver>> {
        self.transceivers
            .lock()
            .iter()
            .map(|transceiver| Arc::clone(transceiver) as Arc<dyn NativeRtpTransceiver>)
            .collect()
    }

    fn dtls_transport(&self) -> Option<Arc<dyn NativeDtlsTransport>> {
        self.dtls
            .lock()
            .as_ref()
            .map(|dtls| Arc::clone(dtls) as Arc<dyn NativeDtlsTransport>)
    }

    fn sctp_transport(&self) -> Option<Arc<dyn NativeSctpTransport>> {
        self.sctp
            .lock()
            .as_ref()
            .map(|sctp| Arc::clone(sctp) as Arc<dyn NativeSctpTransport>)
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.fire_signaling(SignalingState::Closed);
    }
}

// ============================================================================
// Data channel
// ============================================================================

pub struct FakeDataChannel {
    label: String,
    id: Option<u16>,
    worker: Arc<WorkerThread>,
    state: Mutex<DataState>,
    observer: Mutex<Option<Arc<dyn DataChannelObserver>>>,
    sent: Mutex<Vec<DataBuffer>>,
    buffered_amount: AtomicU64,
    unregistered: AtomicUsize,
}

impl FakeDataChannel {
    fn new(label: &str, id: Option<u16>, worker: Arc<WorkerThread>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            id,
            worker,
            state: Mutex::new(DataState::Connecting),
            observer: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            buffered_amount: AtomicU64::new(0),
            unregistered: AtomicUsize::new(0),
        })
    }

    /// Change state and report it from the worker thread
    pub fn set_state(&self, state: DataState) {
        *self.state.lock() = state;
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            invoke(&*self.worker, move || observer.on_state_change(state)).unwrap();
        }
    }

    /// Deliver a text message from the remote peer
    pub fn receive(&self, text: &str) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            let buffer = DataBuffer::text(text);
            invoke(&*self.worker, move || observer.on_message(buffer)).unwrap();
        }
    }

    pub fn set_buffered_amount(&self, amount: u64) {
        self.buffered_amount.store(amount, Ordering::SeqCst);
    }

    pub fn is_observed(&self) -> bool {
        self.observer.lock().is_some()
    }

    pub fn unregistrations(&self) -> usize {
        self.unregistered.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<DataBuffer> {
        self.sent.lock().clone()
    }
}

impl NativeDataChannel for FakeDataChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn id(&self) -> Option<u16> {
        self.id
    }

    fn ordered(&self) -> bool {
        true
    }

    fn protocol(&self) -> String {
        String::new()
    }

    fn negotiated(&self) -> bool {
        false
    }

    fn max_retransmits(&self) -> Option<u16> {
        None
    }

    fn max_packet_life_time(&self) -> Option<u16> {
        None
    }

    fn state(&self) -> DataState {
        *self.state.lock()
    }

    fn buffered_amount(&self) -> u64 {
        self.buffered_amount.load(Ordering::SeqCst)
    }

    fn register_observer(&self, observer: Arc<dyn DataChannelObserver>) {
        *self.observer.lock() = Some(observer);
    }

    fn unregister_observer(&self) {
        self.unregistered.fetch_add(1, Ordering::SeqCst);
        *self.observer.lock() = None;
    }

    fn send(&self, buffer: &DataBuffer) -> Result<(), EngineError> {
        if *self.state.lock() != DataState::Open {
            return Err(EngineError::InvalidState("channel not open".to_string()));
        }
        self.sent.lock().push(buffer.clone());
        Ok(())
    }

    fn close(&self) {
        self.set_state(DataState::Closing);
        self.set_state(DataState::Closed);
    }
}

// ============================================================================
// Transports
// ============================================================================

pub struct FakeDtlsTransport {
    ice: Arc<FakeIceTransport>,
    worker: Arc<WorkerThread>,
    state: Mutex<DtlsState>,
    observer: Mutex<Option<Arc<dyn DtlsTransportObserver>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeDtlsTransport {
    fn new(ice: Arc<FakeIceTransport>, worker: Arc<WorkerThread>) -> Arc<Self> {
        Arc::new(Self {
            ice,
            worker,
            state: Mutex::new(DtlsState::New),
            observer: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn ice(&self) -> &Arc<FakeIceTransport> {
        &self.ice
    }

    pub fn fire_state(&self, state: DtlsState, certificates: Vec<Vec<u8>>) {
        *self.state.lock() = state;
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            invoke(&*self.worker, move || observer.on_state_change(state, certificates)).unwrap();
        }
    }

    pub fn fire_error(&self, message: &str) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            let message = message.to_string();
            invoke(&*self.worker, move || observer.on_error(message)).unwrap();
        }
    }

    /// `register@thread` / `unregister@thread` entries, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn is_observed(&self) -> bool {
        self.observer.lock().is_some()
    }
}

impl NativeDtlsTransport for FakeDtlsTransport {
    fn state(&self) -> DtlsState {
        *self.state.lock()
    }

    fn remote_certificates(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    fn ice_transport(&self) -> Arc<dyn NativeIceTransport> {
        Arc::clone(&self.ice) as Arc<dyn NativeIceTransport>
    }

    fn register_observer(&self, observer: Arc<dyn DtlsTransportObserver>) {
        self.calls.lock().push(format!("register@{}", current_thread()));
        *self.observer.lock() = Some(observer);
    }

    fn unregister_observer(&self) {
        self.calls.lock().push(format!("unregister@{}", current_thread()));
        *self.observer.lock() = None;
    }
}

pub struct FakeIceTransport {
    worker: Arc<WorkerThread>,
    state: Mutex<IceTransportState>,
    observer: Mutex<Option<Arc<dyn IceTransportObserver>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeIceTransport {
    fn new(worker: Arc<WorkerThread>) -> Arc<Self> {
        Arc::new(Self {
            worker,
            state: Mutex::new(IceTransportState::New),
            observer: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fire_state(&self, state: IceTransportState) {
        *self.state.lock() = state;
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            invoke(&*self.worker, move || observer.on_state_change(state)).unwrap();
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn is_observed(&self) -> bool {
        self.observer.lock().is_some()
    }
}

impl NativeIceTransport for FakeIceTransport {
    fn state(&self) -> IceTransportState {
        *self.state.lock()
    }

    fn gathering_state(&self) -> IceGatheringState {
        IceGatheringState::New
    }

    fn register_observer(&self, observer: Arc<dyn IceTransportObserver>) {
        self.calls.lock().push(format!("register@{}", current_thread()));
        *self.observer.lock() = Some(observer);
    }

    fn unregister_observer(&self) {
        self.calls.lock().push(format!("unregister@{}", current_thread()));
        *self.observer.lock() = None;
    }
}

// ============================================================================
// Track
// ============================================================================

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    signaling: Arc<WorkerThread>,
    state: Mutex<TrackState>,
    enabled: AtomicBool,
    observer: Mutex<Option<Arc<dyn TrackObserver>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTrack {
    fn new(id: &str, kind: TrackKind, signaling: Arc<WorkerThread>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            signaling,
            state: Mutex::new(TrackState::Live),
            enabled: AtomicBool::new(true),
            observer: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// End the track and report it from the signaling thread
    pub fn end(&self) {
        *self.state.lock() = TrackState::Ended;
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            invoke(&*self.signaling, move || observer.on_changed(TrackState::Ended)).unwrap();
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn is_observed(&self) -> bool {
        self.observer.lock().is_some()
    }
}

impl NativeTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn state(&self) -> TrackState {
        *self.state.lock()
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn register_observer(&self, observer: Arc<dyn TrackObserver>) {
        self.calls.lock().push(format!("register@{}", current_thread()));
        *self.observer.lock() = Some(observer);
    }

    fn unregister_observer(&self) {
        self.calls.lock().push(format!("unregister@{}", current_thread()));
        *self.observer.lock() = None;
    }
}

// ============================================================================
// RTP objects and streams
// ============================================================================

pub struct FakeMediaStream {
    id: String,
    tracks: Vec<Arc<FakeTrack>>,
}

impl FakeMediaStream {
    fn new(id: &str, tracks: Vec<Arc<FakeTrack>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            tracks,
        })
    }
}

impl NativeMediaStream for FakeMediaStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn tracks(&self) -> Vec<Arc<dyn NativeTrack>> {
        self.tracks
            .iter()
            .map(|track| Arc::clone(track) as Arc<dyn NativeTrack>)
            .collect()
    }
}

pub struct FakeRtpSender {
    id: String,
    track: Mutex<Option<Arc<dyn NativeTrack>>>,
    stream_ids: Vec<String>,
    dtls: Option<Arc<FakeDtlsTransport>>,
}

impl FakeRtpSender {
    pub fn track_id(&self) -> Option<String> {
        self.track.lock().as_ref().map(|track| track.id())
    }
}

impl NativeRtpSender for FakeRtpSender {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn track(&self) -> Option<Arc<dyn NativeTrack>> {
        self.track.lock().clone()
    }

    fn stream_ids(&self) -> Vec<String> {
        self.stream_ids.clone()
    }

    fn dtls_transport(&self) -> Option<Arc<dyn NativeDtlsTransport>> {
        self.dtls
            .as_ref()
            .map(|dtls| Arc::clone(dtls) as Arc<dyn NativeDtlsTransport>)
    }

    fn replace_track(&self, track: Option<Arc<dyn NativeTrack>>) -> Result<(), EngineError> {
        *self.track.lock() = track;
        Ok(())
    }
}

pub struct FakeRtpReceiver {
    id: String,
    track: Arc<FakeTrack>,
    streams: Vec<Arc<FakeMediaStream>>,
    dtls: Option<Arc<FakeDtlsTransport>>,
}

impl NativeRtpReceiver for FakeRtpReceiver {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn track(&self) -> Arc<dyn NativeTrack> {
        Arc::clone(&self.track) as Arc<dyn NativeTrack>
    }

    fn streams(&self) -> Vec<Arc<dyn NativeMediaStream>> {
        self.streams
            .iter()
            .map(|stream| Arc::clone(stream) as Arc<dyn NativeMediaStream>)
            .collect()
    }

    fn dtls_transport(&self) -> Option<Arc<dyn NativeDtlsTransport>> {
        self.dtls
            .as_ref()
            .map(|dtls| Arc::clone(dtls) as Arc<dyn NativeDtlsTransport>)
    }
}

pub struct FakeTransceiver {
    mid: Option<String>,
    kind: TrackKind,
    sender: Arc<FakeRtpSender>,
    receiver: Arc<FakeRtpReceiver>,
    direction: Mutex<RtpTransceiverDirection>,
    stopped: AtomicBool,
}

impl FakeTransceiver {
    pub fn sender(&self) -> &Arc<FakeRtpSender> {
        &self.sender
    }

    pub fn received_track(&self) -> &Arc<FakeTrack> {
        &self.receiver.track
    }
}

impl NativeRtpTransceiver for FakeTransceiver {
    fn mid(&self) -> Option<String> {
        self.mid.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn sender(&self) -> Arc<dyn NativeRtpSender> {
        Arc::clone(&self.sender) as Arc<dyn NativeRtpSender>
    }

    fn receiver(&self) -> Arc<dyn NativeRtpReceiver> {
        Arc::clone(&self.receiver) as Arc<dyn NativeRtpReceiver>
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn direction(&self) -> RtpTransceiverDirection {
        *self.direction.lock()
    }

    fn set_direction(&self, direction: RtpTransceiverDirection) -> Result<(), EngineError> {
        if self.stopped() {
            return Err(EngineError::InvalidState("transceiver stopped".to_string()));
        }
        *self.direction.lock() = direction;
        Ok(())
    }

    fn current_direction(&self) -> Option<RtpTransceiverDirection> {
        None
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.stopped.store(true, Ordering::SeqCst);
        *self.direction.lock() = RtpTransceiverDirection::Stopped;
        Ok(())
    }
}

// ============================================================================
// SCTP
// ============================================================================

pub struct FakeSctpTransport {
    dtls: Arc<FakeDtlsTransport>,
    worker: Arc<WorkerThread>,
    information: Mutex<SctpTransportInformation>,
    observer: Mutex<Option<Arc<dyn SctpTransportObserver>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSctpTransport {
    fn new(
        dtls: Arc<FakeDtlsTransport>,
        state: SctpTransportState,
        worker: Arc<WorkerThread>,
    ) -> Arc<Self> {
        Arc::new(Self {
            dtls,
            worker,
            information: Mutex::new(SctpTransportInformation {
                state,
                max_message_size: None,
                max_channels: None,
            }),
            observer: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn dtls(&self) -> &Arc<FakeDtlsTransport> {
        &self.dtls
    }

    pub fn fire_state(&self, information: SctpTransportInformation) {
        *self.information.lock() = information;
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            invoke(&*self.worker, move || observer.on_state_change(information)).unwrap();
        }
    }

    /// `dtls@thread` / `register@thread` / `unregister@thread` entries, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn is_observed(&self) -> bool {
        self.observer.lock().is_some()
    }
}

impl NativeSctpTransport for FakeSctpTransport {
    fn information(&self) -> SctpTransportInformation {
        *self.information.lock()
    }

    fn dtls_transport(&self) -> Arc<dyn NativeDtlsTransport> {
        self.calls.lock().push(format!("dtls@{}", current_thread()));
        Arc::clone(&self.dtls) as Arc<dyn NativeDtlsTransport>
    }

    fn register_observer(&self, observer: Arc<dyn SctpTransportObserver>) {
        self.calls.lock().push(format!("register@{}", current_thread()));
        *self.observer.lock() = Some(observer);
    }

    fn unregister_observer(&self) {
        self.calls.lock().push(format!("unregister@{}", current_thread()));
        *self.observer.lock() = None;
    }
}

// ============================================================================
// Host fixture
// ============================================================================

thread_local! {
    static CONTEXT: RefCell<Option<Rc<Context>>> = const { RefCell::new(None) };
    static KEPT: RefCell<HashMap<String, Rc<dyn Any>>> = RefCell::new(HashMap::new());
}

/// Keep `value` alive on the host thread under `name`
pub fn keep<T: 'static>(name: &str, value: Rc<T>) {
    KEPT.with(|kept| kept.borrow_mut().insert(name.to_string(), value));
}

/// A value stored with [`keep`]
pub fn kept<T: 'static>(name: &str) -> Rc<T> {
    let value = KEPT.with(|kept| kept.borrow().get(name).cloned());
    value
        .and_then(|value| value.downcast::<T>().ok())
        .unwrap_or_else(|| panic!("nothing of the requested type kept as {name}"))
}

/// Drop the value stored under `name`
pub fn forget(name: &str) {
    let value = KEPT.with(|kept| kept.borrow_mut().remove(name));
    drop(value);
}

/// A host thread with a [`Context`] over a [`FakeEngine`]
pub struct Harness {
    pub host: HostThread,
    pub engine: Arc<FakeEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let host = HostThread::spawn(&HostConfig::default().with_thread_name("webrtc-host")).unwrap();
        let engine = FakeEngine::new();
        let native: Arc<dyn NativeFactory> = engine.clone();
        host.handle()
            .call(move |_| {
                let context = Context::new(native, LoopConfig::default());
                CONTEXT.with(|slot| *slot.borrow_mut() = Some(context));
            })
            .unwrap();
        Self { host, engine }
    }

    /// Run `f` on the host thread with the context
    pub fn run<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&HostContext, &Rc<Context>) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.host
            .handle()
            .call(move |ctx| {
                let context = CONTEXT
                    .with(|slot| slot.borrow().clone())
                    .expect("context installed");
                f(ctx, &context)
            })
            .unwrap()
    }

    /// Hold the host thread until the returned sender is dropped or used
    pub fn block_host(&self) -> crossbeam::channel::Sender<()> {
        let (release, wait) = crossbeam::channel::bounded::<()>(0);
        self.host
            .handle()
            .post(move |_| {
                let _ = wait.recv();
            })
            .unwrap();
        release
    }

    /// Let every queued notification, stop and close complete
    pub fn settle(&self) {
        for _ in 0..4 {
            self.host.handle().flush().unwrap();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.host.handle().call(|_| {
            let kept = KEPT.with(|kept| std::mem::take(&mut *kept.borrow_mut()));
            drop(kept);
            let context = CONTEXT.with(|slot| slot.borrow_mut().take());
            drop(context);
        });
    }
}
