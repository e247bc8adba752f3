//! Interface to the native WebRTC engine
//!
//! The engine owns its protocol stacks and runs its own worker and
//! signaling threads. This module describes what the proxy layer consumes
//! from it:
//!
//! - native handles (`Native*` traits), shared as `Arc<dyn ...>`
//! - observer traits the engine calls from its own threads
//! - [`EngineThread`], the engine's task-posting threads
//!
//! Every trait here is `Send + Sync`. A native handle is only guaranteed to
//! stay valid for the duration of a single observer call unless the caller
//! keeps its own `Arc`.

mod thread;

pub use thread::{invoke, EngineTask, EngineThread, WorkerThread};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by the native engine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine refused to create or modify an object
    #[error("Engine rejected the request: {0}")]
    Rejected(String),

    /// The object is in a state that does not allow the operation
    #[error("Engine object in invalid state: {0}")]
    InvalidState(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An engine thread has stopped accepting tasks
    #[error("Engine thread '{0}' has stopped")]
    ThreadStopped(String),
}

// ============================================================================
// State enums
// ============================================================================

macro_rules! host_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Name exposed to host code
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

host_enum! {
    /// Offer/answer negotiation state of a peer connection
    pub enum SignalingState {
        Stable => "stable",
        HaveLocalOffer => "have-local-offer",
        HaveLocalPranswer => "have-local-pranswer",
        HaveRemoteOffer => "have-remote-offer",
        HaveRemotePranswer => "have-remote-pranswer",
        Closed => "closed",
    }
}

host_enum! {
    /// Aggregate ICE connectivity of a peer connection
    pub enum IceConnectionState {
        New => "new",
        Checking => "checking",
        Connected => "connected",
        Completed => "completed",
        Failed => "failed",
        Disconnected => "disconnected",
        Closed => "closed",
    }
}

host_enum! {
    /// Aggregate transport state of a peer connection
    pub enum PeerConnectionState {
        New => "new",
        Connecting => "connecting",
        Connected => "connected",
        Disconnected => "disconnected",
        Failed => "failed",
        Closed => "closed",
    }
}

host_enum! {
    /// Candidate gathering progress
    pub enum IceGatheringState {
        New => "new",
        Gathering => "gathering",
        Complete => "complete",
    }
}

host_enum! {
    /// Data channel ready state
    pub enum DataState {
        Connecting => "connecting",
        Open => "open",
        Closing => "closing",
        Closed => "closed",
    }
}

host_enum! {
    /// DTLS transport state
    pub enum DtlsState {
        New => "new",
        Connecting => "connecting",
        Connected => "connected",
        Closed => "closed",
        Failed => "failed",
    }
}

host_enum! {
    /// State of a single ICE transport
    pub enum IceTransportState {
        New => "new",
        Checking => "checking",
        Connected => "connected",
        Completed => "completed",
        Failed => "failed",
        Disconnected => "disconnected",
        Closed => "closed",
    }
}

host_enum! {
    /// Media track ready state
    pub enum TrackState {
        Live => "live",
        Ended => "ended",
    }
}

host_enum! {
    /// Media kind of a track
    pub enum TrackKind {
        Audio => "audio",
        Video => "video",
    }
}

host_enum! {
    /// SCTP association state
    pub enum SctpTransportState {
        New => "new",
        Connecting => "connecting",
        Connected => "connected",
        Closed => "closed",
    }
}

host_enum! {
    /// Preferred or negotiated direction of a transceiver
    pub enum RtpTransceiverDirection {
        SendRecv => "sendrecv",
        SendOnly => "sendonly",
        RecvOnly => "recvonly",
        Inactive => "inactive",
        Stopped => "stopped",
    }
}

host_enum! {
    /// Role of a session description in offer/answer
    pub enum SdpType {
        Offer => "offer",
        PrAnswer => "pranswer",
        Answer => "answer",
        Rollback => "rollback",
    }
}

// ============================================================================
// Value types
// ============================================================================

/// A gathered ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// A failed ICE candidate gathering attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateError {
    pub address: String,
    pub port: u16,
    pub url: String,
    pub error_code: u16,
    pub error_text: String,
}

/// An SDP blob and its role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(sdp_type: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            sdp_type,
            sdp: sdp.into(),
        }
    }
}

/// Options for `createOffer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfferOptions {
    pub voice_activity_detection: bool,
    pub ice_restart: bool,
    pub offer_to_receive_audio: Option<bool>,
    pub offer_to_receive_video: Option<bool>,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            voice_activity_detection: true,
            ice_restart: false,
            offer_to_receive_audio: None,
            offer_to_receive_video: None,
        }
    }
}

/// Options for `createAnswer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnswerOptions {
    pub voice_activity_detection: bool,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            voice_activity_detection: true,
        }
    }
}

/// Options for adding a transceiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RtpTransceiverInit {
    pub direction: RtpTransceiverDirection,
    pub stream_ids: Vec<String>,
}

impl Default for RtpTransceiverInit {
    fn default() -> Self {
        Self {
            direction: RtpTransceiverDirection::SendRecv,
            stream_ids: Vec::new(),
        }
    }
}

/// Snapshot of an SCTP association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpTransportInformation {
    pub state: SctpTransportState,
    pub max_message_size: Option<u64>,
    pub max_channels: Option<u16>,
}

/// Payload of one data channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBuffer {
    pub data: Vec<u8>,
    pub binary: bool,
}

impl DataBuffer {
    /// A UTF-8 text message
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: text.into().into_bytes(),
            binary: false,
        }
    }

    /// A binary message
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            binary: true,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Options for creating a data channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataChannelInit {
    pub ordered: bool,
    pub max_packet_life_time: Option<u16>,
    pub max_retransmits: Option<u16>,
    pub protocol: String,
    pub negotiated: bool,
    pub id: Option<u16>,
}

impl Default for DataChannelInit {
    fn default() -> Self {
        Self {
            ordered: true,
            max_packet_life_time: None,
            max_retransmits: None,
            protocol: String::new(),
            negotiated: false,
            id: None,
        }
    }
}

impl DataChannelInit {
    /// Reject option combinations the engine cannot honor
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.max_packet_life_time.is_some() && self.max_retransmits.is_some() {
            return Err(EngineError::InvalidConfiguration(
                "maxPacketLifeTime and maxRetransmits are mutually exclusive".to_string(),
            ));
        }
        if self.negotiated && self.id.is_none() {
            return Err(EngineError::InvalidConfiguration(
                "negotiated channels require an id".to_string(),
            ));
        }
        Ok(())
    }
}

/// STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// Local port range used for ICE candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortRange {
    #[serde(default)]
    pub min: Option<u16>,
    #[serde(default)]
    pub max: Option<u16>,
}

impl PortRange {
    /// Inclusive bounds with unset ends widened to the full range
    pub fn bounds(&self) -> (u16, u16) {
        (self.min.unwrap_or(0), self.max.unwrap_or(u16::MAX))
    }
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub port_range: PortRange,
}

impl RtcConfiguration {
    /// Parse a configuration from its JSON form
    pub fn from_json(source: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before handing it to the engine
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        let (min, max) = self.port_range.bounds();
        if min > max {
            return Err(EngineError::InvalidConfiguration(format!(
                "port range min {} exceeds max {}",
                min, max
            )));
        }
        if let Some(server) = self.ice_servers.iter().find(|s| s.urls.is_empty()) {
            return Err(EngineError::InvalidConfiguration(format!(
                "ICE server entry has no urls (username: {:?})",
                server.username
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Native handles
// ============================================================================

/// Entry point of the engine
pub trait NativeFactory: Send + Sync {
    /// Create a peer connection reporting to `observer`
    fn create_peer_connection(
        &self,
        config: &RtcConfiguration,
        observer: Arc<dyn PeerConnectionObserver>,
    ) -> std::result::Result<Arc<dyn NativePeerConnection>, EngineError>;

    /// Thread owning transport state
    fn worker_thread(&self) -> Arc<dyn EngineThread>;

    /// Thread owning signaling state and track observers
    fn signaling_thread(&self) -> Arc<dyn EngineThread>;
}

/// A native peer connection
pub trait NativePeerConnection: Send + Sync {
    fn signaling_state(&self) -> SignalingState;
    fn ice_connection_state(&self) -> IceConnectionState;
    fn peer_connection_state(&self) -> PeerConnectionState;
    fn ice_gathering_state(&self) -> IceGatheringState;

    /// Open a new data channel
    fn create_data_channel(
        &self,
        label: &str,
        init: &DataChannelInit,
    ) -> std::result::Result<Arc<dyn NativeDataChannel>, EngineError>;

    /// Create an offer; `observer` is called on the signaling thread
    fn create_offer(&self, options: &OfferOptions, observer: Arc<dyn CreateDescriptionObserver>);
    /// Create an answer; `observer` is called on the signaling thread
    fn create_answer(&self, options: &AnswerOptions, observer: Arc<dyn CreateDescriptionObserver>);
    fn set_local_description(
        &self,
        description: SessionDescription,
        observer: Arc<dyn SetDescriptionObserver>,
    );
    fn set_remote_description(
        &self,
        description: SessionDescription,
        observer: Arc<dyn SetDescriptionObserver>,
    );
    fn local_description(&self) -> Option<SessionDescription>;
    fn remote_description(&self) -> Option<SessionDescription>;

    /// Apply a remote candidate
    fn add_ice_candidate(&self, candidate: &IceCandidate) -> std::result::Result<(), EngineError>;

    /// Send `track`, announcing it in `stream_ids`
    fn add_track(
        &self,
        track: Arc<dyn NativeTrack>,
        stream_ids: &[String],
    ) -> std::result::Result<Arc<dyn NativeRtpSender>, EngineError>;
    fn add_transceiver(
        &self,
        kind: TrackKind,
        init: &RtpTransceiverInit,
    ) -> std::result::Result<Arc<dyn NativeRtpTransceiver>, EngineError>;
    fn remove_track(&self, sender: &Arc<dyn NativeRtpSender>) -> std::result::Result<(), EngineError>;

    fn senders(&self) -> Vec<Arc<dyn NativeRtpSender>>;
    /// Every receiver, in transceiver order
    fn receivers(&self) -> Vec<Arc<dyn NativeRtpReceiver>>;
    fn transceivers(&self) -> Vec<Arc<dyn NativeRtpTransceiver>>;

    /// DTLS transport carrying the SCTP association, once negotiated
    fn dtls_transport(&self) -> Option<Arc<dyn NativeDtlsTransport>>;

    /// SCTP association carrying the data channels, once negotiated
    fn sctp_transport(&self) -> Option<Arc<dyn NativeSctpTransport>>;

    /// Close the connection; signaling moves to `Closed`
    fn close(&self);
}

/// Completion of `create_offer` / `create_answer`
pub trait CreateDescriptionObserver: Send + Sync {
    fn on_success(&self, description: SessionDescription);
    fn on_failure(&self, error: EngineError);
}

/// Completion of `set_local_description` / `set_remote_description`
pub trait SetDescriptionObserver: Send + Sync {
    fn on_success(&self);
    fn on_failure(&self, error: EngineError);
}

/// Callbacks from a native peer connection, on engine threads
pub trait PeerConnectionObserver: Send + Sync {
    fn on_signaling_change(&self, state: SignalingState);
    fn on_ice_connection_change(&self, state: IceConnectionState, connection: PeerConnectionState);
    fn on_ice_gathering_change(&self, state: IceGatheringState);
    fn on_ice_candidate(&self, candidate: IceCandidate);
    fn on_ice_candidate_error(&self, error: IceCandidateError);
    /// A remote peer opened a data channel
    fn on_data_channel(&self, channel: Arc<dyn NativeDataChannel>);
    /// A remote track arrived on `transceiver`
    fn on_track(&self, transceiver: Arc<dyn NativeRtpTransceiver>);
    fn on_renegotiation_needed(&self);
}

/// A native data channel
pub trait NativeDataChannel: Send + Sync {
    fn label(&self) -> String;
    fn id(&self) -> Option<u16>;
    fn ordered(&self) -> bool;
    fn protocol(&self) -> String;
    fn negotiated(&self) -> bool;
    fn max_retransmits(&self) -> Option<u16>;
    fn max_packet_life_time(&self) -> Option<u16>;
    fn state(&self) -> DataState;
    fn buffered_amount(&self) -> u64;

    /// Replace the observer; the channel keeps it until unregistered
    fn register_observer(&self, observer: Arc<dyn DataChannelObserver>);
    fn unregister_observer(&self);

    fn send(&self, buffer: &DataBuffer) -> std::result::Result<(), EngineError>;
    fn close(&self);
}

/// Callbacks from a native data channel, on engine threads
pub trait DataChannelObserver: Send + Sync {
    fn on_state_change(&self, state: DataState);
    fn on_message(&self, buffer: DataBuffer);
}

/// A native DTLS transport
pub trait NativeDtlsTransport: Send + Sync {
    fn state(&self) -> DtlsState;
    /// DER-encoded certificates presented by the remote peer
    fn remote_certificates(&self) -> Vec<Vec<u8>>;
    fn ice_transport(&self) -> Arc<dyn NativeIceTransport>;

    /// Must be called on the worker thread
    fn register_observer(&self, observer: Arc<dyn DtlsTransportObserver>);
    /// Must be called on the worker thread
    fn unregister_observer(&self);
}

/// Callbacks from a native DTLS transport, on the worker thread
pub trait DtlsTransportObserver: Send + Sync {
    fn on_state_change(&self, state: DtlsState, remote_certificates: Vec<Vec<u8>>);
    fn on_error(&self, message: String);
}

/// A native ICE transport
pub trait NativeIceTransport: Send + Sync {
    fn state(&self) -> IceTransportState;
    fn gathering_state(&self) -> IceGatheringState;

    /// Must be called on the worker thread
    fn register_observer(&self, observer: Arc<dyn IceTransportObserver>);
    /// Must be called on the worker thread
    fn unregister_observer(&self);
}

/// Callbacks from a native ICE transport, on the worker thread
pub trait IceTransportObserver: Send + Sync {
    fn on_state_change(&self, state: IceTransportState);
    fn on_gathering_state_change(&self, state: IceGatheringState);
}

/// A native media track
pub trait NativeTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;
    fn state(&self) -> TrackState;
    fn enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);

    fn register_observer(&self, observer: Arc<dyn TrackObserver>);
    /// Must be called on the signaling thread
    fn unregister_observer(&self);
}

/// Callbacks from a native media track, on engine threads
pub trait TrackObserver: Send + Sync {
    fn on_changed(&self, state: TrackState);
}

/// A native media stream: an id grouping tracks
pub trait NativeMediaStream: Send + Sync {
    fn id(&self) -> String;
    fn tracks(&self) -> Vec<Arc<dyn NativeTrack>>;
}

/// A native RTP sender
pub trait NativeRtpSender: Send + Sync {
    fn id(&self) -> String;
    fn track(&self) -> Option<Arc<dyn NativeTrack>>;
    fn stream_ids(&self) -> Vec<String>;
    fn dtls_transport(&self) -> Option<Arc<dyn NativeDtlsTransport>>;
    fn replace_track(&self, track: Option<Arc<dyn NativeTrack>>) -> std::result::Result<(), EngineError>;
}

/// A native RTP receiver
pub trait NativeRtpReceiver: Send + Sync {
    fn id(&self) -> String;
    fn track(&self) -> Arc<dyn NativeTrack>;
    fn streams(&self) -> Vec<Arc<dyn NativeMediaStream>>;
    fn dtls_transport(&self) -> Option<Arc<dyn NativeDtlsTransport>>;
}

/// A native transceiver pairing one sender with one receiver
pub trait NativeRtpTransceiver: Send + Sync {
    fn mid(&self) -> Option<String>;
    fn kind(&self) -> TrackKind;
    fn sender(&self) -> Arc<dyn NativeRtpSender>;
    fn receiver(&self) -> Arc<dyn NativeRtpReceiver>;
    fn stopped(&self) -> bool;
    fn direction(&self) -> RtpTransceiverDirection;
    fn set_direction(&self, direction: RtpTransceiverDirection) -> std::result::Result<(), EngineError>;
    fn current_direction(&self) -> Option<RtpTransceiverDirection>;
    fn stop(&self) -> std::result::Result<(), EngineError>;
}

/// A native SCTP transport
pub trait NativeSctpTransport: Send + Sync {
    fn information(&self) -> SctpTransportInformation;
    /// Must be called on the worker thread
    fn dtls_transport(&self) -> Arc<dyn NativeDtlsTransport>;

    /// Must be called on the worker thread
    fn register_observer(&self, observer: Arc<dyn SctpTransportObserver>);
    /// Must be called on the worker thread
    fn unregister_observer(&self);
}

/// Callbacks from a native SCTP transport, on the worker thread
pub trait SctpTransportObserver: Send + Sync {
    fn on_state_change(&self, information: SctpTransportInformation);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(SignalingState::HaveLocalOffer.as_str(), "have-local-offer");
        assert_eq!(DataState::Closing.to_string(), "closing");
        assert_eq!(
            serde_json::to_string(&IceGatheringState::Complete).unwrap(),
            "\"complete\""
        );
        let parsed: TrackKind = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(parsed, TrackKind::Video);
    }

    #[test]
    fn test_configuration_from_json() {
        let config = RtcConfiguration::from_json(
            r#"{
                "iceServers": [{ "urls": ["stun:stun.example.org"] }],
                "portRange": { "min": 10000, "max": 10100 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.port_range.bounds(), (10000, 10100));
        assert_eq!(RtcConfiguration::default().port_range.bounds(), (0, u16::MAX));
    }

    #[test]
    fn test_configuration_rejects_inverted_port_range() {
        let result = RtcConfiguration::from_json(r#"{ "portRange": { "min": 20, "max": 10 } }"#);
        assert!(matches!(
            result,
            Err(crate::Error::Engine(EngineError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn test_data_channel_init_validation() {
        assert!(DataChannelInit::default().validate().is_ok());
        assert!(DataChannelInit::default().ordered);

        let both = DataChannelInit {
            max_packet_life_time: Some(100),
            max_retransmits: Some(3),
            ..Default::default()
        };
        assert!(both.validate().is_err());

        let negotiated = DataChannelInit {
            negotiated: true,
            ..Default::default()
        };
        assert!(negotiated.validate().is_err());
    }

    #[test]
    fn test_session_description_json() {
        let offer = SessionDescription::new(SdpType::Offer, "v=0");
        assert_eq!(
            serde_json::to_value(&offer).unwrap(),
            serde_json::json!({ "type": "offer", "sdp": "v=0" })
        );
        let rollback: SessionDescription = serde_json::from_str(r#"{ "type": "rollback" }"#).unwrap();
        assert_eq!(rollback, SessionDescription::new(SdpType::Rollback, ""));
        assert!(OfferOptions::default().voice_activity_detection);
        assert_eq!(
            RtpTransceiverInit::default().direction,
            RtpTransceiverDirection::SendRecv
        );
    }

    #[test]
    fn test_data_buffer_constructors() {
        let text = DataBuffer::text("hi");
        assert!(!text.binary);
        assert_eq!(text.len(), 2);
        assert!(DataBuffer::binary(Vec::new()).is_empty());
    }
}
