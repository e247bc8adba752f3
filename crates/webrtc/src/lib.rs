//! Host-thread proxies for a multi-threaded WebRTC engine
//!
//! The engine reports state changes from its own worker and signaling
//! threads. Every object it exposes gets one host-side proxy that owns an
//! [`EventLoop`](hostloop_core::EventLoop): engine callbacks become
//! notifications, and the proxy handles them on the host thread where host
//! listeners run.
//!
//! Proxies for engine-created objects are deduplicated through the identity
//! caches of a [`Context`], so one native handle always maps to one proxy.
//!
//! # Example
//!
//! ```no_run
//! use hostloop_core::{HostConfig, HostThread, LoopConfig};
//! use hostloop_webrtc::{Context, NativeFactory, PeerConnection, RtcConfiguration};
//! use std::sync::Arc;
//!
//! fn connect(engine: Arc<dyn NativeFactory>) -> hostloop_webrtc::Result<()> {
//!     let host = HostThread::spawn(&HostConfig::default())?;
//!     host.handle().call(move |ctx| -> hostloop_webrtc::Result<()> {
//!         let context = Context::new(engine, LoopConfig::default());
//!         let pc = PeerConnection::new(ctx, &context, RtcConfiguration::default())?;
//!         pc.on_event(|event| println!("{}", event.kind()));
//!         Ok(())
//!     })??;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod data_channel;
pub mod dtls_transport;
pub mod engine;
pub mod error;
pub mod factory;
pub mod ice_transport;
pub mod key;
pub mod listener;
pub mod media_stream;
pub mod media_stream_track;
pub mod peer_connection;
pub mod request;
pub mod rtp_receiver;
pub mod rtp_sender;
pub mod rtp_transceiver;
pub mod sctp_transport;

pub use context::Context;
pub use data_channel::{BinaryType, DataChannel, DataChannelEvent, MessageData, ObserverRelay};
pub use dtls_transport::{DtlsTransport, DtlsTransportEvent};
pub use engine::{
    AnswerOptions, DataBuffer, DataChannelInit, DataState, DtlsState, EngineError,
    EngineThread, IceCandidate, IceCandidateError, IceConnectionState, IceGatheringState,
    IceServer, IceTransportState, NativeDataChannel, NativeDtlsTransport, NativeFactory,
    NativeIceTransport, NativeMediaStream, NativePeerConnection, NativeRtpReceiver,
    NativeRtpSender, NativeRtpTransceiver, NativeSctpTransport, NativeTrack, OfferOptions,
    PeerConnectionState, PortRange, RtcConfiguration, RtpTransceiverDirection,
    RtpTransceiverInit, SctpTransportInformation, SctpTransportState, SdpType,
    SessionDescription, SignalingState, TrackKind, TrackState, WorkerThread,
};
pub use error::{Error, Result};
pub use factory::PeerConnectionFactory;
pub use ice_transport::{IceTransport, IceTransportEvent};
pub use key::HandleKey;
pub use media_stream::MediaStream;
pub use media_stream_track::{MediaStreamTrack, TrackEvent};
pub use peer_connection::{PeerConnection, PeerConnectionEvent, RtcTrackEvent};
pub use request::RequestId;
pub use rtp_receiver::RtpReceiver;
pub use rtp_sender::RtpSender;
pub use rtp_transceiver::RtpTransceiver;
pub use sctp_transport::{SctpTransport, SctpTransportEvent};
