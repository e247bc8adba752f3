//! RTP transceiver proxy
//!
//! A transceiver pins the proxies of its sender and receiver for its own
//! lifetime.

use crate::context::{unpin, Context};
use crate::engine::{NativeRtpTransceiver, RtpTransceiverDirection, TrackKind};
use crate::key::HandleKey;
use crate::rtp_receiver::{RtpReceiver, RtpReceiverArgs};
use crate::rtp_sender::{RtpSender, RtpSenderArgs};
use crate::Result;
use hostloop_core::{HostContext, OwnedWrap};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Constructor arguments for [`RtpTransceiver`]
pub struct RtpTransceiverArgs {
    pub host: HostContext,
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeRtpTransceiver>,
}

/// Host-visible RTP transceiver
pub struct RtpTransceiver {
    context: Rc<Context>,
    native: Arc<dyn NativeRtpTransceiver>,
    key: HandleKey,
    kind: TrackKind,
    sender: OwnedWrap<HandleKey, RtpSender, RtpSenderArgs>,
    sender_key: HandleKey,
    receiver: OwnedWrap<HandleKey, RtpReceiver, RtpReceiverArgs>,
    receiver_key: HandleKey,
}

impl RtpTransceiver {
    /// Cache factory; see [`Context::transceivers`]
    pub fn create(args: RtpTransceiverArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let RtpTransceiverArgs {
            host,
            context,
            native,
        } = args;

        let sender = OwnedWrap::new(Rc::clone(context.senders()));
        let native_sender = native.sender();
        let sender_key = HandleKey::of(&native_sender);
        sender.get_or_create(
            RtpSenderArgs {
                context: Rc::clone(&context),
                native: native_sender,
            },
            sender_key,
        )?;

        let receiver = OwnedWrap::new(Rc::clone(context.receivers()));
        let native_receiver = native.receiver();
        let receiver_key = HandleKey::of(&native_receiver);
        receiver.get_or_create(
            RtpReceiverArgs {
                host,
                context: Rc::clone(&context),
                native: native_receiver,
            },
            receiver_key,
        )?;

        let kind = native.kind();
        debug!(%kind, ?key, "RTP transceiver proxy created");
        Ok(Rc::new(Self {
            context,
            native,
            key,
            kind,
            sender,
            sender_key,
            receiver,
            receiver_key,
        }))
    }

    /// Media id, once negotiated
    pub fn mid(&self) -> Option<String> {
        self.native.mid()
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn sender(&self) -> Result<Rc<RtpSender>> {
        match self.sender.get(&self.sender_key) {
            Some(pinned) => unpin(pinned, "RTCRtpSender"),
            None => {
                let pinned = self.sender.get_or_create(
                    RtpSenderArgs {
                        context: Rc::clone(&self.context),
                        native: self.native.sender(),
                    },
                    self.sender_key,
                )?;
                unpin(pinned, "RTCRtpSender")
            }
        }
    }

    pub fn receiver(&self, host: &HostContext) -> Result<Rc<RtpReceiver>> {
        match self.receiver.get(&self.receiver_key) {
            Some(pinned) => unpin(pinned, "RTCRtpReceiver"),
            None => {
                let pinned = self.receiver.get_or_create(
                    RtpReceiverArgs {
                        host: host.clone(),
                        context: Rc::clone(&self.context),
                        native: self.native.receiver(),
                    },
                    self.receiver_key,
                )?;
                unpin(pinned, "RTCRtpReceiver")
            }
        }
    }

    pub fn stopped(&self) -> bool {
        self.native.stopped()
    }

    pub fn direction(&self) -> RtpTransceiverDirection {
        self.native.direction()
    }

    /// Change the preferred direction; takes effect on the next negotiation
    pub fn set_direction(&self, direction: RtpTransceiverDirection) -> Result<()> {
        self.native.set_direction(direction)?;
        Ok(())
    }

    /// Direction agreed in the last negotiation
    pub fn current_direction(&self) -> Option<RtpTransceiverDirection> {
        self.native.current_direction()
    }

    /// Permanently stop sending and receiving
    pub fn stop(&self) -> Result<()> {
        self.native.stop()?;
        Ok(())
    }

    pub fn key(&self) -> HandleKey {
        self.key
    }
}

impl Drop for RtpTransceiver {
    fn drop(&mut self) {
        self.context.transceivers().release(self);
    }
}

impl fmt::Debug for RtpTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpTransceiver")
            .field("kind", &self.kind)
            .field("sender", &self.sender_key)
            .field("receiver", &self.receiver_key)
            .finish()
    }
}
