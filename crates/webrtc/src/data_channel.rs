//! Data channel proxy
//!
//! A remote data channel can start reporting state changes and messages
//! before its proxy exists, because the proxy is only built once the host
//! thread processes the peer connection's `DataChannel` notification. An
//! [`ObserverRelay`] is registered on the native channel the moment the
//! engine hands it out; it buffers notifications until the proxy attaches,
//! then replays them in order and forwards everything after.

use crate::context::Context;
use crate::engine::{DataBuffer, DataChannelObserver, DataState, NativeDataChannel};
use crate::key::HandleKey;
use crate::listener::Listener;
use crate::{Error, Result};
use hostloop_core::{Dispatcher, EventLoop, EventTarget, HostContext, LoopState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

/// Notifications from the native channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataChannelNotification {
    StateChange(DataState),
    Message(DataBuffer),
}

/// How binary messages are surfaced to host code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    #[default]
    ArrayBuffer,
    Blob,
}

/// Message payload as seen by host code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageData {
    Text(String),
    Binary(Vec<u8>),
}

impl MessageData {
    fn from_buffer(buffer: DataBuffer) -> Self {
        if buffer.binary {
            return MessageData::Binary(buffer.data);
        }
        match String::from_utf8(buffer.data) {
            Ok(text) => MessageData::Text(text),
            Err(invalid) => MessageData::Binary(invalid.into_bytes()),
        }
    }

    fn into_buffer(self) -> DataBuffer {
        match self {
            MessageData::Text(text) => DataBuffer::text(text),
            MessageData::Binary(data) => DataBuffer::binary(data),
        }
    }
}

impl From<&str> for MessageData {
    fn from(text: &str) -> Self {
        MessageData::Text(text.to_string())
    }
}

impl From<Vec<u8>> for MessageData {
    fn from(data: Vec<u8>) -> Self {
        MessageData::Binary(data)
    }
}

/// Events delivered to the host listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataChannelEvent {
    Open,
    Closing,
    Close,
    Message { data: MessageData },
}

// ============================================================================
// Observer relay
// ============================================================================

enum RelayState {
    Buffering(Vec<DataChannelNotification>),
    Attached(Dispatcher<DataChannel>),
    Detached,
}

/// Native observer that buffers until a proxy attaches
pub struct ObserverRelay {
    state: Mutex<RelayState>,
}

impl ObserverRelay {
    /// Register a fresh relay as `native`'s observer
    pub fn register(native: &Arc<dyn NativeDataChannel>) -> Arc<Self> {
        let relay = Arc::new(Self {
            state: Mutex::new(RelayState::Buffering(Vec::new())),
        });
        native.register_observer(Arc::clone(&relay) as Arc<dyn DataChannelObserver>);
        relay
    }

    /// Replay buffered notifications to `dispatcher` and forward the rest
    pub fn attach(&self, dispatcher: Dispatcher<DataChannel>) {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, RelayState::Attached(dispatcher.clone()));
        if let RelayState::Buffering(buffered) = previous {
            trace!(count = buffered.len(), "replaying buffered data channel notifications");
            for notification in buffered {
                dispatcher.notify(notification);
            }
        }
    }

    /// Stop forwarding; later notifications are discarded
    pub fn detach(&self) {
        *self.state.lock() = RelayState::Detached;
    }

    /// Number of notifications waiting for a proxy
    pub fn buffered(&self) -> usize {
        match &*self.state.lock() {
            RelayState::Buffering(buffered) => buffered.len(),
            _ => 0,
        }
    }

    fn forward(&self, notification: DataChannelNotification) {
        match &mut *self.state.lock() {
            RelayState::Buffering(buffered) => buffered.push(notification),
            RelayState::Attached(dispatcher) => {
                dispatcher.notify(notification);
            }
            RelayState::Detached => {}
        }
    }
}

impl DataChannelObserver for ObserverRelay {
    fn on_state_change(&self, state: DataState) {
        self.forward(DataChannelNotification::StateChange(state));
    }

    fn on_message(&self, buffer: DataBuffer) {
        self.forward(DataChannelNotification::Message(buffer));
    }
}

impl fmt::Debug for ObserverRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &*self.state.lock() {
            RelayState::Buffering(_) => "buffering",
            RelayState::Attached(_) => "attached",
            RelayState::Detached => "detached",
        };
        f.debug_struct("ObserverRelay").field("mode", &mode).finish()
    }
}

// ============================================================================
// Proxy
// ============================================================================

/// Constructor arguments for [`DataChannel`]
pub struct DataChannelArgs {
    pub host: HostContext,
    pub context: Rc<Context>,
    pub native: Arc<dyn NativeDataChannel>,
    pub relay: Arc<ObserverRelay>,
}

/// Properties fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub label: String,
    pub id: Option<u16>,
    pub ordered: bool,
    pub protocol: String,
    pub negotiated: bool,
    pub max_retransmits: Option<u16>,
    pub max_packet_life_time: Option<u16>,
}

impl ChannelInfo {
    fn read(native: &dyn NativeDataChannel) -> Self {
        Self {
            label: native.label(),
            id: native.id(),
            ordered: native.ordered(),
            protocol: native.protocol(),
            negotiated: native.negotiated(),
            max_retransmits: native.max_retransmits(),
            max_packet_life_time: native.max_packet_life_time(),
        }
    }
}

/// Host-visible data channel
pub struct DataChannel {
    events: EventLoop<DataChannel>,
    context: Rc<Context>,
    /// Held for the proxy's whole lifetime so its key stays unique while cached
    handle: Arc<dyn NativeDataChannel>,
    /// Cleared once the channel closes
    native: RefCell<Option<Arc<dyn NativeDataChannel>>>,
    relay: Arc<ObserverRelay>,
    info: ChannelInfo,
    ready_state: Cell<DataState>,
    cached_buffered_amount: Cell<u64>,
    binary_type: Cell<BinaryType>,
    listener: Listener<DataChannelEvent>,
}

impl DataChannel {
    /// Cache factory; see [`Context::data_channels`]
    pub fn create(args: DataChannelArgs, key: HandleKey) -> hostloop_core::Result<Rc<Self>> {
        let DataChannelArgs {
            host,
            context,
            native,
            relay,
        } = args;

        let info = ChannelInfo::read(native.as_ref());
        let ready_state = native.state();
        let channel = Rc::new_cyclic(|weak| Self {
            events: EventLoop::new(
                &host,
                format!("RTCDataChannel({})", info.label),
                weak.clone(),
                context.loop_config(),
            ),
            context: Rc::clone(&context),
            handle: Arc::clone(&native),
            native: RefCell::new(Some(native)),
            relay,
            info,
            ready_state: Cell::new(ready_state),
            cached_buffered_amount: Cell::new(0),
            binary_type: Cell::new(BinaryType::default()),
            listener: Listener::new(),
        });
        channel.events.retain_target(Rc::clone(&channel));
        channel.relay.attach(channel.events.dispatcher());
        debug_assert_eq!(channel.key(), key);
        debug!(label = %channel.info.label, ?key, "data channel proxy created");

        if ready_state == DataState::Closed {
            channel.cleanup_internals();
            channel.events.stop();
        }
        Ok(channel)
    }

    /// Install the host listener
    pub fn on_event(&self, callback: impl FnMut(&DataChannelEvent) + 'static) {
        self.listener.set(callback);
    }

    /// Send a message
    pub fn send(&self, data: impl Into<MessageData>) -> Result<()> {
        let native = self.native.borrow().clone();
        let Some(native) = native else {
            return Err(Error::InvalidState("RTCDataChannel is closed".to_string()));
        };
        if self.ready_state.get() != DataState::Open {
            return Err(Error::InvalidState(format!(
                "RTCDataChannel.readyState is '{}', not 'open'",
                self.ready_state.get()
            )));
        }
        native.send(&data.into().into_buffer())?;
        Ok(())
    }

    /// Begin closing the channel; the state change arrives asynchronously
    pub fn close(&self) {
        let native = self.native.borrow().clone();
        if let Some(native) = native {
            native.close();
        }
    }

    /// Called by the owning peer connection when it closes
    pub fn on_peer_connection_closed(&self) {
        if self.ready_state.get() == DataState::Closed {
            return;
        }
        self.ready_state.set(DataState::Closed);
        self.cleanup_internals();
        self.events.stop();
        self.listener.emit(&DataChannelEvent::Close);
    }

    pub fn label(&self) -> &str {
        &self.info.label
    }

    pub fn id(&self) -> Option<u16> {
        self.info.id
    }

    pub fn ordered(&self) -> bool {
        self.info.ordered
    }

    pub fn protocol(&self) -> &str {
        &self.info.protocol
    }

    pub fn negotiated(&self) -> bool {
        self.info.negotiated
    }

    pub fn max_retransmits(&self) -> Option<u16> {
        self.info.max_retransmits
    }

    pub fn max_packet_life_time(&self) -> Option<u16> {
        self.info.max_packet_life_time
    }

    /// Creation-time properties
    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    pub fn ready_state(&self) -> DataState {
        self.ready_state.get()
    }

    /// Bytes queued in the engine, or the last value seen before close
    pub fn buffered_amount(&self) -> u64 {
        match self.native.borrow().as_ref() {
            Some(native) => native.buffered_amount(),
            None => self.cached_buffered_amount.get(),
        }
    }

    pub fn binary_type(&self) -> BinaryType {
        self.binary_type.get()
    }

    pub fn set_binary_type(&self, binary_type: BinaryType) {
        self.binary_type.set(binary_type);
    }

    /// Identity key of the native channel
    pub fn key(&self) -> HandleKey {
        HandleKey::of(&self.handle)
    }


    /// Lifecycle of this proxy's event loop
    pub fn loop_state(&self) -> LoopState {
        self.events.state()
    }

    fn cleanup_internals(&self) {
        let native = self.native.borrow_mut().take();
        if let Some(native) = native {
            self.cached_buffered_amount.set(native.buffered_amount());
            native.unregister_observer();
        }
    }
}

impl EventTarget for DataChannel {
    type Notification = DataChannelNotification;

    fn handle(&self, _ctx: &HostContext, notification: DataChannelNotification) {
        match notification {
            DataChannelNotification::StateChange(state) => {
                self.ready_state.set(state);
                if state == DataState::Closed {
                    self.cleanup_internals();
                    self.events.stop();
                }
                let event = match state {
                    DataState::Connecting => None,
                    DataState::Open => Some(DataChannelEvent::Open),
                    DataState::Closing => Some(DataChannelEvent::Closing),
                    DataState::Closed => Some(DataChannelEvent::Close),
                };
                if let Some(event) = event {
                    self.listener.emit(&event);
                }
            }
            DataChannelNotification::Message(buffer) => {
                let data = MessageData::from_buffer(buffer);
                self.listener.emit(&DataChannelEvent::Message { data });
            }
        }
    }

    fn did_stop(&self, _ctx: &HostContext) {
        self.relay.detach();
        debug!(label = %self.info.label, "data channel loop stopped");
    }
}

impl Drop for DataChannel {
    fn drop(&mut self) {
        self.context.data_channels().release(self);
    }
}

impl fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("label", &self.info.label)
            .field("ready_state", &self.ready_state.get())
            .field("loop", &self.events.state())
            .finish()
    }
}
