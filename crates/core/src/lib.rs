//! Hostloop core
//!
//! Building blocks for exposing a multi-threaded native engine to a
//! single-threaded host:
//!
//! - [`handle`]: [`RefPtr`], the counted handle over host-visible proxies
//! - [`bidi_map`]: the bijective map backing the identity caches
//! - [`wrap`]: [`Wrap`] and [`OwnedWrap`], one proxy per native handle
//! - [`event`], [`queue`], [`event_loop`]: cross-thread event delivery to
//!   the designated thread with an orderly stop
//! - [`host`]: the designated thread and its wakeup primitive
//!
//! # Example
//!
//! ```
//! use hostloop_core::{Event, EventLoop, EventTarget, HostConfig, HostContext, HostThread};
//! use std::rc::Rc;
//!
//! struct Counter {
//!     events: EventLoop<Counter>,
//! }
//!
//! impl EventTarget for Counter {
//!     type Notification = u32;
//!     fn handle(&self, _ctx: &HostContext, value: u32) {
//!         println!("got {}", value);
//!     }
//! }
//!
//! let host = HostThread::spawn(&HostConfig::default()).unwrap();
//! let dispatcher = host
//!     .handle()
//!     .call(|ctx| {
//!         let counter = Rc::new_cyclic(|weak| Counter {
//!             events: EventLoop::new(ctx, "counter", weak.clone(), &Default::default()),
//!         });
//!         counter.events.retain_target(Rc::clone(&counter));
//!         counter.events.dispatcher()
//!     })
//!     .unwrap();
//!
//! std::thread::spawn(move || {
//!     dispatcher.dispatch(Event::notify(1));
//!     dispatcher.stop();
//! })
//! .join()
//! .unwrap();
//! host.shutdown().unwrap();
//! ```

pub mod bidi_map;
pub mod config;
pub mod error;
pub mod event;
pub mod event_loop;
pub mod handle;
pub mod host;
pub mod logging;
pub mod queue;
pub mod wrap;

pub use bidi_map::{BidiMap, Identity, ProxyId};
pub use config::{HostConfig, LogConfig, LoopConfig};
pub use error::{Error, Result};
pub use event::{Event, EventTarget};
pub use event_loop::{Dispatcher, EventLoop, LoopState};
pub use handle::{HostRefCount, RefCounted, RefPtr};
pub use host::{AsyncWakeup, HostContext, HostHandle, HostThread, WakeupId};
pub use queue::EventQueue;
pub use wrap::{Factory, OwnedWrap, Wrap};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
