//! # mqlink - embedded MQTT session engine
//!
//! A lightweight MQTT 3.1.1 client engine for devices that hold one
//! long-lived broker session: connect, subscribe a fixed topic set, keep the
//! link alive, and reconnect on any failure without involving the
//! application. The library is `no_std` by default and performs no heap
//! allocation; all buffers are fixed-capacity.
//!
//! ## Architecture
//!
//! One engine context owns the socket and runs the session state machine
//! ([`session::Engine`]). Other execution contexts never touch the socket:
//! they publish through [`session::Publisher`], which marshals each message
//! into a self-contained envelope and hands it to the engine over the
//! publish bridge ([`bridge::PublishBridge`]). The engine multiplexes the
//! broker socket and the bridge endpoint in a single blocking wait.
//!
//! The platform plugs in at three seams:
//! - [`transport::Transport`]: sockets and readiness multiplexing
//! - [`transport::Clock`]: monotonic time and delays
//! - [`codec::Codec`]: the wire format, with [`codec::V311Codec`] built in
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mqlink::{Config, Engine, QoS, SharedState, SubscriptionTable, V311Codec};
//!
//! let mut subscriptions = SubscriptionTable::new();
//! subscriptions.register("sensors/+/temp", TempHandler)?;
//!
//! static SHARED: SharedState = SharedState::new();
//! let config = Config {
//!     host: "broker.local",
//!     port: 1883,
//!     client_id: "device-42",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//! };
//! let mut engine = Engine::new(
//!     transport, bridge, V311Codec, clock, config, subscriptions, (), &SHARED,
//! );
//! let publisher = engine.publisher();
//! // ... hand `publisher` to producer contexts, then:
//! engine.run();
//! ```
//!
//! ## Optional Features
//!
//! - `std`: standard library support and [`session::start`] thread spawning
//! - `log`: route internal diagnostics through the `log` facade
//! - `defmt`: route internal diagnostics through `defmt` instead

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

pub mod bridge;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;
pub mod topic;
pub mod transport;

pub use codec::V311Codec;
pub use dispatch::{MessageHandler, SubscriptionTable};
pub use error::Error;
pub use message::{InboundMessage, QoS};
pub use session::{Config, Engine, EventHooks, Publisher, SharedState};
pub use transport::{Clock, Transport};
