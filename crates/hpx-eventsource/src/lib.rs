//! # hpx-eventsource
//!
//! Reconnecting Server-Sent Events client.
//!
//! An [`EventSource`] keeps one long-lived streaming request open, parses the
//! `text/event-stream` body into [`Event`]s, hands them to registered
//! observers and reconnects after failures, replaying the last seen event id
//! in a `Last-Event-ID` header.
//!
//! ## Features
//!
//! - **Incremental parsing**: chunk boundaries need not line up with event
//!   boundaries; blocks end with `LF LF`, `CR CR` or `CR LF CR LF`.
//! - **Typed observers**: one slot each for open, message, close and error
//!   events, plus any number of observers per event name.
//! - **Reconnection**: a single retry timer per connection, using the
//!   server-adjustable `retry` interval (3 seconds by default).
//! - **Pluggable transport**: the core only talks to the [`Transport`]
//!   trait. [`HttpTransport`](transport::HttpTransport) (feature `http-transport`, on by
//!   default) implements it with `reqwest`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use hpx_eventsource::{EventSource, EventSourceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EventSourceConfig::new("https://api.example.com/stream")
//!         .retry_interval(Duration::from_secs(5));
//!
//!     let source = EventSource::new(config)?;
//!     source.on_open(|_| println!("connected"));
//!     source.on_message(|event| println!("{}: {:?}", event.event_type(), event.data()));
//!     source.open();
//!
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     source.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Index
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | [`EventSourceConfig`] builder |
//! | `connection` | [`EventSource`] state machine |
//! | [`dispatch`] | [`HandlerRegistry`](dispatch::HandlerRegistry) and observer types |
//! | [`parse`] | [`StreamParser`](parse::StreamParser) |
//! | [`transport`] | [`Transport`] contract and the HTTP adapter |

mod config;
mod connection;
pub mod dispatch;
pub mod error;
mod event;
pub mod parse;
mod reconnect;
pub mod transport;

pub use config::{DEFAULT_RETRY_INTERVAL, EventSourceConfig};
pub use connection::EventSource;
pub use dispatch::EventHandler;
pub use error::{DecodeError, EventSourceError, EventSourceResult, TransportError};
pub use event::{ConnectionState, Event, EventKind};
pub use transport::{StreamHandle, StreamRequest, StreamSink, Transport};
