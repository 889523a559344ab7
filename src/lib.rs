//! Redis-backed session storage with optimistic mutual exclusion.
//!
//! A session is a Redis hash keyed `sess_<id>` (configurable prefix) with
//! fields `data|lock|pid|wait|writes|req`. [`SessionHandler::read`] runs a
//! counter-based lock acquisition loop before fetching the payload;
//! [`SessionHandler::write`] re-verifies ownership before committing.
//! See [`lock`] for the acquisition protocol and [`codec`] for the
//! self-describing compression format.

pub mod bot;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod handler;
pub mod lifetime;
pub mod lock;
pub mod pid;

pub use bot::BotOverride;
pub use config::{CompressionLibrary, SentinelConfig, SessionConfig};
pub use context::RequestContext;
pub use error::SessionError;
pub use handler::SessionHandler;
