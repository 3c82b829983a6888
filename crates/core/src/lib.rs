//! AvatarChat Core - typed data bus, session dispatcher and avatar renderer
//!
//! This crate hosts the in-process runtime of a conversational avatar:
//! independent handlers (voice activity, recognition, language model,
//! speech synthesis, avatar rendering) exchange typed data within a
//! session, and the avatar handler renders paced audio and video frames.
//!
//! # Architecture
//!
//! - [`data`]: schema-checked containers ([`DataBundle`]) and the
//!   [`ChatData`] envelope routed between handlers
//! - [`handler`]: the [`Handler`] contract, registry and loading
//! - [`session`]: [`ChatSession`], one thread per handler plus an
//!   ingestion thread, and the priority/consume-mode routing table
//! - [`engine`]: [`ChatEngine`], loaded handlers and live sessions
//! - `avatar` (feature `avatar`): the three-stage render pipeline
//!
//! # Example
//!
//! ```ignore
//! use avatarchat_core::config::ServiceConfig;
//! use avatarchat_core::engine::ChatEngine;
//! use avatarchat_core::handler::HandlerRegistry;
//! use avatarchat_core::session::{InputData, SessionInfo, SessionIo};
//!
//! fn main() -> avatarchat_core::Result<()> {
//!     let config = ServiceConfig::from_file("config/chat.yaml")?;
//!     avatarchat_core::logging::init(&config.logger);
//!
//!     let registry = HandlerRegistry::with_builtin()?;
//!     let engine = ChatEngine::new(config.chat_engine.clone(), &registry)?;
//!     let io = SessionIo::for_config(engine.config());
//!     let session = engine.create_session(SessionInfo::new(""), io.clone())?;
//!     session.start()?;
//!     io.send_input(InputData::text("hello"))?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod engine;
mod error;
pub mod handler;
pub mod logging;
pub mod session;
pub mod utils;

#[cfg(feature = "avatar")]
pub mod avatar;

pub use config::{EngineConfig, HandlerConfig, ServiceConfig};
pub use data::{ChatData, ChatDataType, DataBundle, DataBundleDefinition, DataBundleEntry};
pub use engine::ChatEngine;
pub use error::{Error, Result};
pub use handler::{Handler, HandlerRegistry, HandlerResult};
pub use session::{ChatSession, SessionInfo, SessionIo};

#[doc(hidden)]
pub use inventory;
