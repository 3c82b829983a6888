//! Typed data containers and the envelope routed between handlers
//!
//! - [`DataBundleDefinition`]: schema of named, shaped entries
//! - [`DataBundle`]: payload validated against a locked definition
//! - [`ChatData`]: envelope carrying a bundle between handlers

pub mod bundle;
pub mod chat_data;
pub mod definition;
pub mod event;
pub mod store;

pub use bundle::DataBundle;
pub use chat_data::{ChatData, ChatDataType, EngineChannelType, Timestamp};
pub use definition::{DataBundleDefinition, DataBundleEntry, ShapeDim, TimeUnit, VariableSize};
pub use event::{EventData, EventPayloadType, EventType};
pub use store::{DataArray, DataStore, DataValue};
