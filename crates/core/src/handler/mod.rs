//! Handler contract, registry and loading

pub mod context;
pub mod contract;
pub mod manager;
pub mod registration_macros;
pub mod registry;

pub use context::HandlerContext;
pub use contract::{
    ConsumeMode, DataInfoMap, Handler, HandlerDataInfo, HandlerDetail, HandlerInfo,
    HandlerOutput, HandlerResult, HandlerState,
};
pub use manager::{HandlerManager, LoadedHandler};
pub use registry::{HandlerFactory, HandlerRegistration, HandlerRegistry};
