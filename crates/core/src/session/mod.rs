//! Session dispatcher, routing and per-session shared state

pub mod chat_session;
pub mod clock;
pub mod context;
pub mod io;
pub mod router;
pub mod shared_states;

pub use chat_session::{pack_input, ChatSession, SessionState, POLL_INTERVAL};
pub use clock::{SessionClock, TIMESTAMP_BASE};
pub use context::{SessionContext, SessionInfo};
pub use io::{InputData, SessionIo};
pub use router::{pack_result, DataSink, DataSubmitter, Dispatcher, RoutingTable};
pub use shared_states::SharedStates;
