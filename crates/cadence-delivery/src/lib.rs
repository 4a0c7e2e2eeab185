//! Incremental response delivery for Cadence.
//!
//! Turns a submitted user message into an assistant reply that grows on
//! screen, either replayed from a pre-authored script while offline or
//! streamed live from the chat backend.

pub mod assembler;
pub mod error;
pub mod frame;
pub mod mode;
pub mod orchestrator;
pub mod replay;
pub mod state;
pub mod store;
pub mod transport;

pub use assembler::{AssemblyOutcome, DeliverySession, Notification, ResponseAssembler};
pub use error::DeliveryError;
pub use frame::ChunkFrameParser;
pub use mode::{ModeFlag, ModeSource};
pub use orchestrator::{DeliveryHandle, DeliveryOrchestrator, DeliveryOutcome, Route};
pub use replay::{ReplayOutcome, ReplayScheduler, ReplayScript, ScenarioCatalog, ScenarioScripts};
pub use state::{DeliveryState, DeliveryTracker};
pub use store::{ChannelSink, Conversation, DeliveryTicket, NullSink, UpdateSink};
pub use transport::{
    DeliveryRequest, FrameStream, HeaderProvider, HttpTransport, LiveTransport, StaticHeaders,
    TransportError,
};
