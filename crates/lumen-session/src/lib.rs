//! Client-side chat state: the streaming session state machine, the
//! transcript with server reconciliation, the composer and the controller
//! that drives one exchange at a time.
mod composer;
mod controller;
mod error;
mod exchange;
mod render;
mod session;
mod transcript;

pub use composer::{Composer, ImagePayload, ImageResizer, Submission};
pub use controller::{ChatController, ExchangeReport, SubmitOutcome};
pub use error::SessionError;
pub use exchange::{run_exchange, ExchangeOutcome};
pub use render::{MarkupRenderer, RenderInstruction, Renderer};
pub use session::{SessionPhase, SessionSummary, StreamSession, ThinkingRegion, SEARCHING_MARKER};
pub use transcript::{EntryId, MessageRecord, Transcript};
