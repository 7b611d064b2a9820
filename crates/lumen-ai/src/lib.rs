//! Wire protocol and HTTP backend client for the lumen chat server.
mod client;
mod event;
mod frame;
mod request_id;
mod types;

pub use client::{BackendClient, BackendConfig};
pub use event::{
    classify, is_truthy, DoneEvent, GeneratedImage, StreamEvent, WireImageResult, WireRecord,
};
pub use frame::{Frame, FrameDecoder, DATA_PREFIX};
pub use types::{
    ByteStream, ChatStreamRequest, ChatTransport, LumenAiError, MemoryEntry, MemoryStore,
    MessageId, MessageRole, PersonaDirectory, PersonaListing, PersonaSummary,
};
