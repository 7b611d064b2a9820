//! State machine for one streamed exchange.
//!
//! `StreamSession` consumes classified stream events and returns the render
//! instructions each one implies. It owns no display and performs no I/O, so
//! every transition is testable with plain values.

use lumen_ai::{DoneEvent, GeneratedImage, MessageId, StreamEvent};
use tracing::trace;

use crate::render::RenderInstruction;

/// Line appended to the thinking region when the server starts a sub-task.
pub const SEARCHING_MARKER: &str = "Searching the web...\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `SessionPhase` values.
pub enum SessionPhase {
    ThinkingVisible,
    Responding,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How the thinking region is currently shown.
pub enum ThinkingRegion {
    Expanded,
    Collapsed,
    Hidden,
}

#[derive(Debug, Clone)]
pub struct StreamSession {
    phase: SessionPhase,
    accumulated_text: String,
    thinking_text: String,
    saw_any_thinking: bool,
    responded: bool,
    is_error: bool,
    error_detail: Option<String>,
    sources: Vec<String>,
    generated_image: Option<GeneratedImage>,
    image_pending: bool,
    user_timestamp: Option<MessageId>,
    assistant_timestamp: Option<MessageId>,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::ThinkingVisible,
            accumulated_text: String::new(),
            thinking_text: String::new(),
            saw_any_thinking: false,
            responded: false,
            is_error: false,
            error_detail: None,
            sources: Vec::new(),
            generated_image: None,
            image_pending: false,
            user_timestamp: None,
            assistant_timestamp: None,
        }
    }

    pub fn apply(&mut self, event: StreamEvent) -> Vec<RenderInstruction> {
        match event {
            StreamEvent::Searching => self.on_thinking(SEARCHING_MARKER.to_string()),
            StreamEvent::Thinking { delta } => self.on_thinking(delta),
            StreamEvent::Token { text } => self.on_token(text),
            StreamEvent::Done(done) => self.on_done(done),
        }
    }

    /// Drives the session to `Finished` when the transport ends. A session
    /// that already saw `done` returns nothing.
    pub fn finish(&mut self) -> Vec<RenderInstruction> {
        if self.phase == SessionPhase::Finished {
            return Vec::new();
        }
        self.phase = SessionPhase::Finished;
        self.settle()
    }

    fn on_thinking(&mut self, delta: String) -> Vec<RenderInstruction> {
        if self.phase != SessionPhase::ThinkingVisible {
            trace!(phase = ?self.phase, "dropping thinking delta outside thinking phase");
            return Vec::new();
        }
        self.saw_any_thinking = true;
        if delta.is_empty() {
            return Vec::new();
        }
        self.thinking_text.push_str(&delta);
        vec![RenderInstruction::AppendThinking(delta)]
    }

    fn on_token(&mut self, text: String) -> Vec<RenderInstruction> {
        match self.phase {
            SessionPhase::ThinkingVisible => {
                // The first token replaces rather than appends: the server may
                // open with a complete prefix of the reply.
                self.phase = SessionPhase::Responding;
                self.responded = true;
                self.accumulated_text = text.clone();
                vec![
                    RenderInstruction::CollapseThinking,
                    RenderInstruction::ResetResponse(text),
                ]
            }
            SessionPhase::Responding => {
                self.accumulated_text.push_str(&text);
                vec![RenderInstruction::AppendResponse(text)]
            }
            SessionPhase::Finished => {
                trace!("dropping token after session finished");
                Vec::new()
            }
        }
    }

    fn on_done(&mut self, done: DoneEvent) -> Vec<RenderInstruction> {
        if self.phase == SessionPhase::Finished {
            // Text is frozen once finished; only fill identifiers still missing.
            if self.user_timestamp.is_none() {
                self.user_timestamp = done.user_timestamp;
            }
            if self.assistant_timestamp.is_none() {
                self.assistant_timestamp = done.assistant_timestamp;
            }
            return Vec::new();
        }

        self.phase = SessionPhase::Finished;
        let mut instructions = Vec::new();

        if let Some(final_text) = done.final_text {
            self.accumulated_text = final_text;
            instructions.push(RenderInstruction::ResetResponse(
                self.accumulated_text.clone(),
            ));
        }
        if done.error {
            self.is_error = true;
            self.error_detail = done.error_detail;
            instructions.push(RenderInstruction::MarkError(self.error_detail.clone()));
        }
        if let Some(sources) = done.sources {
            self.sources = sources;
            if !self.sources.is_empty() {
                instructions.push(RenderInstruction::ShowSources(self.sources.clone()));
            }
        }
        if let Some(image) = done.image_result {
            instructions.push(RenderInstruction::ShowGeneratedImage(image.clone()));
            self.generated_image = Some(image);
        }
        if done.image_pending {
            self.image_pending = true;
            instructions.push(RenderInstruction::ImagePending);
        }
        self.user_timestamp = done.user_timestamp;
        self.assistant_timestamp = done.assistant_timestamp;

        instructions.extend(self.settle());
        instructions
    }

    fn settle(&self) -> Vec<RenderInstruction> {
        let mut instructions = Vec::new();
        if !self.saw_any_thinking {
            instructions.push(RenderInstruction::HideThinking);
        }
        instructions.push(RenderInstruction::Finished {
            text: self.accumulated_text.clone(),
        });
        instructions
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn thinking_text(&self) -> &str {
        &self.thinking_text
    }

    pub fn saw_any_thinking(&self) -> bool {
        self.saw_any_thinking
    }

    pub fn thinking_region(&self) -> ThinkingRegion {
        match self.phase {
            SessionPhase::ThinkingVisible => ThinkingRegion::Expanded,
            SessionPhase::Responding => ThinkingRegion::Collapsed,
            SessionPhase::Finished if !self.saw_any_thinking => ThinkingRegion::Hidden,
            SessionPhase::Finished if self.responded => ThinkingRegion::Collapsed,
            SessionPhase::Finished => ThinkingRegion::Expanded,
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn generated_image(&self) -> Option<&GeneratedImage> {
        self.generated_image.as_ref()
    }

    pub fn image_pending(&self) -> bool {
        self.image_pending
    }

    pub fn user_timestamp(&self) -> Option<&MessageId> {
        self.user_timestamp.as_ref()
    }

    pub fn assistant_timestamp(&self) -> Option<&MessageId> {
        self.assistant_timestamp.as_ref()
    }

    pub fn into_summary(self) -> SessionSummary {
        let thinking_visible = self.saw_any_thinking;
        SessionSummary {
            text: self.accumulated_text,
            thinking: self.thinking_text,
            thinking_visible,
            is_error: self.is_error,
            error_detail: self.error_detail,
            sources: self.sources,
            generated_image: self.generated_image,
            image_pending: self.image_pending,
            user_timestamp: self.user_timestamp,
            assistant_timestamp: self.assistant_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Settled state of a finished session.
pub struct SessionSummary {
    pub text: String,
    pub thinking: String,
    pub thinking_visible: bool,
    pub is_error: bool,
    pub error_detail: Option<String>,
    pub sources: Vec<String>,
    pub generated_image: Option<GeneratedImage>,
    pub image_pending: bool,
    pub user_timestamp: Option<MessageId>,
    pub assistant_timestamp: Option<MessageId>,
}
