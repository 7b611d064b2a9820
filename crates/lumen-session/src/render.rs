use lumen_ai::GeneratedImage;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Display side effect produced by the stream session. A rendering surface
/// applies these in order; the session itself never touches a display.
pub enum RenderInstruction {
    /// Append text to the thinking region.
    AppendThinking(String),
    /// The first response token arrived; fold the thinking region away.
    CollapseThinking,
    /// Nothing was thought; remove the thinking region entirely.
    HideThinking,
    /// Replace the response region content and make it visible.
    ResetResponse(String),
    AppendResponse(String),
    /// Flag the response as an error. The text stays visible.
    MarkError(Option<String>),
    ShowSources(Vec<String>),
    ShowGeneratedImage(GeneratedImage),
    /// The server is still generating an image for this reply.
    ImagePending,
    /// The session reached its terminal phase with this settled text.
    Finished { text: String },
    /// Settled text after one pass through the markup renderer.
    RenderMarkup(String),
}

/// Rendering surface for one exchange.
pub trait Renderer {
    fn apply(&mut self, instruction: &RenderInstruction);
}

impl Renderer for Vec<RenderInstruction> {
    fn apply(&mut self, instruction: &RenderInstruction) {
        self.push(instruction.clone());
    }
}

/// Text-to-display-markup conversion. It runs once per exchange, after the
/// stream has settled.
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, text: &str) -> String;
}

impl<F> MarkupRenderer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn render(&self, text: &str) -> String {
        self(text)
    }
}
