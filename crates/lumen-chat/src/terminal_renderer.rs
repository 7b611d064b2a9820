use std::io::{self, Write};

use lumen_ai::GeneratedImage;
use lumen_session::{RenderInstruction, Renderer};

const THINKING_LABEL: &str = "thinking> ";
const RESPONSE_LABEL: &str = "lumen> ";

/// Writes render instructions to a line-oriented terminal.
///
/// Terminal output cannot be taken back, so a collapse closes the thinking
/// line and a response reset only rewrites what differs from the text
/// already printed.
pub(crate) struct TerminalRenderer<W: Write> {
    out: W,
    thinking_open: bool,
    response_open: bool,
    printed: String,
    write_error: Option<io::Error>,
}

impl<W: Write> TerminalRenderer<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            thinking_open: false,
            response_open: false,
            printed: String::new(),
            write_error: None,
        }
    }

    /// First write failure since the last call, if any.
    pub(crate) fn take_error(&mut self) -> Option<io::Error> {
        self.write_error.take()
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if self.write_error.is_some() {
            return;
        }
        if let Err(error) = self.out.write_all(text.as_bytes()) {
            self.write_error = Some(error);
        }
    }

    fn end_line(&mut self) {
        if self.thinking_open || self.response_open {
            self.write("\n");
        }
        self.thinking_open = false;
        self.response_open = false;
    }

    fn open_response(&mut self) {
        if self.thinking_open {
            self.end_line();
        }
        if !self.response_open {
            self.write(RESPONSE_LABEL);
            self.response_open = true;
        }
    }

    fn replace_response(&mut self, text: &str) {
        if let Some(suffix) = text.strip_prefix(self.printed.as_str()) {
            self.open_response();
            self.write(suffix);
        } else {
            self.end_line();
            self.write("[revised]\n");
            self.open_response();
            self.write(text);
        }
        self.printed = text.to_string();
    }

    fn write_notice(&mut self, notice: &str) {
        self.end_line();
        self.write(notice);
        self.write("\n");
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn apply(&mut self, instruction: &RenderInstruction) {
        match instruction {
            RenderInstruction::AppendThinking(delta) => {
                if !self.thinking_open {
                    self.end_line();
                    self.write(THINKING_LABEL);
                    self.thinking_open = true;
                }
                self.write(delta);
            }
            RenderInstruction::CollapseThinking => {
                if self.thinking_open {
                    self.end_line();
                }
            }
            RenderInstruction::HideThinking => {}
            RenderInstruction::ResetResponse(text) => self.replace_response(text),
            RenderInstruction::AppendResponse(delta) => {
                self.open_response();
                self.write(delta);
                self.printed.push_str(delta);
            }
            RenderInstruction::MarkError(detail) => {
                let notice = match detail {
                    Some(detail) => format!("[error] {detail}"),
                    None => "[error] the server reported an error".to_string(),
                };
                self.write_notice(&notice);
            }
            RenderInstruction::ShowSources(sources) => {
                self.end_line();
                self.write("sources:\n");
                for source in sources {
                    self.write(&format!("  - {source}\n"));
                }
            }
            RenderInstruction::ShowGeneratedImage(GeneratedImage::Path(path)) => {
                self.write_notice(&format!("[image] {path}"));
            }
            RenderInstruction::ShowGeneratedImage(GeneratedImage::Inline(encoded)) => {
                self.write_notice(&format!("[image] inline, {} base64 bytes", encoded.len()));
            }
            RenderInstruction::ImagePending => {
                self.write_notice("[image] still generating in the background");
            }
            RenderInstruction::Finished { .. } => {
                self.end_line();
                self.printed.clear();
            }
            RenderInstruction::RenderMarkup(markup) => {
                self.end_line();
                self.write(markup);
                self.write("\n");
            }
        }
        if let Err(error) = self.out.flush() {
            self.write_error.get_or_insert(error);
        }
    }
}
