//! Drives one request/response exchange end to end.

use futures_util::StreamExt;
use lumen_ai::{
    classify, ChatStreamRequest, ChatTransport, Frame, FrameDecoder, LumenAiError, StreamEvent,
};
use tracing::{debug, info, warn};

use crate::{
    render::{MarkupRenderer, RenderInstruction, Renderer},
    session::{SessionSummary, StreamSession},
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Result of an exchange that reached the streaming stage.
pub struct ExchangeOutcome {
    pub summary: SessionSummary,
    pub frames: usize,
    pub malformed_records: usize,
    /// The transport failed after streaming began; the session was settled
    /// with whatever had arrived.
    pub truncated: bool,
}

#[derive(Debug, Default)]
struct DispatchStats {
    frames: usize,
    malformed_records: usize,
}

/// Opens the stream and feeds every record through a fresh
/// [`StreamSession`], applying each instruction to `renderer` in arrival
/// order.
///
/// Failing to open the stream returns the error before any session exists.
/// After that nothing aborts the exchange: malformed records are logged and
/// skipped, a read failure ends the stream early, and the session is always
/// settled. When a markup renderer is supplied, the settled text goes
/// through it exactly once.
pub async fn run_exchange<R>(
    transport: &dyn ChatTransport,
    request: &ChatStreamRequest,
    renderer: &mut R,
    markup: Option<&dyn MarkupRenderer>,
) -> Result<ExchangeOutcome, LumenAiError>
where
    R: Renderer + ?Sized,
{
    let mut stream = transport.open_stream(request).await?;
    info!(images = request.images.len(), "chat exchange started");

    let mut session = StreamSession::new();
    let mut decoder = FrameDecoder::new();
    let mut stats = DispatchStats::default();
    let mut truncated = false;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                warn!(%error, "chat stream read failed; settling with partial response");
                truncated = true;
                break;
            }
        };
        for frame in decoder.push(&chunk) {
            dispatch_frame(&frame, &mut session, renderer, &mut stats).await;
        }
    }
    if let Some(frame) = decoder.finish() {
        debug!("decoding unterminated trailing frame");
        dispatch_frame(&frame, &mut session, renderer, &mut stats).await;
    }

    for instruction in session.finish() {
        renderer.apply(&instruction);
    }
    if let Some(markup) = markup {
        renderer.apply(&RenderInstruction::RenderMarkup(
            markup.render(session.accumulated_text()),
        ));
    }

    info!(
        frames = stats.frames,
        malformed = stats.malformed_records,
        error = session.is_error(),
        "chat exchange finished"
    );
    Ok(ExchangeOutcome {
        summary: session.into_summary(),
        frames: stats.frames,
        malformed_records: stats.malformed_records,
        truncated,
    })
}

async fn dispatch_frame<R>(
    frame: &Frame,
    session: &mut StreamSession,
    renderer: &mut R,
    stats: &mut DispatchStats,
) where
    R: Renderer + ?Sized,
{
    stats.frames += 1;
    for record in frame.records() {
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                stats.malformed_records += 1;
                warn!(%error, "skipping malformed stream record");
                continue;
            }
        };
        let Some(event) = classify(record) else {
            debug!("ignoring stream record with no recognised field");
            continue;
        };

        let is_thinking = matches!(event, StreamEvent::Thinking { .. });
        for instruction in session.apply(event) {
            renderer.apply(&instruction);
        }
        if is_thinking {
            // Let the renderer catch up between bursts of small deltas.
            tokio::task::yield_now().await;
        }
    }
}
