use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use lumen_ai::{BackendClient, BackendConfig, MessageRole};
use lumen_session::{
    ChatController, ExchangeOutcome, ImagePayload, ImageResizer, SessionError, SubmitOutcome,
    Transcript,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::cli_args::Cli;
use crate::image_resize::JpegDownscaler;
use crate::terminal_renderer::TerminalRenderer;

const REPL_PROMPT: &str = "you> ";
const REPL_HELP: &str = "\
commands:
  /attach <path>   stage an image (raw, .b64 or data URL) for the next message
  /detach <n>      remove staged image n
  /pending         list staged images
  /history         show the transcript with entry numbers
  /delete <n>      delete entry n from the server memory
  /clear           clear the server memory for the active persona
  /personas        list personas
  /persona <id>    switch persona and load its history
  /help            show this help
  /exit, /quit     leave";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Message(String),
    Attach(PathBuf),
    Detach(usize),
    Pending,
    History,
    Delete(usize),
    Clear,
    Personas,
    Persona(String),
    Help,
    Exit,
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InteractiveLoopControl {
    Continue,
    Exit,
}

fn parse_entry_number(argument: &str) -> Option<usize> {
    argument.parse::<usize>().ok().filter(|number| *number > 0)
}

fn parse_repl_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    if matches!(trimmed, "exit" | "quit") {
        return ReplCommand::Exit;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ReplCommand::Message(trimmed.to_string());
    };
    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command, ""),
    };
    match (name, argument.is_empty()) {
        ("exit" | "quit", true) => ReplCommand::Exit,
        ("help", true) => ReplCommand::Help,
        ("pending", true) => ReplCommand::Pending,
        ("history", true) => ReplCommand::History,
        ("clear", true) => ReplCommand::Clear,
        ("personas", true) => ReplCommand::Personas,
        ("attach", false) => ReplCommand::Attach(PathBuf::from(argument)),
        ("persona", false) => ReplCommand::Persona(argument.to_string()),
        ("detach", _) => parse_entry_number(argument)
            .map(ReplCommand::Detach)
            .unwrap_or_else(|| ReplCommand::Invalid("usage: /detach <n>".to_string())),
        ("delete", _) => parse_entry_number(argument)
            .map(ReplCommand::Delete)
            .unwrap_or_else(|| ReplCommand::Invalid("usage: /delete <n>".to_string())),
        ("attach", true) => ReplCommand::Invalid("usage: /attach <path>".to_string()),
        ("persona", true) => ReplCommand::Invalid("usage: /persona <id>".to_string()),
        _ => ReplCommand::Invalid(format!("unknown command: /{name} (try /help)")),
    }
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let client = Arc::new(
        BackendClient::new(BackendConfig {
            api_base: cli.server_url.clone(),
            connect_timeout_ms: cli.connect_timeout_ms,
        })
        .context("failed to configure chat server client")?,
    );
    let mut controller = ChatController::new(client.clone(), client.clone(), client);
    let resizer = JpegDownscaler::new(cli.max_image_side, cli.image_quality);

    start_session(&mut controller, &cli).await?;
    for path in &cli.images {
        attach_image_file(&mut controller, &resizer, path).await?;
    }

    if let Some(message) = cli.message.as_deref() {
        return run_one_shot(&mut controller, message).await;
    }
    run_interactive(&mut controller, &resizer, cli.all_personas).await
}

async fn start_session(controller: &mut ChatController, cli: &Cli) -> Result<()> {
    match (cli.persona.as_deref(), cli.skip_history) {
        (Some(persona_id), true) => {
            let persona = controller
                .select_persona(persona_id)
                .await
                .map_err(session_failure)?;
            println!("persona: {} ({})", persona.name, persona.id);
        }
        (Some(persona_id), false) => {
            let persona = controller
                .switch_persona(persona_id)
                .await
                .map_err(session_failure)?;
            println!("persona: {} ({})", persona.name, persona.id);
            print_transcript(controller.transcript());
        }
        (None, false) => {
            controller.load_history().await.map_err(session_failure)?;
            print_transcript(controller.transcript());
        }
        (None, true) => {}
    }
    Ok(())
}

fn session_failure(error: SessionError) -> anyhow::Error {
    anyhow::anyhow!(error.user_message())
}

async fn read_image_file(path: &Path) -> Result<ImagePayload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))?;
    if bytes.is_empty() {
        bail!("image {} is empty", path.display());
    }
    if !holds_base64_text(path, &bytes) {
        return Ok(ImagePayload::from_bytes(bytes));
    }
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("image {} is not valid base64 text", path.display()))?;
    let payload = ImagePayload::from_base64(text)
        .with_context(|| format!("failed to decode base64 image {}", path.display()))?;
    if payload.is_empty() {
        bail!("image {} decodes to no bytes", path.display());
    }
    Ok(payload)
}

/// `.b64` files and data URLs carry base64 text instead of raw image bytes.
fn holds_base64_text(path: &Path, bytes: &[u8]) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("b64"))
        || bytes.trim_ascii_start().starts_with(b"data:")
}

async fn attach_image_file(
    controller: &mut ChatController,
    resizer: &dyn ImageResizer,
    path: &Path,
) -> Result<usize> {
    let payload = read_image_file(path).await?;
    let index = controller
        .composer_mut()
        .attach_resized(resizer, payload)
        .await;
    debug!(path = %path.display(), index, "staged image");
    Ok(index)
}

async fn submit_and_render(controller: &mut ChatController, text: &str) -> Result<Option<bool>> {
    let mut renderer = TerminalRenderer::new(std::io::stdout());
    let outcome = controller.submit(text, &mut renderer).await;
    if let Some(error) = renderer.take_error() {
        return Err(error).context("failed to write response to stdout");
    }
    match outcome {
        Ok(SubmitOutcome::Skipped) => Ok(None),
        Ok(SubmitOutcome::Exchanged(report)) => {
            if report.outcome.truncated {
                eprintln!("[truncated] the connection dropped before the reply finished");
            }
            Ok(Some(exchange_succeeded(&report.outcome)))
        }
        Err(error) => {
            eprintln!("error: {}", error.user_message());
            Ok(Some(false))
        }
    }
}

/// A reply cut short by the transport counts as a failed exchange.
fn exchange_succeeded(outcome: &ExchangeOutcome) -> bool {
    !outcome.summary.is_error && !outcome.truncated
}

async fn run_one_shot(controller: &mut ChatController, message: &str) -> Result<()> {
    match submit_and_render(controller, message).await? {
        None => bail!("nothing to send: pass a non-empty --message or at least one --image"),
        Some(false) => bail!("the exchange did not complete successfully"),
        Some(true) => Ok(()),
    }
}

async fn run_interactive(
    controller: &mut ChatController,
    resizer: &dyn ImageResizer,
    all_personas: bool,
) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("{REPL_PROMPT}");
        std::io::stdout()
            .flush()
            .context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match dispatch_interactive_line(controller, resizer, all_personas, &line).await? {
            InteractiveLoopControl::Continue => continue,
            InteractiveLoopControl::Exit => break,
        }
    }

    Ok(())
}

async fn dispatch_interactive_line(
    controller: &mut ChatController,
    resizer: &dyn ImageResizer,
    all_personas: bool,
    line: &str,
) -> Result<InteractiveLoopControl> {
    let result = match parse_repl_command(line) {
        ReplCommand::Exit => return Ok(InteractiveLoopControl::Exit),
        ReplCommand::Help => {
            println!("{REPL_HELP}");
            Ok(())
        }
        ReplCommand::Invalid(message) => {
            eprintln!("{message}");
            Ok(())
        }
        ReplCommand::Message(text) => {
            submit_and_render(controller, &text).await?;
            Ok(())
        }
        ReplCommand::Attach(path) => match attach_image_file(controller, resizer, &path).await {
            Ok(index) => {
                println!("staged image {} from {}", index + 1, path.display());
                Ok(())
            }
            Err(error) => {
                eprintln!("error: {error:#}");
                Ok(())
            }
        },
        ReplCommand::Detach(number) => {
            match controller.composer_mut().remove(number - 1) {
                Some(_) => println!("removed staged image {number}"),
                None => eprintln!("no staged image {number}"),
            }
            Ok(())
        }
        ReplCommand::Pending => {
            print_pending(controller.composer().pending());
            Ok(())
        }
        ReplCommand::History => {
            print_transcript(controller.transcript());
            Ok(())
        }
        ReplCommand::Delete(number) => delete_entry(controller, number).await,
        ReplCommand::Clear => controller.clear().await.map(|()| {
            println!("memory cleared");
        }),
        ReplCommand::Personas => controller
            .personas(!all_personas)
            .await
            .map(|listing| {
                for persona in &listing.personas {
                    let marker = if listing.default.as_deref() == Some(persona.id.as_str()) {
                        " (default)"
                    } else {
                        ""
                    };
                    let active = if controller.persona_id() == Some(persona.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{active} {} - {}{marker}", persona.id, persona.name);
                }
            }),
        ReplCommand::Persona(persona_id) => {
            controller
                .switch_persona(&persona_id)
                .await
                .map(|persona| {
                    println!("persona: {} ({})", persona.name, persona.id);
                    print_transcript(controller.transcript());
                })
        }
    };
    if let Err(error) = result {
        eprintln!("error: {}", error.user_message());
    }
    Ok(InteractiveLoopControl::Continue)
}

async fn delete_entry(controller: &mut ChatController, number: usize) -> Result<(), SessionError> {
    let Some(entry) = controller.transcript().entries().get(number - 1) else {
        eprintln!("no transcript entry {number}");
        return Ok(());
    };
    let id = entry.id();
    controller.delete(id).await?;
    println!("deleted entry {number}");
    Ok(())
}

fn print_pending(pending: &[ImagePayload]) {
    if pending.is_empty() {
        println!("no staged images");
        return;
    }
    for (index, payload) in pending.iter().enumerate() {
        println!("{}: {} bytes", index + 1, payload.len());
    }
}

fn render_transcript(transcript: &Transcript) -> String {
    let mut lines = Vec::with_capacity(transcript.len());
    for (index, record) in transcript.entries().iter().enumerate() {
        let speaker = match record.role {
            MessageRole::User => "you",
            MessageRole::Assistant => "lumen",
        };
        let mut flags = String::new();
        if !record.is_deletable() {
            flags.push_str(" [unsaved]");
        }
        if record.is_error {
            flags.push_str(" [error]");
        }
        if !record.attachments.is_empty() {
            flags.push_str(&format!(" [{} image(s)]", record.attachments.len()));
        }
        lines.push(format!("{:>3} {speaker}{flags}: {}", index + 1, record.text));
    }
    lines.join("\n")
}

fn print_transcript(transcript: &Transcript) {
    if transcript.is_empty() {
        return;
    }
    println!("{}", render_transcript(transcript));
}
