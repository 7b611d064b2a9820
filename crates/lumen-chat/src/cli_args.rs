use std::path::PathBuf;

use clap::{ArgAction, Parser};

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_quality_percent(value: &str) -> Result<u8, String> {
    let parsed = value
        .parse::<u8>()
        .map_err(|error| format!("failed to parse percent: {error}"))?;
    if !(1..=100).contains(&parsed) {
        return Err("value must be in range 1..=100".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "lumen-chat",
    about = "Terminal client for a streaming persona chat server",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "server-url",
        env = "LUMEN_SERVER_URL",
        default_value = "http://127.0.0.1:5000",
        help = "Base URL of the chat server"
    )]
    pub(crate) server_url: String,

    #[arg(
        long,
        env = "LUMEN_PERSONA",
        help = "Persona id to chat with. Defaults to the server's default persona"
    )]
    pub(crate) persona: Option<String>,

    #[arg(
        long = "all-personas",
        env = "LUMEN_ALL_PERSONAS",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Include non-public personas in /personas listings"
    )]
    pub(crate) all_personas: bool,

    #[arg(
        long = "connect-timeout-ms",
        env = "LUMEN_CONNECT_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "TCP connect timeout for server requests. Streams themselves are not time limited"
    )]
    pub(crate) connect_timeout_ms: u64,

    #[arg(
        long = "max-image-side",
        env = "LUMEN_MAX_IMAGE_SIDE",
        default_value_t = 512,
        value_parser = parse_positive_u32,
        help = "Attached images larger than this many pixels on their longest side are scaled down"
    )]
    pub(crate) max_image_side: u32,

    #[arg(
        long = "image-quality",
        env = "LUMEN_IMAGE_QUALITY",
        default_value_t = 82,
        value_parser = parse_quality_percent,
        help = "JPEG quality used when re-encoding scaled images"
    )]
    pub(crate) image_quality: u8,

    #[arg(
        long = "image",
        value_name = "PATH",
        action = ArgAction::Append,
        help = "Image file to attach to the first message. Repeatable"
    )]
    pub(crate) images: Vec<PathBuf>,

    #[arg(
        long,
        value_name = "TEXT",
        help = "Send one message, print the reply and exit"
    )]
    pub(crate) message: Option<String>,

    #[arg(
        long = "skip-history",
        default_value_t = false,
        help = "Do not load recent history on start"
    )]
    pub(crate) skip_history: bool,
}
