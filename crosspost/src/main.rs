//! crosspost - Publish one post to several social networks

use clap::Parser;
use libcrosspost::config::Config;
use libcrosspost::logging::{LogFormat, LoggingConfig};
use libcrosspost::types::{MediaRef, PublishOptions, VerificationGuarantee, Visibility};
use libcrosspost::{
    AdapterRegistry, AggregateResult, CrosspostError, Database, LegOutcome, Platform,
    PublishOrchestrator, PublishRequest, Result,
};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "crosspost")]
#[command(version, about = "Publish one post to several social networks")]
#[command(long_about = r#"Publish one post to several social networks.

Every platform is handled independently: content is adapted and validated
per platform, transient failures are retried, expired tokens are refreshed
and each post is checked for existence before it is reported as published.

EXAMPLES:
    crosspost --user alice "Shipping v2 today #release"
    echo "Hello" | crosspost --user alice --platform twitter,linkedin
    crosspost --user alice --platform youtube --media https://cdn.example.com/launch.mp4 "Launch day"
    crosspost --user alice --format json "Hello" | jq '.summary'

EXIT CODES:
    0 - Every leg was published, or queued for a later retry
    1 - At least one leg failed
    2 - Every failed leg needs the account to be linked again
    3 - Invalid input
"#)]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// Target platform(s), comma-separated (defaults from config)
    #[arg(short, long)]
    platform: Option<String>,

    /// User whose linked accounts are used
    #[arg(short, long, env = "CROSSPOST_USER")]
    user: String,

    /// Publicly reachable media URL (repeatable)
    #[arg(short, long = "media", value_name = "URL")]
    media: Vec<String>,

    /// Audience: public, unlisted or private
    #[arg(long, default_value = "public")]
    visibility: String,

    /// Outbound link for Pinterest pins and LinkedIn articles
    #[arg(long)]
    link: Option<String>,

    /// Pinterest board to pin to
    #[arg(long)]
    board: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Configuration file (overrides CROSSPOST_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = if cli.verbose {
        LoggingConfig::new(LogFormat::Text, "debug".to_string(), true)
    } else {
        let mut config = LoggingConfig::from_env();
        if std::env::var("CROSSPOST_LOG_LEVEL").is_err() {
            config.level = "error".to_string();
        }
        config
    };
    let _ = logging.init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.format != "text" && cli.format != "json" {
        return Err(CrosspostError::InvalidInput(format!(
            "Invalid format '{}'. Valid formats: text, json",
            cli.format
        )));
    }

    let content = read_content(cli.content.as_deref())?;
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let platforms = match &cli.platform {
        Some(list) => parse_platforms(list)?,
        None => config.defaults.platforms.clone(),
    };
    if platforms.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "No platforms specified. Use --platform or set defaults.platforms".to_string(),
        ));
    }

    let options = PublishOptions {
        visibility: parse_visibility(&cli.visibility)?,
        link: cli.link,
        board_id: cli.board,
        ..Default::default()
    };
    let media = cli
        .media
        .iter()
        .map(|url| media_from_url(url))
        .collect::<Result<Vec<_>>>()?;

    let request = PublishRequest::new(cli.user, content, platforms)
        .with_media(media)
        .with_options(options);
    tracing::debug!(request_id = %request.id, "Built publish request");

    let db = Arc::new(Database::new(&config.database.path).await?);
    let registry = AdapterRegistry::from_config(&config)?;
    let orchestrator =
        PublishOrchestrator::new(registry, db.clone(), db, config.orchestrator.clone());

    let result = orchestrator.publish(&request).await;

    match cli.format.as_str() {
        "json" => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: Failed to render result: {}", e);
                return Ok(1);
            }
        },
        _ => print!("{}", render_text(&request, &result)),
    }

    Ok(exit_code(&result))
}

fn read_content(arg: Option<&str>) -> Result<String> {
    let content = match arg {
        Some(text) => text.to_string(),
        None if std::io::stdin().is_terminal() => {
            return Err(CrosspostError::InvalidInput(
                "No content provided. Pass it as an argument or on stdin".to_string(),
            ))
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).map_err(|e| {
                CrosspostError::InvalidInput(format!("Failed to read stdin: {}", e))
            })?;
            buffer
        }
    };

    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "Content cannot be empty".to_string(),
        ));
    }
    Ok(content)
}

fn parse_platforms(list: &str) -> Result<Vec<Platform>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(CrosspostError::InvalidInput))
        .collect()
}

fn parse_visibility(value: &str) -> Result<Visibility> {
    match value.to_lowercase().as_str() {
        "public" => Ok(Visibility::Public),
        "unlisted" => Ok(Visibility::Unlisted),
        "private" => Ok(Visibility::Private),
        _ => Err(CrosspostError::InvalidInput(format!(
            "Invalid visibility '{}'. Valid options: public, unlisted, private",
            value
        ))),
    }
}

/// Guess the MIME type from the URL's file extension
fn media_from_url(url: &str) -> Result<MediaRef> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => {
            return Err(CrosspostError::InvalidInput(format!(
                "Cannot tell the media type of '{}'",
                url
            )))
        }
    };

    Ok(MediaRef::new(url, mime, 0))
}

fn render_text(request: &PublishRequest, result: &AggregateResult) -> String {
    let mut out = String::new();

    for platform in request.distinct_platforms() {
        let Some(leg) = result.leg(platform) else {
            continue;
        };
        let error = leg.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
        let id = leg.external_post_id.as_deref().unwrap_or("");
        let location = leg.external_url.as_deref().unwrap_or(id);

        let line = match leg.outcome {
            LegOutcome::Succeeded if leg.verification == Some(VerificationGuarantee::BestEffort) => {
                format!("✓ {}: {} (best effort)", platform, location)
            }
            LegOutcome::Succeeded => format!("✓ {}: {}", platform, location),
            LegOutcome::SucceededUnverified => {
                format!("? {}: {} (unverified: {})", platform, location, error)
            }
            LegOutcome::QueuedForRetry => format!("↻ {}: queued for retry ({})", platform, error),
            LegOutcome::Failed => format!("✗ {}: {}", platform, error),
        };
        out.push_str(&line);
        out.push('\n');
    }

    out
}

fn exit_code(result: &AggregateResult) -> i32 {
    if result.failed.is_empty() {
        0
    } else if result.failed.iter().all(|leg| {
        leg.error
            .as_ref()
            .is_some_and(|e| e.kind.requires_reauthorization())
    }) {
        2
    } else {
        1
    }
}
