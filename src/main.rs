//! llm-knife command-line entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI args
//!   3. Resolve the configuration tree (defaults, env, files)
//!   4. Resolve effective log level (CLI `-v` flags > RUST_LOG > config)
//!   5. Init logger once
//!   6. Optionally persist the resolved config
//!   7. Route the backend name and print the generation to stdout

use std::path::PathBuf;

use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use llm_knife::config::ConfigStore;
use llm_knife::error::AppError;
use llm_knife::llm::{GenerateOptions, Generation, ModelRouter};
use llm_knife::logger::{self, LevelOrigin};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let (config, files) = ConfigStore::load()?;

    let configured_level = config.get_or("logging.level", logger::FALLBACK_LEVEL.to_string());
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = logger::resolve_directive(args.verbosity, rust_log.as_deref(), &configured_level);
    logger::init(&directive)?;

    info!(
        environment = %config.get_or("environment", String::new()),
        config_files = files.loaded.len(),
        configured_log_level = %configured_level,
        effective_log_directive = %directive.directive,
        origin = ?directive.origin,
        "config loaded"
    );
    // load_from_files ran before the subscriber existed
    for (path, reason) in &files.skipped {
        warn!(path = %path.display(), error = %reason, "could not load config file, skipping");
    }
    if directive.origin == LevelOrigin::Fallback {
        warn!(level = %configured_level, "ignoring unrecognised logging.level");
    }

    if let Some(target) = &args.save_config {
        let written = config.save(target.as_deref())?;
        eprintln!("saved configuration to {}", written.display());
    }

    let (backend, prompt) = match (args.backend, args.prompt) {
        (Some(backend), Some(prompt)) => (backend, prompt),
        // --save-config alone is a complete invocation
        (None, _) if args.save_config.is_some() => return Ok(()),
        _ => {
            eprintln!("error: expected <backend> <prompt> (see --help)");
            std::process::exit(2);
        }
    };

    let router = ModelRouter::new(&config)?;
    let provider = router.resolve(&backend).await?;
    debug!(backend = %provider.backend(), model = %provider.model(), "provider ready");

    let options = GenerateOptions {
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        top_p: None,
        stream: args.stream,
    };

    let generation = provider
        .generate(&prompt, args.context.as_deref(), &options)
        .await?;

    let mut stdout = tokio::io::stdout();
    write_generation(&mut stdout, generation).await
}

/// Write the reply followed by a newline, flushing after each streamed
/// fragment so partial output shows up as it arrives.
async fn write_generation<W>(out: &mut W, generation: Generation) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    match generation {
        Generation::Text(text) => {
            out.write_all(text.as_bytes()).await?;
        }
        Generation::Stream(mut fragments) => {
            while let Some(fragment) = fragments.next().await {
                out.write_all(fragment?.as_bytes()).await?;
                out.flush().await?;
            }
        }
    }
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

struct CliArgs {
    /// Count of `-v` flags; zero defers to RUST_LOG and config.
    verbosity: u8,
    context: Option<String>,
    stream: bool,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    /// `Some(None)` saves to the default path.
    save_config: Option<Option<PathBuf>>,
    backend: Option<String>,
    prompt: Option<String>,
}

fn print_usage() {
    println!("Usage: llm-knife [OPTIONS] <BACKEND> <PROMPT>...");
    println!();
    println!("Backends are matched by prefix: openai*, azure*, anthropic*, bedrock*, dummy*");
    println!();
    println!("Options:");
    println!("  -h, --help                 Print help");
    println!("  -c, --context <TEXT>       System instructions sent with the prompt");
    println!("  -s, --stream               Print fragments as they arrive");
    println!("      --max-tokens <N>       Override the configured token limit");
    println!("      --temperature <T>      Override the configured temperature");
    println!("      --save-config[=PATH]   Write the resolved config (default ~/.llm_knife/config.yaml)");
    println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
}

fn usage_error(msg: &str) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(2);
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut context = None;
    let mut stream = false;
    let mut max_tokens = None;
    let mut temperature = None;
    let mut save_config = None;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            positional.extend(iter.by_ref());
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-c" | "--context" => match iter.next() {
                Some(text) => context = Some(text),
                None => usage_error("-c/--context requires a text argument"),
            },
            "-s" | "--stream" => stream = true,
            "--max-tokens" => match iter.next().map(|v| v.parse::<u32>()) {
                Some(Ok(n)) => max_tokens = Some(n),
                _ => usage_error("--max-tokens requires a non-negative integer"),
            },
            "--temperature" => match iter.next().map(|v| v.parse::<f32>()) {
                Some(Ok(t)) => temperature = Some(t),
                _ => usage_error("--temperature requires a number"),
            },
            "--save-config" => save_config = Some(None),
            a if a.starts_with("--save-config=") => {
                let path = &a["--save-config=".len()..];
                if path.is_empty() {
                    usage_error("--save-config= requires a path");
                }
                save_config = Some(Some(PathBuf::from(path)));
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            a if a.starts_with('-') && a.len() > 1 => usage_error(&format!("unknown option '{a}'")),
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let backend = positional.next();
    let rest: Vec<String> = positional.collect();
    let prompt = (!rest.is_empty()).then(|| rest.join(" "));

    CliArgs {
        verbosity,
        context,
        stream,
        max_tokens,
        temperature,
        save_config,
        backend,
        prompt,
    }
}
