use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use similar::TextDiff;
use wikinorm_core::Normalizer;
use wikinorm_core::config::{NormalizerConfig, load_config};
use wikinorm_core::hook::{PageOutcome, normalize_page};
use wikinorm_core::pipeline::Module;
use wikinorm_core::store::{MediaWikiClient, PageStore};

const DEFAULT_CONFIG_FILE: &str = "wikinorm.toml";

#[derive(Debug, Parser)]
#[command(
    name = "wikinorm",
    version,
    about = "Normalize wikitext into a canonical style"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (default: wikinorm.toml)")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Log each normalization pass to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Normalize a wikitext file, or stdin when no path (or -) is given")]
    Fix(FixArgs),
    #[command(about = "Normalize a live wiki page under the service-account policy")]
    Page(PageArgs),
    #[command(about = "List normalization passes and whether each is enabled")]
    Modules,
}

#[derive(Debug, Args)]
struct FixArgs {
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,
    #[arg(long, help = "Write the result back to PATH")]
    in_place: bool,
    #[arg(long, help = "Exit with an error when normalization would change the text")]
    check: bool,
    #[arg(long, help = "Print a unified diff instead of the normalized text")]
    diff: bool,
}

#[derive(Debug, Args)]
struct PageArgs {
    title: String,
    #[arg(long, value_name = "NAME", help = "Account that made the triggering edit")]
    editor: Option<String>,
    #[arg(long, help = "Save the normalized text (default: print the diff only)")]
    save: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path)?;
    tracing::debug!(config = %normalize_path(&config_path), "loaded configuration");

    match cli.command {
        Commands::Fix(args) => run_fix(&config, args),
        Commands::Page(args) => run_page(&config, args),
        Commands::Modules => run_modules(&config),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(value) = env::var("WIKINORM_CONFIG") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

fn build_normalizer(config: &NormalizerConfig) -> Normalizer {
    Normalizer::new(config.normalize_options(), config.title_resolver())
}

fn run_fix(config: &NormalizerConfig, args: FixArgs) -> Result<()> {
    let source = args.path.as_deref().filter(|path| *path != Path::new("-"));
    if args.in_place && source.is_none() {
        bail!("--in-place needs a file path");
    }

    let label = source.map_or_else(|| "<stdin>".to_string(), normalize_path);
    let original = match source {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };

    let normalized = build_normalizer(config).normalize(&original);
    let changed = normalized != original;

    if args.diff {
        if changed {
            print!("{}", unified_diff(&original, &normalized, &label));
        }
    } else if args.in_place {
        if changed && !args.check {
            let path = source.context("--in-place needs a file path")?;
            fs::write(path, &normalized)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("normalized: {label}");
        }
    } else if !args.check {
        print!("{normalized}");
    }

    if args.check && changed {
        bail!("{label} is not normalized");
    }
    Ok(())
}

fn run_page(config: &NormalizerConfig, args: PageArgs) -> Result<()> {
    let mut client = MediaWikiClient::from_config(config)?;
    if args.save {
        let username = env::var("WIKI_BOT_USER").context("WIKI_BOT_USER is required for --save")?;
        let password = env::var("WIKI_BOT_PASS").context("WIKI_BOT_PASS is required for --save")?;
        client.login(&username, &password)?;
    }

    let normalizer = build_normalizer(config);
    let outcome = normalize_page(
        &mut client,
        &normalizer,
        config,
        &args.title,
        args.editor.as_deref(),
        args.save,
    )?;

    println!("title: {}", args.title);
    match &outcome {
        PageOutcome::Missing => println!("status: missing"),
        PageOutcome::Skipped { reason } => {
            println!("status: skipped");
            println!("reason: {}", reason.as_str());
        }
        PageOutcome::Unchanged => println!("status: unchanged"),
        PageOutcome::Pending {
            original,
            normalized,
        } => {
            println!("status: pending");
            print!("{}", unified_diff(original, normalized, &args.title));
        }
        PageOutcome::Saved {
            revision_id,
            original,
            normalized,
        } => {
            println!("status: saved");
            if let Some(revision_id) = revision_id {
                println!("revision_id: {revision_id}");
            }
            print!("{}", unified_diff(original, normalized, &args.title));
        }
    }
    println!("requests: {}", client.request_count());
    Ok(())
}

fn run_modules(config: &NormalizerConfig) -> Result<()> {
    let options = config.normalize_options();
    for module in Module::ALL {
        println!(
            "{}: {}",
            module.as_str(),
            format_flag(options.is_enabled(module))
        );
    }
    println!("redirect_guard: {}", options.redirect_guard.as_str());
    let namespaces = config
        .eligible_namespaces()
        .into_iter()
        .map(|namespace| namespace.to_string())
        .collect::<Vec<_>>();
    println!("namespaces: {}", namespaces.join(", "));
    println!("service_account: {}", config.service_account());
    Ok(())
}

fn unified_diff(original: &str, normalized: &str, label: &str) -> String {
    TextDiff::from_lines(original, normalized)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
