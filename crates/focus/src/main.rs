//! focusguard - keep browser blocking in step with a focus session
//!
//! Usage:
//!   focusguard run                  Run as the browser's native messaging host
//!   focusguard poll [--json]        Poll the focus app once and show the result
//!   focusguard check <URL>          Would this URL be blocked right now?
//!   focusguard rules                Print the rules that would be installed
//!   focusguard normalize <SITE>...  Show canonical hostnames for site entries
//!   focusguard simulate <URL>...    Poll once against in-memory tabs
//!   focusguard config [--init]      Show or write the configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use focusguard_core::{format, Config, Paths};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use focusguard::native::NativeHost;
use focusguard::{
    normalize, normalize_all, HttpStatusSource, MemoryBrowser, RuleInstaller, StatusSource,
    SyncLoop, Synchronizer,
};

/// Focusguard - browser blocking driven by your focus sessions
#[derive(Parser)]
#[command(name = "focusguard")]
#[command(about = "Keeps browser site blocking in sync with an external focus session")]
#[command(version)]
#[command(after_help = r#"HOW IT WORKS:
    The focus app serves {"focusing": bool, "blocked_sites": [...]} on a
    local HTTP endpoint. 'focusguard run' polls it every couple of seconds
    and drives the browser extension over native messaging: redirect rules
    while focusing, a sweep of open tabs when a session starts, and live
    interception of navigations to blocked domains and their subdomains.

    If the focus app stays unreachable while a session is active, all
    blocking is released after the configured number of failed polls.

EXAMPLES:
    focusguard poll                      # What does the focus app say?
    focusguard check https://m.x.com/    # Is this blocked right now?
    focusguard normalize https://x.com/  # -> x.com
    focusguard config --init             # Write a default config file

CONFIGURATION:
    ~/.config/focusguard/config.json, or FOCUSGUARD_CONFIG / --config.
    FOCUSGUARD_STATUS_URL overrides the status endpoint.
    RUST_LOG controls log verbosity (logs go to stderr).
"#)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a native messaging host (stdin/stdout belong to the browser)
    Run,

    /// Poll the status endpoint once
    Poll {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a URL would be blocked right now
    Check {
        /// URL to check
        url: String,
    },

    /// Print the redirect rules for the current status as JSON
    Rules,

    /// Show canonical hostnames for site entries
    Normalize {
        /// Site entries (domains or URLs)
        #[arg(required = true)]
        sites: Vec<String>,
    },

    /// Poll once against an in-memory browser holding the given tabs
    Simulate {
        /// URLs of the open tabs
        #[arg(required = true)]
        tabs: Vec<String>,
    },

    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

// ANSI color codes
const RED: &str = "\x1b[0;31m";
const GREEN: &str = "\x1b[0;32m";
const YELLOW: &str = "\x1b[0;33m";
const CYAN: &str = "\x1b[0;36m";
const BOLD: &str = "\x1b[1m";
const NC: &str = "\x1b[0m";

/// Check if stdout is a TTY and colors should be used
fn use_colors() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

/// Conditionally apply color
fn color(code: &str, text: &str) -> String {
    if use_colors() {
        format!("{}{}{}", code, text, NC)
    } else {
        text.to_string()
    }
}

/// Browsers start native hosts with their own arguments: Chrome passes the
/// caller origin, Firefox the manifest path and extension id.
fn launched_by_browser(args: &[String]) -> bool {
    args.get(1).is_some_and(|arg| {
        arg.starts_with("chrome-extension://") || arg.ends_with(".json")
    })
}

/// Origin of the calling extension when Chrome launched us
fn caller_origin(args: &[String]) -> Option<&str> {
    args.get(1)
        .map(String::as_str)
        .filter(|arg| arg.starts_with("chrome-extension://"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let cli = if launched_by_browser(&args) {
        Cli {
            config: None,
            command: Some(Commands::Run),
        }
    } else {
        Cli::parse()
    };

    let config_path = cli.config.unwrap_or_else(|| Paths::new().config_file());

    if let Some(Commands::Config { init }) = cli.command {
        return cmd_config(&config_path, init);
    }

    let mut config = Config::resolve(&config_path)?;
    if let Some(origin) = caller_origin(&args) {
        config.set_extension_origin(origin)?;
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = rt.block_on(async {
        match cli.command {
            Some(Commands::Run) | None => cmd_run(config).await,
            Some(Commands::Poll { json }) => cmd_poll(&config, json).await,
            Some(Commands::Check { url }) => cmd_check(&config, &url).await,
            Some(Commands::Rules) => cmd_rules(&config).await,
            Some(Commands::Normalize { sites }) => cmd_normalize(&sites),
            Some(Commands::Simulate { tabs }) => cmd_simulate(&config, &tabs).await,
            Some(Commands::Config { .. }) => Ok(()),
        }
    });

    // A blocking stdin read may still be parked on the runtime's pool
    rt.shutdown_background();
    result
}

fn status_source(config: &Config) -> Result<HttpStatusSource> {
    HttpStatusSource::new(config.status_url.clone(), config.poll_interval())
        .context("Failed to build HTTP client")
}

/// Run the synchronizer against the browser on stdin/stdout
async fn cmd_run(config: Config) -> Result<()> {
    let source = status_source(&config)?;
    let (host, events) = NativeHost::spawn(
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.host_call_timeout(),
    );
    let host = host.with_rule_engine(config.rule_engine);

    let sync = Synchronizer::new(host, &config);
    let mut sync_loop = SyncLoop::new(source, sync, config.poll_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(
        status_url = %config.status_url,
        blocking_page = %config.blocking_page_url,
        rule_engine = config.rule_engine,
        "Starting focusguard native host"
    );
    sync_loop.run(events, shutdown_rx).await;
    Ok(())
}

/// Poll once and print the report
async fn cmd_poll(config: &Config, json: bool) -> Result<()> {
    let report = status_source(config)?
        .fetch()
        .await
        .with_context(|| format!("Failed to poll {}", config.status_url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let domains = normalize_all(&report.blocked_sites);
    if report.focusing {
        println!("{}", color(&format!("{}{}", BOLD, GREEN), "FOCUSING"));
    } else {
        println!("{}", color(BOLD, "Not focusing"));
    }
    println!();
    println!("  {}  {}", color(CYAN, "Endpoint:"), config.status_url);
    println!("  {}   {}", color(CYAN, "Blocked:"), domains.len());
    for domain in &domains {
        println!("    - {}", domain);
    }
    if report.focusing && domains.is_empty() {
        println!();
        println!(
            "{} No sites listed, nothing will be blocked",
            color(YELLOW, "[warn]")
        );
    }

    Ok(())
}

/// Report whether a URL would be redirected
async fn cmd_check(config: &Config, url: &str) -> Result<()> {
    let report = status_source(config)?
        .fetch()
        .await
        .with_context(|| format!("Failed to poll {}", config.status_url))?;

    let mut sync = Synchronizer::new(MemoryBrowser::new(), config);
    sync.reconcile(report.focusing, &report.blocked_sites).await?;

    let interceptor = sync.interceptor();
    let Some(host) = interceptor.candidate_host(url) else {
        println!("{} {} is exempt (internal page or not http)", color(GREEN, "[allowed]"), url);
        return Ok(());
    };

    if sync.state().is_blocked(&host) {
        println!("{} {} ({})", color(RED, "[blocked]"), url, host);
    } else if !sync.state().focusing() {
        println!("{} {} (not focusing)", color(GREEN, "[allowed]"), url);
    } else {
        println!("{} {} ({} is not on the list)", color(GREEN, "[allowed]"), url, host);
    }

    Ok(())
}

/// Print the rules the installer would push for the current status
async fn cmd_rules(config: &Config) -> Result<()> {
    let report = status_source(config)?
        .fetch()
        .await
        .with_context(|| format!("Failed to poll {}", config.status_url))?;

    let domains = if report.focusing {
        normalize_all(&report.blocked_sites)
    } else {
        Default::default()
    };
    let rules = RuleInstaller::new(config.blocking_page_path.clone()).rules_for(&domains);
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

fn cmd_normalize(sites: &[String]) -> Result<()> {
    for site in sites {
        let host = normalize(site);
        if host == *site {
            println!("{}", host);
        } else {
            println!("{} -> {}", site, color(BOLD, &host));
        }
    }
    Ok(())
}

/// Poll once and show what a focus-start sweep would do to the given tabs
async fn cmd_simulate(config: &Config, tabs: &[String]) -> Result<()> {
    let browser = if config.rule_engine {
        MemoryBrowser::new()
    } else {
        MemoryBrowser::without_rule_engine()
    };
    let ids: Vec<_> = tabs.iter().map(|url| browser.open_tab(url)).collect();

    let source = status_source(config)?;
    let mut sync = Synchronizer::new(browser, config);
    let outcome = sync.handle_poll(source.fetch().await).await?;

    let snapshot = sync.snapshot();
    match snapshot.last_success {
        Some(at) => println!(
            "{} polled {} ({})",
            color(CYAN, "[info]"),
            config.status_url,
            format::relative_time(at)
        ),
        None => println!(
            "{} {} unreachable, nothing enforced",
            color(YELLOW, "[warn]"),
            config.status_url
        ),
    }
    println!();

    for (id, url) in ids.iter().zip(tabs) {
        if outcome.redirected.contains(id) {
            println!("  {} {}", color(RED, "redirected"), url);
        } else {
            println!("  {}       {}", color(GREEN, "kept"), url);
        }
    }

    println!();
    println!(
        "  {} {}",
        color(CYAN, "Rules:"),
        sync.host().rules().len()
    );
    println!(
        "  {} {}",
        color(CYAN, "Poll period:"),
        format::duration(config.poll_interval())
    );
    Ok(())
}

fn cmd_config(path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            println!("{} {} already exists", color(YELLOW, "[skip]"), path.display());
        } else {
            Config::default().save(path)?;
            println!("{} Wrote {}", color(GREEN, "[ok]"), path.display());
        }
    }

    let mut config = Config::load(path)?;
    config.apply_env(|key| std::env::var(key).ok());

    println!("{}", color(BOLD, &path.display().to_string()));
    println!("{}", serde_json::to_string_pretty(&config)?);
    if let Err(e) = config.validate() {
        println!();
        println!("{} {}", color(RED, "[invalid]"), e);
    }
    Ok(())
}
