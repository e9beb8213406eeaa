//! Quokka headless shell
//!
//! Opens a tab on a URL, lets the page load and settle, then writes the
//! composited frame to `quokka.png` and prints the accessibility tree as
//! JSON on stdout.
//!
//! - quokka https://example.com
//! - quokka 'data:text/html,<h1>Hi</h1>'

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use log::warn;
use owo_colors::OwoColorize;
use quokka_browser::common::net::NetworkFetcher;
use quokka_browser::common::url::Url;
use quokka_browser::{BrowserConfig, CompositorThread, TabThread};

const SCREENSHOT: &str = "quokka.png";

/// How long the compositor must stay idle before the page counts as settled.
const QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Give up waiting for a page after this long.
const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Quokka: render a page headlessly
#[derive(Parser, Debug)]
#[command(name = "quokka")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Render a page, save quokka.png and print its accessibility tree
    quokka https://example.com

    # Local files and data URLs work too
    quokka file:///tmp/index.html
    quokka 'data:text/html,<h1>Test</h1>'
"#)]
struct Cli {
    /// URL to open
    #[arg(value_name = "URL")]
    url: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let url = Url::parse(&cli.url).with_context(|| format!("'{}' is not a URL", cli.url))?;
    let config = BrowserConfig::default();
    let fetcher = NetworkFetcher::new().context("failed to set up the network")?;

    let mut compositor = CompositorThread::spawn(config.width as u32, config.height as u32)
        .context("failed to start the compositor thread")?;
    let mut tab = TabThread::spawn(config, Arc::new(fetcher), url.clone(), compositor.sender())
        .context("failed to start the tab thread")?;

    eprintln!("{} {}", "Loading".cyan().bold(), url);
    if !compositor.wait_until_settled(QUIET_PERIOD, LOAD_TIMEOUT) {
        warn!("page did not settle within {}s", LOAD_TIMEOUT.as_secs());
    }
    tab.shutdown();

    let path = Path::new(SCREENSHOT);
    compositor.save_png(path)?;
    eprintln!("{} {}", "Saved".green().bold(), path.display());

    let tree = compositor
        .accessibility_tree()
        .context("the page produced no accessibility tree")?;
    println!("{}", serde_json::to_string_pretty(&tree)?);

    compositor.shutdown();
    Ok(())
}
