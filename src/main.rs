use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use forumdocs::cli::{Cli, Command};
use forumdocs::commands;
use forumdocs::site::Site;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    forumdocs::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = cli.site.site_config().context("site config")?;
    let command = cli.command;
    tokio::task::spawn_blocking(move || {
        let site = Site::from_config(config).context("forum client")?;
        match command {
            Command::Index => commands::index(&site).context("index"),
            Command::Resolve(args) => commands::resolve(&site, args).context("resolve"),
            Command::Topic(args) => commands::topic(&site, args).context("topic"),
            Command::Sitemap(args) => commands::sitemap(&site, args).context("sitemap"),
            Command::Tables => commands::tables(&site).context("tables"),
            Command::Pages(query) => commands::pages(&site, query).context("pages"),
            Command::EngagePage(args) => commands::engage_page(&site, args).context("engage page"),
            Command::Tags => commands::tags(&site).context("tags"),
            Command::Takeovers => commands::takeovers(&site).context("takeovers"),
        }
    })
    .await
    .context("join command task")?
}
