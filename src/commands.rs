//! The `forumdocs` subcommands. Each runs on a blocking thread since the forum
//! client is synchronous.

use std::io::Write as _;

use anyhow::Context as _;

use crate::cli::{FullPathArgs, PathArgs, SitemapArgs};
use crate::engage::EngageQuery;
use crate::error::{ResolveError, SiteError};
use crate::site::Site;

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).context("write json")?;
    writeln!(stdout).context("write stdout")?;
    Ok(())
}

pub fn index(site: &Site) -> anyhow::Result<()> {
    let index = site.index().context("parse index topic")?;
    for warning in site.take_warnings() {
        tracing::warn!(%warning, "index warning");
    }
    print_json(index.as_ref())
}

pub fn resolve(site: &Site, args: PathArgs) -> anyhow::Result<()> {
    let index = site.index().context("parse index topic")?;
    match index.resolve_path(&args.path) {
        Ok(resolved) => println!("topic {}", resolved.topic_id),
        Err(ResolveError::RedirectFound { target_url, .. }) => println!("redirect {target_url}"),
        Err(err @ ResolveError::PathNotFound { .. }) => return Err(err.into()),
    }
    Ok(())
}

pub fn topic(site: &Site, args: PathArgs) -> anyhow::Result<()> {
    match site.page(&args.path) {
        Ok(page) => print_json(&page),
        Err(SiteError::Resolve(ResolveError::RedirectFound { target_url, .. })) => {
            println!("redirect {target_url}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

pub fn sitemap(site: &Site, args: SitemapArgs) -> anyhow::Result<()> {
    let body = if args.xml {
        site.sitemap_xml(&args.base_url)?
    } else {
        site.sitemap_text(&args.base_url)?
    };
    print!("{body}");
    Ok(())
}

pub fn tables(site: &Site) -> anyhow::Result<()> {
    let index = site.index().context("parse index topic")?;
    print_json(&index.data_tables)
}

pub fn pages(site: &Site, query: EngageQuery) -> anyhow::Result<()> {
    let listing = site.engage_listing(&query)?;
    print_json(&listing)
}

pub fn engage_page(site: &Site, args: FullPathArgs) -> anyhow::Result<()> {
    match site.engage_page(&args.path)? {
        Some(page) => print_json(&page),
        None => Err(ResolveError::not_found(args.path).into()),
    }
}

pub fn tags(site: &Site) -> anyhow::Result<()> {
    for tag in site.engage_tags()? {
        println!("{tag}");
    }
    Ok(())
}

pub fn takeovers(site: &Site) -> anyhow::Result<()> {
    print_json(&site.active_takeovers()?)
}
