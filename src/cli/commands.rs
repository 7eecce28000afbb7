use tokio::sync::watch;

use crate::app::{AppContext, Result};
use crate::bot::CommandBot;
use crate::config::{Config, ExtractRule};
use crate::daemon::{self, Daemon};
use crate::health;
use crate::store::SeenStore;

pub async fn run_once(ctx: &AppContext) -> Result<()> {
    let summary = ctx.pipeline.run_once().await?;

    for source in &summary.sources {
        println!("  {}: {} new", source.source, source.selected);
    }
    for failure in &summary.failures {
        eprintln!("  ! {} ({:?}): {}", failure.source, failure.kind, failure.message);
    }

    let report = &summary.dispatch;
    if report.fallback {
        println!("No new items; sent the fallback notice");
    }
    println!(
        "Run complete: {} delivered, {} failed, {} marked",
        report.delivered, report.failed, report.marked
    );
    Ok(())
}

/// Collect and print what would be sent. Nothing is delivered or marked.
pub async fn dry_run(ctx: &AppContext) -> Result<()> {
    let collection = ctx.pipeline.preview().await?;

    for failure in &collection.failures {
        eprintln!("  ! {} ({:?}): {}", failure.source, failure.kind, failure.message);
    }

    let payloads = ctx.pipeline.formatter().build_payloads(&collection.batch);
    for (i, payload) in payloads.iter().enumerate() {
        println!("--- {} ---", i + 1);
        if let Some(ref image) = payload.image_url {
            println!("[photo] {}", image);
        }
        println!("{}", payload.text);
    }

    println!(
        "\nDry run: {} payloads from {} new items",
        payloads.len(),
        collection.batch.total()
    );
    Ok(())
}

/// Scheduler, health server and chat commands until SIGINT/SIGTERM.
pub async fn serve(ctx: &AppContext) -> Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        daemon::shutdown_signal().await;
        tracing::info!("shutdown requested");
        stop_tx.send_replace(true);
    });

    let health_task = if ctx.config.health.enabled {
        let addr = format!("{}:{}", ctx.config.health.bind, ctx.config.health.port);
        let pipeline = ctx.pipeline.clone();
        let stop = daemon::wait_for(stop_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = health::serve(pipeline, &addr, stop).await {
                tracing::error!(addr = %addr, error = %e, "health server stopped");
            }
        }))
    } else {
        None
    };

    let bot_task = if ctx.config.telegram.poll_commands {
        let bot = CommandBot::new(
            ctx.telegram.clone(),
            ctx.pipeline.clone(),
            &ctx.config.telegram,
        );
        let stop = daemon::wait_for(stop_rx.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = bot.run(stop).await {
                tracing::error!(error = %e, "command polling stopped");
            }
        }))
    } else {
        None
    };

    let scheduler = Daemon::from_config(ctx.pipeline.clone(), &ctx.config.schedule)?;
    scheduler.run(daemon::wait_for(stop_rx)).await?;

    if let Some(task) = health_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "health server task panicked");
        }
    }
    if let Some(task) = bot_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "command polling task panicked");
        }
    }
    Ok(())
}

pub fn list_sources(config: &Config) -> Result<()> {
    let lines = describe_sources(config);
    if lines.is_empty() {
        println!("No sources configured");
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn describe_sources(config: &Config) -> Vec<String> {
    let feeds = config
        .feeds
        .iter()
        .map(|f| format!("[feed] {} ({})\n  {}", f.name, f.key, f.url));
    let pages = config.pages.iter().map(|p| {
        let rule = match p.rule {
            ExtractRule::UrlSuffix {
                ref suffix,
                ref host,
            } => match host {
                Some(host) => format!("links ending in {} on {}", suffix, host),
                None => format!("links ending in {}", suffix),
            },
            ExtractRule::Selector { ref selector } => format!("selector {}", selector),
        };
        format!("[page] {} ({})\n  {}\n  {}", p.name, p.key, p.url, rule)
    });
    feeds.chain(pages).collect()
}

pub fn list_seen(ctx: &AppContext, limit: usize) -> Result<()> {
    let total = ctx.store.count()?;
    let records = ctx.store.recent(limit)?;

    if records.is_empty() {
        println!("No items sent yet");
        return Ok(());
    }

    for record in &records {
        println!("{} {}", record.sent_at.format("%Y-%m-%d %H:%M"), record.id);
    }
    println!("\nShowing {} of {} sent items", records.len(), total);
    Ok(())
}
