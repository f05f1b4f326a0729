use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, info_span};

use crate::app::{AppContext, Result};
use crate::config::{format_interval, Credentials};
use crate::domain::DEFAULT_FORMAT;
use crate::fetcher::{FeedSource, HttpFeedSource, HttpFetcher};
use crate::render::render;
use crate::schema::BootstrapReport;
use crate::store::FeedCatalog;
use crate::transport::{DiscordClient, Listener, ListenerConfig};

/// Run the poller and the command listener until SIGINT/SIGTERM.
pub async fn run(ctx: AppContext, credentials: &Credentials) -> Result<()> {
    let client = Arc::new(DiscordClient::new(
        credentials.discord_token.clone(),
        ctx.config.discord.api_base.clone(),
    )?);

    // An unusable token stops startup before anything is spawned.
    let me = client.current_user().await?;
    info!("Authenticated as {} ({})", me.username, me.id);

    let poller = ctx.poller(client.clone());
    let router = Arc::new(ctx.router(&credentials.owner_id, client.clone()));
    let channels = ctx.config.discord.control_channels.clone();
    let listener = Listener::new(
        client,
        me,
        router,
        ListenerConfig {
            channels: channels.clone(),
            interval: ctx.config.discord.listen_interval,
        },
    )
    .with_span(info_span!("listener", channels = channels.len()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { poller.run(shutdown).await })
    };
    let listener_task = tokio::spawn(async move {
        let result = listener.run(shutdown_rx).await;
        if let Err(e) = &result {
            error!("Listener stopped with error: {}", e);
        }
        result
    });

    info!(
        "Runnel started (poll interval: {}, PID: {})",
        format_interval(ctx.config.poller.interval.as_secs()),
        std::process::id()
    );

    wait_for_shutdown().await?;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_task.await {
        error!("Poller task failed: {}", e);
    }
    if let Err(e) = listener_task.await {
        error!("Listener task failed: {}", e);
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

pub fn bootstrap(ctx: &AppContext) {
    print_bootstrap(&ctx.bootstrap);
}

fn print_bootstrap(report: &BootstrapReport) {
    if report.is_noop() {
        println!(
            "Schema up to date ({} tables): {}",
            report.required.len(),
            report.required.join(", ")
        );
    } else {
        println!("Created tables: {}", report.created.join(", "));
    }
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let overviews = ctx.store.feed_overviews()?;

    if overviews.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for overview in overviews {
        let status = if overview.feed.active { "" } else { " [inactive]" };
        println!(
            "#{} {}{}\n  -> {} ({} sent)",
            overview.feed.id,
            overview.feed.url,
            status,
            overview.display_destination(),
            overview.sent_count
        );

        if let Some(last) = ctx.store.sent_records(overview.feed.id, 1)?.first() {
            println!(
                "  last: {} ({})",
                last.title,
                last.sent_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

/// Fetch a feed and print rendered entries without delivering or recording them.
pub async fn preview(url: &str, format: Option<&str>, limit: usize) -> Result<()> {
    let source = HttpFeedSource::new(Arc::new(HttpFetcher::new()?));
    let entries = source.fetch_entries(url).await?;
    let format = format.unwrap_or(DEFAULT_FORMAT);

    if entries.is_empty() {
        println!("No entries");
        return Ok(());
    }

    println!("{} entries, showing {}", entries.len(), limit.min(entries.len()));

    for entry in entries.iter().take(limit) {
        let rendered = render(format, entry);
        println!("--- {}", entry.guid);
        println!("{}", rendered.description);
        for field in &rendered.fields {
            println!("  [{}] {}", field.name, field.value);
        }
    }

    Ok(())
}
