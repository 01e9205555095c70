mod cli;

use std::path::Path;

use chrono::Utc;
use clap::Parser;
use log::info;

use quote_cache::app;
use quote_cache::cache::{CycleOutcome, ErrorKind};
use quote_cache::error::{AppError, Context, Result};
use quote_cache::storage::export_csv;
use quote_cache::ui::{render_snapshot, render_state, render_table};
use quote_cache::utils::{format_age, format_timestamp};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let root = cli.root.as_path();

    match cli.command {
        Commands::List => list(root),
        Commands::Watch { ref code } => watch(root, code).await,
        Commands::Refresh { ref code } => refresh(root, code).await,
        Commands::Show { ref code } => show(root, code),
        Commands::Export { ref code, ref path } => export(root, code, path),
    }
}

fn list(root: &Path) -> Result<()> {
    let rows: Vec<Vec<String>> = app::available_watchlists(root)?
        .into_iter()
        .map(|summary| {
            vec![
                summary.code,
                summary.name,
                summary.provider.to_string(),
                summary.symbols.to_string(),
            ]
        })
        .collect();

    println!("{}", render_table(&["Code", "Name", "Provider", "Symbols"], &rows, 3));
    Ok(())
}

async fn watch(root: &Path, code: &str) -> Result<()> {
    let descriptor = app::ensure_watchlist(root, code)?;
    let cache = app::build_cache(&descriptor)?;
    let mut updates = cache.subscribe();

    let startup = cache.initialize();
    info!("Watching `{}` ({:?}); press Ctrl-C to stop", descriptor.code, startup);

    loop {
        let state = updates.borrow_and_update().clone();
        println!("\n# {}\n{}", descriptor.name, render_state(&state, Utc::now()));

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    cache.dispose();
    Ok(())
}

async fn refresh(root: &Path, code: &str) -> Result<()> {
    let descriptor = app::ensure_watchlist(root, code)?;
    let cache = app::build_cache(&descriptor)?;

    match cache.refresh_cycle().await {
        CycleOutcome::Committed { entries, persisted } => {
            println!("Fetched {entries} quotes for `{}`.", descriptor.code);
            if !persisted {
                println!("Quotes could not be saved; see the log for details.");
            }
        }
        CycleOutcome::Aborted { kind, fetched } => {
            println!(
                "Refresh stopped after {fetched} quotes: {}",
                ErrorKind::from(kind)
            );
        }
        other => info!("Refresh of `{}` finished: {:?}", descriptor.code, other),
    }

    println!("{}", render_state(&cache.get_state(), Utc::now()));
    Ok(())
}

fn show(root: &Path, code: &str) -> Result<()> {
    let descriptor = app::ensure_watchlist(root, code)?;
    let Some(snapshot) = app::load_persisted_snapshot(&descriptor)? else {
        println!(
            "No cached quotes for `{}` yet. Run `refresh {}` first.",
            descriptor.code, descriptor.code
        );
        return Ok(());
    };

    let now = Utc::now();
    let freshness = if snapshot.is_fresh(now, descriptor.cache.ttl) {
        "fresh"
    } else {
        "stale"
    };
    println!(
        "# {}\nCaptured {} ({} old, {})",
        descriptor.name,
        format_timestamp(snapshot.captured_at()),
        format_age(snapshot.age(now)),
        freshness
    );
    println!("{}", render_snapshot(&snapshot));
    Ok(())
}

fn export(root: &Path, code: &str, path: &Path) -> Result<()> {
    let descriptor = app::ensure_watchlist(root, code)?;
    let snapshot = app::load_persisted_snapshot(&descriptor)?.ok_or_else(|| {
        AppError::message(format!(
            "No cached quotes for `{}`; run `refresh {}` first",
            descriptor.code, descriptor.code
        ))
    })?;

    export_csv(&snapshot, path)?;
    println!("Exported {} quotes to {}.", snapshot.len(), path.display());
    Ok(())
}
