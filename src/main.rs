//! acepace - reconcile a local One Pace library against the remote catalog
//!
//! Content checksums are the identity key throughout: the tool walks the
//! paginated listing for checksummed releases, walks the local library
//! for checksummed files, and reports the difference. Separate commands
//! rename local files to canonical titles, rebuild the episode index,
//! submit missing magnets to a download client, and export the cache.

mod cli;
mod config;
mod db;
mod services;
mod torrent;

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{CliOptions, Command};
use crate::config::Config;
use crate::db::{ChecksumCache, EpisodeIndex, now_timestamp};
use crate::services::{
    AutoConfirm, CatalogClient, Confirm, InventoryBuilder, TerminalConfirm,
    reconcile::{apply_rename_plan, build_rename_plan, new_since_last, reconcile},
    report,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "acepace=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let options = CliOptions::from_args();

    if config.non_interactive {
        info!("Running in non-interactive mode");
    }

    let query_url = options.url.clone().unwrap_or_else(|| config.query_url.clone());
    Config::validate_query_url(&query_url)
        .context("refusing to start with an unrecognized catalog URL")?;

    // Cancellation between files and pages; partial work stays cached
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current item");
            signal_token.cancel();
        }
    });

    show_index_status(&config).await;

    match options.command {
        Command::RefreshIndex => refresh_index(&config, options.force_refresh, &cancel).await,
        Command::ExportCache => export_cache(&config).await,
        Command::Download => download_missing(&config, &options).await,
        Command::Rename => rename_files(&config, &cancel).await,
        Command::Report => {
            let folder = resolve_folder(&config, &options).await?;
            run_report(&config, &query_url, &folder, &cancel).await
        }
    }
}

/// Log when the episode index was last rebuilt.
async fn show_index_status(config: &Config) {
    match EpisodeIndex::open(&config.index_db_path).await {
        Ok(index) => match index.last_update().await {
            Ok(Some(stamp)) => info!(last_update = %stamp, "Episode index status"),
            Ok(None) => info!("Episode index has not been built yet"),
            Err(e) => warn!(error = %e, "Could not read episode index status"),
        },
        Err(e) => warn!(error = %e, "Could not open episode index"),
    }
}

/// Full catalog walk into the episode index, guarded by recency.
async fn refresh_index(config: &Config, force: bool, cancel: &CancellationToken) -> Result<()> {
    let index = EpisodeIndex::open(&config.index_db_path).await?;

    if !force && !index.is_stale(config.index_max_age).await? {
        info!(
            max_age_secs = config.index_max_age.as_secs(),
            "Episode index is fresh, skipping refresh (use --force-refresh to override)"
        );
        return Ok(());
    }

    let client = CatalogClient::new(
        config.base_url.clone(),
        config.quality_gate(),
        config.request_delay,
        config.http_timeout,
    )?;
    let refresh_url = client.search_url(&config.refresh_query);
    let snapshot = client.fetch_catalog(&refresh_url, cancel).await?;

    for entry in &snapshot.entries {
        index.upsert(&entry.checksum, &entry.title, &entry.page_link).await?;
    }
    if cancel.is_cancelled() || !snapshot.skipped_pages.is_empty() {
        // Timestamp only moves after a complete pass
        warn!(
            entries = snapshot.entries.len(),
            skipped_pages = snapshot.skipped_pages.len(),
            "Partial refresh persisted, index timestamp left unchanged"
        );
        return Ok(());
    }
    index.touch_last_update().await?;
    info!(entries = snapshot.entries.len(), "Episode index updated");
    Ok(())
}

/// Export the checksum cache to CSV.
async fn export_cache(config: &Config) -> Result<()> {
    let cache = ChecksumCache::open(&config.cache_db_path).await?;
    let records = cache.all_records().await?;
    report::export_cache_csv(&config.cache_export_path, &records)?;
    cache.set_metadata("last_db_export", &now_timestamp()).await?;
    println!("Database exported to {}", config.cache_export_path.display());
    Ok(())
}

/// Submit the missing report's magnets to the configured client.
async fn download_missing(config: &Config, options: &CliOptions) -> Result<()> {
    let magnets = report::load_magnet_links(&config.missing_report_path)?;
    if magnets.is_empty() {
        bail!(
            "no magnet links found in {}",
            config.missing_report_path.display()
        );
    }

    let client_config = config.client_config(
        options.client.as_deref(),
        options.host.as_deref(),
        options.port,
        options.username.as_deref(),
        options.password.as_deref(),
        options.download_folder.as_deref(),
        options.tags.clone(),
        options.category.clone(),
    )?;
    let submitter = torrent::connect_client(&client_config).await?;
    let summary = submitter.submit(&magnets).await?;

    println!(
        "Submitted {} magnets: {} accepted, {} duplicates, {} failed",
        magnets.len(),
        summary.accepted,
        summary.duplicates,
        summary.failures.len()
    );
    for (magnet, error) in &summary.failures {
        println!("  failed: {magnet}: {error}");
    }
    Ok(())
}

/// Rename cached local files to their canonical catalog titles.
async fn rename_files(config: &Config, cancel: &CancellationToken) -> Result<()> {
    let cache = ChecksumCache::open(&config.cache_db_path).await?;
    let index = EpisodeIndex::open(&config.index_db_path).await?;

    let last_update = index.last_update().await?;
    let confirm = confirmation_policy(config);
    let refresh_wanted = if config.non_interactive {
        // Unattended runs refresh only a never-built index
        last_update.is_none()
    } else {
        let question = match &last_update {
            Some(stamp) => {
                format!("Update the episode index before renaming? (last update: {stamp})")
            }
            None => {
                println!("WARNING: the episode index has never been built.");
                "Update the episode index before renaming?".to_string()
            }
        };
        confirm.confirm(&question)
    };
    if refresh_wanted {
        refresh_index(config, true, cancel).await?;
    }

    let records = cache.all_records().await?;
    if records.is_empty() {
        println!("No entries found in the local checksum cache.");
        return Ok(());
    }
    let mut titles = index.title_map().await?;

    // Checksums the full refresh never saw get an individual listing search
    let unindexed: Vec<&str> = records
        .iter()
        .filter(|r| !titles.contains_key(&r.crc32))
        .map(|r| r.crc32.as_str())
        .collect();
    if !unindexed.is_empty() {
        info!(count = unindexed.len(), "Searching the listing for unindexed checksums");
        let client = CatalogClient::new(
            config.base_url.clone(),
            config.quality_gate(),
            config.request_delay,
            config.http_timeout,
        )?;
        for crc32 in unindexed {
            if cancel.is_cancelled() {
                break;
            }
            tokio::time::sleep(config.request_delay).await;
            match client.entry_for_checksum(crc32).await {
                Ok(Some(entry)) => {
                    index.upsert(&entry.checksum, &entry.title, &entry.page_link).await?;
                    titles.insert(entry.checksum, entry.title);
                }
                Ok(None) => {}
                Err(e) => warn!(crc32 = %crc32, error = %e, "Checksum search failed"),
            }
        }
    }

    let plan = build_rename_plan(&records, &titles);

    if plan.is_empty() {
        println!("No files to rename.");
        println!("0/{} cached files need renaming.", records.len());
        return Ok(());
    }

    println!("Rename plan:");
    for entry in &plan {
        println!(
            "{} -> {}",
            entry.current_path.file_name().unwrap_or_default().to_string_lossy(),
            entry.target_path.file_name().unwrap_or_default().to_string_lossy()
        );
    }
    println!("{}/{} files will be renamed.", plan.len(), records.len());

    if !confirm.confirm("Proceed with renaming?") {
        println!("Renaming aborted.");
        return Ok(());
    }

    let result = apply_rename_plan(plan, &cache).await?;
    println!("Renamed {} files, {} failed.", result.renamed.len(), result.failed.len());
    for (entry, error) in &result.failed {
        println!("  failed: {}: {error}", entry.current_path.display());
    }
    Ok(())
}

/// The default command: reconcile local inventory against the remote
/// catalog and write the missing report.
async fn run_report(
    config: &Config,
    query_url: &str,
    folder: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let cache = ChecksumCache::open(&config.cache_db_path).await?;
    let builder = InventoryBuilder::new(cache.clone());

    if let Some(stamp) = cache.get_metadata("last_missing_export").await? {
        println!("Last missing report generated on: {stamp}");
    }
    let last_run = cache.get_metadata("last_run").await?;
    if let Some(stamp) = &last_run {
        println!("Last run was on: {stamp}");
    }
    cache.set_metadata("last_run", &now_timestamp()).await?;

    let (total_files, recorded_files) = builder.count_files(folder).await?;
    println!("Using URL: {query_url}");
    println!("Total video files detected: {total_files}");
    println!("Episodes already recorded in cache: {recorded_files}");

    let client = CatalogClient::new(
        config.base_url.clone(),
        config.quality_gate(),
        config.request_delay,
        config.http_timeout,
    )?;
    let snapshot = client.fetch_catalog(query_url, cancel).await?;
    println!("Found {} episodes in the remote catalog.", snapshot.entries.len());

    if last_run.is_some() {
        println!("Calculating new local checksums...");
    } else {
        println!("Calculating local checksums - this will take a while on first run!");
    }
    let inventory = builder.scan(folder, cancel).await?;
    println!("Found {} local checksums.", inventory.checksums.len());
    for conflict in &inventory.conflicts {
        println!("Conflict: {conflict}");
    }

    // A partial inventory or catalog would list present episodes as
    // missing and poison the next run's delta
    if !inventory.is_complete() || cancel.is_cancelled() {
        println!("Run interrupted, keeping the previous missing report.");
        return Ok(());
    }

    let result = reconcile(&inventory.checksums, &snapshot.entries);
    println!(
        "\nSummary: {} missing episodes out of {} found in the catalog ({} present locally).\n",
        result.missing.len(),
        snapshot.entries.len(),
        result.present.len()
    );

    let previous: HashSet<String> = report::read_previous_missing(&config.missing_report_path)?;
    let newly_missing = new_since_last(&result.missing, &previous);
    if !newly_missing.is_empty() {
        println!("New missing episodes since last report: {}", newly_missing.len());
        for entry in &newly_missing {
            println!("Missing: {}", entry.title);
        }
    }

    report::write_missing_report(&config.missing_report_path, &result.missing)?;
    println!(
        "Missing report saved to {}",
        config.missing_report_path.display()
    );

    cache
        .set_metadata("last_checked_page", &snapshot.last_checked_page.to_string())
        .await?;
    cache.set_metadata("last_missing_export", &now_timestamp()).await?;
    Ok(())
}

/// Pick the confirmation policy for this run.
fn confirmation_policy(config: &Config) -> Box<dyn Confirm> {
    if config.non_interactive {
        Box::new(AutoConfirm(true))
    } else {
        Box::new(TerminalConfirm)
    }
}

/// Resolve the scan root: CLI flag, then the non-interactive default,
/// then the remembered folder, then an interactive prompt.
async fn resolve_folder(config: &Config, options: &CliOptions) -> Result<PathBuf> {
    let cache = ChecksumCache::open(&config.cache_db_path).await?;

    let folder = if let Some(folder) = &options.folder {
        folder.clone()
    } else if let Some(default) = config.default_media_root() {
        default
    } else {
        let remembered = cache.get_metadata("last_folder").await?;
        if let Some(last) = &remembered {
            println!("Last used folder: {last}");
        }
        let prompt = match &remembered {
            Some(_) => "Press Enter to use this folder, or enter a new path: ",
            None => "Enter the folder containing local video files: ",
        };
        let answer = prompt_line(prompt)?;
        match (answer.is_empty(), remembered) {
            (false, _) => PathBuf::from(answer),
            (true, Some(last)) => PathBuf::from(last),
            (true, None) => bail!("no folder specified"),
        }
    };

    cache
        .set_metadata("last_folder", &folder.to_string_lossy())
        .await?;
    Ok(folder)
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}
