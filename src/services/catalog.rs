//! Remote catalog fetching
//!
//! Walks the paginated HTML listing of a nyaa-style torrent index and
//! resolves each row to a checksum identity. The listing is loosely
//! structured: sometimes the checksum sits in the row title, sometimes
//! only in the per-torrent file list, so rows without a bracketed token
//! fall back to a detail-page fetch.
//!
//! Full-catalog refresh and on-demand reconciliation fetches share this
//! one extraction path, including the quality gate and the detail-page
//! fallback. The page bound is read from the pagination controls of the
//! first page; a failed page is logged and skipped, and a subsequent
//! refresh fills the gap.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::identity::{QualityGate, extract_checksum, gated_checksum, gated_checksum_from_filenames};

static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.torrent-list").unwrap());
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static PAGINATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.pagination a[href]").unwrap());
static FILELIST_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.torrent-file-list").unwrap());
static FOLDER_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a.folder").unwrap());
static UL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("ul").unwrap());
static LI_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("li").unwrap());

/// One accepted catalog entry, keyed by checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub checksum: String,
    pub title: String,
    pub page_link: String,
    pub magnet: Option<String>,
}

/// Result of one catalog walk
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    /// Accepted entries in fetch (insertion) order, deduplicated by checksum
    pub entries: Vec<RemoteEntry>,
    /// Last page that was fetched successfully
    pub last_checked_page: u32,
    /// Pages that failed to fetch and were skipped
    pub skipped_pages: Vec<u32>,
}

/// A raw listing row before identity resolution
#[derive(Debug)]
struct ListingRow {
    title: String,
    page_link: String,
    magnet: Option<String>,
}

/// Paginated catalog client
pub struct CatalogClient {
    http: Client,
    base_url: String,
    gate: QualityGate,
    request_delay: Duration,
}

impl CatalogClient {
    pub fn new(
        base_url: impl Into<String>,
        gate: QualityGate,
        request_delay: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url: base_url.into(), gate, request_delay })
    }

    /// Listing query URL for a search term (no page parameter).
    pub fn search_url(&self, query: &str) -> String {
        format!("{}/?f=0&c=0_0&q={}", self.base_url, urlencoding::encode(query))
    }

    /// Walk every page under `query_url` and collect accepted entries.
    ///
    /// Cancellation is checked between pages; entries already collected
    /// are returned.
    pub async fn fetch_catalog(
        &self,
        query_url: &str,
        cancel: &CancellationToken,
    ) -> Result<CatalogSnapshot> {
        let mut snapshot = CatalogSnapshot::default();
        let mut seen: HashSet<String> = HashSet::new();

        info!(url = %query_url, "Browsing catalog listing");

        let first = match self.fetch_text(&format!("{query_url}&p=1")).await {
            Ok(text) => text,
            Err(e) => {
                // A lost first page is still a skipped page: callers use
                // an empty skip list as proof of a complete pass
                warn!(error = %e, "Failed to fetch first listing page");
                snapshot.skipped_pages.push(1);
                return Ok(snapshot);
            }
        };
        let total_pages = parse_total_pages(&first);
        info!(total_pages = total_pages, "Detected listing page count");

        for page in 1..=total_pages {
            if cancel.is_cancelled() {
                info!(page = page, "Catalog fetch cancelled, keeping partial results");
                break;
            }

            let text = if page == 1 {
                first.clone()
            } else {
                tokio::time::sleep(self.request_delay).await;
                match self.fetch_text(&format!("{query_url}&p={page}")).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(page = page, error = %e, "Failed to fetch listing page, skipping");
                        snapshot.skipped_pages.push(page);
                        continue;
                    }
                }
            };

            let rows = parse_listing_rows(&text, &self.base_url);
            debug!(page = page, rows = rows.len(), "Parsed listing page");

            for row in rows {
                self.resolve_row(row, &mut seen, &mut snapshot.entries).await;
            }
            snapshot.last_checked_page = page;
        }

        info!(entries = snapshot.entries.len(), "Catalog walk complete");
        Ok(snapshot)
    }

    /// Resolve one row to an entry, applying the quality gate and the
    /// detail-page fallback. Rows without an extractable identity are
    /// dropped silently; that is the expected high-frequency case.
    async fn resolve_row(
        &self,
        row: ListingRow,
        seen: &mut HashSet<String>,
        entries: &mut Vec<RemoteEntry>,
    ) {
        let checksum = if extract_checksum(&row.title).is_some() {
            // Title carries a token: the gate decides, no fallback
            gated_checksum(&self.gate, &row.title)
        } else {
            self.checksum_from_detail_page(&row.page_link).await
        };

        let Some(checksum) = checksum else { return };
        if !seen.insert(checksum.clone()) {
            return;
        }
        entries.push(RemoteEntry {
            checksum,
            title: row.title,
            page_link: row.page_link,
            magnet: row.magnet,
        });
    }

    /// File-list fallback: fetch the torrent detail page and scan its
    /// listed filenames for a gated identity.
    async fn checksum_from_detail_page(&self, page_link: &str) -> Option<String> {
        tokio::time::sleep(self.request_delay).await;
        let text = match self.fetch_text(page_link).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = %page_link, error = %e, "Failed to fetch torrent detail page");
                return None;
            }
        };
        let filenames = parse_file_list(&text);
        gated_checksum_from_filenames(&self.gate, filenames.iter().map(String::as_str))
    }

    /// Search the listing for a checksum and return its entry only when
    /// the match is unambiguous. Identity lookup, not quality filtering:
    /// the gate does not apply here.
    pub async fn entry_for_checksum(&self, crc32: &str) -> Result<Option<RemoteEntry>> {
        let url = format!("{}&o=asc", self.search_url(crc32));
        let text = self
            .fetch_text(&url)
            .await
            .with_context(|| format!("failed to search listing for {crc32}"))?;

        let wanted = crc32.to_uppercase();
        let mut matched: Vec<RemoteEntry> = parse_listing_rows(&text, &self.base_url)
            .into_iter()
            .filter(|row| extract_checksum(&row.title).as_deref() == Some(wanted.as_str()))
            .map(|row| RemoteEntry {
                checksum: wanted.clone(),
                title: row.title,
                page_link: row.page_link,
                magnet: row.magnet,
            })
            .collect();

        match matched.len() {
            1 => Ok(matched.pop()),
            0 => {
                warn!(crc32 = %wanted, "No listing entry found for checksum");
                Ok(None)
            }
            n => {
                warn!(crc32 = %wanted, matches = n, "Ambiguous checksum search, ignoring");
                Ok(None)
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("unexpected status {status} for {url}");
        }
        Ok(response.text().await?)
    }
}

/// Read the total page count from the pagination controls. A listing
/// without controls is a single page.
fn parse_total_pages(html_text: &str) -> u32 {
    let document = Html::parse_document(html_text);
    document
        .select(&PAGINATION_SELECTOR)
        .filter_map(|a| {
            let text: String = a.text().collect::<String>().trim().to_string();
            text.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(1)
}

/// Extract (title, detail link, magnet) from every row of the torrent
/// table. Rows without a titled `/view/` link are not releases.
fn parse_listing_rows(html_text: &str, base_url: &str) -> Vec<ListingRow> {
    let document = Html::parse_document(html_text);
    let Some(table) = document.select(&TABLE_SELECTOR).next() else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for tr in table.select(&ROW_SELECTOR) {
        let mut title_link: Option<ElementRef> = None;
        let mut magnet = None;

        for link in tr.select(&LINK_SELECTOR) {
            let href = link.value().attr("href").unwrap_or("");
            if href.starts_with("/view/") && link.value().attr("title").is_some() {
                title_link = Some(link);
            } else if href.starts_with("magnet:") {
                magnet = Some(href.to_string());
            }
        }

        let Some(link) = title_link else { continue };
        let title = link.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }
        let href = link.value().attr("href").unwrap_or("");
        rows.push(ListingRow {
            title,
            page_link: format!("{base_url}{href}"),
            magnet,
        });
    }
    rows
}

/// Extract filenames from a torrent detail page's file list, handling
/// both the flat single-file layout and the nested folder layout.
fn parse_file_list(html_text: &str) -> Vec<String> {
    let document = Html::parse_document(html_text);
    let Some(filelist) = document.select(&FILELIST_SELECTOR).next() else {
        return Vec::new();
    };

    let has_folders = filelist.select(&FOLDER_SELECTOR).next().is_some();
    let mut filenames = Vec::new();

    if has_folders {
        for ul in filelist.select(&UL_SELECTOR) {
            for li in ul.select(&LI_SELECTOR) {
                // Leaf entries only; folder nodes contain a nested list
                if li.select(&UL_SELECTOR).next().is_some() {
                    continue;
                }
                // Nested lists are visited once per enclosing <ul>
                if let Some(name) = direct_text(&li) {
                    if !filenames.contains(&name) {
                        filenames.push(name);
                    }
                }
            }
        }
    } else if let Some(li) = filelist.select(&LI_SELECTOR).next() {
        if let Some(name) = direct_text(&li) {
            filenames.push(name);
        }
    }

    filenames
}

/// Concatenated direct text children of an element, skipping nested
/// markup such as the file-size badge.
fn direct_text(element: &ElementRef) -> Option<String> {
    let text: String = element
        .children()
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect();
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}
