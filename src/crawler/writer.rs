//! Write worker: the only mutator of crawl state
//!
//! Runs on a blocking thread, receives page results from every host worker,
//! applies them in batches of up to `batch_size` per transaction, and feeds
//! newly discovered URLs back to the [`HostScheduler`].

use crate::crawler::dedup::DedupIndex;
use crate::crawler::fetcher::PageResult;
use crate::crawler::scheduler::HostScheduler;
use crate::state::PageState;
use crate::storage::{ContentRecord, PageMeta, Storage, StorageResult, StorageTx, UrlRecord};
use crate::url::host_key;
use std::collections::HashMap;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, trace};
use url::Url;

/// Summary of what the write worker did during one crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Page results received from host workers
    pub results_received: usize,
    /// Results whose terminal PageMeta was committed
    pub pages_written: usize,
    pub committed_batches: usize,
    /// Batches rolled back after a store error
    pub failed_batches: usize,
}

/// Single consumer of the results channel
pub struct WriteWorker<S: Storage> {
    store: S,
    scheduler: HostScheduler,
    dedup: DedupIndex,
    /// Host key -> host id of every participating host
    hosts: HashMap<String, i64>,
    batch_size: usize,
    report: CrawlReport,
}

/// What a batch did, handed to the scheduler once it commits
#[derive(Default)]
struct BatchOutcome {
    written: usize,
    /// Newly discovered URLs of configured hosts
    offers: Vec<(i64, String)>,
    /// URLs of configured hosts that got their PageMeta in this batch
    resolved: Vec<(i64, String)>,
}

impl<S: Storage> WriteWorker<S> {
    pub fn new(
        store: S,
        scheduler: HostScheduler,
        dedup: DedupIndex,
        hosts: HashMap<String, i64>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            scheduler,
            dedup,
            hosts,
            batch_size: batch_size.max(1),
            report: CrawlReport::default(),
        }
    }

    /// Consumes results until every sender is gone
    ///
    /// Must run on a thread where blocking is allowed (e.g. under
    /// `tokio::task::spawn_blocking`). Returns the store so callers can
    /// inspect it after the crawl.
    pub fn run(mut self, mut results: Receiver<PageResult>) -> (CrawlReport, S) {
        while let Some(first) = results.blocking_recv() {
            let mut batch = vec![first];
            while batch.len() < self.batch_size {
                match results.try_recv() {
                    Ok(result) => batch.push(result),
                    Err(_) => break,
                }
            }
            self.report.results_received += batch.len();

            match self.write_batch(&batch) {
                Ok(outcome) => {
                    self.dedup.commit();
                    self.report.committed_batches += 1;
                    self.report.pages_written += outcome.written;
                    info!(
                        "Committed batch of {} results ({} pages written)",
                        batch.len(),
                        outcome.written
                    );
                    for (host_id, url) in outcome.resolved {
                        if self.scheduler.forget(host_id, &url) {
                            debug!("{} resolved by a redirect, dropped from backlog", url);
                        }
                    }
                    for (host_id, url) in outcome.offers {
                        self.scheduler.offer(host_id, &url);
                    }
                }
                Err(e) => {
                    self.dedup.discard();
                    self.report.failed_batches += 1;
                    error!(
                        "Write batch of {} results failed and was rolled back: {}",
                        batch.len(),
                        e
                    );
                    for result in &batch {
                        debug!("Lost result for {} (stays unloaded)", result.url);
                    }
                }
            }

            for result in &batch {
                self.scheduler.complete(result.host_id);
                self.scheduler.top_up();
            }
        }

        info!(
            "Write worker finished: {} results, {} pages written, {} batches committed, {} failed",
            self.report.results_received,
            self.report.pages_written,
            self.report.committed_batches,
            self.report.failed_batches
        );

        (self.report, self.store)
    }

    /// Applies a batch inside one transaction
    fn write_batch(&mut self, batch: &[PageResult]) -> StorageResult<BatchOutcome> {
        let mut tx = self.store.transaction()?;
        let mut outcome = BatchOutcome::default();

        for result in batch {
            apply_result(&mut tx, &mut self.dedup, &self.hosts, result, &mut outcome)?;
        }

        tx.commit()?;
        Ok(outcome)
    }
}

/// Looks up the configured host a URL belongs to
fn host_id_of(hosts: &HashMap<String, i64>, url: &str) -> Option<i64> {
    let parsed = Url::parse(url).ok()?;
    hosts.get(&host_key(&parsed)?).copied()
}

/// Applies one page result to an open transaction
///
/// Redirect hops are written first, in order, each pointing at the previous
/// one. The final URL is skipped when it already has a PageMeta. A chain
/// that ends in `Redirect` continues on another configured host: its target
/// stays unloaded and is offered to that host instead of being resolved
/// here.
fn apply_result<T: StorageTx>(
    tx: &mut T,
    dedup: &mut DedupIndex,
    hosts: &HashMap<String, i64>,
    result: &PageResult,
    outcome: &mut BatchOutcome,
) -> StorageResult<()> {
    let mut referer: Option<i64> = None;

    for (depth, hop) in result.hops.iter().enumerate() {
        let hop_host = host_id_of(hosts, &hop.url);
        tx.insert_url(&UrlRecord::discovered(&hop.url, hop_host, None))?;

        if let Some(existing) = tx.meta_id(&hop.url)? {
            referer = Some(existing);
            continue;
        }

        let id = tx.next_page_id()?;
        tx.put_meta(&PageMeta {
            id,
            url_id: hop.url.clone(),
            state: PageState::Redirect,
            status_code: Some(hop.status_code),
            origin: None,
            redirect_depth: depth as u32,
            referer_id: referer,
        })?;
        tx.mark_loaded(&hop.url, referer)?;
        if let Some(host_id) = hop_host {
            outcome.resolved.push((host_id, hop.url.clone()));
        }
        referer = Some(id);
    }

    let final_url = &result.final_url;
    let final_host = host_id_of(hosts, final_url);

    if result.state == PageState::Redirect {
        if tx.insert_url(&UrlRecord::discovered(final_url, final_host, referer))? {
            if let Some(host_id) = final_host {
                debug!("Redirect target {} handed to host {}", final_url, host_id);
                outcome.offers.push((host_id, final_url.clone()));
            }
        }
        return Ok(());
    }

    tx.insert_url(&UrlRecord::discovered(final_url, final_host, None))?;

    if tx.meta_id(final_url)?.is_some() {
        debug!("{} already resolved, result ignored", final_url);
        return Ok(());
    }

    let id = tx.next_page_id()?;
    let mut state = result.state;
    let mut origin = None;

    if state == PageState::Success {
        if let Some(content) = &result.content {
            if let Some(first) = dedup.lookup(&content.hash) {
                state = PageState::Duplicate;
                origin = Some(first);
            }
        }
    }

    tx.put_meta(&PageMeta {
        id,
        url_id: final_url.clone(),
        state,
        status_code: result.status_code,
        origin,
        redirect_depth: result.hops.len() as u32,
        referer_id: referer,
    })?;

    if state == PageState::Success {
        if let Some(content) = &result.content {
            tx.put_content(&ContentRecord {
                page_id: id,
                hash: content.hash.clone(),
                body: content.body.clone(),
                title: content.title.clone(),
            })?;
            dedup.stage(&content.hash, id);
        }
    }

    tx.mark_loaded(final_url, referer)?;
    trace!("{} -> {} (page {})", final_url, state, id);
    outcome.written += 1;
    if let Some(host_id) = final_host {
        outcome.resolved.push((host_id, final_url.clone()));
    }

    if state.follows_links() {
        for (link, host) in &result.links {
            let link_host = hosts.get(host).copied();
            if tx.insert_url(&UrlRecord::discovered(link, link_host, Some(id)))? {
                if let Some(host_id) = link_host {
                    outcome.offers.push((host_id, link.clone()));
                }
            }
        }
    }

    Ok(())
}
