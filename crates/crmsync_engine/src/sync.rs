//! The sync orchestrator.
//!
//! Drives one entity through catalog sync, schema evolution, paginated
//! upserts and deletion reconciliation, and decides what a full or
//! incremental run does when local and remote counts disagree.

use crate::catalog::FieldCatalog;
use crate::coerce::{coerce_record, FieldMap};
use crate::config::SyncConfig;
use crate::context::{EntityTarget, TenantContext};
use crate::cursor::SyncCursor;
use crate::error::{SyncError, SyncResult};
use crate::run_log::{RunLogEntry, RunOutcome};
use crate::schema::SchemaEvolver;
use chrono::{DateTime, FixedOffset, Local, Offset, TimeDelta, Utc};
use crmsync_remote::{record_id, ListPage};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use tracing::{debug, error, info, warn};

/// Which kind of run to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Full pass if the physical table is missing, incremental otherwise.
    Auto,
    /// Unrestricted pass with divergence checks.
    Full,
    /// Deletion sweep plus records changed within the window.
    Incremental {
        /// Window size in hours.
        hours: u32,
    },
}

/// Result of a full identifier sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionSweep {
    /// Distinct identifiers seen remotely.
    pub observed: u64,
    /// Local rows removed.
    pub removed: u64,
}

/// How a full attempt ended, short of an error.
enum FullCheck {
    Exact { local: u64 },
    Adjusted { local: u64, diff: u64 },
}

/// Synchronizes one entity of one tenant.
pub struct SyncOrchestrator<'a> {
    ctx: &'a TenantContext,
    target: &'a EntityTarget,
}

impl<'a> SyncOrchestrator<'a> {
    /// Creates an orchestrator for one entity.
    pub fn new(ctx: &'a TenantContext, target: &'a EntityTarget) -> Self {
        Self { ctx, target }
    }

    /// The entity's field catalog.
    pub fn catalog(&self) -> FieldCatalog<'a> {
        FieldCatalog::new(self.ctx, self.target)
    }

    /// The entity's schema evolver.
    pub fn evolver(&self) -> SchemaEvolver<'a> {
        SchemaEvolver::new(self.ctx, self.target)
    }

    fn config(&self) -> &SyncConfig {
        self.ctx.config()
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Paginates the remote records matching `filter` and upserts them.
    ///
    /// The catalog and physical schema are brought up to date first. An
    /// unrestricted, unlimited pass also removes local rows whose identifiers
    /// were not seen. Returns the number of records processed.
    pub fn sync_data(&self, filter: &Map<String, Value>, limit: Option<u64>) -> SyncResult<u64> {
        self.catalog().sync_field_mapping()?;
        self.evolver().update_physical_schema()?;

        let store = self.ctx.store();
        let table = self.target.data_table();
        store.ensure_data_table(&table)?;

        let fields = FieldMap::from_descriptors(&self.catalog().active_fields()?);
        let select = fields.select_list();
        let filtered = !filter.is_empty();
        let progress_every = self.config().progress_every.max(1);

        let mut processed = 0u64;
        let cursor = self.paginate(&select, filter, |id, item| {
            let values = match item.as_object() {
                Some(record) => coerce_record(record, &fields),
                None => Vec::new(),
            };
            store.upsert_row(&table, id, &values)?;
            processed += 1;

            if filtered && processed % progress_every == 0 {
                info!(entity = %self.target.table_base_name, processed, "progress");
            }
            if limit.is_some_and(|limit| processed >= limit) {
                return Ok(ControlFlow::Break(()));
            }
            Ok(ControlFlow::Continue(()))
        })?;

        if !filtered && limit.is_none() {
            self.reconcile(&cursor.collected_ids);
        }

        debug!(
            tenant = %self.ctx.tenant(),
            entity = %self.target.table_base_name,
            processed,
            "data pass finished"
        );
        Ok(processed)
    }

    /// Sweeps every remote identifier and removes local rows not among them.
    pub fn sync_deleted(&self) -> SyncResult<DeletionSweep> {
        let select = vec![self.target.kind.id_key().to_string()];
        let cursor = self.paginate(&select, &Map::new(), |_, _| Ok(ControlFlow::Continue(())))?;
        Ok(DeletionSweep {
            observed: cursor.observed(),
            removed: self.reconcile(&cursor.collected_ids),
        })
    }

    /// Number of remote records matching `filter`.
    pub fn remote_total(&self, filter: &Map<String, Value>) -> SyncResult<u64> {
        let kind = &self.target.kind;
        let params = kind.list_params(&["id".to_string()], filter);
        let response = self.call_with_retry(kind.list_method(), &params)?;
        Ok(ListPage::from_response(&response).total.unwrap_or(0))
    }

    /// Number of local rows; zero before the table exists.
    pub fn local_total(&self) -> SyncResult<u64> {
        let store = self.ctx.store();
        let table = self.target.data_table();
        if !store.table_exists(&table)? {
            return Ok(0);
        }
        Ok(store.count_rows(&table)?)
    }

    // =========================================================================
    // Runs
    // =========================================================================

    /// Runs according to `mode`. Never fails; the outcome is logged.
    pub fn run(&self, mode: SyncMode) -> RunOutcome {
        match mode {
            SyncMode::Full => self.run_full(),
            SyncMode::Incremental { hours } => self.run_incremental(hours),
            SyncMode::Auto => match self.ctx.store().table_exists(&self.target.data_table()) {
                Ok(true) => self.run_incremental(self.config().incremental_window_hours),
                Ok(false) => {
                    info!(entity = %self.target.table_base_name, "no physical table yet, running full pass");
                    self.run_full()
                }
                Err(e) => self.finish(Local::now(), RunOutcome::error(0, e.to_string())),
            },
        }
    }

    /// Full pass with divergence handling.
    ///
    /// Exact counts succeed. A small divergence gets one corrective pass and
    /// succeeds. A larger one restarts the full pass until the attempt cap,
    /// then fails.
    pub fn run_full(&self) -> RunOutcome {
        let started = Local::now();
        let attempts = self.config().full_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match self.full_attempt() {
                Ok(FullCheck::Exact { local }) => RunOutcome::ok(local, None),
                Ok(FullCheck::Adjusted { local, diff }) => {
                    RunOutcome::ok(local, Some(format!("(adjusted +{diff})")))
                }
                Err(e @ SyncError::IntegrityDivergence { .. }) => {
                    let diff = e.divergence().unwrap_or_default();
                    if attempt < attempts {
                        warn!(
                            tenant = %self.ctx.tenant(),
                            entity = %self.target.table_base_name,
                            attempt,
                            diff,
                            "high divergence, restarting full pass"
                        );
                        attempt += 1;
                        continue;
                    }
                    let local = match e {
                        SyncError::IntegrityDivergence { local, .. } => local,
                        _ => 0,
                    };
                    RunOutcome::error(local, format!("persistent divergence ({diff})"))
                }
                Err(e) => RunOutcome::error(0, e.to_string()),
            };
            return self.finish(started, outcome);
        }
    }

    /// Incremental pass, escalating to a full pass when rows are missing.
    pub fn run_incremental(&self, hours: u32) -> RunOutcome {
        let started = Local::now();
        match self.incremental_attempt(hours) {
            Ok((remote, local)) if local < remote => {
                warn!(
                    tenant = %self.ctx.tenant(),
                    entity = %self.target.table_base_name,
                    local,
                    remote,
                    "replica incomplete, escalating to full pass"
                );
                self.run_full()
            }
            Ok((_, local)) => self.finish(started, RunOutcome::ok(local, Some("(incremental)".into()))),
            Err(e) => self.finish(started, RunOutcome::error(0, e.to_string())),
        }
    }

    fn full_attempt(&self) -> SyncResult<FullCheck> {
        self.sync_data(&Map::new(), None)?;
        let remote = self.remote_total(&Map::new())?;
        let local = self.local_total()?;
        let diff = remote.abs_diff(local);

        if diff == 0 {
            return Ok(FullCheck::Exact { local });
        }
        if diff > self.config().corrective_threshold {
            return Err(SyncError::IntegrityDivergence { remote, local });
        }

        info!(entity = %self.target.table_base_name, diff, "small divergence, running corrective pass");
        let mut corrective = Map::new();
        corrective.insert(format!(">{}", self.target.kind.id_key()), json!(0));
        self.sync_data(&corrective, None)?;
        Ok(FullCheck::Adjusted {
            local: self.local_total()?,
            diff,
        })
    }

    fn incremental_attempt(&self, hours: u32) -> SyncResult<(u64, u64)> {
        let sweep = self.sync_deleted()?;
        debug!(entity = %self.target.table_base_name, observed = sweep.observed, removed = sweep.removed, "deletion sweep");

        let since = changed_since(Utc::now(), hours, self.config().utc_offset_hours);
        let mut filter = Map::new();
        filter.insert(format!(">{}", self.target.kind.updated_field()), json!(since));
        self.sync_data(&filter, None)?;

        Ok((self.remote_total(&Map::new())?, self.local_total()?))
    }

    fn finish(&self, started: DateTime<Local>, outcome: RunOutcome) -> RunOutcome {
        let entry = RunLogEntry {
            tenant: self.ctx.tenant().to_string(),
            entity: self.target.table_base_name.clone(),
            started,
            finished: Local::now(),
            outcome,
        };

        if entry.outcome.is_ok() {
            info!(tenant = %entry.tenant, entity = %entry.entity, total = entry.outcome.count, detail = ?entry.outcome.detail, "run finished");
        } else {
            error!(tenant = %entry.tenant, entity = %entry.entity, total = entry.outcome.count, detail = ?entry.outcome.detail, "run failed");
        }
        if let Err(e) = self.ctx.run_log().append(&entry) {
            warn!(error = %e, "failed to write run log");
        }
        entry.outcome
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Walks the remote listing by ascending identifier.
    ///
    /// Stops on an empty or short page, when the watermark stalls, or when
    /// `on_item` breaks.
    fn paginate<F>(
        &self,
        select: &[String],
        filter: &Map<String, Value>,
        mut on_item: F,
    ) -> SyncResult<SyncCursor>
    where
        F: FnMut(i64, &Value) -> SyncResult<ControlFlow<()>>,
    {
        let kind = &self.target.kind;
        let watermark_key = format!(">{}", kind.id_key());
        let mut cursor = SyncCursor::new(self.config().page_size);

        loop {
            let mut page_filter = filter.clone();
            page_filter.insert(watermark_key.clone(), json!(cursor.last_seen_id));
            let mut params = kind.list_params(select, &page_filter);
            params["start"] = json!(-1);

            let response = self.call_with_retry(kind.list_method(), &params)?;
            let page = ListPage::from_response(&response);
            if page.is_empty() {
                break;
            }

            for item in &page.items {
                let Some(id) = record_id(item) else {
                    continue;
                };
                cursor.observe(id);
                if on_item(id, item)?.is_break() {
                    return Ok(cursor);
                }
            }

            if !cursor.advance(&page) {
                warn!(
                    entity = %self.target.table_base_name,
                    last_seen_id = cursor.last_seen_id,
                    "watermark did not advance, stopping"
                );
                break;
            }

            self.respect_rate_limit(&page);

            if cursor.is_last_page(&page) {
                break;
            }
            let pause = self.config().pacing.pause_for(self.ctx.plan());
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }

        Ok(cursor)
    }

    fn respect_rate_limit(&self, page: &ListPage) {
        let wait = self.config().pacing.rate_limit_wait(
            page.operating,
            page.operating_reset_at,
            Utc::now().timestamp(),
        );
        if let Some(wait) = wait {
            warn!(
                operating = ?page.operating,
                wait_secs = wait.as_secs(),
                "remote operating time high, waiting for reset"
            );
            std::thread::sleep(wait);
        }
    }

    fn call_with_retry(&self, method: &str, params: &Value) -> SyncResult<Value> {
        let retry = &self.config().retry;
        let mut retries = 0;
        loop {
            let err = match self.ctx.remote().call(method, params) {
                Ok(response) => return Ok(response),
                Err(e) => SyncError::from(e),
            };
            if !err.is_retryable() || retries >= retry.max_retries {
                return Err(err);
            }
            retries += 1;
            warn!(method, retries, error = %err, "time limit reached, retrying");
            std::thread::sleep(retry.delay);
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Deletes local rows absent from `observed`. Failures are logged and
    /// leave the table untouched.
    fn reconcile(&self, observed: &BTreeSet<i64>) -> u64 {
        if observed.is_empty() {
            return 0;
        }
        let table = self.target.data_table();
        match self.ctx.store().reconcile_ids(&table, observed) {
            Ok(removed) => {
                if removed > 0 {
                    info!(%table, removed, "removed rows deleted remotely");
                }
                removed
            }
            Err(source) => {
                let e = SyncError::Reconciliation { table, source };
                warn!(error = %e, "reconciliation rolled back");
                0
            }
        }
    }
}

/// Renders the lower bound of an incremental window.
///
/// The bound is `now - hours`, formatted as an ISO-8601 timestamp in the
/// given UTC offset, e.g. `2024-05-01T07:00:00-03:00`.
pub fn changed_since(now: DateTime<Utc>, hours: u32, utc_offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    (now - TimeDelta::hours(i64::from(hours)))
        .with_timezone(&offset)
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}
