//! The pipeline manager (§4.4): a bounded worker pool running scrape and
//! refresh jobs, one active job per version, with cooperative cancellation
//! and a broadcast event feed for subscribers (the operator HTTP surface).
//!
//! Generalizes the teacher's request-scoped concurrency (a semaphore guarding
//! outbound fetches for the lifetime of one HTTP call) into a long-lived
//! worker pool guarding whole crawl jobs for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, Semaphore};
use tracing::warn;
use uuid::Uuid;

use crate::core::cancel::CancelToken;
use crate::core::config::SchedulerFileConfig;
use crate::core::errors::{AppError, AppResult};
use crate::core::types::{JobEvent, JobInfo, ScraperOptions, VersionStatus};
use crate::crawler;
use crate::embedder::Embedder;
use crate::fetcher::auto::AutoFetcher;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Scrape,
    Refresh,
}

#[derive(Clone)]
struct JobRecord {
    job_id: String,
    version_id: String,
    library: String,
    version: String,
    kind: JobKind,
    cancel: CancelToken,
}

struct SchedulerState {
    jobs: HashMap<String, JobRecord>,
    active_versions: HashMap<String, String>, // version_id -> job_id
}

pub struct Scheduler {
    store: Arc<Store>,
    fetcher: AutoFetcher,
    embedder: Option<Arc<dyn Embedder>>,
    semaphore: Arc<Semaphore>,
    events_tx: broadcast::Sender<JobEvent>,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        http_client: reqwest::Client,
        embedder: Option<Arc<dyn Embedder>>,
        config: &SchedulerFileConfig,
    ) -> Arc<Self> {
        let (events_tx, _rx) = broadcast::channel(1024);
        Arc::new(Self {
            store,
            fetcher: AutoFetcher::new(http_client),
            embedder,
            semaphore: Arc::new(Semaphore::new(config.resolve_max_concurrency().max(1))),
            events_tx,
            state: Mutex::new(SchedulerState {
                jobs: HashMap::new(),
                active_versions: HashMap::new(),
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events_tx.subscribe()
    }

    /// Enqueues a scrape for `library`/`version` starting from `url`. If a
    /// job is already active for this version, returns its existing job id
    /// instead of starting a second one (§4.4 "at most one active job per
    /// version").
    pub async fn enqueue_scrape(
        self: &Arc<Self>,
        library: &str,
        version: Option<&str>,
        url: String,
        options: ScraperOptions,
    ) -> AppResult<String> {
        options.validate().map_err(AppError::Validation)?;
        let version_id = self.store.resolve_version(library, version).await?;

        {
            let state = self.state.lock().await;
            if let Some(job_id) = state.active_versions.get(&version_id) {
                return Ok(job_id.clone());
            }
        }

        let current = self.store.get_version(&version_id).await?;
        if !current.status.can_transition_to(VersionStatus::Queued) {
            return Err(AppError::IllegalTransition {
                from: current.status.to_string(),
                to: VersionStatus::Queued.to_string(),
            });
        }
        self.store.update_version_status(&version_id, VersionStatus::Queued, None).await?;

        let job_id = Uuid::new_v4().to_string();
        let record = JobRecord {
            job_id: job_id.clone(),
            version_id: version_id.clone(),
            library: library.to_string(),
            version: current.name.clone(),
            kind: JobKind::Scrape,
            cancel: CancelToken::new(),
        };

        {
            let mut state = self.state.lock().await;
            state.active_versions.insert(version_id.clone(), job_id.clone());
            state.jobs.insert(job_id.clone(), record.clone());
        }
        let _ = self.events_tx.send(JobEvent::JobEnqueued {
            version_id: version_id.clone(),
            job_id: job_id.clone(),
        });

        self.spawn(record, VersionStatus::Queued, JobBody::Scrape { url, options });
        Ok(job_id)
    }

    /// Enqueues a refresh of an already-completed version. Only legal from
    /// `COMPLETED` (§4.5).
    pub async fn enqueue_refresh(self: &Arc<Self>, library: &str, version: Option<&str>) -> AppResult<String> {
        let version_id = self.store.resolve_version(library, version).await?;

        {
            let state = self.state.lock().await;
            if let Some(job_id) = state.active_versions.get(&version_id) {
                return Ok(job_id.clone());
            }
        }

        let current = self.store.get_version(&version_id).await?;
        if current.status != VersionStatus::Completed {
            return Err(AppError::Validation(format!(
                "cannot refresh version in status {}, must be completed",
                current.status
            )));
        }
        self.store.update_version_status(&version_id, VersionStatus::Updating, None).await?;

        let job_id = Uuid::new_v4().to_string();
        let record = JobRecord {
            job_id: job_id.clone(),
            version_id: version_id.clone(),
            library: library.to_string(),
            version: current.name.clone(),
            kind: JobKind::Refresh,
            cancel: CancelToken::new(),
        };

        {
            let mut state = self.state.lock().await;
            state.active_versions.insert(version_id.clone(), job_id.clone());
            state.jobs.insert(job_id.clone(), record.clone());
        }
        let _ = self.events_tx.send(JobEvent::JobEnqueued {
            version_id: version_id.clone(),
            job_id: job_id.clone(),
        });

        self.spawn(record, VersionStatus::Updating, JobBody::Refresh);
        Ok(job_id)
    }

    /// Cooperative cancellation: flips the job's token. The worker observes
    /// it at the next suspension point and moves the version to `CANCELLED`.
    pub async fn cancel_job(&self, job_id: &str) -> AppResult<()> {
        let state = self.state.lock().await;
        let record = state
            .jobs
            .get(job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;
        record.cancel.cancel();
        Ok(())
    }

    pub async fn get_job_info(&self, job_id: Option<&str>) -> AppResult<Vec<JobInfo>> {
        let records: Vec<JobRecord> = {
            let state = self.state.lock().await;
            match job_id {
                Some(id) => state
                    .jobs
                    .get(id)
                    .cloned()
                    .map(|r| vec![r])
                    .ok_or_else(|| AppError::NotFound(format!("job {id}")))?,
                None => state.jobs.values().cloned().collect(),
            }
        };

        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let version = self.store.get_version(&record.version_id).await?;
            out.push(JobInfo {
                job_id: record.job_id,
                library: record.library,
                version: record.version,
                status: version.status,
                pages: version.progress_pages,
                max_pages: version.progress_max_pages,
                error_message: version.error_message,
                started_at: version.started_at,
            });
        }
        Ok(out)
    }

    /// Drops every job whose version has reached a terminal status. Returns
    /// the number removed.
    pub async fn clear_completed_jobs(&self) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let mut terminal_ids = Vec::new();
        for (job_id, record) in state.jobs.iter() {
            let version = self.store.get_version(&record.version_id).await?;
            if !version.status.is_active() {
                terminal_ids.push(job_id.clone());
            }
        }
        for job_id in &terminal_ids {
            state.jobs.remove(job_id);
        }
        Ok(terminal_ids.len())
    }

    /// Startup recovery (§4.4): any version left in QUEUED/RUNNING/UPDATING
    /// from a prior process (crash, restart) is reset to QUEUED and
    /// re-enqueued as a fresh job. RUNNING/QUEUED versions resume as plain
    /// scrapes from their recorded `source_url`; UPDATING versions resume as
    /// refreshes.
    pub async fn recover_orphaned_jobs(self: &Arc<Self>) -> AppResult<()> {
        for status in [VersionStatus::Queued, VersionStatus::Running, VersionStatus::Updating] {
            let orphaned = self.store.get_versions_by_status(status).await?;
            for version in orphaned {
                let kind = if status == VersionStatus::Updating {
                    JobKind::Refresh
                } else {
                    JobKind::Scrape
                };

                self.store.force_reset_to_queued(&version.id).await?;

                let Some(source_url) = version.source_url.clone() else {
                    warn!("recovery: version {} has no source_url, skipping", version.id);
                    continue;
                };
                let options = version.scraper_options.clone().unwrap_or_default();
                let library = self.store.get_library_name(&version.library_id).await.unwrap_or_default();

                let job_id = Uuid::new_v4().to_string();
                let record = JobRecord {
                    job_id: job_id.clone(),
                    version_id: version.id.clone(),
                    library,
                    version: version.name.clone(),
                    kind,
                    cancel: CancelToken::new(),
                };

                {
                    let mut state = self.state.lock().await;
                    state.active_versions.insert(version.id.clone(), job_id.clone());
                    state.jobs.insert(job_id.clone(), record.clone());
                }
                let _ = self.events_tx.send(JobEvent::JobEnqueued {
                    version_id: version.id.clone(),
                    job_id,
                });

                let body = match kind {
                    JobKind::Refresh => JobBody::Refresh,
                    JobKind::Scrape => JobBody::Scrape { url: source_url, options },
                };
                self.spawn(record, VersionStatus::Queued, body);
            }
        }
        Ok(())
    }

    fn spawn(self: &Arc<Self>, record: JobRecord, pending_status: VersionStatus, body: JobBody) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.execute(record, pending_status, body).await;
        });
    }

    async fn execute(self: Arc<Self>, record: JobRecord, pending_status: VersionStatus, body: JobBody) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let mut old_status = pending_status;

        if record.cancel.is_cancelled() {
            let _ = self.store.update_version_status(&record.version_id, VersionStatus::Cancelled, None).await;
        } else {
            match self.store.update_version_status(&record.version_id, VersionStatus::Running, None).await {
                Ok(_) => {
                    let _ = self.events_tx.send(JobEvent::JobStatusChange {
                        version_id: record.version_id.clone(),
                        old: pending_status,
                        new: VersionStatus::Running,
                        error: None,
                    });
                    old_status = VersionStatus::Running;

                    let result = match &body {
                        JobBody::Scrape { url, options } => {
                            crawler::scrape::run(
                                &self.store,
                                &self.fetcher,
                                self.embedder.as_ref(),
                                &record.version_id,
                                url,
                                options,
                                &record.cancel,
                                &self.events_tx,
                            )
                            .await
                        }
                        JobBody::Refresh => {
                            crawler::refresh::run(
                                &self.store,
                                &self.fetcher,
                                self.embedder.as_ref(),
                                &record.version_id,
                                &self.events_tx,
                                &record.cancel,
                            )
                            .await
                        }
                    };

                    if let Err(e) = result {
                        warn!("job {} for version {} errored: {}", record.job_id, record.version_id, e);
                        let _ = self
                            .store
                            .update_version_status(&record.version_id, VersionStatus::Failed, Some(&e.to_string()))
                            .await;
                    }
                }
                Err(e) => {
                    warn!("job {} could not transition to running: {}", record.job_id, e);
                }
            }
        }

        let final_status = self
            .store
            .get_version(&record.version_id)
            .await
            .map(|v| (v.status, v.error_message))
            .unwrap_or((VersionStatus::Failed, None));

        let _ = self.events_tx.send(JobEvent::JobStatusChange {
            version_id: record.version_id.clone(),
            old: old_status,
            new: final_status.0,
            error: final_status.1,
        });
        let _ = self.events_tx.send(JobEvent::LibraryChange);

        let mut state = self.state.lock().await;
        state.active_versions.remove(&record.version_id);
    }
}

enum JobBody {
    Scrape { url: String, options: ScraperOptions },
    Refresh,
}
