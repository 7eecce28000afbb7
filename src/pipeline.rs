//! One end-to-end run: collect, dispatch, record the summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::{RelayError, Result};
use crate::collector::{Collection, Collector};
use crate::dispatch::{DispatchReport, Dispatcher, Formatter};
use crate::sources::SourceFailure;
use crate::store::SeenStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub selected: usize,
}

/// Outcome of a finished run, exposed on the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceCount>,
    pub failures: Vec<SourceFailure>,
    pub dispatch: DispatchReport,
}

impl RunSummary {
    pub fn selected(&self) -> usize {
        self.sources.iter().map(|s| s.selected).sum()
    }
}

pub struct Pipeline {
    collector: Collector,
    dispatcher: Dispatcher,
    store: Arc<dyn SeenStore>,
    running: AtomicBool,
    last_run: watch::Sender<Option<RunSummary>>,
}

/// Clears the run flag when a run ends, including on error.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Pipeline {
    pub fn new(collector: Collector, dispatcher: Dispatcher, store: Arc<dyn SeenStore>) -> Self {
        let (last_run, _) = watch::channel(None);
        Self {
            collector,
            dispatcher,
            store,
            running: AtomicBool::new(false),
            last_run,
        }
    }

    pub fn store(&self) -> &Arc<dyn SeenStore> {
        &self.store
    }

    pub fn formatter(&self) -> &Formatter {
        self.dispatcher.formatter()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receiver for the most recent completed run.
    pub fn subscribe(&self) -> watch::Receiver<Option<RunSummary>> {
        self.last_run.subscribe()
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.last_run.borrow().clone()
    }

    fn acquire(&self) -> Result<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RelayError::RunInProgress)?;
        Ok(RunGuard(&self.running))
    }

    /// Collect, deliver and mark. Overlapping calls fail with
    /// [`RelayError::RunInProgress`] instead of delivering twice.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let _guard = self.acquire()?;
        let started_at = Utc::now();
        tracing::info!("run started");

        let collection = self.collector.collect(self.store.as_ref()).await?;
        let dispatch = self
            .dispatcher
            .dispatch(&collection.batch, self.store.as_ref())
            .await?;

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            sources: source_counts(&collection),
            failures: collection.failures,
            dispatch,
        };

        tracing::info!(
            selected = summary.selected(),
            failed_sources = summary.failures.len(),
            delivered = summary.dispatch.delivered,
            "run finished"
        );
        self.last_run.send_replace(Some(summary.clone()));
        Ok(summary)
    }

    /// Run on a separate task. Dropping the handle does not cancel the run,
    /// so a delivered item is always marked before the task ends.
    pub fn spawn_run(self: &Arc<Self>) -> JoinHandle<Result<RunSummary>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run_once().await })
    }

    /// Collect without delivering or marking anything.
    pub async fn preview(&self) -> Result<Collection> {
        let _guard = self.acquire()?;
        self.collector.collect(self.store.as_ref()).await
    }
}

fn source_counts(collection: &Collection) -> Vec<SourceCount> {
    collection
        .batch
        .groups
        .iter()
        .map(|g| SourceCount {
            source: g.source.clone(),
            selected: g.items.len(),
        })
        .collect()
}
