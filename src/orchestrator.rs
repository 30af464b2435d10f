//! Batch driver: resolves the current academic year, evaluates every
//! enrolled student under a bounded worker pool, and isolates per-student
//! failures so one bad record set never stops the rest of the population.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::engine::{self, EngineError};
use crate::model::BatchSummary;
use crate::store::BadgeStore;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_STUDENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    store: Arc<dyn BadgeStore>,
    workers: usize,
    student_timeout: Duration,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn BadgeStore>) -> Self {
        Self {
            store,
            workers: DEFAULT_WORKERS,
            student_timeout: DEFAULT_STUDENT_TIMEOUT,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_student_timeout(mut self, timeout: Duration) -> Self {
        self.student_timeout = timeout;
        self
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<BatchSummary, EngineError> {
        let year = {
            let store = self.store.clone();
            tokio::task::spawn_blocking(move || store.current_year())
                .await?
                .map_err(EngineError::Aggregation)?
        };
        let Some(year) = year else {
            tracing::info!("no current academic year; nothing to evaluate");
            return Ok(BatchSummary::default());
        };

        let students = {
            let store = self.store.clone();
            let year_id = year.id.clone();
            tokio::task::spawn_blocking(move || store.students(&year_id))
                .await?
                .map_err(EngineError::Aggregation)?
        };

        let mut summary = BatchSummary {
            year_id: Some(year.id.clone()),
            students: students.len(),
            ..BatchSummary::default()
        };

        let pool = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for student in students {
            let store = self.store.clone();
            let year_id = year.id.clone();
            let pool = pool.clone();
            let student_timeout = self.student_timeout;
            let student_id = student.id.clone();
            tasks.spawn(async move {
                let permit = match pool.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return (student_id, Err(EngineError::PoolClosed)),
                };
                let result = tokio::time::timeout(
                    student_timeout,
                    engine::evaluate_student(store, &year_id, student, now),
                )
                .await
                .unwrap_or(Err(EngineError::Timeout));
                drop(permit);
                (student_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    summary.succeeded += 1;
                    summary.awards_granted += outcome.new_awards;
                }
                Ok((student_id, Err(e))) => {
                    summary.failed += 1;
                    tracing::warn!(student = %student_id, error = %e, "student evaluation failed");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(error = %e, "student evaluation task panicked");
                }
            }
        }

        tracing::info!(
            year = %year.id,
            students = summary.students,
            succeeded = summary.succeeded,
            failed = summary.failed,
            awards = summary.awards_granted,
            "badge batch finished"
        );
        Ok(summary)
    }

    /// Sync entry for the IPC surface: spins up a runtime for the duration of
    /// one batch. The batch fires roughly once a day, so runtime construction
    /// cost is irrelevant.
    pub fn run_blocking(&self, now: DateTime<Utc>) -> anyhow::Result<BatchSummary> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .build()?;
        Ok(runtime.block_on(self.run(now))?)
    }
}
