use std::sync::Arc;

use sqlx::MySqlPool;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinSet;

use crate::cancel::CancellationToken;
use crate::error::StoreError;
use crate::meta::MetaDirectory;
use crate::model::{ResolvedSeries, TimeSeries};
use crate::resolver;
use crate::tsid_cache::TsidCache;

use super::{DEFAULT_BATCH_THRESHOLD, DEFAULT_CHANNEL_CAPACITY, DEFAULT_WORKER_COUNT};

/// A sub-batch queued for fetch-TSID processing. `done` carries the first
/// error across all three stages, or `Ok(())` once both forks complete.
struct FetchTsidTask {
    batch: Vec<TimeSeries>,
    done: oneshot::Sender<Result<(), StoreError>>,
}

/// A resolved sub-batch queued for either the update-date or
/// insert-samples pool.
struct ForkTask {
    batch: Arc<Vec<ResolvedSeries>>,
    done: oneshot::Sender<Result<(), StoreError>>,
}

/// Max items a single flush batches before issuing its multi-row statement.
/// Sub-batches are already capped near `DEFAULT_BATCH_THRESHOLD` samples by
/// the splitter, so pool workers flush one sub-batch at a time rather than
/// draining several — unlike the teacher's fixed-shape event ingestion,
/// forcing together unrelated callers' sub-batches here would blur which
/// caller's error channel a SQL failure belongs to.
pub struct IngestPipeline {
    fetch_tsid_tx: mpsc::Sender<FetchTsidTask>,
    cancel: CancellationToken,
    /// The fixed set of long-lived worker loops (update-date, insert-samples,
    /// fetch-tsid). Populated once in `spawn_with` and never touched again
    /// until `shutdown` drains it — nothing else locks this, so draining it
    /// can never contend with a worker trying to add to it.
    pool_tasks: AsyncMutex<JoinSet<()>>,
    /// Per-batch fork-completion forwarders (the task spawned at the bottom
    /// of `fetch_tsid_worker`), tracked separately because workers spawn
    /// into this one at runtime — draining it is only safe once every
    /// `pool_tasks` worker has exited and can no longer add to it.
    completion_tasks: Arc<AsyncMutex<JoinSet<()>>>,
}

impl IngestPipeline {
    /// Build the three worker pools and wire their channels together.
    /// Caches and the pool are shared `Arc`s injected into every worker —
    /// the "correct architectural choice" per spec §9, as opposed to a
    /// module-level global.
    pub fn spawn(
        pool: MySqlPool,
        meta_dir: Arc<MetaDirectory>,
        tsid_cache: Arc<TsidCache>,
    ) -> Self {
        Self::spawn_with(
            pool,
            meta_dir,
            tsid_cache,
            DEFAULT_WORKER_COUNT,
            DEFAULT_CHANNEL_CAPACITY,
        )
    }

    pub fn spawn_with(
        pool: MySqlPool,
        meta_dir: Arc<MetaDirectory>,
        tsid_cache: Arc<TsidCache>,
        worker_count: usize,
        channel_capacity: usize,
    ) -> Self {
        let (update_tx, update_rx) = mpsc::channel::<ForkTask>(channel_capacity);
        let (insert_tx, insert_rx) = mpsc::channel::<ForkTask>(channel_capacity);
        let (fetch_tx, fetch_rx) = mpsc::channel::<FetchTsidTask>(channel_capacity);

        let update_rx = Arc::new(AsyncMutex::new(update_rx));
        let insert_rx = Arc::new(AsyncMutex::new(insert_rx));
        let fetch_rx = Arc::new(AsyncMutex::new(fetch_rx));

        let cancel = CancellationToken::new();
        let completion_tasks = Arc::new(AsyncMutex::new(JoinSet::new()));
        let mut pool_tasks = JoinSet::new();

        for _ in 0..worker_count {
            pool_tasks.spawn(update_date_worker(pool.clone(), update_rx.clone(), cancel.clone()));
        }
        for _ in 0..worker_count {
            pool_tasks.spawn(insert_samples_worker(pool.clone(), insert_rx.clone(), cancel.clone()));
        }
        for _ in 0..worker_count {
            pool_tasks.spawn(fetch_tsid_worker(
                pool.clone(),
                meta_dir.clone(),
                tsid_cache.clone(),
                fetch_rx.clone(),
                update_tx.clone(),
                insert_tx.clone(),
                cancel.clone(),
                completion_tasks.clone(),
            ));
        }

        Self {
            fetch_tsid_tx: fetch_tx,
            cancel,
            pool_tasks: AsyncMutex::new(pool_tasks),
            completion_tasks,
        }
    }

    /// Cancel the root token and drain every worker loop and in-flight
    /// fork-completion forwarder (spec §5: the completion handle that
    /// tracks every spawned worker). Callers already enqueued via
    /// `store_batch` before this runs are still awaited normally; no new
    /// work is accepted once the worker loops observe cancellation.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut pool_tasks = self.pool_tasks.lock().await;
        while pool_tasks.join_next().await.is_some() {}
        drop(pool_tasks);

        let mut completion_tasks = self.completion_tasks.lock().await;
        while completion_tasks.join_next().await.is_some() {}
    }

    /// `BatchStore`: split `batch` along series boundaries (spec §4.6),
    /// enqueue each sub-batch as an independent pipeline task, and wait for
    /// all of them to finish. The caller sees the first error across any
    /// sub-batch, but one sub-batch's failure never aborts its siblings
    /// (spec §5's "independent lifecycle" invariant).
    pub async fn store_batch(&self, batch: Vec<TimeSeries>) -> Result<(), StoreError> {
        self.store_batch_with_threshold(batch, DEFAULT_BATCH_THRESHOLD)
            .await
    }

    pub async fn store_batch_with_threshold(
        &self,
        batch: Vec<TimeSeries>,
        threshold: usize,
    ) -> Result<(), StoreError> {
        let sub_batches = super::split_batch(batch, threshold);

        let mut receivers = Vec::with_capacity(sub_batches.len());
        for sub_batch in sub_batches {
            let (done_tx, done_rx) = oneshot::channel();
            self.fetch_tsid_tx
                .try_send(FetchTsidTask {
                    batch: sub_batch,
                    done: done_tx,
                })
                .map_err(|_| StoreError::IngestBusy)?;
            receivers.push(done_rx);
        }

        let mut first_error = None;
        for rx in receivers {
            match rx.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if first_error.is_none() => first_error = Some(e),
                Ok(Err(_)) | Err(_) => {}
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[allow(clippy::too_many_arguments)]
async fn fetch_tsid_worker(
    pool: MySqlPool,
    meta_dir: Arc<MetaDirectory>,
    tsid_cache: Arc<TsidCache>,
    fetch_rx: Arc<AsyncMutex<mpsc::Receiver<FetchTsidTask>>>,
    update_tx: mpsc::Sender<ForkTask>,
    insert_tx: mpsc::Sender<ForkTask>,
    cancel: CancellationToken,
    completion_tasks: Arc<AsyncMutex<JoinSet<()>>>,
) {
    loop {
        let task = {
            let mut rx = fetch_rx.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                t = rx.recv() => t,
            }
        };
        let Some(task) = task else {
            return;
        };

        let resolved = match resolver::resolve_batch(&pool, &meta_dir, &tsid_cache, task.batch).await {
            Ok(resolved) => resolved,
            Err(e) => {
                let _ = task.done.send(Err(e));
                continue;
            }
        };

        let resolved = Arc::new(resolved);

        let (update_done_tx, update_done_rx) = oneshot::channel();
        if update_tx
            .try_send(ForkTask {
                batch: resolved.clone(),
                done: update_done_tx,
            })
            .is_err()
        {
            tracing::warn!("update date workers are busy, dropping sub-batch");
            let _ = task.done.send(Err(StoreError::IngestBusy));
            continue;
        }

        let (insert_done_tx, insert_done_rx) = oneshot::channel();
        if insert_tx
            .try_send(ForkTask {
                batch: resolved,
                done: insert_done_tx,
            })
            .is_err()
        {
            tracing::warn!("insert sample workers are busy, dropping sub-batch");
            let _ = task.done.send(Err(StoreError::IngestBusy));
            continue;
        }

        // Await both forks without blocking this worker's own loop from
        // picking up the next fetch-tsid task. Tracked in `completion_tasks`
        // rather than bare `tokio::spawn` so shutdown can drain it.
        completion_tasks.lock().await.spawn(async move {
            let update_result = update_done_rx.await.unwrap_or(Ok(()));
            let insert_result = insert_done_rx.await.unwrap_or(Ok(()));
            let outcome = update_result.and(insert_result);
            let _ = task.done.send(outcome);
        });
    }
}

async fn update_date_worker(
    pool: MySqlPool,
    rx: Arc<AsyncMutex<mpsc::Receiver<ForkTask>>>,
    cancel: CancellationToken,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                t = rx.recv() => t,
            }
        };
        let Some(task) = task else {
            return;
        };
        let result = batch_update_date(&pool, &task.batch).await.map_err(StoreError::from);
        let _ = task.done.send(result);
    }
}

async fn insert_samples_worker(
    pool: MySqlPool,
    rx: Arc<AsyncMutex<mpsc::Receiver<ForkTask>>>,
    cancel: CancellationToken,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                t = rx.recv() => t,
            }
        };
        let Some(task) = task else {
            return;
        };
        let result = batch_insert_samples(&pool, &task.batch).await.map_err(StoreError::from);
        let _ = task.done.send(result);
    }
}

/// Update-Date stage (spec §4.4): one `INSERT IGNORE` row per distinct
/// `(tsid, date)` pair observed in the batch.
async fn batch_update_date(pool: &MySqlPool, batch: &[ResolvedSeries]) -> Result<(), sqlx::Error> {
    let mut rows: Vec<(i64, chrono::NaiveDate)> = Vec::new();
    for series in batch {
        let tsid = series.tsid.expect("tsid resolved before update-date stage");
        for date in series.distinct_dates() {
            rows.push((tsid, date));
        }
    }

    if rows.is_empty() {
        return Ok(());
    }

    let mut qb: sqlx::QueryBuilder<'_, sqlx::MySql> =
        sqlx::QueryBuilder::new("INSERT IGNORE INTO flash_metrics_update (tsid, updated_date) ");
    qb.push_values(&rows, |mut b, (tsid, date)| {
        b.push_bind(tsid).push_bind(*date);
    });
    qb.build().execute(pool).await?;
    Ok(())
}

/// Insert-Samples stage (spec §4.5): one row per non-NaN sample. Binds a
/// native `NaiveDateTime` rather than formatting the
/// `YYYY-MM-DD HH:MM:SS.mmm ±ZZZZ` string the original Go driver needs,
/// per the escape hatch spec §9 allows when the dialect supports it —
/// sqlx's MySQL driver does.
async fn batch_insert_samples(pool: &MySqlPool, batch: &[ResolvedSeries]) -> Result<(), sqlx::Error> {
    let mut rows: Vec<(i64, chrono::NaiveDateTime, f64)> = Vec::new();
    for series in batch {
        let tsid = series.tsid.expect("tsid resolved before insert-samples stage");
        for sample in &series.samples {
            if sample.value.is_nan() {
                continue;
            }
            let Some(ts) = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(sample.timestamp_ms) else {
                continue;
            };
            rows.push((tsid, ts.naive_utc(), sample.value));
        }
    }

    if rows.is_empty() {
        return Ok(());
    }

    let mut qb: sqlx::QueryBuilder<'_, sqlx::MySql> =
        sqlx::QueryBuilder::new("INSERT INTO flash_metrics_data (tsid, ts, v) ");
    qb.push_values(&rows, |mut b, (tsid, ts, v)| {
        b.push_bind(tsid).push_bind(*ts).push_bind(*v);
    });
    qb.build().execute(pool).await?;
    Ok(())
}
