/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};

use crate::{Dsp, Error, SignedEvidence};

use super::{find_modulus, RecoveredKey, RecoveryConfig, WorkItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    pub(crate) workers: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) recovery: RecoveryConfig,
}

/// Runs recovery attempts for many keys on a pool of tokio workers.
#[derive(Debug, Clone)]
pub struct Solver {
    config: SolverConfig,
}

/// Outcome of one recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverRow {
    pub(crate) index: usize,
    pub(crate) pair: usize,
    pub(crate) dsp: Dsp,
    pub(crate) result: crate::Result<Option<RecoveredKey>>,
    pub(crate) source_a: String,
    pub(crate) source_b: String,
    pub(crate) timestamp_a: Option<u64>,
    pub(crate) timestamp_b: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            workers: std::thread::available_parallelism()
                .map(|workers| workers.get())
                .unwrap_or(1),
            queue_capacity: 64,
            recovery: RecoveryConfig::default(),
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Solver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Feeds `items` through the worker pool and sends one row per attempted
    /// pair to `sink`. Returns once the queue is drained and every worker
    /// has finished, with the number of rows emitted.
    ///
    /// Rows arrive in completion order. Dropping the receiving end of `sink`
    /// makes workers stop taking new items.
    pub async fn run(
        &self,
        items: impl IntoIterator<Item = WorkItem>,
        sink: mpsc::Sender<SolverRow>,
    ) -> usize {
        let items = items.into_iter().collect::<Vec<_>>();
        let remaining = Arc::new(AtomicUsize::new(items.len()));
        let (queue_tx, queue_rx) = mpsc::channel::<WorkItem>(self.config.queue_capacity.max(1));
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let recovery = Arc::new(self.config.recovery.clone());

        tracing::info!(
            context = "solver",
            items = items.len(),
            workers = self.config.workers,
            "Queued work items."
        );

        let mut workers = JoinSet::new();
        for worker in 0..self.config.workers.max(1) {
            workers.spawn(work(
                worker,
                queue_rx.clone(),
                sink.clone(),
                recovery.clone(),
                remaining.clone(),
            ));
        }
        drop(queue_rx);
        drop(sink);

        for item in items {
            if queue_tx.send(item).await.is_err() {
                break;
            }
        }
        drop(queue_tx);

        let mut emitted = 0;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(rows) => emitted += rows,
                Err(err) => {
                    tracing::warn!(context = "solver", reason = %err, "Worker failed.");
                }
            }
        }

        tracing::info!(context = "solver", rows = emitted, "Solver finished.");
        emitted
    }

    /// Runs every item and returns the rows ordered by item index.
    pub async fn solve(&self, items: impl IntoIterator<Item = WorkItem>) -> Vec<SolverRow> {
        let (tx, mut rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let collect = async {
            let mut rows = Vec::new();
            while let Some(row) = rx.recv().await {
                rows.push(row);
            }
            rows
        };
        let (_, mut rows) = tokio::join!(self.run(items, tx), collect);
        rows.sort_unstable_by_key(|row: &SolverRow| (row.index, row.pair));
        rows
    }
}

async fn work(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    sink: mpsc::Sender<SolverRow>,
    recovery: Arc<RecoveryConfig>,
    remaining: Arc<AtomicUsize>,
) -> usize {
    let mut emitted = 0;

    loop {
        let item = queue.lock().await.recv().await;
        let Some(item) = item else {
            break;
        };
        if sink.is_closed() {
            break;
        }

        tracing::info!(
            context = "solver",
            worker,
            dsp = %item.dsp,
            remaining = remaining.fetch_sub(1, Ordering::Relaxed).saturating_sub(1),
            "Searching for public key."
        );

        for (pair, (a, b)) in item.pairs.into_iter().enumerate() {
            let mut row = SolverRow::new(item.index, pair, item.dsp.clone(), &a, &b);
            let recovery = recovery.clone();
            row.result = tokio::task::spawn_blocking(move || find_modulus(&a, &b, &recovery))
                .await
                .unwrap_or_else(|err| {
                    Err(Error::CryptoError(format!("recovery task failed: {err}")))
                });

            match &row.result {
                Ok(Some(key)) => {
                    tracing::info!(context = "solver", dsp = %row.dsp, key = %key, "Found public key.")
                }
                Ok(None) => {
                    tracing::info!(context = "solver", dsp = %row.dsp, "No public key found.")
                }
                Err(err) => {
                    tracing::warn!(context = "solver", dsp = %row.dsp, reason = %err, "Pair rejected.")
                }
            }

            if sink.send(row).await.is_err() {
                return emitted;
            }
            emitted += 1;
        }
    }

    emitted
}

impl SolverRow {
    fn new(
        index: usize,
        pair: usize,
        dsp: Dsp,
        a: &SignedEvidence,
        b: &SignedEvidence,
    ) -> Self {
        SolverRow {
            index,
            pair,
            dsp,
            result: Ok(None),
            source_a: a.source().to_string(),
            source_b: b.source().to_string(),
            timestamp_a: a.timestamp(),
            timestamp_b: b.timestamp(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn dsp(&self) -> &Dsp {
        &self.dsp
    }

    pub fn result(&self) -> &crate::Result<Option<RecoveredKey>> {
        &self.result
    }

    pub fn key(&self) -> Option<&RecoveredKey> {
        self.result.as_ref().ok().and_then(|key| key.as_ref())
    }

    pub fn sources(&self) -> (&str, &str) {
        (&self.source_a, &self.source_b)
    }

    fn key_column(&self) -> String {
        match &self.result {
            Ok(Some(key)) => key
                .to_dns_record()
                .unwrap_or_else(|err| format!("error: {err}")),
            Ok(None) => "-".to_string(),
            Err(err) => format!("error: {err}"),
        }
    }
}

impl Display for SolverRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let timestamp = |ts: Option<u64>| ts.map_or_else(|| "unknown".to_string(), |ts| ts.to_string());
        write!(
            f,
            "{:04}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.index,
            self.dsp.domain(),
            self.dsp.selector(),
            self.key_column(),
            self.source_a,
            self.source_b,
            timestamp(self.timestamp_a),
            timestamp(self.timestamp_b)
        )
    }
}
