//! Periodic sweep over due units.
//!
//! Each cycle queries the deadline index twice: once for cron jobs, whose
//! overdue deadlines become synthetic state-machine events, and once for
//! HTTP monitors, whose due polls fan out to the prober under a
//! concurrency cap. One misbehaving unit never aborts the cycle; failures
//! are logged per unit and the sweep moves on.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::time::{interval, Duration};
use upmon_common::types::UnitKind;
use upmon_engine::machine::{self, UnitEvent};
use upmon_storage::UnitRepository;

use crate::dispatch::EventDispatcher;
use crate::sweep::prober::Prober;

pub struct SweepScheduler {
    repo: Arc<dyn UnitRepository>,
    dispatcher: Arc<EventDispatcher>,
    prober: Arc<dyn Prober>,
    tick_secs: u64,
    max_concurrent_probes: usize,
}

impl SweepScheduler {
    pub fn new(
        repo: Arc<dyn UnitRepository>,
        dispatcher: Arc<EventDispatcher>,
        prober: Arc<dyn Prober>,
        tick_secs: u64,
        max_concurrent_probes: usize,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            prober,
            tick_secs: tick_secs.max(1),
            max_concurrent_probes: max_concurrent_probes.max(1),
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            tick_secs = self.tick_secs,
            max_concurrent_probes = self.max_concurrent_probes,
            "Sweep scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.tick_secs));
        loop {
            tick.tick().await;
            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, "Sweep cycle failed");
            }
        }
    }

    async fn run_cycle(&self) -> Result<()> {
        self.sweep_cron_jobs().await?;
        self.sweep_http_monitors().await?;
        Ok(())
    }

    /// Walks overdue cron jobs and applies whichever synthetic event their
    /// state warrants. The deadline query is a coarse filter; the exact
    /// predicate lives in the engine so a unit saved by a concurrent ping
    /// between query and dispatch resolves to a no-op.
    pub async fn sweep_cron_jobs(&self) -> Result<()> {
        let now = Utc::now();
        let due = self.repo.find_due(UnitKind::CronJob, now)?;
        if due.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = due.len(), "Sweeping overdue cron jobs");
        for unit in due {
            let Some(event) = machine::sweep_event_for(&unit, now) else {
                continue;
            };
            if let Err(e) = self.dispatcher.dispatch(&unit.id, &event, now).await {
                tracing::error!(unit_id = %unit.id, error = %e, "Sweep event failed");
            }
        }
        Ok(())
    }

    /// Polls due HTTP monitors, bounded by a semaphore. Each poll result
    /// is dispatched at the instant the poll completed, not the instant
    /// the sweep started, so interval re-arming measures from completion.
    pub async fn sweep_http_monitors(&self) -> Result<()> {
        let now = Utc::now();
        let due = self.repo.find_due(UnitKind::HttpMonitor, now)?;
        if due.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = due.len(), "Polling due HTTP monitors");
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_probes));
        let mut handles = Vec::new();

        for unit in due {
            if !machine::poll_due(&unit, now) {
                continue;
            }
            let Some(probe) = unit.probe.clone() else {
                tracing::warn!(unit_id = %unit.id, "HTTP monitor without probe config, skipping");
                continue;
            };

            let permit = semaphore.clone().acquire_owned().await?;
            let prober = self.prober.clone();
            let dispatcher = self.dispatcher.clone();
            let unit_id = unit.id.clone();

            handles.push(tokio::spawn(async move {
                let outcome = prober.poll(&probe).await;
                let completed_at = Utc::now();
                if let Err(e) = dispatcher
                    .dispatch(&unit_id, &UnitEvent::PollResult(outcome), completed_at)
                    .await
                {
                    tracing::error!(unit_id = %unit_id, error = %e, "Poll result dispatch failed");
                }
                drop(permit);
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Probe task panicked");
            }
        }
        Ok(())
    }
}
