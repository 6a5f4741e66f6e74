//! Digest: dirty checking of bound models
//!
//! A pass fingerprints every live cache entry and re-binds the roots whose
//! fingerprint changed since their last bind. `run_digest_loop` repeats
//! passes on a tokio interval until cancelled.

use std::ops::AddAssign;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::events::BindEventKind;
use super::Binder;
use crate::error::Result;

/// Outcome of one or more digest passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestReport {
    /// Live entries fingerprinted
    pub scanned: usize,
    /// Entries whose model changed and were re-bound
    pub rebound: usize,
    /// Entries dropped because their root is gone
    pub pruned: usize,
}

impl DigestReport {
    /// Check if the pass changed nothing
    pub fn is_quiet(&self) -> bool {
        self.rebound == 0
    }
}

impl AddAssign for DigestReport {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.rebound += other.rebound;
        self.pruned += other.pruned;
    }
}

/// Resets the digesting flag when a pass ends, error or not
struct PassGuard<'a>(&'a Binder);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.digesting.set(false);
    }
}

impl Binder {
    /// Re-bind every root whose model changed since its last bind
    ///
    /// A digest started while another is running (from a callable or a
    /// listener) returns an empty report. Roots that are being bound right
    /// now are skipped. The first bind error stops the pass.
    pub fn digest(&self) -> Result<DigestReport> {
        if self.digesting.get() {
            debug!("digest already running, skipping nested pass");
            return Ok(DigestReport::default());
        }
        self.digesting.set(true);
        let _guard = PassGuard(self);
        let started = Instant::now();

        let mut report = DigestReport {
            pruned: self.prune(),
            ..DigestReport::default()
        };
        let entries = self.cache.borrow().live_entries();
        self.events.emit(BindEventKind::DigestStarted {
            entries: entries.len(),
        });

        for entry in entries {
            report.scanned += 1;
            if let Some(active) = self.overlapping_active(&entry.root) {
                trace!(root = %entry.root.id(), %active, "root is being bound, skipping");
                continue;
            }
            let fingerprint = entry.binding.fingerprint()?;
            if fingerprint == entry.fingerprint {
                continue;
            }
            trace!(root = %entry.root.id(), "model changed, re-binding");
            self.apply(&entry.root, entry.binding)?;
            report.rebound += 1;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.events.emit(BindEventKind::DigestCompleted {
            scanned: report.scanned,
            rebound: report.rebound,
            pruned: report.pruned,
            duration_ms,
        });
        if report.rebound > 0 {
            debug!(
                scanned = report.scanned,
                rebound = report.rebound,
                pruned = report.pruned,
                duration_ms,
                "digest pass"
            );
        }
        Ok(report)
    }

    /// Run digest passes every `period` until `cancel` fires
    ///
    /// Ticks missed while a pass runs are skipped, so passes never overlap
    /// or queue up. Pass errors are logged and the loop keeps going.
    /// Returns the totals over all passes.
    pub async fn run_digest_loop(&self, period: Duration, cancel: CancellationToken) -> DigestReport {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut total = DigestReport::default();
        let mut passes = 0u64;

        info!(period_ms = period.as_millis() as u64, "digest loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    passes += 1;
                    match self.digest() {
                        Ok(report) => total += report,
                        Err(e) => warn!(error = %e, "digest pass failed"),
                    }
                }
            }
        }
        info!(passes, rebound = total.rebound, "digest loop stopped");
        total
    }

    /// `run_digest_loop` with the configured `digest_interval_ms`
    pub async fn run_digest_loop_default(&self, cancel: CancellationToken) -> DigestReport {
        let period = Duration::from_millis(self.config.digest_interval_ms.max(1));
        self.run_digest_loop(period, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Model;
    use crate::dom::Node;
    use serde_json::json;

    #[test]
    fn empty_registry_is_a_quiet_pass() {
        let report = Binder::new().digest().unwrap();
        assert_eq!(report, DigestReport::default());
        assert!(report.is_quiet());
    }

    #[test]
    fn unchanged_models_are_not_rebound() {
        let binder = Binder::new();
        let root = Node::parse("<p><b></b></p>").unwrap();
        binder
            .bind(&root, &Model::new(json!({"b": "x"})), None)
            .unwrap();

        let report = binder.digest().unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.rebound, 0);
    }

    #[test]
    fn reports_add_up() {
        let mut total = DigestReport::default();
        total += DigestReport {
            scanned: 2,
            rebound: 1,
            pruned: 0,
        };
        total += DigestReport {
            scanned: 1,
            rebound: 0,
            pruned: 3,
        };
        assert_eq!(
            total,
            DigestReport {
                scanned: 3,
                rebound: 1,
                pruned: 3
            }
        );
    }

    #[test]
    fn digesting_flag_is_cleared_after_errors() {
        let binder = Binder::new();
        let root = Node::parse("<li>x</li>").unwrap();
        let model = Model::new(json!({}));
        binder.bind(&root, &model, None).unwrap();
        model.replace(json!({".": ["a"]}));

        assert_eq!(binder.digest().unwrap_err().code(), "BIND-030");
        assert!(!binder.digesting.get());
    }
}
