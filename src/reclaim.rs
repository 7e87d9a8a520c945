//! Age-based reclamation of the transient store.
//!
//! Two ways to drive it:
//!
//! * **Inline** (default): [`Reclaimer::maybe_reclaim`] is called once per
//!   request and sweeps with a small fixed probability. No traffic means no
//!   sweeps; heavy traffic means sweeps roughly proportional to load.
//! * **Background**: [`Reclaimer::spawn_background`] sweeps on a fixed
//!   cadence until [`BackgroundReclaimer::shutdown`] is called. Long-running
//!   services that want punctual cleanup set the inline probability to zero
//!   and use this instead.
//!
//! A sweep takes no locks. Files created or deleted concurrently are fine:
//! a file that disappears between listing and deletion is counted as
//! `already_gone`, and per-file errors are logged and skipped.
//!
//! Only entries the store named are candidates: files carrying the
//! [`crate::naming`] suffix and `.docconv-` staging entries. Anything else
//! found in an area is left alone, however old.

use crate::config::ConverterConfig;
use crate::naming::has_unique_suffix;
use crate::output::ReclaimReport;
use crate::store::{TransientStore, STAGING_PREFIX};
use rand::Rng;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sweeps both store areas for entries older than the retention threshold.
#[derive(Debug, Clone)]
pub struct Reclaimer {
    areas: Vec<PathBuf>,
    retention: Duration,
    probability: f64,
}

impl Reclaimer {
    pub fn new(store: &TransientStore, config: &ConverterConfig) -> Self {
        Self {
            areas: store.areas().iter().map(|p| p.to_path_buf()).collect(),
            retention: config.retention(),
            probability: config.reclaim_probability,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Whether a uniform roll in `[0, 1)` triggers a sweep.
    pub fn should_trigger(&self, roll: f64) -> bool {
        roll < self.probability
    }

    /// Roll once and sweep if the roll hits. Returns the report of the sweep
    /// that ran, if any.
    pub fn maybe_reclaim(&self) -> Option<ReclaimReport> {
        let roll: f64 = rand::rng().random();
        if self.should_trigger(roll) {
            Some(self.sweep())
        } else {
            None
        }
    }

    /// Sweep now.
    pub fn sweep(&self) -> ReclaimReport {
        self.sweep_at(SystemTime::now())
    }

    /// Sweep as if the current time were `now`.
    ///
    /// Deletes store-named files whose modification time is strictly older
    /// than `now - retention`, plus abandoned scratch directories of the
    /// same age. Entries with a modification time in the future are kept.
    pub fn sweep_at(&self, now: SystemTime) -> ReclaimReport {
        let start = Instant::now();
        let mut report = ReclaimReport::default();

        for area in &self.areas {
            let entries = match std::fs::read_dir(area) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Reclaim: cannot list {}: {}", area.display(), e);
                    report.errors += 1;
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Reclaim: bad entry in {}: {}", area.display(), e);
                        report.errors += 1;
                        continue;
                    }
                };
                self.visit(&entry.path(), now, &mut report);
            }
        }

        if report.removed > 0 || report.errors > 0 {
            info!(
                "Reclaimed {} of {} files ({} already gone, {} errors) in {}ms",
                report.removed,
                report.scanned,
                report.already_gone,
                report.errors,
                start.elapsed().as_millis()
            );
        } else {
            debug!("Reclaim sweep: {} files, nothing stale", report.scanned);
        }
        report
    }

    fn visit(&self, path: &Path, now: SystemTime, report: &mut ReclaimReport) {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                report.already_gone += 1;
                return;
            }
            Err(e) => {
                warn!("Reclaim: cannot stat {}: {}", path.display(), e);
                report.errors += 1;
                return;
            }
        };

        let is_scratch_dir = meta.is_dir() && is_staging(path);
        if !meta.is_file() && !is_scratch_dir {
            return;
        }
        if meta.is_file() && !is_staging(path) && !is_store_named(path) {
            debug!("Reclaim: leaving {} alone, not a store name", path.display());
            return;
        }
        report.scanned += 1;

        let modified = match meta.modified() {
            Ok(t) => t,
            Err(e) => {
                warn!("Reclaim: no mtime for {}: {}", path.display(), e);
                report.errors += 1;
                return;
            }
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= self.retention {
            return;
        }

        let result = if is_scratch_dir {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => {
                debug!("Reclaimed {} (age {}s)", path.display(), age.as_secs());
                report.removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => report.already_gone += 1,
            Err(e) => {
                warn!("Reclaim: cannot delete {}: {}", path.display(), e);
                report.errors += 1;
            }
        }
    }

    /// Run a sweep every `every` on the current tokio runtime until shut down.
    ///
    /// The first sweep runs immediately.
    pub fn spawn_background(&self, every: Duration) -> BackgroundReclaimer {
        let (tx, mut rx) = watch::channel(false);
        let reclaimer = self.clone();
        let every = every.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("Background reclamation every {}s", every.as_secs_f64());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let r = reclaimer.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || r.sweep()).await {
                            warn!("Background sweep task failed: {}", e);
                        }
                    }
                    changed = rx.changed() => {
                        // A dropped sender also ends the loop.
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Background reclamation stopped");
        });

        BackgroundReclaimer { stop: tx, handle }
    }
}

fn is_store_named(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(has_unique_suffix)
}

fn is_staging(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(STAGING_PREFIX))
}

/// Handle to a background sweep loop.
#[derive(Debug)]
pub struct BackgroundReclaimer {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundReclaimer {
    /// Stop the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            warn!("Background reclamation ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
