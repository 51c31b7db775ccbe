use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashSet;
use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

use crate::tpl::cache::TemplateCache;

/// Hot reload for file-backed templates.
///
/// A ticker task stats the cached files every `watch_interval` and queues
/// changed identities on a bounded channel; a worker task re-compiles them
/// on the blocking pool. An identity sits in the queue at most once, and a
/// full queue leaves the rest for the next tick.
///
/// Must be spawned inside a tokio runtime. Dropping the watcher stops both
/// tasks.
pub struct Watcher {
    ticker: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl Watcher {
    /// Starts watching `cache`, which can be an `Arc<TemplateCache>` or the
    /// global `&*TEMPLATES`.
    pub fn spawn<C>(cache: C) -> Self
    where
        C: Deref<Target = TemplateCache> + Clone + Send + Sync + 'static,
    {
        let config = cache.config().clone();
        let (tx, mut rx) = mpsc::channel::<String>(config.queue_capacity.max(1));
        let queued: Arc<DashSet<String>> = Arc::new(DashSet::new());

        let ticker = {
            let cache = cache.clone();
            let queued = queued.clone();
            tokio::spawn(async move {
                let mut interval = time::interval(config.watch_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    let scan = cache.clone();
                    let stale = match task::spawn_blocking(move || scan.stale()).await {
                        Ok(stale) => stale,
                        Err(e) => {
                            warn!("Watch: scan failed, error={}", e);
                            continue;
                        }
                    };

                    for identity in stale {
                        if !queued.insert(identity.clone()) {
                            continue;
                        }
                        match tx.try_send(identity) {
                            Ok(()) => {}
                            Err(TrySendError::Full(identity)) => {
                                queued.remove(&identity);
                                debug!("Watch: reload queue full, deferring template={}", identity);
                                break;
                            }
                            Err(TrySendError::Closed(_)) => return,
                        }
                    }
                }
            })
        };

        let worker = tokio::spawn(async move {
            while let Some(identity) = rx.recv().await {
                let target = cache.clone();
                let id = identity.clone();
                // `reload` logs its own outcome; a failure keeps the old tree.
                if let Err(e) = task::spawn_blocking(move || target.reload(&id)).await {
                    warn!("Watch: reload task failed, template={}, error={}", identity, e);
                }
                queued.remove(&identity);
            }
        });

        Self { ticker, worker }
    }

    /// Stops watching. Same as dropping the watcher.
    pub fn stop(self) {}

    pub fn is_running(&self) -> bool {
        !self.ticker.is_finished() && !self.worker.is_finished()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.ticker.abort();
        self.worker.abort();
    }
}
