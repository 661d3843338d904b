//! Off-thread loading of the project list.
//!
//! A [`ProjectsFetch`] reads the catalog on a worker thread and hands the
//! newest-first list back over a channel. The owner polls it from the
//! interactive thread; once the cancellation token fires, any late result
//! is dropped instead of being published.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::datastore::ProjectCatalog;
use crate::error::StoreError;
use crate::task::Project;

pub type FetchResult = Result<Vec<Project>, StoreError>;

/// What the form does when the background project fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchFailurePolicy {
    /// Leave the list empty; log only.
    #[default]
    Silent,
    /// Also emit a `ProjectsLoadFailed` event.
    Signal,
}

impl std::str::FromStr for FetchFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "off" => Ok(Self::Silent),
            "signal" | "on" => Ok(Self::Signal),
            other => Err(anyhow!("invalid projects.fetch_failure setting: {other}")),
        }
    }
}

#[derive(Debug)]
pub struct ProjectsFetch {
    rx: Receiver<FetchResult>,
    cancel: CancellationToken,
}

impl ProjectsFetch {
    #[tracing::instrument(skip_all)]
    pub fn spawn(
        catalog: Arc<dyn ProjectCatalog>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker_cancel = cancel.clone();

        thread::Builder::new()
            .name("taskform-projects".to_string())
            .spawn(move || {
                if worker_cancel.is_cancelled() {
                    debug!("project fetch cancelled before start");
                    return;
                }

                let result = catalog.list_all().map(|mut projects| {
                    projects.reverse();
                    projects
                });

                if worker_cancel.is_cancelled() {
                    debug!("form closed while loading projects; dropping result");
                    return;
                }
                if tx.send(result).is_err() {
                    debug!("project fetch receiver gone; dropping result");
                }
            })
            .context("failed to spawn project fetch worker")?;

        Ok(Self { rx, cancel })
    }

    /// Non-blocking; `None` while the worker is still running or after
    /// cancellation.
    pub fn try_take(&self) -> Option<FetchResult> {
        if self.cancel.is_cancelled() {
            return None;
        }
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_exited())),
        }
    }

    pub fn wait(&self, timeout: Duration) -> Option<FetchResult> {
        if self.cancel.is_cancelled() {
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(result) if !self.cancel.is_cancelled() => Some(result),
            Ok(_) => None,
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "timed out waiting for projects");
                None
            }
            Err(RecvTimeoutError::Disconnected) => Some(Err(worker_exited())),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn worker_exited() -> StoreError {
    StoreError::Backend(anyhow!("project fetch worker exited without a result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryStore;

    #[test]
    fn delivers_newest_first() {
        let catalog = Arc::new(MemoryStore::with_projects(["Home", "Work", "Garden"]));
        let fetch =
            ProjectsFetch::spawn(catalog, CancellationToken::new()).expect("spawn fetch");

        let projects = fetch
            .wait(Duration::from_secs(5))
            .expect("fetch result")
            .expect("projects");
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Garden", "Work", "Home"]);
    }

    #[test]
    fn cancelled_fetch_yields_nothing() {
        let catalog = Arc::new(MemoryStore::with_projects(["Home"]));
        let token = CancellationToken::new();
        token.cancel();
        let fetch = ProjectsFetch::spawn(catalog, token).expect("spawn fetch");

        assert!(fetch.is_cancelled());
        assert!(fetch.wait(Duration::from_millis(50)).is_none());
        assert!(fetch.try_take().is_none());
    }

    /// Parks inside `list_all` until the test lets it go.
    struct GatedCatalog {
        entered: crossbeam_channel::Sender<()>,
        release: Receiver<()>,
    }

    impl ProjectCatalog for GatedCatalog {
        fn list_all(&self) -> Result<Vec<Project>, StoreError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Ok(vec![Project {
                id: 1,
                name: "Late".to_string(),
            }])
        }

        fn get(&self, id: u64) -> Result<Project, StoreError> {
            Err(StoreError::project_not_found(id))
        }
    }

    #[test]
    fn cancelling_mid_flight_drops_the_result() {
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let catalog = Arc::new(GatedCatalog {
            entered: entered_tx,
            release: release_rx,
        });
        let token = CancellationToken::new();
        let fetch = ProjectsFetch::spawn(catalog, token.child_token()).expect("spawn fetch");

        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker reached the catalog");
        token.cancel();
        release_tx.send(()).expect("release worker");

        // The worker sees the token and exits without sending.
        assert!(matches!(
            fetch.rx.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        ));
        assert!(fetch.is_cancelled());
        assert!(fetch.wait(Duration::from_millis(50)).is_none());
        assert!(fetch.try_take().is_none());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(
            "Signal".parse::<FetchFailurePolicy>().ok(),
            Some(FetchFailurePolicy::Signal)
        );
        assert!("loud".parse::<FetchFailurePolicy>().is_err());
    }
}
