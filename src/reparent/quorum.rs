//! Quorum Redirect
//!
//! Fans a redirect out to every remaining replica at once and waits for
//! all of them. Each replica gets its own deadline, so one hung tablet
//! delays the result by at most that deadline and never blocks the
//! others. The result never fails as a whole: per-replica failures are
//! collected into a report the coordinator turns into a warning.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::time::timeout;

use super::collaborators::{MasterDescriptor, QuorumExecutor, ReplicaRestarter};
use super::errors::{CollaboratorError, RedirectFailure, ReparentWarning};
use crate::topology::{ReplicaSet, TabletPath};

/// More than half of the attempted redirects succeeded.
///
/// An empty attempt set is vacuously a majority.
pub fn is_majority(succeeded: usize, attempted: usize) -> bool {
    attempted == 0 || succeeded > attempted / 2
}

/// Outcome of redirecting a replica set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuorumReport {
    pub attempted: usize,
    pub succeeded: Vec<TabletPath>,
    pub failures: Vec<RedirectFailure>,
}

impl QuorumReport {
    /// Build a report from per-replica results.
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = (TabletPath, Result<(), CollaboratorError>)>,
    {
        let mut report = Self::default();
        for (tablet, result) in results {
            report.attempted += 1;
            match result {
                Ok(()) => report.succeeded.push(tablet),
                Err(error) => report.failures.push(RedirectFailure { tablet, error }),
            }
        }
        report
    }

    pub fn majority_achieved(&self) -> bool {
        is_majority(self.succeeded.len(), self.attempted)
    }

    /// Consolidated warning, `None` when every replica followed.
    pub fn warning(&self) -> Option<ReparentWarning> {
        if self.failures.is_empty() {
            return None;
        }
        Some(ReparentWarning::QuorumDegraded {
            attempted: self.attempted,
            succeeded: self.succeeded.len(),
            majority_achieved: self.majority_achieved(),
            failures: self.failures.clone(),
        })
    }
}

/// Default quorum executor: concurrent per-replica restarts with a
/// per-replica timeout.
pub struct ParallelRedirector<R: ?Sized> {
    restarter: Arc<R>,
    per_replica_timeout: Duration,
}

impl<R: ReplicaRestarter + ?Sized> ParallelRedirector<R> {
    pub fn new(restarter: Arc<R>, per_replica_timeout: Duration) -> Self {
        Self {
            restarter,
            per_replica_timeout,
        }
    }

    pub fn per_replica_timeout(&self) -> Duration {
        self.per_replica_timeout
    }
}

#[async_trait]
impl<R: ReplicaRestarter + ?Sized> QuorumExecutor for ParallelRedirector<R> {
    async fn redirect(&self, replicas: &ReplicaSet, master: &MasterDescriptor) -> QuorumReport {
        let attempts = replicas.iter().map(|replica| async move {
            let result = match timeout(
                self.per_replica_timeout,
                self.restarter.restart_replica(replica, master),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::TimedOut(self.per_replica_timeout)),
            };
            (replica.path.clone(), result)
        });

        QuorumReport::from_results(join_all(attempts).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ReplicationPosition, ShardPath, Tablet, TabletRole};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Hang,
        Delay(Duration),
    }

    struct ScriptedRestarter {
        behaviors: HashMap<TabletPath, Behavior>,
        restarted: Mutex<Vec<TabletPath>>,
    }

    impl ScriptedRestarter {
        fn new(behaviors: &[(&str, Behavior)]) -> Self {
            Self {
                behaviors: behaviors
                    .iter()
                    .map(|(path, b)| (TabletPath::parse(path).unwrap(), *b))
                    .collect(),
                restarted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReplicaRestarter for ScriptedRestarter {
        async fn restart_replica(
            &self,
            replica: &Tablet,
            _master: &MasterDescriptor,
        ) -> Result<(), CollaboratorError> {
            match self.behaviors[&replica.path] {
                Behavior::Succeed => {}
                Behavior::Fail => return Err(CollaboratorError::Unreachable(replica.path.clone())),
                Behavior::Hang => std::future::pending::<()>().await,
                Behavior::Delay(delay) => tokio::time::sleep(delay).await,
            }
            self.restarted.lock().unwrap().push(replica.path.clone());
            Ok(())
        }
    }

    fn shard() -> ShardPath {
        ShardPath::parse("ks/0").unwrap()
    }

    fn replicas(paths: &[&str]) -> ReplicaSet {
        paths
            .iter()
            .map(|p| Tablet::new(TabletPath::parse(p).unwrap(), shard(), TabletRole::Replica))
            .collect()
    }

    fn master() -> MasterDescriptor {
        MasterDescriptor {
            path: TabletPath::parse("zone1-1").unwrap(),
            shard: shard(),
            address: "db1:3306".to_string(),
            position: ReplicationPosition::new(1, 100),
        }
    }

    #[test]
    fn test_majority_threshold() {
        assert!(is_majority(0, 0));
        assert!(is_majority(1, 1));
        assert!(!is_majority(0, 1));
        assert!(is_majority(2, 2));
        assert!(!is_majority(1, 2));
        assert!(is_majority(2, 3));
        assert!(!is_majority(2, 4));
        assert!(is_majority(3, 4));
    }

    #[tokio::test]
    async fn test_all_replicas_follow() {
        let restarter = Arc::new(ScriptedRestarter::new(&[
            ("zone1-2", Behavior::Succeed),
            ("zone1-3", Behavior::Succeed),
        ]));
        let redirector = ParallelRedirector::new(restarter.clone(), Duration::from_secs(5));

        let report = redirector
            .redirect(&replicas(&["zone1-2", "zone1-3"]), &master())
            .await;

        assert_eq!(report.attempted, 2);
        assert!(report.majority_achieved());
        assert!(report.warning().is_none());
        assert_eq!(restarter.restarted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_one_of_two_is_not_majority() {
        let restarter = Arc::new(ScriptedRestarter::new(&[
            ("zone1-2", Behavior::Succeed),
            ("zone1-3", Behavior::Fail),
        ]));
        let redirector = ParallelRedirector::new(restarter, Duration::from_secs(5));

        let report = redirector
            .redirect(&replicas(&["zone1-2", "zone1-3"]), &master())
            .await;

        assert!(!report.majority_achieved());
        let warning = report.warning().unwrap();
        assert_eq!(
            warning.failed_replicas(),
            vec![&TabletPath::parse("zone1-3").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_majority_with_straggler_still_warns() {
        let restarter = Arc::new(ScriptedRestarter::new(&[
            ("zone1-2", Behavior::Succeed),
            ("zone1-3", Behavior::Succeed),
            ("zone1-4", Behavior::Fail),
        ]));
        let redirector = ParallelRedirector::new(restarter, Duration::from_secs(5));

        let report = redirector
            .redirect(&replicas(&["zone1-2", "zone1-3", "zone1-4"]), &master())
            .await;

        assert!(report.majority_achieved());
        match report.warning() {
            Some(ReparentWarning::QuorumDegraded {
                succeeded,
                majority_achieved,
                ..
            }) => {
                assert_eq!(succeeded, 2);
                assert!(majority_achieved);
            }
            None => panic!("expected a degraded-quorum warning"),
        }
    }

    #[tokio::test]
    async fn test_empty_set_is_vacuous_majority() {
        let restarter = Arc::new(ScriptedRestarter::new(&[]));
        let redirector = ParallelRedirector::new(restarter, Duration::from_secs(5));

        let report = redirector.redirect(&ReplicaSet::new(), &master()).await;

        assert_eq!(report.attempted, 0);
        assert!(report.majority_achieved());
        assert!(report.warning().is_none());
    }

    #[tokio::test]
    async fn test_hung_replica_times_out_without_blocking_others() {
        let restarter = Arc::new(ScriptedRestarter::new(&[
            ("zone1-2", Behavior::Succeed),
            ("zone1-3", Behavior::Hang),
            ("zone1-4", Behavior::Succeed),
        ]));
        let redirector = ParallelRedirector::new(restarter.clone(), Duration::from_millis(100));

        let started = Instant::now();
        let report = redirector
            .redirect(&replicas(&["zone1-2", "zone1-3", "zone1-4"]), &master())
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].error,
            CollaboratorError::TimedOut(Duration::from_millis(100))
        );
        assert!(report.majority_achieved());
    }

    #[tokio::test]
    async fn test_redirects_run_concurrently() {
        let delay = Behavior::Delay(Duration::from_millis(200));
        let restarter = Arc::new(ScriptedRestarter::new(&[
            ("zone1-2", delay),
            ("zone1-3", delay),
            ("zone1-4", delay),
        ]));
        let redirector = ParallelRedirector::new(restarter, Duration::from_secs(5));

        let started = Instant::now();
        let report = redirector
            .redirect(&replicas(&["zone1-2", "zone1-3", "zone1-4"]), &master())
            .await;

        // Sequential redirects would take at least 600ms
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(report.succeeded.len(), 3);
    }
}
