//! Reparent Outcome

use serde::Serialize;
use uuid::Uuid;

use super::collaborators::MasterDescriptor;
use super::errors::ReparentWarning;
use super::observability::ReparentEvent;
use super::state::ReparentMode;

/// Result of a completed reparent.
///
/// Completed means the new master was promoted and recorded. A `warning`
/// marks a degraded success: some replicas are not following yet.
#[derive(Debug, Clone)]
pub struct ReparentOutcome {
    pub operation_id: Uuid,
    pub mode: ReparentMode,
    pub new_master: MasterDescriptor,
    /// More than half of the remaining replicas follow the new master
    pub majority_achieved: bool,
    pub warning: Option<ReparentWarning>,
    /// Everything the run recorded, in order
    pub events: Vec<ReparentEvent>,
}

impl ReparentOutcome {
    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }

    /// Compact, serializable view for reporting.
    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            operation_id: self.operation_id,
            mode: self.mode,
            new_master: self.new_master.clone(),
            majority_achieved: self.majority_achieved,
            degraded: self.is_degraded(),
            warning: self.warning.as_ref().map(ToString::to_string),
            failed_replicas: self
                .warning
                .as_ref()
                .map(|w| w.failed_replicas().iter().map(|p| p.to_string()).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub operation_id: Uuid,
    pub mode: ReparentMode,
    pub new_master: MasterDescriptor,
    pub majority_achieved: bool,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_replicas: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reparent::errors::{CollaboratorError, RedirectFailure};
    use crate::topology::{ReplicationPosition, ShardPath, TabletPath};

    fn outcome(warning: Option<ReparentWarning>) -> ReparentOutcome {
        ReparentOutcome {
            operation_id: Uuid::new_v4(),
            mode: ReparentMode::Graceful,
            new_master: MasterDescriptor {
                path: TabletPath::parse("zone1-2").unwrap(),
                shard: ShardPath::parse("ks/0").unwrap(),
                address: "db2:3306".to_string(),
                position: ReplicationPosition::new(3, 42),
            },
            majority_achieved: warning.is_none(),
            warning,
            events: Vec::new(),
        }
    }

    #[test]
    fn test_full_success_summary() {
        let summary = outcome(None).summary();
        assert!(!summary.degraded);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["mode"], "graceful");
        assert_eq!(json["new_master"]["path"], "zone1-2");
        assert!(json.get("warning").is_none());
        assert!(json.get("failed_replicas").is_none());
    }

    #[test]
    fn test_degraded_summary_lists_failed_replicas() {
        let warning = ReparentWarning::QuorumDegraded {
            attempted: 2,
            succeeded: 1,
            majority_achieved: false,
            failures: vec![RedirectFailure {
                tablet: TabletPath::parse("zone1-3").unwrap(),
                error: CollaboratorError::Unreachable(TabletPath::parse("zone1-3").unwrap()),
            }],
        };
        let outcome = outcome(Some(warning));
        assert!(outcome.is_degraded());

        let json = serde_json::to_value(outcome.summary()).unwrap();
        assert_eq!(json["degraded"], true);
        assert_eq!(json["failed_replicas"][0], "zone1-3");
    }
}
