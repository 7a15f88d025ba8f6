//! Structural validation of a TreasureMap
//!
//! Pure checks only: nothing here touches the network or the filesystem. Every
//! problem is collected so a broken map is reported in one pass.

use std::collections::HashSet;

use crate::error::{Error, Result, ValidationIssue};
use crate::types::{Deployment, TreasureMap};

impl TreasureMap {
    /// Validate every deployment, failing with all issues found.
    pub fn validate(&self) -> Result<()> {
        let issues: Vec<ValidationIssue> = self
            .deployments
            .iter()
            .flat_map(Deployment::issues)
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(issues))
        }
    }
}

impl Deployment {
    /// Validate a single deployment.
    pub fn validate(&self) -> Result<()> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(issues))
        }
    }

    /// Collect every structural problem with this deployment
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.hosts.is_empty() {
            issues.push(ValidationIssue::deployment(&self.name, "no hosts defined"));
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            issues.push(ValidationIssue::deployment(
                &self.name,
                "host identifiers must not be empty",
            ));
        }
        // One worker per target at a time
        let mut seen = HashSet::new();
        for host in &self.hosts {
            if !seen.insert(host.as_str()) {
                issues.push(ValidationIssue::deployment(
                    &self.name,
                    format!("host [{}] is listed more than once", host),
                ));
            }
        }

        for (index, action) in self.actions.iter().enumerate() {
            if let Err(e) = action.kind() {
                issues.push(ValidationIssue::action(&self.name, index, e.to_string()));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, COMMAND, DOWNLOAD, KEY, PACKAGE};

    fn deployment(actions: Vec<Action>) -> Deployment {
        Deployment {
            name: "test".into(),
            hosts: vec!["h1".into()],
            actions,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_map() {
        let map = TreasureMap {
            deployments: vec![deployment(vec![
                Action::command("uptime", "uptime"),
                Action {
                    action_type: "docker/tag".into(),
                    ..Default::default()
                },
            ])],
        };
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_empty_hosts_rejected() {
        let mut d = deployment(vec![]);
        d.hosts.clear();
        let err = d.validate().unwrap_err();
        match err {
            Error::Validation(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].reason, "no hosts defined");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_hosts_rejected() {
        let mut d = deployment(vec![Action::command("uptime", "uptime")]);
        d.hosts = vec!["h1".into(), "h2".into(), "h1".into()];
        d.parallel = true;

        let Err(Error::Validation(issues)) = d.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].reason, "host [h1] is listed more than once");
        assert_eq!(issues[0].action, None);
    }

    #[test]
    fn test_all_issues_collected() {
        let map = TreasureMap {
            deployments: vec![deployment(vec![
                Action::default(),
                Action {
                    action_type: COMMAND.into(),
                    ..Default::default()
                },
                Action {
                    action_type: PACKAGE.into(),
                    package_manager: "brew".into(),
                    package_operation: "install".into(),
                    packages: "git".into(),
                    ..Default::default()
                },
                Action {
                    action_type: DOWNLOAD.into(),
                    source: "/etc/hosts".into(),
                    ..Default::default()
                },
                Action {
                    action_type: KEY.into(),
                    ..Default::default()
                },
            ])],
        };

        let Err(Error::Validation(issues)) = map.validate() else {
            panic!("expected validation failure");
        };
        let indexes: Vec<_> = issues.iter().map(|i| i.action).collect();
        assert_eq!(indexes, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
        assert!(issues[2].reason.contains("brew"));
    }

    #[test]
    fn test_error_message_lists_issues() {
        let mut d = deployment(vec![Action::default()]);
        d.hosts.push(" ".into());
        let msg = d.validate().unwrap_err().to_string();
        assert!(msg.contains("2 issue(s)"));
        assert!(msg.contains("action #0: action type is empty"));
    }
}
