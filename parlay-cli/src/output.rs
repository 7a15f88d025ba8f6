//! Human readable rendering of run results

use parlay_engine::{HostOutcome, RunReport};
use parlay_logging::JsonLog;
use std::collections::HashMap;
use std::fmt::Write;

pub fn render_run(report: &RunReport, logs: &HashMap<String, JsonLog>) -> String {
    let mut out = String::new();
    for deployment in &report.deployments {
        let _ = writeln!(
            out,
            "Deployment [{}] ({} worker(s))",
            deployment.name, deployment.workers
        );
        for host in &deployment.hosts {
            let state = match (host.outcome, logs.get(&host.host)) {
                (HostOutcome::Skipped, _) | (_, None) => "Skipped".to_string(),
                (_, Some(log)) => log.state.to_string(),
            };
            let _ = writeln!(out, "  {} [{}]", host.host, state);
        }
    }

    let mut targets: Vec<&String> = logs.keys().collect();
    targets.sort();
    for target in targets {
        let log = &logs[target];
        let _ = writeln!(out, "\n== {} [{}]", target, log.state);
        for entry in &log.entries {
            if entry.is_error() {
                let _ = writeln!(out, "  {} FAILED: {}", entry.task_name, entry.err);
            } else if entry.entry.trim().is_empty() {
                let _ = writeln!(out, "  {}", entry.task_name);
            } else {
                let _ = writeln!(out, "  {}:", entry.task_name);
                for line in entry.entry.trim_end().lines() {
                    let _ = writeln!(out, "    {}", line);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlay_engine::{DeploymentReport, HostReport};
    use parlay_logging::{JsonLogEntry, LogState};

    #[test]
    fn test_render_run() {
        let now = chrono::Utc::now();
        let report = RunReport {
            run_id: "r".into(),
            started_at: now,
            finished_at: now,
            deployments: vec![DeploymentReport {
                name: "web".into(),
                workers: 2,
                hosts: vec![
                    HostReport {
                        host: "h1".into(),
                        outcome: HostOutcome::Aborted,
                        store: HashMap::new(),
                    },
                    HostReport {
                        host: "h2".into(),
                        outcome: HostOutcome::Skipped,
                        store: HashMap::new(),
                    },
                ],
            }],
        };
        let log = JsonLog {
            state: LogState::Failed,
            entries: vec![
                JsonLogEntry::new("uptime", "up 2 days\n", ""),
                JsonLogEntry::new("broken", "", "exit code 1"),
            ],
        };
        let logs = HashMap::from([("h1".to_string(), log)]);

        let text = render_run(&report, &logs);
        assert!(text.contains("Deployment [web] (2 worker(s))"));
        assert!(text.contains("  h1 [Failed]"));
        assert!(text.contains("  h2 [Skipped]"));
        assert!(text.contains("  uptime:\n    up 2 days\n"));
        assert!(text.contains("  broken FAILED: exit code 1"));
    }
}
