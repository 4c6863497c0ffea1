// system-tests/tests/helpers/artifacts.rs
// ============================================================================
// Module: Test Artifacts
// Description: Artifact helpers for gateway system tests.
// Purpose: Create per-test run roots, keep gateway logs, and write summaries.
// Dependencies: system-tests, reputation-gate-harness, serde, serde_jcs
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use reputation_gate_harness::HarnessError;
use reputation_gate_harness::ProcessOutput;
use reputation_gate_harness::ScenarioOutcome;
use serde::Serialize;
use system_tests::config::SystemTestConfig;

#[derive(Debug, Serialize)]
struct TestSummary {
    test_name: String,
    status: String,
    started_at_ms: u128,
    ended_at_ms: u128,
    duration_ms: u128,
    notes: Vec<String>,
    artifacts: Vec<String>,
}

/// Serializable view of one probe.
#[derive(Debug, Serialize)]
struct ProbeArtifact {
    path: String,
    status: u16,
    body: String,
    elapsed_ms: u128,
}

fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

fn default_run_root(test_name: &str) -> PathBuf {
    let stamp = now_millis();
    PathBuf::from("target/system-tests").join(format!("run_{stamp}")).join(test_name)
}

/// Artifact manager for a single system-test.
#[derive(Debug, Clone)]
pub struct TestArtifacts {
    root: PathBuf,
}

impl TestArtifacts {
    /// Creates the artifact root for a test.
    pub fn new(test_name: &str) -> io::Result<Self> {
        let config = SystemTestConfig::load().map_err(io::Error::other)?;
        let root = config
            .run_root
            .map_or_else(|| default_run_root(test_name), |root| root.join(test_name));
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
        })
    }

    /// Returns the root directory for the test artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes a JSON artifact using canonical JCS serialization.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> io::Result<PathBuf> {
        let path = self.root.join(name);
        let bytes = serde_jcs::to_vec(value).map_err(|err| io::Error::other(err.to_string()))?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Writes a text artifact with UTF-8 encoding.
    pub fn write_text(&self, name: &str, value: &str) -> io::Result<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, value.as_bytes())?;
        Ok(path)
    }
}

/// Helper that writes summaries even when a test panics.
pub struct TestReporter {
    artifacts: TestArtifacts,
    test_name: String,
    started_at_ms: u128,
    written: Vec<String>,
    finalized: bool,
}

impl TestReporter {
    /// Creates a reporter for the named test.
    pub fn new(test_name: &str) -> io::Result<Self> {
        Ok(Self {
            artifacts: TestArtifacts::new(test_name)?,
            test_name: test_name.to_string(),
            started_at_ms: now_millis(),
            written: Vec::new(),
            finalized: false,
        })
    }

    /// Returns the artifact manager.
    pub fn artifacts(&self) -> &TestArtifacts {
        &self.artifacts
    }

    /// Keeps the probes and gateway logs of a completed scenario.
    pub fn record_outcome(&mut self, outcome: &ScenarioOutcome) -> io::Result<()> {
        let probes: Vec<ProbeArtifact> = outcome
            .probes
            .iter()
            .map(|probe| ProbeArtifact {
                path: probe.path.clone(),
                status: probe.status,
                body: probe.body.clone(),
                elapsed_ms: probe.elapsed.as_millis(),
            })
            .collect();
        let name = format!("{}.probes.json", outcome.name);
        self.artifacts.write_json(&name, &probes)?;
        self.written.push(name);
        self.record_output(&outcome.name, &outcome.output)
    }

    /// Keeps the gateway logs attached to a failed scenario.
    pub fn record_failure(&mut self, error: &HarnessError) -> io::Result<()> {
        if let HarnessError::Scenario {
            name,
            output,
            ..
        } = error
        {
            let note = format!("{name}.error.txt");
            self.artifacts.write_text(&note, &error.to_string())?;
            self.written.push(note);
            self.record_output(name, output)?;
        }
        Ok(())
    }

    fn record_output(&mut self, scenario: &str, output: &ProcessOutput) -> io::Result<()> {
        let stdout = format!("{scenario}.gateway.stdout.log");
        let stderr = format!("{scenario}.gateway.stderr.log");
        self.artifacts.write_text(&stdout, &output.stdout)?;
        self.artifacts.write_text(&stderr, &output.stderr)?;
        self.written.push(stdout);
        self.written.push(stderr);
        Ok(())
    }

    /// Writes the final summary for the test.
    pub fn finish(&mut self, status: &str, notes: Vec<String>) -> io::Result<()> {
        let ended_at_ms = now_millis();
        let summary = TestSummary {
            test_name: self.test_name.clone(),
            status: status.to_string(),
            started_at_ms: self.started_at_ms,
            ended_at_ms,
            duration_ms: ended_at_ms.saturating_sub(self.started_at_ms),
            notes,
            artifacts: self.written.clone(),
        };
        self.artifacts.write_json("summary.json", &summary)?;
        self.artifacts.write_text("summary.md", &summary_markdown(&summary))?;
        self.finalized = true;
        Ok(())
    }
}

impl Drop for TestReporter {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let status = if std::thread::panicking() { "panic" } else { "fail" };
        let _ = self.finish(status, vec!["test terminated without explicit summary".to_string()]);
    }
}

fn summary_markdown(summary: &TestSummary) -> String {
    let mut out = String::new();
    out.push_str("# Gateway System-Test Summary\n\n");
    out.push_str("## Status\n\n");
    out.push_str(&format!("- Test: {}\n", summary.test_name));
    out.push_str(&format!("- Status: {}\n", summary.status));
    out.push_str(&format!("- Duration (ms): {}\n", summary.duration_ms));
    for (title, items) in [("Notes", &summary.notes), ("Artifacts", &summary.artifacts)] {
        out.push_str(&format!("\n## {title}\n\n"));
        if items.is_empty() {
            out.push_str("- None\n");
        }
        for item in items {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out
}
