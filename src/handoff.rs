use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::model::{RunOptions, TestRun};

/// The build-result handoff file: the sole coupling between the `run`
/// phase and the `trending` phase, which execute as separate processes.
/// Artifact bytes are never serialized — the file carries run metadata
/// only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    #[serde(rename = "testOptions")]
    pub test_options: RunOptions,
    #[serde(rename = "testRun")]
    pub test_run: TestRun,
    #[serde(rename = "writtenAt")]
    pub written_at: DateTime<Utc>,
}

const HANDOFF_FILE_PREFIX: &str = "perfcloud_run_result";

pub fn handoff_path(workspace: &Path, test_id: u32) -> PathBuf {
    workspace.join(format!("{HANDOFF_FILE_PREFIX}_{test_id}"))
}

/// Write the build result for a completed orchestration.
pub fn save(
    workspace: &Path,
    test_id: u32,
    options: &RunOptions,
    run: &TestRun,
) -> Result<PathBuf, RunnerError> {
    let result = BuildResult {
        test_options: options.clone(),
        test_run: run.clone(),
        written_at: Utc::now(),
    };
    let path = handoff_path(workspace, test_id);
    std::fs::write(&path, serde_json::to_string_pretty(&result)?)?;
    Ok(path)
}

/// Read the build result a prior `run` invocation left behind.
pub fn load(workspace: &Path, test_id: u32) -> Result<BuildResult, RunnerError> {
    let content = std::fs::read_to_string(handoff_path(workspace, test_id))?;
    Ok(serde_json::from_str(&content)?)
}
