//! Wire types exchanged with the control plane.
//!
//! Field names follow the control plane's camelCase JSON contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity the runner presents to the control plane.
///
/// `runner_id` is the registered identity; `instance_id` distinguishes
/// restarts of the same registration.
#[derive(Debug, Clone)]
pub struct RunnerIdentity {
    pub account_id: String,
    pub runner_id: String,
    pub runner_name: String,
    pub instance_id: String,
}

/// Notification that work exists for this runner; not yet the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunnerEvent {
    #[serde(default)]
    pub account_id: String,
    pub task_id: String,
    #[serde(default)]
    pub runner_type: String,
    #[serde(default)]
    pub task_type: String,
}

/// One request within a task's execution payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerRequest {
    pub task_id: String,
    #[serde(default)]
    pub task_type: String,
    /// Opaque handler input, interpreted by the task router.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Terminal outcome of one dispatched request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatusCode {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Status payload reported back after executing a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: String,
    pub code: TaskStatusCode,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResponse {
    /// Builds a success response carrying the router's body.
    pub fn ok(task_id: &str, data: serde_json::Value) -> Self {
        Self {
            id: task_id.to_string(),
            code: TaskStatusCode::Ok,
            data,
            error: None,
        }
    }

    /// Builds a failure response with a structured error message.
    pub fn failed(task_id: &str, message: String) -> Self {
        Self {
            id: task_id.to_string(),
            code: TaskStatusCode::Failed,
            data: serde_json::Value::Null,
            error: Some(message),
        }
    }
}

/// Operational descriptor for a daemon set.
///
/// Equality of two descriptors decides whether a running daemon set may
/// be reused instead of restarted, so the comparison is an explicit
/// field-by-field contract rather than a derived deep-equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationalConfig {
    /// Executable version reference (resolved by the downloader).
    pub version: String,
    /// Executable name or artifact reference.
    pub executable: String,
    /// Environment handed to the child process. Ordered map so two
    /// configs with the same bindings always compare equal.
    pub env: BTreeMap<String, String>,
    /// CPU limit in millicores; 0 means unlimited.
    pub cpu_millis: u64,
    /// Memory limit in MiB; 0 means unlimited.
    pub memory_mb: u64,
}

impl OperationalConfig {
    /// Field-wise equality: true when a running instance with this
    /// config can serve a declaration carrying `other`.
    pub fn matches(&self, other: &OperationalConfig) -> bool {
        self.version == other.version
            && self.executable == other.executable
            && self.env == other.env
            && self.cpu_millis == other.cpu_millis
            && self.memory_mb == other.memory_mb
    }
}

/// A unit of work assigned to a running daemon set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonTask {
    pub task_id: String,
    #[serde(default)]
    pub task_type: String,
    /// Opaque parameters, passed through to the daemon set verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

/// Locally observed state for one daemon-set type, reported upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetReport {
    pub daemon_set_id: String,
    #[serde(rename = "type")]
    pub set_type: String,
    pub config: OperationalConfig,
    pub healthy: bool,
}

/// The control plane's declared desired state for one daemon-set type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileEntry {
    pub daemon_set_id: String,
    #[serde(rename = "type")]
    pub set_type: String,
    #[serde(default)]
    pub config: OperationalConfig,
    #[serde(default)]
    pub healthy: bool,
    /// Task IDs the control plane expects assigned to this type.
    #[serde(default)]
    pub task_ids: Vec<String>,
    /// When set, the runner must not touch this type this round.
    #[serde(default)]
    pub skip_update: bool,
}

/// Registration request announcing this runner to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub runner_id: String,
    pub runner_name: String,
    pub instance_id: String,
    pub version: String,
}

/// Request to acquire parameters for newly desired daemon tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireDaemonTasksRequest {
    pub daemon_set_id: String,
    #[serde(rename = "type")]
    pub set_type: String,
    pub task_ids: Vec<String>,
}
