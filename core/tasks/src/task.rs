//! Task records and their terminal states.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use fileengine_common::{Error, Result};

/// Operations the worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// `parent`, `name`
    CreateFolder,
    /// `src`, `dst`
    MoveFile,
    /// `upload_tmp`, `target_path`, `filename`
    CompleteUpload,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::CreateFolder => "create_folder",
            TaskKind::MoveFile => "move_file",
            TaskKind::CompleteUpload => "complete_upload",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create_folder" => Ok(TaskKind::CreateFolder),
            "move_file" => Ok(TaskKind::MoveFile),
            "complete_upload" => Ok(TaskKind::CompleteUpload),
            other => Err(Error::UnknownTaskType(other.to_string())),
        }
    }
}

/// A unit of deferred work.
///
/// Wire form: `{"id": "...", "type": "create_folder", "params": {...}}`.
/// `type` stays a free string so unknown kinds survive transport and are
/// rejected by the worker, not the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl Task {
    /// Create a task with a fresh random id.
    pub fn new<I, K, V>(kind: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn create_folder(parent: &str, name: &str) -> Self {
        Self::new(
            TaskKind::CreateFolder.as_str(),
            [("parent", parent), ("name", name)],
        )
    }

    pub fn move_file(src: &str, dst: &str) -> Self {
        Self::new(TaskKind::MoveFile.as_str(), [("src", src), ("dst", dst)])
    }

    pub fn complete_upload(upload_tmp: &str, target_path: &str, filename: &str) -> Self {
        Self::new(
            TaskKind::CompleteUpload.as_str(),
            [
                ("upload_tmp", upload_tmp),
                ("target_path", target_path),
                ("filename", filename),
            ],
        )
    }

    /// A required parameter.
    ///
    /// # Errors
    /// - `InvalidInput` if the parameter is absent
    pub fn param(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::InvalidInput(format!("missing task parameter: {}", key)))
    }
}

/// Lifecycle state of a task, keyed by task id.
///
/// Rendered as `pending`, `success` or `failed:<reason>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TaskStatus {
    Pending,
    Success,
    Failed(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    /// Short status word without the failure reason.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Success => "success",
            TaskStatus::Failed(_) => "failed",
        }
    }

    /// Failure reason, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            TaskStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Failed(reason) => write!(f, "failed:{}", reason),
            other => f.write_str(other.label()),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "success" => Ok(TaskStatus::Success),
            "failed" => Ok(TaskStatus::Failed(String::new())),
            _ => match s.strip_prefix("failed:") {
                Some(reason) => Ok(TaskStatus::Failed(reason.to_string())),
                None => Err(Error::InvalidInput(format!("invalid task status: {}", s))),
            },
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for TaskStatus {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
