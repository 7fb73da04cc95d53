use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a content task. `Dispatching` is the transient claimed state
/// between a successful claim and the final status commit; it exists so the
/// claim can be a single conditional UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Draft,
    DraftApproved,
    Scheduled,
    Dispatching,
    Posted,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Draft => "draft",
            TaskStatus::DraftApproved => "draft_approved",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Dispatching => "dispatching",
            TaskStatus::Posted => "posted",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "draft" => Some(TaskStatus::Draft),
            "draft_approved" => Some(TaskStatus::DraftApproved),
            "scheduled" => Some(TaskStatus::Scheduled),
            "dispatching" => Some(TaskStatus::Dispatching),
            "posted" => Some(TaskStatus::Posted),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Posted | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<AttemptStatus> {
        match s {
            "success" => Some(AttemptStatus::Success),
            "failed" => Some(AttemptStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub hashtags: Vec<String>,
    pub image_prompt: Option<String>,
    pub media_url: Option<String>,
    pub status: TaskStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformRecord {
    pub platform_id: String,
    pub api_name: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    /// Encrypted credentials blob. Never serialized out of the registry.
    #[serde(skip_serializing)]
    pub credentials: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PlatformRecord {
    /// A platform with a past expiry is unusable regardless of `is_active`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostAttemptRecord {
    pub attempt_id: String,
    pub task_id: String,
    pub platform_id: String,
    pub status: AttemptStatus,
    pub response: Option<serde_json::Value>,
    pub latency_ms: Option<i64>,
    pub error_log_id: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogRecord {
    pub error_id: String,
    pub task_id: Option<String>,
    pub platform_id: Option<String>,
    pub attempt_id: Option<String>,
    pub error_type: Option<String>,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating a draft.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub image_prompt: Option<String>,
    pub media_url: Option<String>,
    pub notes: Option<String>,
}

/// Partial update applied to a draft-state task only.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftUpdate {
    pub title: Option<String>,
    pub caption: Option<String>,
    pub hashtags: Option<Vec<String>>,
    pub image_prompt: Option<String>,
    pub media_url: Option<String>,
    pub notes: Option<String>,
}

/// Timestamps are stored as fixed-width RFC 3339 (`...Z`, microseconds) so
/// lexicographic TEXT comparison in SQLite matches chronological order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
