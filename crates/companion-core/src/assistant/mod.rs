use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::AssistantError;

pub mod openai;

/// Reply substituted whenever a run ends in anything but success.
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I couldn't generate a response. Please try again.";

/// Interval between run status polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Hard deadline for a single assistant run. A run still pending past this
/// point is treated as timed out and takes the degraded-reply path.
pub const RUN_DEADLINE: Duration = Duration::from_secs(120);

/// Status of an assistant run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    /// Local status: the poll deadline elapsed while the run was pending.
    TimedOut,
    Unknown(String),
}

impl From<&str> for RunStatus {
    fn from(s: &str) -> Self {
        match s {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "cancelling" => Self::Cancelling,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl RunStatus {
    /// Whether the run is still worth polling.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// A run handle returned by the assistant service.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    pub last_error: Option<String>,
}

/// Client seam for the hosted assistant service (threads/runs API).
///
/// The real implementation is [`openai::OpenAiAssistant`]; tests inject
/// fakes through this trait.
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Create a new conversation thread, returning its id.
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append a user message to a thread.
    async fn add_user_message(&self, thread_id: &str, text: &str) -> Result<(), AssistantError>;

    /// Start an assistant run on a thread.
    async fn create_run(&self, thread_id: &str, assistant_id: &str)
        -> Result<Run, AssistantError>;

    /// Retrieve the current state of a run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, AssistantError>;

    /// Text of the newest assistant-authored message on a thread, if any.
    async fn latest_assistant_text(&self, thread_id: &str)
        -> Result<Option<String>, AssistantError>;
}

/// Poll a run every [`POLL_INTERVAL`] until it reaches a terminal status or
/// the deadline elapses. The sleep is non-blocking; other requests are served
/// during the wait.
pub async fn run_to_completion(
    api: &dyn AssistantApi,
    thread_id: &str,
    mut run: Run,
    deadline: Duration,
) -> Result<Run, AssistantError> {
    let started = tokio::time::Instant::now();
    while run.status.is_pending() {
        if started.elapsed() >= deadline {
            warn!(
                thread_id,
                run_id = %run.id,
                "assistant run still {} after {:?}, giving up",
                run.status,
                deadline
            );
            run.status = RunStatus::TimedOut;
            return Ok(run);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        run = api.get_run(thread_id, &run.id).await?;
    }
    Ok(run)
}

#[cfg(test)]
pub mod fake;
