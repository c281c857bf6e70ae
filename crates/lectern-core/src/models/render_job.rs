use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Name of the document render job on the queue.
pub const RENDER_DOCUMENT_JOB: &str = "render_document";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "render_job_status", rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// One unit of work on the render queue.
///
/// Delivery is at-least-once: a job claimed by a worker that crashes is
/// returned to `Pending` by the stale-job reaper and redelivered. The
/// handler must therefore tolerate reprocessing an already-completed asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: Uuid,
    pub job_name: String,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: for<'de> Deserialize<'de>>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Payload of a document render job. Exactly one job exists per PROCESSING
/// asset under normal operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderJobPayload {
    /// Private staging key the worker downloads the source from.
    pub source_key: String,
    pub content_type: String,
    pub original_filename: String,
    pub asset_id: Uuid,
    /// Overrides the configured brand label when set.
    pub brand_label: Option<String>,
}

impl RenderJobPayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_payload_roundtrip_through_job() {
        let payload = RenderJobPayload {
            source_key: "staging/abc/lecture.docx".to_string(),
            content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                .to_string(),
            original_filename: "lecture.docx".to_string(),
            asset_id: Uuid::new_v4(),
            brand_label: Some("Night School".to_string()),
        };

        let job = RenderJob {
            id: Uuid::new_v4(),
            job_name: RENDER_DOCUMENT_JOB.to_string(),
            status: JobStatus::Pending,
            payload: payload.to_value(),
            result: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let decoded: RenderJobPayload = job.try_payload_as().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let job = RenderJob {
            id: Uuid::new_v4(),
            job_name: RENDER_DOCUMENT_JOB.to_string(),
            status: JobStatus::Pending,
            payload: serde_json::json!({"source_key": 42}),
            result: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(job.try_payload_as::<RenderJobPayload>().is_err());
    }
}
