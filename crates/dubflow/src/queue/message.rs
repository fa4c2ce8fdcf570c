//! Wire format of queue messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Job;

/// Message type marker for dubbing job requests.
pub const MESSAGE_TYPE_DUBBING: &str = "DUBBING_JOB";

/// A job execution request as it travels through the queue. Field names are
/// camelCase on the wire to match the producing services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub message_type: String,
    pub job_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl QueueMessage {
    pub fn dubbing(job: &Job) -> Self {
        Self {
            message_type: MESSAGE_TYPE_DUBBING.to_string(),
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            video_id: job.video_id.clone(),
            requested_at: Utc::now(),
        }
    }

    pub fn is_dubbing(&self) -> bool {
        self.message_type == MESSAGE_TYPE_DUBBING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_camel_case() {
        let msg = QueueMessage {
            message_type: MESSAGE_TYPE_DUBBING.to_string(),
            job_id: "j1".to_string(),
            user_id: "u1".to_string(),
            video_id: Some("v1".to_string()),
            requested_at: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["messageType"], "DUBBING_JOB");
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["videoId"], "v1");
        assert!(json.get("requestedAt").is_some());
    }

    #[test]
    fn test_video_id_omitted_when_none() {
        let msg = QueueMessage {
            message_type: MESSAGE_TYPE_DUBBING.to_string(),
            job_id: "j1".to_string(),
            user_id: "u1".to_string(),
            video_id: None,
            requested_at: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("videoId").is_none());
    }

    #[test]
    fn test_deserialize_producer_payload() {
        let raw = r#"{
            "messageType": "DUBBING_JOB",
            "jobId": "abc",
            "userId": "u9",
            "requestedAt": "2026-08-01T10:00:00Z"
        }"#;
        let msg: QueueMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.is_dubbing());
        assert_eq!(msg.job_id, "abc");
        assert!(msg.video_id.is_none());
    }
}
