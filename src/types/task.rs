//! Embedding task wire format

use serde::{Deserialize, Serialize};

use crate::types::document::{DocumentKey, DocumentRecord};

/// A unit of embedding work handed from the ingestion stage to the
/// embedding stage through the task queue.
///
/// Field names are the wire contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedTask {
    #[serde(rename = "documentid")]
    pub document_id: String,
    pub created: String,
    /// Object store key of the uploaded PDF
    pub key: String,
}

impl EmbedTask {
    pub fn for_record(record: &DocumentRecord, key: impl Into<String>) -> Self {
        Self {
            document_id: record.document_id.clone(),
            created: record.created.clone(),
            key: key.into(),
        }
    }

    pub fn document_key(&self) -> DocumentKey {
        DocumentKey::new(self.document_id.clone(), self.created.clone())
    }
}

/// A claimed task together with its queue receipt. The receipt is needed
/// to acknowledge the task once processing finishes; unacknowledged tasks
/// become visible again after the visibility timeout.
#[derive(Debug, Clone)]
pub struct TaskLease {
    pub receipt: String,
    pub attempts: u32,
    pub task: EmbedTask,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_field_names() {
        let task = EmbedTask {
            document_id: "deadbeef".into(),
            created: "2024-03-01T09:30:00.000000Z".into(),
            key: "report.pdf".into(),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["documentid"], "deadbeef");
        assert_eq!(json["created"], "2024-03-01T09:30:00.000000Z");
        assert_eq!(json["key"], "report.pdf");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_task_round_trip() {
        let json = r#"{"documentid":"cafe","created":"2024-01-01T00:00:00.000000Z","key":"a.pdf"}"#;
        let task: EmbedTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.document_id, "cafe");
        assert_eq!(task.key, "a.pdf");
    }
}
