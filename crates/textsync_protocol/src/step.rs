//! Steps exchanged between editing clients.
//!
//! A step is an opaque, composable edit produced by the editing surface.
//! The protocol never looks inside a step; it only orders and forwards them.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A batch of steps as stored by the server, one entry per accepted push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEntry {
    /// Server row ID, if the server exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Document version after this batch was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Session that authored the batch.
    pub session_id: i64,
    /// The steps, expected to be a JSON array.
    pub data: Value,
}

impl StepEntry {
    /// Creates an entry holding `steps`.
    pub fn new(session_id: i64, version: u64, steps: Vec<Value>) -> Self {
        Self {
            id: None,
            version: Some(version),
            session_id,
            data: Value::Array(steps),
        }
    }

    /// Returns the steps in this entry.
    ///
    /// Fails if `data` is not an array; such entries cannot be applied.
    pub fn steps(&self) -> ProtocolResult<&[Value]> {
        self.data
            .as_array()
            .map(Vec::as_slice)
            .ok_or(ProtocolError::InvalidStepData {
                session_id: self.session_id,
            })
    }
}

/// A single remote step paired with the session that authored it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedStep {
    /// The step.
    pub step: Value,
    /// Authoring session ID.
    pub client_id: i64,
}

/// Local steps ready to be pushed, based on `version`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendableSteps {
    /// Version the steps were computed against.
    pub version: u64,
    /// Steps not yet confirmed by the server.
    pub steps: Vec<Value>,
}

impl SendableSteps {
    /// Creates a sendable batch.
    pub fn new(version: u64, steps: Vec<Value>) -> Self {
        Self { version, steps }
    }

    /// Returns true if there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_steps() {
        let entry = StepEntry::new(4, 2, vec![json!({"stepType": "replace"}), json!({})]);
        assert_eq!(entry.steps().unwrap().len(), 2);
    }

    #[test]
    fn entry_with_invalid_data() {
        let entry: StepEntry =
            serde_json::from_value(json!({"sessionId": 9, "data": "broken"})).unwrap();
        assert!(matches!(
            entry.steps(),
            Err(ProtocolError::InvalidStepData { session_id: 9 })
        ));
    }

    #[test]
    fn entry_decodes_server_shape() {
        let entry: StepEntry = serde_json::from_value(json!({
            "id": 31,
            "version": 5,
            "sessionId": 2,
            "data": [{"stepType": "addMark"}]
        }))
        .unwrap();
        assert_eq!(entry.id, Some(31));
        assert_eq!(entry.version, Some(5));
        assert_eq!(entry.steps().unwrap()[0]["stepType"], "addMark");
    }

    #[test]
    fn sendable_empty() {
        assert!(SendableSteps::default().is_empty());
        assert!(!SendableSteps::new(1, vec![json!(1)]).is_empty());
    }
}
