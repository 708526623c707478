//! Append-only log of steps received from the server.

use crate::step::ReceivedStep;
use serde_json::Value;

/// Steps and their authoring sessions from a given version onward.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepsSince {
    /// The steps, in log order.
    pub steps: Vec<Value>,
    /// Authoring session of each step, index-aligned with `steps`.
    pub client_ids: Vec<i64>,
}

/// The local step log.
///
/// The log keeps every step in the order the server delivered it together
/// with the session that authored it.
///
/// # Invariants
///
/// - Steps are only appended, never reordered or rewritten
/// - `steps` and `client_ids` always have the same length
/// - `version()` is the number of steps in the log
#[derive(Debug, Clone, Default)]
pub struct StepLog {
    steps: Vec<Value>,
    client_ids: Vec<i64>,
}

impl StepLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one step.
    pub fn append(&mut self, step: Value, client_id: i64) {
        self.steps.push(step);
        self.client_ids.push(client_id);
    }

    /// Appends received steps in order.
    pub fn extend<'a>(&mut self, received: impl IntoIterator<Item = &'a ReceivedStep>) {
        for r in received {
            self.append(r.step.clone(), r.client_id);
        }
    }

    /// Returns the steps from `version` onward.
    ///
    /// A version past the end yields an empty result.
    pub fn since(&self, version: u64) -> StepsSince {
        let start = usize::try_from(version)
            .unwrap_or(usize::MAX)
            .min(self.steps.len());
        StepsSince {
            steps: self.steps[start..].to_vec(),
            client_ids: self.client_ids[start..].to_vec(),
        }
    }

    /// Returns the number of steps in the log.
    pub fn version(&self) -> u64 {
        self.steps.len() as u64
    }

    /// Returns the total number of entries.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn append_tracks_version() {
        let mut log = StepLog::new();
        assert!(log.is_empty());

        log.append(json!({"n": 1}), 10);
        log.append(json!({"n": 2}), 11);

        assert_eq!(log.version(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn since_returns_suffix() {
        let mut log = StepLog::new();
        for i in 0..5 {
            log.append(json!(i), 100 + i);
        }

        let tail = log.since(3);
        assert_eq!(tail.steps, vec![json!(3), json!(4)]);
        assert_eq!(tail.client_ids, vec![103, 104]);

        assert_eq!(log.since(0).steps.len(), 5);
        assert!(log.since(5).steps.is_empty());
        assert!(log.since(99).client_ids.is_empty());
    }

    #[test]
    fn extend_from_received() {
        let mut log = StepLog::new();
        let received = vec![
            ReceivedStep {
                step: json!("a"),
                client_id: 1,
            },
            ReceivedStep {
                step: json!("b"),
                client_id: 2,
            },
        ];
        log.extend(&received);
        assert_eq!(log.since(1).client_ids, vec![2]);
    }

    proptest! {
        #[test]
        fn since_stays_aligned(count in 0usize..40, from in 0u64..60) {
            let mut log = StepLog::new();
            for i in 0..count {
                log.append(json!(i), i as i64);
            }
            let tail = log.since(from);
            prop_assert_eq!(tail.steps.len(), tail.client_ids.len());
            prop_assert_eq!(tail.steps.len(), count.saturating_sub(from as usize));
        }
    }
}
