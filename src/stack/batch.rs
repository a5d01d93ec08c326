use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Outcome of one operation applied container by container.
///
/// Failures are collected; a failing container never stops the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Verb used in the report, e.g. "stop".
    pub operation: String,
    pub attempted: usize,
    pub succeeded: Vec<String>,
    /// `(container id, error message)`
    pub failed: Vec<(String, String)>,
    pub notes: Vec<String>,
}

impl BatchResult {
    pub fn new(operation: impl Into<String>) -> Self {
        BatchResult {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn record<E: fmt::Display>(&mut self, id: &str, result: std::result::Result<(), E>) {
        self.attempted += 1;
        match result {
            Ok(()) => self.succeeded.push(id.to_string()),
            Err(e) => {
                tracing::warn!("{} container {} failed: {}", self.operation, id, e);
                self.failed.push((id.to_string(), e.to_string()));
            }
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// `PartialFailure` if any container failed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::PartialFailure {
                attempted: self.attempted,
                failed: self.failed.len(),
                errors: self.failed,
            })
        }
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} container(s) succeeded",
            self.operation,
            self.succeeded.len(),
            self.attempted
        )?;
        for id in &self.succeeded {
            write!(f, "\n  ok      {}", id)?;
        }
        for (id, err) in &self.failed {
            write!(f, "\n  failed  {}: {}", id, err)?;
        }
        for note in &self.notes {
            write!(f, "\n{}", note)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_and_continues() {
        let mut batch = BatchResult::new("stop");
        batch.record::<String>("a", Ok(()));
        batch.record("b", Err("boom"));
        batch.record::<String>("c", Ok(()));
        assert_eq!(batch.attempted, 3);
        assert_eq!(batch.succeeded, vec!["a", "c"]);
        assert!(!batch.is_success());

        let text = batch.to_string();
        assert!(text.starts_with("stop: 2 of 3 container(s) succeeded"));
        assert!(text.contains("failed  b: boom"));

        match batch.into_result() {
            Err(Error::PartialFailure {
                attempted,
                failed,
                errors,
            }) => {
                assert_eq!((attempted, failed), (3, 1));
                assert_eq!(errors, vec![("b".to_string(), "boom".to_string())]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn empty_batch_is_success() {
        let batch = BatchResult::new("start");
        assert!(batch.clone().into_result().is_ok());
        assert_eq!(batch.to_string(), "start: 0 of 0 container(s) succeeded");
    }
}
