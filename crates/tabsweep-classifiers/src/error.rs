use thiserror::Error;

/// Errors raised while loading data, fitting models or evaluating a run.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Unknown model kind, missing or contradictory option.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Absent id/target column, duplicate identifiers, empty partition.
    #[error("data error: {0}")]
    Data(String),

    /// A metric is mathematically undefined for the given fold.
    #[error("metric computation error: {0}")]
    MetricComputation(String),

    /// A plot or other side artifact could not be produced.
    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("model error: {0}")]
    Model(String),

    /// A fit or evaluation stopped because its cancel token fired.
    #[error("run was cancelled")]
    Cancelled,

    #[error("run exceeded the {secs}s timeout")]
    Timeout { secs: u64 },

    #[error("run panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SweepError {
    /// Whether the error drops the current run from the result table.
    ///
    /// Metric failures are reported inside the record and artifact failures
    /// are swallowed; everything else aborts only the run that raised it.
    pub fn is_fatal_to_run(&self) -> bool {
        !matches!(
            self,
            SweepError::MetricComputation(_) | SweepError::Artifact(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_and_artifact_errors_do_not_drop_runs() {
        assert!(!SweepError::MetricComputation("single class".into()).is_fatal_to_run());
        assert!(!SweepError::Artifact("disk full".into()).is_fatal_to_run());
        assert!(SweepError::Data("duplicate id".into()).is_fatal_to_run());
        assert!(SweepError::Timeout { secs: 3 }.is_fatal_to_run());
    }

    #[test]
    fn display_includes_category() {
        let err = SweepError::Configuration("unknown model kind 'svm'".into());
        assert_eq!(err.to_string(), "configuration error: unknown model kind 'svm'");
    }
}
