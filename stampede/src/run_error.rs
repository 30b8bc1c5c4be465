use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Configuration problems are invalid input; everything else is a runtime failure.
    pub fn from_core(err: stampede_core::Error, context: &'static str) -> Self {
        use stampede_core::Error as CoreError;

        let kind = match &err {
            CoreError::Join(_) | CoreError::Metrics(_) => RunError::RuntimeError,
            CoreError::MissingDefaultProfile { .. }
            | CoreError::EmptyProfile(_)
            | CoreError::InvalidVus
            | CoreError::InvalidIterations
            | CoreError::InvalidDuration
            | CoreError::InvalidExecutor
            | CoreError::InvalidStages
            | CoreError::InvalidTimeUnit
            | CoreError::InvalidPreAllocatedVus
            | CoreError::InvalidMaxVus
            | CoreError::DuplicateScenario(_)
            | CoreError::InvalidThreshold { .. }
            | CoreError::EmptySession(_)
            | CoreError::InvalidThinkTime { .. }
            | CoreError::InvalidBaseUrl(_)
            | CoreError::EmptyBatch(_) => RunError::InvalidInput,
        };

        kind(anyhow::Error::new(err).context(context))
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) | Self::RuntimeError(e) => {
                write!(f, "{e:#}")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_invalid_input() {
        let err = RunError::from_core(stampede_core::Error::InvalidStages, "invalid profile");
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert_eq!(
            err.to_string(),
            "invalid profile: `stages` must be a non-empty array of { duration, target }"
        );

        let err = RunError::from_core(
            stampede_core::Error::Metrics(stampede_core::MetricsError::UnknownMetric(
                "x".to_string(),
            )),
            "run failed",
        );
        assert_eq!(err.exit_code(), ExitCode::RuntimeError);
    }
}
