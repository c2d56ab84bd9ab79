use crate::model::TestRun;

/// Gateway-boundary error classification. Retry loops dispatch on the
/// variant: `Transient` is retried against a budget, `AuthExpired`
/// triggers a re-login, `Fatal` propagates immediately.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("authentication expired")]
    AuthExpired,

    #[error("{0}")]
    Fatal(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return ApiError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 401 => ApiError::AuthExpired,
            Some(status) if status.is_server_error() => ApiError::Transient(err.to_string()),
            _ => ApiError::Fatal(err.to_string()),
        }
    }
}

/// Orchestration-level failures surfaced to the caller. The caller (the
/// CI step) maps these into the final exit disposition; this crate never
/// decides the CI-visible status itself.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to start test run: {0}")]
    StartFailed(String),

    #[error("re-login retried {attempts} times, failed")]
    LoginExhausted { attempts: u32 },

    #[error("status polling retried {attempts} times, abort")]
    PollExhausted {
        attempts: u32,
        /// Last known run snapshot, for diagnostics. Non-terminal by
        /// construction — callers must not treat it as a completed run.
        last: Box<TestRun>,
    },

    #[error("test run interrupted, final status {outcome}")]
    Interrupted { outcome: crate::model::RunStatus },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed build result: {0}")]
    Json(#[from] serde_json::Error),
}
