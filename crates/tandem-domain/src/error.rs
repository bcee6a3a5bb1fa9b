use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Fingerprint failed: {0}")]
    Fingerprint(String),

    #[error("Workflow returned empty output after {attempts} attempts")]
    EmptyOutputExhausted { attempts: u32 },

    #[error("Workflow rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Workflow HTTP error {status}")]
    WorkflowHttp { status: u16 },

    #[error("Workflow connection failed: {0}")]
    WorkflowConnection(String),

    #[error("Control log persistence failed: {0}")]
    LogPersistence(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Cap error text destined for operator-facing logs.
pub fn truncate_error_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}
