use thiserror::Error;

/// Failure of an external collaborator call.
///
/// Rendered with an `Error:` prefix so degraded text stays recognisable
/// wherever it surfaces.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("Error: Could not get response from language model. {0}")]
    Reasoning(String),

    #[error("Error: Embedding request failed. {0}")]
    Embedding(String),

    #[error("Error: Search request failed. {0}")]
    Search(String),
}

/// Errors that abort a research session before the report can be written.
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Could not process the initial query due to an embedding failure.")]
    QueryEmbedding,

    #[error("Workflow error: {0}")]
    Workflow(#[from] graph_flow::GraphError),

    #[error("Workflow failed: {0}")]
    WorkflowFailed(String),

    #[error("Session {0} finished without producing a report")]
    MissingReport(String),
}

pub type Result<T> = std::result::Result<T, ResearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_render_with_error_prefix() {
        let errors = [
            ServiceError::Reasoning("timeout".into()),
            ServiceError::Embedding("response size mismatch: sent 2, received 1".into()),
            ServiceError::Search("HTTP 429".into()),
        ];
        for error in errors {
            assert!(error.to_string().starts_with("Error: "), "{}", error);
        }
        assert_eq!(
            ServiceError::Embedding("quota".into()).to_string(),
            "Error: Embedding request failed. quota"
        );
    }
}
