use thiserror::Error;

/// Failures a studio request can end in. The display text is what the user sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StudioError {
    /// Missing credential or unusable client setup.
    #[error("{0}")]
    Configuration(String),

    #[error("{provider} API error: {detail}. Please check your API key.")]
    Transport { provider: String, detail: String },

    #[error("No image found in the {provider} API response.")]
    EmptyResult { provider: String },

    /// Required input missing; raised before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Codec(String),
}

impl StudioError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Transport { .. } => "transport",
            Self::EmptyResult { .. } => "empty_result",
            Self::Validation(_) => "validation",
            Self::Codec(_) => "codec",
        }
    }

    /// The generic banner shown for any failed request.
    pub fn user_message(&self) -> String {
        let detail = self.to_string();
        format!(
            "An error occurred: {}. Please try again.",
            detail.trim_end_matches('.')
        )
    }
}
