use thiserror::Error;

/// Errors raised while importing a roster, resolving the typeface or
/// composing the envelope sheet. None of them are fatal to the process.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("roster CSV must contain a 名前 (name) column")]
    MissingNameColumn,

    #[error("row {row}: name must not be blank")]
    BlankName { row: usize },

    #[error("row {row}: invalid fee '{value}'")]
    InvalidFee { row: usize, value: String },

    #[error("at most {max} extra items can be configured, got {got}")]
    TooManyExtraItems { max: usize, got: usize },

    #[error("default fee must be a positive amount")]
    InvalidDefaultFee,

    #[error("roster has no members")]
    EmptyRoster,

    #[error("failed to read roster CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("typeface unavailable: {0}")]
    Font(String),

    #[error("failed to fetch typeface: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to write PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("envelope rendering was aborted: {0}")]
    Render(#[from] tokio::task::JoinError),
}

impl EnvelopeError {
    /// Whether the error stems from user input rather than from the
    /// environment the service runs in.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EnvelopeError::MissingNameColumn
                | EnvelopeError::BlankName { .. }
                | EnvelopeError::InvalidFee { .. }
                | EnvelopeError::TooManyExtraItems { .. }
                | EnvelopeError::InvalidDefaultFee
                | EnvelopeError::EmptyRoster
                | EnvelopeError::Csv(_)
        )
    }
}
