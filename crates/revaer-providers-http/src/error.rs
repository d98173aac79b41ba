//! Error type for the generic HTTP-scraping provider.

use thiserror::Error;

/// Primary error type for HTTP-scraping provider operations.
#[derive(Debug, Error)]
pub enum HttpProviderError {
    /// Every configured template failed for this query.
    #[error("all HTTP source templates failed: {last_error}")]
    AllTemplatesFailed {
        /// The last template's failure message.
        last_error: String,
    },
    /// A template is missing the required `{query}` placeholder.
    #[error("template {template:?} is missing the {{query}} placeholder")]
    MissingQueryPlaceholder {
        /// The offending template.
        template: String,
    },
}

/// Convenience alias for HTTP-scraping provider results.
pub type HttpProviderResult<T> = Result<T, HttpProviderError>;
