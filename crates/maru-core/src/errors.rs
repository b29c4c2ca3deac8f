//! Dialog pipeline error taxonomy.
//!
//! Only [`DialogError::ContextUnavailable`] is fatal for a turn; every
//! other condition degrades to a best-effort response. The transport
//! collaborator maps fatal errors to a generic "could not process"
//! reply, never a raw internal error.

/// Errors that can occur while orchestrating a dialog turn.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    /// Both storage tiers are unreachable. Fatal for the turn.
    #[error("Context unavailable: {0}")]
    ContextUnavailable(String),

    /// NLU collaborator unavailable; local fallback matcher was used.
    #[error("Intent resolution degraded: {0}")]
    IntentResolutionDegraded(String),

    /// A handler exceeded its per-invocation deadline.
    #[error("Plugin timeout: {handler} exceeded {timeout_ms}ms")]
    PluginTimeout {
        /// Handler name.
        handler: String,
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// A handler returned an error.
    #[error("Plugin execution failed: {handler}: {message}")]
    PluginExecutionFailed {
        /// Handler name.
        handler: String,
        /// Error description.
        message: String,
    },

    /// No registered handler matched the resolved intent.
    #[error("No candidate handler for intent: {0}")]
    NoCandidateHandler(String),

    /// One or more enrichment services failed; context returned without
    /// the missing data.
    #[error("Enrichment partial: {0}")]
    EnrichmentPartial(String),

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DialogError {
    /// Whether this error fails the turn (vs. degrading to a fallback).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ContextUnavailable(_) | Self::Internal(_))
    }

    /// Error category string for event emission and metrics labels.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::ContextUnavailable(_) => "context_unavailable",
            Self::IntentResolutionDegraded(_) => "intent_degraded",
            Self::PluginTimeout { .. } => "plugin_timeout",
            Self::PluginExecutionFailed { .. } => "plugin_failed",
            Self::NoCandidateHandler(_) => "no_candidate",
            Self::EnrichmentPartial(_) => "enrichment_partial",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn only_context_and_internal_are_fatal() {
        assert!(DialogError::ContextUnavailable("both tiers down".into()).is_fatal());
        assert!(DialogError::Internal("bug".into()).is_fatal());
        assert!(!DialogError::NoCandidateHandler("weather.query".into()).is_fatal());
        assert!(
            !DialogError::PluginTimeout {
                handler: "weather".into(),
                timeout_ms: 3000
            }
            .is_fatal()
        );
        assert!(!DialogError::IntentResolutionDegraded("nlu 503".into()).is_fatal());
        assert!(!DialogError::EnrichmentPartial("profile".into()).is_fatal());
    }

    #[test]
    fn category_strings() {
        assert_eq!(
            DialogError::ContextUnavailable("x".into()).category(),
            "context_unavailable"
        );
        assert_eq!(
            DialogError::PluginExecutionFailed {
                handler: "h".into(),
                message: "m".into()
            }
            .category(),
            "plugin_failed"
        );
        assert_eq!(
            DialogError::NoCandidateHandler("a.b".into()).category(),
            "no_candidate"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = DialogError::PluginTimeout {
            handler: "weather".into(),
            timeout_ms: 3000,
        };
        assert_eq!(err.to_string(), "Plugin timeout: weather exceeded 3000ms");

        let err = DialogError::ContextUnavailable("both tiers unreachable".into());
        assert_matches!(err, DialogError::ContextUnavailable(_));
        assert!(err.to_string().contains("both tiers unreachable"));
    }
}
