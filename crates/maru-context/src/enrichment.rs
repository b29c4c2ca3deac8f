//! Context enrichment from collaborator services.
//!
//! Profile, environment, and long-term-pattern data are fetched from
//! read-only collaborators during get-or-create. Each service is
//! independently optional: a failure is logged and the context is
//! returned without that service's data — never an error for the turn.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use maru_core::context::{ConversationContext, EnvironmentState};
use maru_core::ids::UserId;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A collaborator fetch failed.
#[derive(Debug, thiserror::Error)]
#[error("Enrichment fetch failed: {0}")]
pub struct EnrichmentError(pub String);

/// User profile data from the profile collaborator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Preferred language code (BCP 47).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Home location (room/city), if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Free-form preference entries.
    #[serde(default)]
    pub preferences: HashMap<String, Value>,
}

/// Read-only user profile lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// Fetch the profile for a user.
    async fn fetch(&self, user: &UserId) -> Result<UserProfile, EnrichmentError>;
}

/// Read-only environment sensor lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvironmentService: Send + Sync {
    /// Fetch current environment state for a user's home.
    async fn fetch(&self, user: &UserId) -> Result<EnvironmentState, EnrichmentError>;
}

/// Read-only long-term pattern lookup (ML pattern-analysis pipeline).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatternService: Send + Sync {
    /// Fetch learned pattern entries for a user.
    async fn fetch(&self, user: &UserId) -> Result<HashMap<String, Value>, EnrichmentError>;
}

/// Composes the optional enrichment collaborators.
#[derive(Clone, Default)]
pub struct Enricher {
    profile: Option<Arc<dyn ProfileService>>,
    environment: Option<Arc<dyn EnvironmentService>>,
    patterns: Option<Arc<dyn PatternService>>,
}

impl Enricher {
    /// An enricher with no collaborators (no-op).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a profile service.
    #[must_use]
    pub fn with_profile(mut self, service: Arc<dyn ProfileService>) -> Self {
        self.profile = Some(service);
        self
    }

    /// Attach an environment service.
    #[must_use]
    pub fn with_environment(mut self, service: Arc<dyn EnvironmentService>) -> Self {
        self.environment = Some(service);
        self
    }

    /// Attach a pattern service.
    #[must_use]
    pub fn with_patterns(mut self, service: Arc<dyn PatternService>) -> Self {
        self.patterns = Some(service);
        self
    }

    /// Merge collaborator data into the context. Returns the names of
    /// services that failed (empty when fully enriched).
    pub async fn enrich(&self, context: &mut ConversationContext) -> Vec<&'static str> {
        let mut failed = Vec::new();
        let user = context.user_id.clone();

        if let Some(profile) = &self.profile {
            match profile.fetch(&user).await {
                Ok(data) => {
                    // Profile fills gaps; conversation-derived state wins.
                    if context.user_state.language.is_none() {
                        context.user_state.language = data.language;
                    }
                    if context.user_state.location.is_none() {
                        context.user_state.location = data.location;
                    }
                    context.merge_long_term(&data.preferences);
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "profile enrichment failed");
                    counter!("context_enrichment_failures", "service" => "profile").increment(1);
                    failed.push("profile");
                }
            }
        }

        if let Some(environment) = &self.environment {
            match environment.fetch(&user).await {
                Ok(state) => merge_environment(&mut context.environment_state, state),
                Err(e) => {
                    warn!(user = %user, error = %e, "environment enrichment failed");
                    counter!("context_enrichment_failures", "service" => "environment")
                        .increment(1);
                    failed.push("environment");
                }
            }
        }

        if let Some(patterns) = &self.patterns {
            match patterns.fetch(&user).await {
                Ok(entries) => context.merge_long_term(&entries),
                Err(e) => {
                    warn!(user = %user, error = %e, "pattern enrichment failed");
                    counter!("context_enrichment_failures", "service" => "patterns").increment(1);
                    failed.push("patterns");
                }
            }
        }

        failed
    }
}

fn merge_environment(current: &mut EnvironmentState, fresh: EnvironmentState) {
    if fresh.temperature.is_some() {
        current.temperature = fresh.temperature;
    }
    if fresh.humidity.is_some() {
        current.humidity = fresh.humidity;
    }
    if fresh.light_level.is_some() {
        current.light_level = fresh.light_level;
    }
    if fresh.noise_level.is_some() {
        current.noise_level = fresh.noise_level;
    }
    if fresh.last_motion_at.is_some() {
        current.last_motion_at = fresh.last_motion_at;
    }
}
