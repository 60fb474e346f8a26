//! Recommendation request/response handling.
//!
//! - `prompt` renders the system instruction from the catalogue and context.
//! - `recovery` turns unreliable model text into a [`RecommendationResult`].
//! - `stock` drops ids that are unknown or unavailable.

pub mod prompt;
pub mod recovery;
pub mod stock;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

pub const MAX_RECOMMENDATIONS: usize = 4;

pub const TECHNICAL_ERROR_REPLY: &str =
    "Désolé, je rencontre un problème technique. Peux-tu reformuler ta demande ?";
pub const DEMO_MODE_REPLY: &str = "⚠️ Mode démo : l'IA n'est pas configurée. Renseigne SHOPPER_LLM_API_KEY pour activer les recommandations intelligentes.";
pub const FRIENDLY_FALLBACK_REPLY: &str =
    "Voici mes recommandations pour toi ! Jette un œil aux produits ci-dessous.";
pub const RECOMMENDED_MODELS: [&str; 2] =
    ["mistralai/Mistral-7B-Instruct-v0.3", "Qwen/Qwen2.5-7B-Instruct"];

/// Outcome of one recommendation turn. Holds at most [`MAX_RECOMMENDATIONS`]
/// distinct ids; every constructor, deserialization included, goes through
/// [`RecommendationResult::new`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRecommendationResult")]
pub struct RecommendationResult {
    reply: String,
    recommended_ids: Vec<ProductId>,
}

#[derive(Deserialize)]
struct RawRecommendationResult {
    reply: String,
    recommended_ids: Vec<ProductId>,
}

impl From<RawRecommendationResult> for RecommendationResult {
    fn from(raw: RawRecommendationResult) -> Self {
        Self::new(raw.reply, raw.recommended_ids)
    }
}

impl RecommendationResult {
    /// Keeps the first occurrence of each id, then caps the list.
    pub fn new(reply: impl Into<String>, recommended_ids: Vec<ProductId>) -> Self {
        let mut seen = BTreeSet::new();
        let recommended_ids = recommended_ids
            .into_iter()
            .filter(|product_id| seen.insert(*product_id))
            .take(MAX_RECOMMENDATIONS)
            .collect();
        Self { reply: reply.into(), recommended_ids }
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn recommended_ids(&self) -> &[ProductId] {
        &self.recommended_ids
    }

    pub fn into_parts(self) -> (String, Vec<ProductId>) {
        (self.reply, self.recommended_ids)
    }

    pub fn reply_only(reply: impl Into<String>) -> Self {
        Self::new(reply, Vec::new())
    }

    pub fn technical_error() -> Self {
        Self::reply_only(TECHNICAL_ERROR_REPLY)
    }

    pub fn demo_mode() -> Self {
        Self::reply_only(DEMO_MODE_REPLY)
    }

    pub fn friendly_fallback() -> Self {
        Self::reply_only(FRIENDLY_FALLBACK_REPLY)
    }

    /// Actionable reply for a model that the configured credential cannot use.
    pub fn gated_model(model: &str) -> Self {
        let alternatives = RECOMMENDED_MODELS
            .iter()
            .enumerate()
            .map(|(index, name)| {
                if index == 0 {
                    format!("- {name} (recommandé)")
                } else {
                    format!("- {name}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        Self::reply_only(format!(
            "⚠️ Le modèle \"{model}\" nécessite une autorisation supplémentaire.\n\n\
             Solution rapide : change SHOPPER_LLM_MODEL pour l'un de ces modèles :\n\
             {alternatives}\n\nPuis relance l'application."
        ))
    }

    pub fn has_recommendations(&self) -> bool {
        !self.recommended_ids.is_empty()
    }
}
