//! Turns raw completion text into a [`RecommendationResult`].
//!
//! Tiers run in order and the first success wins:
//! 1. [`DirectParse`]: the whole text is the object, possibly with `//`
//!    comments or trailing commas.
//! 2. [`EmbeddedObjectExtraction`]: the object sits inside surrounding prose.
//! 3. [`HeuristicSalvage`]: pattern-match a reply and ids out of broken text.
//!
//! When every tier fails the pipeline answers with the friendly fallback, so
//! [`RecoveryPipeline::recover`] never fails.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::domain::product::ProductId;
use crate::errors::ParseError;
use crate::events::{EventSink, RecommendationEvent};
use crate::recommendation::{RecommendationResult, FRIENDLY_FALLBACK_REPLY, MAX_RECOMMENDATIONS};

const SALVAGED_REPLY_MAX_CHARS: usize = 300;

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"//[^\n]*").expect("valid regex"));
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([\]}])").expect("valid regex"));
static EMBEDDED_OBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\{.*?"reply".*?"recommended_ids".*?\}"#).expect("valid regex")
});
static IDS_ARRAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"recommended_ids".*?\[([\d,\s]+)\]"#).expect("valid regex")
});
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));
static STANDALONE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[1-9]\d?\b").expect("valid regex"));
static REPLY_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""reply"[\s:]+"([^"]+)""#).expect("valid regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryTier {
    Direct,
    Extraction,
    Heuristic,
    Fallback,
}

impl RecoveryTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Extraction => "extraction",
            Self::Heuristic => "heuristic",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for RecoveryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait RecoveryStrategy: Send + Sync {
    fn tier(&self) -> RecoveryTier;
    fn try_parse(&self, text: &str) -> Result<RecommendationResult, ParseError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DirectParse;

impl RecoveryStrategy for DirectParse {
    fn tier(&self) -> RecoveryTier {
        RecoveryTier::Direct
    }

    fn try_parse(&self, text: &str) -> Result<RecommendationResult, ParseError> {
        let trimmed = text.trim();
        match parse_object(trimmed) {
            Ok(result) => Ok(result),
            Err(error) => {
                let cleaned = strip_comments_and_trailing_commas(trimmed);
                if cleaned == trimmed {
                    Err(error)
                } else {
                    parse_object(&cleaned)
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedObjectExtraction;

impl RecoveryStrategy for EmbeddedObjectExtraction {
    fn tier(&self) -> RecoveryTier {
        RecoveryTier::Extraction
    }

    fn try_parse(&self, text: &str) -> Result<RecommendationResult, ParseError> {
        let mut last_error = ParseError::NoEmbeddedObject;
        let mut start = 0;

        // Each candidate begins at a later `{`, so nested wrappers like
        // `{"data": {"reply": ...}}` still yield the inner object.
        while let Some(candidate) = EMBEDDED_OBJECT.find_at(text, start) {
            let cleaned = strip_comments_and_trailing_commas(candidate.as_str());
            match parse_object(&cleaned) {
                Ok(result) => return Ok(result),
                Err(error) => last_error = error,
            }
            start = candidate.start() + 1;
        }

        Err(last_error)
    }
}

/// Last-resort pattern matching. Standalone numbers are only accepted in
/// `1..=max_id`.
#[derive(Clone, Copy, Debug)]
pub struct HeuristicSalvage {
    max_id: ProductId,
}

impl HeuristicSalvage {
    pub fn new(max_id: ProductId) -> Self {
        Self { max_id }
    }

    fn salvage_ids(&self, text: &str) -> Vec<ProductId> {
        if let Some(array) = IDS_ARRAY.captures(text).and_then(|captures| captures.get(1)) {
            let ids = DIGITS
                .find_iter(array.as_str())
                .filter_map(|digits| digits.as_str().parse::<u32>().ok())
                .map(ProductId)
                .take(MAX_RECOMMENDATIONS)
                .collect::<Vec<_>>();
            if !ids.is_empty() {
                return ids;
            }
        }

        let mut seen = HashSet::new();
        STANDALONE_ID
            .find_iter(text)
            .filter_map(|number| number.as_str().parse::<u32>().ok())
            .map(ProductId)
            .filter(|id| *id <= self.max_id)
            .filter(|id| seen.insert(*id))
            .take(MAX_RECOMMENDATIONS)
            .collect()
    }

    fn salvage_reply(text: &str) -> String {
        if let Some(reply) = REPLY_VALUE.captures(text).and_then(|captures| captures.get(1)) {
            return reply.as_str().to_string();
        }

        text.chars()
            .take(SALVAGED_REPLY_MAX_CHARS)
            .filter(|character| !matches!(character, '{' | '}' | '[' | ']'))
            .collect::<String>()
            .trim()
            .to_string()
    }
}

impl RecoveryStrategy for HeuristicSalvage {
    fn tier(&self) -> RecoveryTier {
        RecoveryTier::Heuristic
    }

    fn try_parse(&self, text: &str) -> Result<RecommendationResult, ParseError> {
        let cleaned = strip_comments_and_trailing_commas(text.trim());
        let ids = self.salvage_ids(&cleaned);
        let reply = Self::salvage_reply(&cleaned);

        match (reply.is_empty(), ids.is_empty()) {
            (true, true) => Err(ParseError::Unrecoverable),
            (true, false) => Ok(RecommendationResult::new(FRIENDLY_FALLBACK_REPLY, ids)),
            (false, _) => Ok(RecommendationResult::new(reply, ids)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recovered {
    pub result: RecommendationResult,
    pub tier: RecoveryTier,
}

pub struct RecoveryPipeline {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl RecoveryPipeline {
    /// The standard three tiers, salvaging standalone ids up to `max_id`.
    pub fn new(max_id: ProductId) -> Self {
        Self::with_strategies(vec![
            Box::new(DirectParse),
            Box::new(EmbeddedObjectExtraction),
            Box::new(HeuristicSalvage::new(max_id)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn recover(&self, raw: &str, events: &dyn EventSink) -> Recovered {
        for strategy in &self.strategies {
            let tier = strategy.tier();
            match strategy.try_parse(raw) {
                Ok(result) => {
                    events.emit(
                        RecommendationEvent::info("recovery.succeeded", "completion text recovered")
                            .with_metadata("tier", tier.as_str())
                            .with_metadata("recommended", result.recommended_ids().len().to_string()),
                    );
                    return Recovered { result, tier };
                }
                Err(error) => events.emit(
                    RecommendationEvent::debug("recovery.tier_failed", error.to_string())
                        .with_metadata("tier", tier.as_str()),
                ),
            }
        }

        events.emit(
            RecommendationEvent::warn(
                "recovery.fallback",
                "no tier recovered the completion; answering with the friendly fallback",
            )
            .with_metadata("raw_chars", raw.chars().count().to_string()),
        );
        Recovered { result: RecommendationResult::friendly_fallback(), tier: RecoveryTier::Fallback }
    }
}

impl fmt::Debug for RecoveryPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiers: Vec<_> = self.strategies.iter().map(|strategy| strategy.tier()).collect();
        f.debug_struct("RecoveryPipeline").field("tiers", &tiers).finish()
    }
}

pub fn strip_comments_and_trailing_commas(text: &str) -> Cow<'_, str> {
    let without_comments = LINE_COMMENT.replace_all(text, "");
    if !TRAILING_COMMA.is_match(&without_comments) {
        return without_comments;
    }
    Cow::Owned(TRAILING_COMMA.replace_all(&without_comments, "$1").into_owned())
}

/// `reply` must be a string and `recommended_ids` an array. Array entries that
/// are not non-negative integers (`1` or `1.0`) are dropped.
fn parse_object(text: &str) -> Result<RecommendationResult, ParseError> {
    let value = serde_json::from_str::<Value>(text)
        .map_err(|error| ParseError::InvalidJson(error.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    let reply = object
        .get("reply")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingKey("reply"))?;
    let ids = object
        .get("recommended_ids")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingKey("recommended_ids"))?
        .iter()
        .filter_map(integral_id)
        .map(ProductId)
        .collect();

    Ok(RecommendationResult::new(reply, ids))
}

fn integral_id(value: &Value) -> Option<u32> {
    if let Some(id) = value.as_u64() {
        return u32::try_from(id).ok();
    }
    value
        .as_f64()
        .filter(|id| id.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(id))
        .map(|id| id as u32)
}

#[cfg(test)]
mod tests {
    use super::{
        strip_comments_and_trailing_commas, DirectParse, EmbeddedObjectExtraction,
        HeuristicSalvage, RecoveryPipeline, RecoveryStrategy, RecoveryTier,
    };
    use crate::domain::product::ProductId;
    use crate::errors::ParseError;
    use crate::events::InMemoryEventSink;
    use crate::recommendation::FRIENDLY_FALLBACK_REPLY;

    fn ids(raw: &[u32]) -> Vec<ProductId> {
        raw.iter().copied().map(ProductId).collect()
    }

    fn pipeline() -> RecoveryPipeline {
        RecoveryPipeline::new(ProductId(26))
    }

    #[test]
    fn well_formed_object_is_recovered_exactly() {
        let sink = InMemoryEventSink::default();
        let raw = "  {\"reply\":\"Prends la veste // imperméable !\",\"recommended_ids\":[1,11]}\n";
        let recovered = pipeline().recover(raw, &sink);

        assert_eq!(recovered.tier, RecoveryTier::Direct);
        assert_eq!(recovered.result.reply(), "Prends la veste // imperméable !");
        assert_eq!(recovered.result.recommended_ids(), ids(&[1, 11]));
        assert!(sink.contains("recovery.succeeded"));
    }

    #[test]
    fn comments_and_trailing_commas_are_cleaned_in_the_first_tier() {
        let raw = "{\n  \"reply\": \"Voici\", // salutation\n  \"recommended_ids\": [2, 17,],\n}";
        let result = DirectParse.try_parse(raw).expect("direct tier recovers");
        assert_eq!(result.reply(), "Voici");
        assert_eq!(result.recommended_ids(), ids(&[2, 17]));
    }

    #[test]
    fn cleanup_leaves_plain_text_borrowed() {
        let text = "{\"reply\":\"ok\",\"recommended_ids\":[]}";
        assert!(matches!(
            strip_comments_and_trailing_commas(text),
            std::borrow::Cow::Borrowed(_)
        ));
    }

    #[test]
    fn direct_tier_rejects_mistyped_shape() {
        assert_eq!(
            DirectParse.try_parse("{\"reply\":3,\"recommended_ids\":[1]}"),
            Err(ParseError::MissingKey("reply"))
        );
        assert_eq!(
            DirectParse.try_parse("{\"reply\":\"ok\",\"recommended_ids\":\"1\"}"),
            Err(ParseError::MissingKey("recommended_ids"))
        );
        assert_eq!(DirectParse.try_parse("[1,2]"), Err(ParseError::NotAnObject));
    }

    #[test]
    fn non_integer_ids_are_dropped() {
        let result = DirectParse
            .try_parse("{\"reply\":\"ok\",\"recommended_ids\":[1,\"2\",-3,4.5,9]}")
            .expect("direct tier recovers");
        assert_eq!(result.recommended_ids(), ids(&[1, 9]));
    }

    #[test]
    fn more_than_four_ids_are_capped() {
        let result = DirectParse
            .try_parse("{\"reply\":\"ok\",\"recommended_ids\":[1,2,3,4,5,6]}")
            .expect("direct tier recovers");
        assert_eq!(result.recommended_ids(), ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn object_wrapped_in_prose_is_extracted() {
        let sink = InMemoryEventSink::default();
        let raw = "Voici ma réponse : {\"reply\":\"Ok\",\"recommended_ids\":[5]} merci";
        let recovered = pipeline().recover(raw, &sink);

        assert_eq!(recovered.tier, RecoveryTier::Extraction);
        assert_eq!(recovered.result.reply(), "Ok");
        assert_eq!(recovered.result.recommended_ids(), ids(&[5]));
        assert!(sink.contains("recovery.tier_failed"));
    }

    #[test]
    fn extraction_skips_to_inner_object() {
        let raw = "Réponse {\"data\": {\"reply\":\"Ok\",\"recommended_ids\":[3]}}";
        let result = EmbeddedObjectExtraction.try_parse(raw).expect("inner object found");
        assert_eq!(result.recommended_ids(), ids(&[3]));
    }

    #[test]
    fn extracted_object_is_cleaned_before_parsing() {
        let sink = InMemoryEventSink::default();
        let raw = "Voici : {\"reply\":\"Ok\", // conseil\n \"recommended_ids\":[1,2,],} merci";

        let result = EmbeddedObjectExtraction.try_parse(raw).expect("cleaned object parses");
        assert_eq!(result.reply(), "Ok");
        assert_eq!(result.recommended_ids(), ids(&[1, 2]));

        let recovered = pipeline().recover(raw, &sink);
        assert_eq!(recovered.tier, RecoveryTier::Extraction);
        assert_eq!(recovered.result.recommended_ids(), ids(&[1, 2]));
    }

    #[test]
    fn integral_float_ids_are_kept() {
        let result = DirectParse
            .try_parse("{\"reply\":\"ok\",\"recommended_ids\":[1.0, 3, 2.5, -4, \"7\"]}")
            .expect("direct tier recovers");
        assert_eq!(result.recommended_ids(), ids(&[1, 3]));
    }

    #[test]
    fn duplicate_ids_collapse_before_the_cap() {
        let result = DirectParse
            .try_parse("{\"reply\":\"ok\",\"recommended_ids\":[1,1,1,2,3,4,5]}")
            .expect("direct tier recovers");
        assert_eq!(result.recommended_ids(), ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn extraction_reports_missing_object() {
        assert_eq!(
            EmbeddedObjectExtraction.try_parse("pas de json ici"),
            Err(ParseError::NoEmbeddedObject)
        );
    }

    #[test]
    fn truncated_array_is_salvaged_from_prose() {
        let sink = InMemoryEventSink::default();
        let raw = "Je te conseille \"recommended_ids\": [3, 7, 12] voilà";
        let recovered = pipeline().recover(raw, &sink);

        assert_eq!(recovered.tier, RecoveryTier::Heuristic);
        assert_eq!(recovered.result.recommended_ids(), ids(&[3, 7, 12]));
        assert!(!recovered.result.reply().is_empty());
        assert!(!recovered.result.reply().contains('['));
    }

    #[test]
    fn salvage_prefers_reply_key_value() {
        let raw = "{\"reply\": \"Prends la doudoune\", \"recommended_ids\": [21, 9";
        let result = HeuristicSalvage::new(ProductId(26)).try_parse(raw).expect("salvaged");
        assert_eq!(result.reply(), "Prends la doudoune");
        assert_eq!(result.recommended_ids(), ids(&[21, 9]));
    }

    #[test]
    fn standalone_numbers_respect_catalogue_bound() {
        let raw = "Les produits 3, 40 et 12 sont top, le 3 surtout, et 7 aussi, puis 8";
        let result = HeuristicSalvage::new(ProductId(26)).try_parse(raw).expect("salvaged");
        assert_eq!(result.recommended_ids(), ids(&[3, 12, 7, 8]));
    }

    #[test]
    fn salvaged_reply_is_bounded_and_stripped() {
        let raw = format!("{{[{}]}}", "a".repeat(400));
        let result = HeuristicSalvage::new(ProductId(26)).try_parse(&raw).expect("salvaged");
        assert_eq!(result.reply().chars().count(), 298);
        assert!(result.recommended_ids().is_empty());
    }

    #[test]
    fn nothing_recoverable_yields_friendly_fallback() {
        let sink = InMemoryEventSink::default();
        let recovered = pipeline().recover("  {} [] ", &sink);

        assert_eq!(recovered.tier, RecoveryTier::Fallback);
        assert_eq!(recovered.result.reply(), FRIENDLY_FALLBACK_REPLY);
        assert!(recovered.result.recommended_ids().is_empty());
        assert!(sink.contains("recovery.fallback"));
    }

    #[test]
    fn empty_text_falls_back() {
        let sink = InMemoryEventSink::default();
        assert_eq!(pipeline().recover("", &sink).tier, RecoveryTier::Fallback);
    }

    #[test]
    fn debug_lists_tiers_in_order() {
        let rendered = format!("{:?}", pipeline());
        assert!(rendered.contains("[Direct, Extraction, Heuristic]"));
    }
}
