//! Picks weather and location hints out of a shopper's message.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::chat::ShoppingContext;

const WEATHER_KEYWORDS: [(&str, &[&str]); 4] = [
    (
        "pluie",
        &["pluie", "pluies", "pluvieux", "pluvieuse", "averse", "averses", "orage", "orages", "humide", "rain", "rainy"],
    ),
    ("froid", &["froid", "froide", "neige", "neigeux", "gel", "hiver", "cold", "snow", "winter"]),
    (
        "soleil",
        &["soleil", "ensoleille", "chaud", "chaude", "canicule", "ete", "sunny", "hot", "summer"],
    ),
    ("vent", &["vent", "venteux", "tempete", "rafales", "wind", "windy"]),
];

static LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[\s,(])(?:[aàÀ]|au|aux|vers|sur|près de|in|near|at)\s+(\p{Lu}[\p{L}'’]*(?:[\s-]\p{Lu}[\p{L}'’]*)*)",
    )
    .expect("valid regex")
});

/// First weather tag whose keywords appear as a word in `text`, ignoring case
/// and accents. Tags are checked in a fixed order (pluie, froid, soleil, vent).
pub fn infer_weather(text: &str) -> Option<&'static str> {
    let folded = fold_accents(&text.to_lowercase());
    let words: Vec<&str> = folded
        .split(|character: char| !character.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    WEATHER_KEYWORDS
        .iter()
        .find(|(_, keywords)| words.iter().any(|word| keywords.contains(word)))
        .map(|(tag, _)| *tag)
}

fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|character| match character {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Capitalised place name following a locative preposition, e.g. `à Chamonix`.
pub fn infer_location(text: &str) -> Option<String> {
    LOCATION
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Context for the next turn: hints found in `text` replace the matching
/// field of `current`, everything else carries over.
pub fn infer_context(text: &str, current: &ShoppingContext) -> ShoppingContext {
    ShoppingContext {
        weather: infer_weather(text).map_or_else(|| current.weather.clone(), str::to_string),
        location: infer_location(text).unwrap_or_else(|| current.location.clone()),
    }
}
