//! Deciding whether a turn needs a fresh search.
//!
//! Follow-up questions such as "tell me more about the third one" refer to
//! shops the assistant already suggested. Those are answered from the
//! context recorded on the last grounded assistant turn instead of a new
//! semantic search.

use std::collections::HashSet;
use std::sync::LazyLock;

use mall_catalog::ShopRecord;
use mall_conversation::{ConversationTurn, Role};
use mall_retrieval::text::{content_terms, tokenize};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Outcome of the retrieval decision for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalDecision {
    /// Search the index with the utterance.
    NeedsRetrieval,

    /// Answer from shops already suggested earlier in the thread.
    ReuseContext {
        /// The earlier shops, in their original rank order.
        candidates: Vec<ShopRecord>,

        /// Index into `candidates` of the shop the visitor singled out.
        focus: Option<usize>,
    },
}

impl RetrievalDecision {
    pub fn needs_retrieval(&self) -> bool {
        matches!(self, RetrievalDecision::NeedsRetrieval)
    }
}

/// Replaceable strategy for the retrieval decision.
///
/// Implementations must be pure: the same utterance and history always
/// yield the same decision.
pub trait RetrievalPolicy: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    fn decide(&self, utterance: &str, history: &[ConversationTurn]) -> RetrievalDecision;
}

/// Always searches.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetrieve;

impl RetrievalPolicy for AlwaysRetrieve {
    fn name(&self) -> &str {
        "always"
    }

    fn decide(&self, _utterance: &str, _history: &[ConversationTurn]) -> RetrievalDecision {
        RetrievalDecision::NeedsRetrieval
    }
}

const ORDINAL_WORDS: &str = "first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|last";

const REFERENT_NOUNS: &str = concat!(
    "one|ones|shop|shops|store|stores|place|places|option|options|",
    "restaurant|restaurants|outlet|outlets|result|results|",
    "suggestion|suggestions|recommendation|recommendations"
);

static ORDINAL_REFERENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b({ORDINAL_WORDS}|1st|2nd|3rd|[4-9]th|10th)\s+(?:{REFERENT_NOUNS})\b"
    ))
    .ok()
});

static TRAILING_ORDINAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(r"\bthe\s+({ORDINAL_WORDS})\s*[?.!]*$")).ok()
});

static NUMBERED_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:#\s*|\bnumber\s+|\bno\.\s*)(\d{1,2})\b").ok());

static DEMONSTRATIVE_REFERENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?:that|this|those|these|the\s+same)\s+(?:\w+\s+)?(?:{REFERENT_NOUNS})\b"
    ))
    .ok()
});

/// Terms that ask about a shop already on the table rather than naming a
/// new topic.
static ATTRIBUTE_TERMS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "more", "detail", "info", "information", "else", "hour", "open", "opening", "close",
        "closing", "time", "price", "pricey", "cost", "expensive", "cheap", "menu", "direction",
        "way", "reach", "floor", "level", "located", "location", "far", "near", "nearby",
        "nearest", "closest", "best", "good", "which", "sell", "offer", "serve", "about",
        "exactly", "again", "all", "each", "them", "any", "other",
    ]
    .into_iter()
    .collect()
});

/// Keyword rules for ordinal and demonstrative references.
///
/// - Without earlier grounded turns every utterance is searched.
/// - An ordinal reference ("the third one", "#2", "the last shop") reuses
///   the earlier shops and focuses the referenced one. An ordinal past the
///   end of the list reuses the list without a focus.
/// - A demonstrative reference ("that place", "those shops") reuses the
///   earlier shops when every other meaningful term either matches those
///   shops or asks about them (hours, location, price). Naming one of the
///   earlier shops focuses it.
/// - Anything else is treated as a self-contained question.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPolicy;

impl HeuristicPolicy {
    /// The shops recorded on the most recent grounded assistant turn.
    pub fn last_context(history: &[ConversationTurn]) -> Option<&[ShopRecord]> {
        history
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant && !turn.context.is_empty())
            .map(|turn| turn.context.as_slice())
    }

    /// Zero-based position referenced by an ordinal, or `None` when the
    /// utterance contains no ordinal reference. `last` resolves against
    /// `len`.
    pub fn ordinal_position(utterance: &str, len: usize) -> Option<usize> {
        let lowered = utterance.to_lowercase();
        let word = [&ORDINAL_REFERENCE, &TRAILING_ORDINAL]
            .into_iter()
            .filter_map(|re| Option::as_ref(re))
            .find_map(|re| re.captures(&lowered))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        if let Some(word) = word {
            return match word.as_str() {
                "last" => Some(len.saturating_sub(1)),
                other => ordinal_value(other).map(|n| n - 1),
            };
        }

        Option::as_ref(&NUMBERED_REFERENCE)
            .and_then(|re| re.captures(&lowered))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .map(|n| n - 1)
    }

    fn is_demonstrative(utterance: &str) -> bool {
        let lowered = utterance.to_lowercase();
        Option::as_ref(&DEMONSTRATIVE_REFERENCE)
            .is_some_and(|re| re.is_match(&lowered))
    }

    /// Position of the earlier shop whose name the utterance mentions.
    fn named_position(terms: &[String], shops: &[ShopRecord]) -> Option<usize> {
        shops.iter().position(|shop| {
            tokenize(&shop.name)
                .iter()
                .any(|token| token.len() > 2 && terms.contains(token))
        })
    }
}

fn ordinal_value(word: &str) -> Option<usize> {
    let value = match word {
        "first" | "1st" => 1,
        "second" | "2nd" => 2,
        "third" | "3rd" => 3,
        "fourth" => 4,
        "fifth" => 5,
        "sixth" => 6,
        "seventh" => 7,
        "eighth" => 8,
        "ninth" => 9,
        "tenth" | "10th" => 10,
        numeric => numeric.strip_suffix("th")?.parse().ok()?,
    };
    Some(value)
}

impl RetrievalPolicy for HeuristicPolicy {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn decide(&self, utterance: &str, history: &[ConversationTurn]) -> RetrievalDecision {
        let Some(shops) = Self::last_context(history) else {
            return RetrievalDecision::NeedsRetrieval;
        };

        if let Some(position) = Self::ordinal_position(utterance, shops.len()) {
            return RetrievalDecision::ReuseContext {
                candidates: shops.to_vec(),
                focus: (position < shops.len()).then_some(position),
            };
        }

        if !Self::is_demonstrative(utterance) {
            return RetrievalDecision::NeedsRetrieval;
        }

        let terms = content_terms(utterance);
        if let Some(position) = Self::named_position(&terms, shops) {
            return RetrievalDecision::ReuseContext {
                candidates: shops.to_vec(),
                focus: Some(position),
            };
        }

        let known: HashSet<String> = shops
            .iter()
            .flat_map(|shop| {
                shop.keywords
                    .iter()
                    .chain(shop.categories.iter())
                    .chain(shop.subcategories.iter())
                    .flat_map(|field| tokenize(field))
            })
            .collect();
        let introduces_topic = terms
            .iter()
            .any(|term| !ATTRIBUTE_TERMS.contains(term.as_str()) && !known.contains(term));

        if introduces_topic {
            RetrievalDecision::NeedsRetrieval
        } else {
            RetrievalDecision::ReuseContext {
                candidates: shops.to_vec(),
                focus: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mall_conversation::Exchange;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn shop(name: &str, keywords: &[&str]) -> ShopRecord {
        ShopRecord {
            id: format!("{name} | LG2"),
            name: name.to_string(),
            categories: vec!["Food & Beverage".to_string()],
            subcategories: vec!["Chinese".to_string()],
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            description: String::new(),
            location: "LG2".to_string(),
        }
    }

    fn shops() -> Vec<ShopRecord> {
        vec![
            shop("Dolly Dim Sum", &["halal", "dim sum"]),
            shop("Tang Noodle House", &["noodles"]),
            shop("Canton Kitchen", &["halal", "rice"]),
        ]
    }

    fn grounded_history() -> Vec<ConversationTurn> {
        Exchange::new(Uuid::new_v4(), "halal chinese food?", "Here are three.", shops())
            .into_turns(1)
            .to_vec()
    }

    fn decide(utterance: &str) -> RetrievalDecision {
        HeuristicPolicy.decide(utterance, &grounded_history())
    }

    fn reuse(focus: Option<usize>) -> RetrievalDecision {
        RetrievalDecision::ReuseContext {
            candidates: shops(),
            focus,
        }
    }

    #[test]
    fn test_fresh_thread_always_retrieves() {
        assert_eq!(
            HeuristicPolicy.decide("tell me more about the third one", &[]),
            RetrievalDecision::NeedsRetrieval
        );
    }

    #[test]
    fn test_ordinal_references_focus_a_shop() {
        assert_eq!(decide("tell me more about the third one"), reuse(Some(2)));
        assert_eq!(decide("Where is the 2nd place?"), reuse(Some(1)));
        assert_eq!(decide("what about #1"), reuse(Some(0)));
        assert_eq!(decide("and the last one?"), reuse(Some(2)));
        assert_eq!(decide("I'll go with the first."), reuse(Some(0)));
    }

    #[test]
    fn test_ordinal_past_the_end_reuses_without_focus() {
        assert_eq!(decide("what about the fifth option"), reuse(None));
    }

    #[test]
    fn test_floor_ordinals_are_not_references() {
        assert_eq!(
            decide("any bookstores on the second floor"),
            RetrievalDecision::NeedsRetrieval
        );
    }

    #[test]
    fn test_demonstratives() {
        assert_eq!(decide("tell me more about that place"), reuse(None));
        assert_eq!(decide("what are the opening hours of those shops"), reuse(None));
        assert_eq!(decide("which of those places are halal"), reuse(None));
        assert_eq!(decide("is that noodle place far"), reuse(Some(1)));
        assert_eq!(
            decide("those are nice but any sushi places?"),
            RetrievalDecision::NeedsRetrieval
        );
    }

    #[test]
    fn test_self_contained_questions_retrieve() {
        assert_eq!(
            decide("tell me more about dolly dim sum"),
            RetrievalDecision::NeedsRetrieval
        );
        assert_eq!(decide("where can I buy sneakers"), RetrievalDecision::NeedsRetrieval);
    }

    #[test]
    fn test_always_retrieve() {
        assert!(AlwaysRetrieve
            .decide("the third one", &grounded_history())
            .needs_retrieval());
    }
}
