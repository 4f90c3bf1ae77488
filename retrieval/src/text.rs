//! Lightweight text normalization shared by re-ranking and dialogue policies.

use std::collections::HashSet;
use std::sync::LazyLock;

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // function words
        "a", "an", "and", "any", "are", "as", "at", "be", "but", "by", "can", "could", "do",
        "does", "for", "from", "get", "got", "have", "has", "here", "how", "i", "if",
        "in", "into", "is", "it", "its", "just", "like", "me", "my", "of", "on", "or", "our",
        "so", "some", "than", "that", "the", "their", "them", "then", "there", "these", "they",
        "this", "those", "to", "too", "us", "was", "we", "what", "when", "where", "which",
        "who", "why", "will", "with", "would", "you", "your",
        // conversational filler
        "about", "also", "ask", "give", "go", "hello", "hi", "know", "let", "look", "looking",
        "more", "need", "please", "recommend", "show", "suggest", "tell", "thank", "thanks",
        "want", "find",
        // generic references to results
        "one", "ones", "shop", "store", "place", "option", "outlet", "spot", "result",
    ]
    .into_iter()
    .collect()
});

/// Crude plural folding: "shops" → "shop", "noodles" → "noodle".
pub fn stem(token: &str) -> &str {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        &token[..token.len() - 1]
    } else {
        token
    }
}

/// Lower-cased alphanumeric tokens with plurals folded.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| stem(&t.to_lowercase()).to_string())
        .collect()
}

/// Whether a lower-cased token carries no topical meaning.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token) || STOPWORDS.contains(stem(token))
}

/// Distinct meaningful tokens of `text`, in first-occurrence order.
pub fn content_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !is_stopword(t))
        .map(|t| stem(&t).to_string())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenize_folds_case_and_plurals() {
        assert_eq!(
            tokenize("Halal Noodles, glass-shops!"),
            vec!["halal", "noodle", "glass", "shop"]
        );
    }

    #[test]
    fn test_content_terms_drop_filler() {
        assert_eq!(
            content_terms("Can you show me halal chinese food places?"),
            vec!["halal", "chinese", "food"]
        );
        assert!(content_terms("tell me more about the third one").contains(&"third".to_string()));
        assert!(content_terms("what about those ones").is_empty());
    }
}
