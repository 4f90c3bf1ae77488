//! Re-ranking policies applied to over-fetched candidates.
//!
//! A policy is a pure function of the query text and the candidate list:
//! it may reorder candidates but never adds, drops or edits them, and it
//! never touches the index. Candidates with equal scores keep their
//! incoming (similarity) order.

use std::collections::HashSet;

use ordered_float::OrderedFloat;

use crate::retriever::RetrievalCandidate;
use crate::text::{content_terms, tokenize};

/// Second-pass ordering over similarity-ranked candidates.
pub trait Reranker: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Reorder `candidates`, which arrive in descending similarity order.
    fn rerank(&self, query: &str, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate>;
}

/// Keeps the index order untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityOrder;

impl Reranker for SimilarityOrder {
    fn name(&self) -> &str {
        "similarity"
    }

    fn rerank(&self, _query: &str, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
        candidates
    }
}

/// Blends vector similarity with lexical overlap between the query and the
/// shop's fields.
///
/// Each query term contributes the weight of the best field it appears in
/// (name > keywords > categories > description); the lexical score is the
/// mean over query terms, in [0, 1].
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    pub similarity_weight: f32,
    pub lexical_weight: f32,
    pub name_weight: f32,
    pub keyword_weight: f32,
    pub category_weight: f32,
    pub description_weight: f32,
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self {
            similarity_weight: 0.6,
            lexical_weight: 0.4,
            name_weight: 1.0,
            keyword_weight: 0.9,
            category_weight: 0.8,
            description_weight: 0.5,
        }
    }
}

impl LexicalReranker {
    /// Lexical overlap of `terms` with one candidate, in [0, 1].
    pub fn lexical_score(&self, terms: &[String], candidate: &RetrievalCandidate) -> f32 {
        if terms.is_empty() {
            return 0.0;
        }

        let shop = &candidate.shop;
        let name: HashSet<String> = tokenize(&shop.name).into_iter().collect();
        let keywords: HashSet<String> = shop.keywords.iter().flat_map(|k| tokenize(k)).collect();
        let categories: HashSet<String> = shop
            .categories
            .iter()
            .chain(shop.subcategories.iter())
            .flat_map(|c| tokenize(c))
            .collect();
        let description: HashSet<String> = tokenize(&shop.description).into_iter().collect();

        let total: f32 = terms
            .iter()
            .map(|term| {
                if name.contains(term) {
                    self.name_weight
                } else if keywords.contains(term) {
                    self.keyword_weight
                } else if categories.contains(term) {
                    self.category_weight
                } else if description.contains(term) {
                    self.description_weight
                } else {
                    0.0
                }
            })
            .sum();

        total / terms.len() as f32
    }
}

impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "lexical"
    }

    fn rerank(&self, query: &str, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
        let terms = content_terms(query);
        let scores = candidates
            .iter()
            .map(|c| {
                self.similarity_weight * c.similarity
                    + self.lexical_weight * self.lexical_score(&terms, c)
            })
            .collect();
        order_by_scores(candidates, scores)
    }
}

/// Stable descending sort of `candidates` by `scores`, recording each score
/// as the candidate's relevance.
pub fn order_by_scores(
    candidates: Vec<RetrievalCandidate>,
    scores: Vec<f32>,
) -> Vec<RetrievalCandidate> {
    let mut scored: Vec<(f32, RetrievalCandidate)> = scores.into_iter().zip(candidates).collect();
    scored.sort_by_key(|(score, _)| std::cmp::Reverse(OrderedFloat(*score)));
    scored
        .into_iter()
        .map(|(score, mut candidate)| {
            candidate.relevance = Some(score);
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mall_catalog::ShopRecord;
    use pretty_assertions::assert_eq;

    fn candidate(
        name: &str,
        keywords: &[&str],
        similarity: f32,
        rank: usize,
    ) -> RetrievalCandidate {
        RetrievalCandidate {
            shop: ShopRecord {
                id: format!("{name} | G1"),
                name: name.to_string(),
                categories: vec!["Food & Beverage".to_string()],
                subcategories: Vec::new(),
                keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
                description: String::new(),
                location: "G1".to_string(),
            },
            similarity,
            similarity_rank: rank,
            rank,
            relevance: None,
        }
    }

    fn names(candidates: &[RetrievalCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.shop.name.as_str()).collect()
    }

    #[test]
    fn test_lexical_overlap_promotes_matching_shop() {
        let candidates = vec![
            candidate("Sushi King", &["japanese"], 0.82, 1),
            candidate("Dolly Dim Sum", &["halal", "chinese"], 0.80, 2),
        ];

        let ranked = LexicalReranker::default().rerank("halal chinese food", candidates);

        assert_eq!(names(&ranked), vec!["Dolly Dim Sum", "Sushi King"]);
        assert!(ranked[0].relevance.unwrap() > ranked[1].relevance.unwrap());
    }

    #[test]
    fn test_no_signal_keeps_similarity_order() {
        let candidates = vec![
            candidate("A", &[], 0.5, 1),
            candidate("B", &[], 0.5, 2),
            candidate("C", &[], 0.5, 3),
        ];

        let ranked = LexicalReranker::default().rerank("tell me something", candidates);

        assert_eq!(names(&ranked), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_similarity_order_is_identity() {
        let candidates = vec![candidate("A", &[], 0.9, 1), candidate("B", &[], 0.1, 2)];
        let ranked = SimilarityOrder.rerank("b", candidates);
        assert_eq!(names(&ranked), vec!["A", "B"]);
    }
}
