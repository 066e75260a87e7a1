use std::collections::HashSet;

/// Added to a community's score for each member named in the query
pub const NAMED_ENTITY_BONUS: f64 = 0.5;

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "as", "at", "be", "been", "by", "can", "could",
    "did", "do", "does", "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "in",
    "into", "is", "it", "its", "me", "of", "on", "or", "our", "she", "should", "so", "tell", "that",
    "the", "their", "them", "there", "these", "they", "this", "those", "to", "us", "was", "we",
    "were", "what", "when", "where", "which", "who", "whom", "why", "will", "with", "would", "you",
];

/// Lowercased content words of `text`
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

/// Share of query terms that also occur in `passage`, in `[0, 1]`
pub fn lexical_overlap(query_terms: &HashSet<String>, passage: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let passage_terms = terms(passage);
    let shared = query_terms.intersection(&passage_terms).count();
    shared as f64 / query_terms.len() as f64
}

/// Whether `name` occurs in `text` as whole words, ignoring case
pub fn mentions(text: &str, name: &str) -> bool {
    let text = text.to_lowercase();
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }

    text.match_indices(&name).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
