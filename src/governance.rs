//! Keyword-containment governance evaluation.
//!
//! This is a deliberately crude heuristic: a rule's meaningful keywords (its
//! words minus a fixed stop-word set) must all appear as substrings of the
//! lowercased prompt for the rule to block. It has known failure modes on
//! paraphrase and synonym-free overlap; downstream behavior depends on the
//! heuristic staying exactly this, so do not "improve" it in place.

use crate::models::GovernanceRule;

/// Words carrying no policy meaning on their own: articles, prepositions,
/// generic verbs and generic nouns common in rule phrasing.
const STOP_WORDS: &[&str] = &[
    // articles / determiners
    "a", "an", "the", "this", "that", "any", "all", "some", "no",
    // prepositions / conjunctions
    "of", "on", "in", "to", "for", "from", "with", "about", "at", "by", "into", "over", "under",
    "and", "or", "not",
    // auxiliaries
    "is", "are", "be", "been", "do", "does", "dont", "don't", "can", "cannot", "should", "must",
    // generic verbs
    "block", "deny", "prevent", "restrict", "disallow", "forbid", "show", "display", "list",
    "get", "give", "access", "run", "execute", "view", "see", "allow",
    // generic nouns
    "table", "tables", "data", "query", "queries", "database", "databases", "information",
    "record", "records", "row", "rows", "column", "columns",
    // politeness / filler
    "please", "never", "ever", "anyone", "users",
];

/// Outcome of evaluating a prompt against the active rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Carries the text of the violated rule, verbatim, for the error message.
    Block(String),
}

/// Lowercase word tokens of a rule, stop words removed.
fn meaningful_keywords(rule_text: &str) -> Vec<String> {
    rule_text
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Evaluate the prompt against all active rules, in first-added order.
///
/// A rule blocks when its meaningful keyword set is non-empty and every
/// keyword is a substring of the lowercased prompt. A rule made entirely of
/// stop words never blocks. An empty rule set always allows. Evaluation
/// happens before synthesis; a blocked request never reaches the synthesizer
/// or a connector.
pub fn evaluate(prompt: &str, rules: &[GovernanceRule]) -> Verdict {
    let prompt_lower = prompt.to_lowercase();

    for rule in rules.iter().filter(|r| r.is_active) {
        let keywords = meaningful_keywords(&rule.rule);
        if keywords.is_empty() {
            continue;
        }
        if keywords.iter().all(|kw| prompt_lower.contains(kw.as_str())) {
            log::info!("governance rule matched: {}", rule.rule);
            return Verdict::Block(rule.rule.clone());
        }
    }

    Verdict::Allow
}
