//! Model output parsing for the deliberation engine.
//!
//! These functions extract structured data from free-form model responses.
//! They are pure domain logic — no I/O, no session management, just text
//! pattern matching with conservative fallbacks.
//!
//! # Functions
//!
//! | Function | Use Case |
//! |----------|----------|
//! | [`extract_answer`] | Structural validation of a contribution |
//! | [`parse_vote`] | Final recommendation + confidence per expert |
//! | [`parse_decomposition`] | Sub-problem list from the decomposition call |
//! | [`parse_gaps`] | Information gaps with priorities |
//! | [`count_challenge_markers`] | Critical-engagement check for Challenge rounds |
//! | [`looks_truncated`] | Overflow detection for synthesis continuation |

use crate::deliberation::problem::SubProblem;
use crate::deliberation::result::ExpertVote;
use crate::session::clarification::{ClarificationQuestion, GapPriority};

/// Section headers accepted as the answer block of a contribution.
const ANSWER_MARKERS: &[&str] = &["ANSWER:", "RECOMMENDATION:", "## Answer", "## Recommendation"];

/// Markers counted as critical engagement in Challenge rounds.
const CHALLENGE_MARKERS: &[&str] = &[
    "however",
    "risk",
    "concern",
    "disagree",
    "challenge",
    "weakness",
    "assumes",
    "assumption",
    "counterpoint",
    "fails when",
    "tradeoff",
    "trade-off",
];

/// Extract the answer section from a contribution.
///
/// A contribution is structurally valid when it contains one of the accepted
/// answer markers; the text after the first marker is the answer. Returns
/// `None` for responses with no extractable answer section.
pub fn extract_answer(response: &str) -> Option<String> {
    for marker in ANSWER_MARKERS {
        if let Some(pos) = response.find(marker) {
            let answer = response[pos + marker.len()..].trim();
            if !answer.is_empty() {
                return Some(answer.to_string());
            }
        }
    }
    None
}

/// Parse a voting response into an [`ExpertVote`].
///
/// Prefers an embedded JSON object:
/// `{"recommendation": "...", "confidence": 0.8, "reasoning": "...", "conditions": [...]}`.
/// Falls back to labeled-line scanning (`RECOMMENDATION:`, `CONFIDENCE:`,
/// `REASONING:`, `CONDITIONS:`). When nothing parses, the whole response
/// becomes the recommendation at neutral confidence 0.5.
pub fn parse_vote(persona_code: &str, response: &str) -> ExpertVote {
    if let Some(vote) = parse_vote_json(persona_code, response) {
        return vote;
    }
    if let Some(vote) = parse_vote_labeled(persona_code, response) {
        return vote;
    }
    ExpertVote::new(persona_code, response.trim(), 0.5, "")
}

fn parse_vote_json(persona_code: &str, response: &str) -> Option<ExpertVote> {
    let start = response.find('{')?;
    let end = response[start..].rfind('}')?;
    let parsed: serde_json::Value = serde_json::from_str(&response[start..start + end + 1]).ok()?;

    let recommendation = parsed.get("recommendation")?.as_str()?.to_string();
    let confidence = parsed
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.5);
    let reasoning = parsed
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let conditions = parsed
        .get("conditions")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some(ExpertVote::new(persona_code, recommendation, confidence, reasoning).with_conditions(conditions))
}

fn parse_vote_labeled(persona_code: &str, response: &str) -> Option<ExpertVote> {
    let recommendation = labeled_line(response, "RECOMMENDATION:")?;
    let confidence = labeled_line(response, "CONFIDENCE:")
        .and_then(|s| s.trim_end_matches('%').trim().parse::<f64>().ok())
        .map(|v| if v > 1.0 { v / 100.0 } else { v })
        .unwrap_or(0.5);
    let reasoning = labeled_line(response, "REASONING:").unwrap_or_default();
    let conditions = labeled_line(response, "CONDITIONS:")
        .map(|s| {
            s.split(';')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Some(ExpertVote::new(persona_code, recommendation, confidence, reasoning).with_conditions(conditions))
}

fn labeled_line(response: &str, label: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let trimmed = line.trim();
        let upper = trimmed.to_uppercase();
        if upper.starts_with(label) {
            Some(trimmed[label.len()..].trim().to_string())
        } else {
            None
        }
    })
}

/// Parse a decomposition response into sub-problems.
///
/// Prefers a JSON array of objects with `goal`, optional `id`,
/// `complexity` (1-10) and `depends_on`. Falls back to treating each
/// numbered list line as one sub-problem of medium complexity. Ids are
/// assigned positionally (`sp-1`, `sp-2`, ...) when the model omits them.
pub fn parse_decomposition(response: &str) -> Vec<SubProblem> {
    if let Some(subs) = parse_decomposition_json(response) {
        return subs;
    }

    // Fallback: numbered list, one sub-problem per line
    response
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let rest = trimmed
                .split_once(". ")
                .filter(|(n, _)| n.chars().all(|c| c.is_ascii_digit()) && !n.is_empty())
                .map(|(_, rest)| rest)?;
            Some(rest.trim().to_string())
        })
        .enumerate()
        .map(|(i, goal)| SubProblem::new(format!("sp-{}", i + 1), goal, 5))
        .collect()
}

fn parse_decomposition_json(response: &str) -> Option<Vec<SubProblem>> {
    let start = response.find('[')?;
    let end = response[start..].rfind(']')?;
    let parsed: serde_json::Value = serde_json::from_str(&response[start..start + end + 1]).ok()?;
    let items = parsed.as_array()?;

    let mut subs = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let goal = item.get("goal").and_then(|v| v.as_str())?;
        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("sp-{}", i + 1));
        let complexity = item
            .get("complexity")
            .and_then(|v| v.as_u64())
            .unwrap_or(5) as u8;
        let depends_on = item
            .get("depends_on")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        subs.push(SubProblem::new(id, goal, complexity).with_dependencies(depends_on));
    }
    if subs.is_empty() { None } else { Some(subs) }
}

/// Parse an information-gap analysis response.
///
/// Accepts lines of the form `PRIORITY: question | reason`, where PRIORITY is
/// CRITICAL, IMPORTANT or OPTIONAL. Unlabeled lines are ignored.
pub fn parse_gaps(response: &str) -> Vec<ClarificationQuestion> {
    response
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim().trim_start_matches(['-', '*', ' ']);
            let (label, rest) = trimmed.split_once(':')?;
            let priority = match label.trim().to_uppercase().as_str() {
                "CRITICAL" => GapPriority::Critical,
                "IMPORTANT" => GapPriority::Important,
                "OPTIONAL" => GapPriority::Optional,
                _ => return None,
            };
            let (question, reason) = match rest.split_once('|') {
                Some((q, r)) => (q.trim(), r.trim()),
                None => (rest.trim(), ""),
            };
            if question.is_empty() {
                return None;
            }
            Some(ClarificationQuestion::new(question, reason, priority))
        })
        .collect()
}

/// Count critical-engagement markers in a Challenge-round contribution.
pub fn count_challenge_markers(text: &str) -> usize {
    let lower = text.to_lowercase();
    CHALLENGE_MARKERS
        .iter()
        .map(|marker| lower.matches(marker).count())
        .sum()
}

/// Heuristic truncation check for synthesis output.
///
/// Text is treated as truncated when it ends mid-sentence (no terminal
/// punctuation or closing fence on the last non-empty line).
pub fn looks_truncated(text: &str) -> bool {
    let Some(last) = text.lines().rev().find(|l| !l.trim().is_empty()) else {
        return false;
    };
    let trimmed = last.trim_end();
    if trimmed.ends_with("```") {
        return false;
    }
    !trimmed.ends_with(['.', '!', '?', ':', ')', '"', '\'', '`'])
}
