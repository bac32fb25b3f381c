//! The structural agreement between assistant text and what the client renders.
//!
//! Assistant text is free-form prose, optionally followed by tagged blocks that each
//! hold one JSON array:
//!
//! ```text
//! Here are two events this weekend.
//! <cards>
//! [{"id": 12, "title": "Beach cleanup", "category": "environment"}]
//! </cards>
//! <followups>
//! ["Anything on Sunday?"]
//! </followups>
//! ```
//!
//! Text that does not follow the grammar is never rejected; it is delivered as plain prose.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::prompt_template::MAX_FOLLOWUPS;

const CARDS: &str = "cards";
const FOLLOWUPS: &str = "followups";

fn block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<(cards|followups)>(.*?)</(cards|followups)>").expect("valid block pattern")
    })
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"</?(cards|followups)>").expect("valid tag pattern"))
}

fn blank_lines_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank line pattern"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CardId {
    Number(i64),
    Text(String),
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardId::Number(id) => write!(f, "{}", id),
            CardId::Text(id) => f.write_str(id),
        }
    }
}

/// An opportunity the client renders as a rich card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityCard {
    pub id: CardId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A finalized assistant reply, split into the parts the client renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantReply {
    pub text: String,
    pub cards: Vec<OpportunityCard>,
    pub followups: Vec<String>,
    /// False when the text is delivered as plain prose
    pub structured: bool,
}

#[derive(Debug, Error, PartialEq)]
enum ContractViolation {
    #[error("block opened as <{open}> but closed as </{close}>")]
    MismatchedTags { open: String, close: String },

    #[error("block <{0}> appears more than once")]
    Duplicate(String),

    #[error("block <{0}> contains another tag")]
    Nested(String),

    #[error("stray or unbalanced tag outside a block")]
    Stray,

    #[error("block <{block}> is not valid: {reason}")]
    Malformed { block: String, reason: String },
}

impl AssistantReply {
    /// Treat the entire text as conversational content
    pub fn plain<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            cards: Vec::new(),
            followups: Vec::new(),
            structured: false,
        }
    }

    /// Check `raw` against the contract, falling back to plain text on any mismatch
    pub fn validate(raw: &str) -> Self {
        match parse(raw) {
            Ok(reply) => reply,
            Err(violation) => {
                tracing::debug!(%violation, "assistant text does not follow the output contract");
                Self::plain(raw)
            }
        }
    }

    /// The canonical text of this reply, as stored in the conversation
    pub fn render(&self) -> String {
        if !self.structured {
            return self.text.clone();
        }

        let mut sections = Vec::new();
        if !self.text.is_empty() {
            sections.push(self.text.clone());
        }
        if !self.cards.is_empty() {
            sections.push(render_block(CARDS, &self.cards));
        }
        if !self.followups.is_empty() {
            sections.push(render_block(FOLLOWUPS, &self.followups));
        }
        sections.join("\n\n")
    }
}

fn render_block<T: Serialize>(name: &str, items: &T) -> String {
    let body = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
    format!("<{name}>\n{body}\n</{name}>")
}

fn parse(raw: &str) -> Result<AssistantReply, ContractViolation> {
    let mut prose = String::new();
    let mut last = 0;
    let mut cards: Option<Vec<OpportunityCard>> = None;
    let mut followups: Option<Vec<String>> = None;

    for captures in block_pattern().captures_iter(raw) {
        let (Some(whole), Some(open), Some(body), Some(close)) =
            (captures.get(0), captures.get(1), captures.get(2), captures.get(3))
        else {
            continue;
        };
        let open = open.as_str();
        if open != close.as_str() {
            return Err(ContractViolation::MismatchedTags {
                open: open.to_string(),
                close: close.as_str().to_string(),
            });
        }
        if tag_pattern().is_match(body.as_str()) {
            return Err(ContractViolation::Nested(open.to_string()));
        }

        let body = body.as_str().trim();
        match open {
            CARDS => {
                if cards.is_some() {
                    return Err(ContractViolation::Duplicate(open.to_string()));
                }
                cards = Some(parse_cards(body)?);
            }
            _ => {
                if followups.is_some() {
                    return Err(ContractViolation::Duplicate(open.to_string()));
                }
                followups = Some(parse_followups(body)?);
            }
        }

        prose.push_str(&raw[last..whole.start()]);
        last = whole.end();
    }
    prose.push_str(&raw[last..]);

    if tag_pattern().is_match(&prose) {
        return Err(ContractViolation::Stray);
    }

    let cards = cards.unwrap_or_default();
    let followups = followups.unwrap_or_default();
    // Empty blocks are dropped; only a block with items makes the reply structured
    let structured = !cards.is_empty() || !followups.is_empty();
    let text = blank_lines_pattern()
        .replace_all(prose.trim(), "\n\n")
        .to_string();

    Ok(AssistantReply {
        text,
        cards,
        followups,
        structured,
    })
}

fn malformed(block: &str, reason: impl fmt::Display) -> ContractViolation {
    ContractViolation::Malformed {
        block: block.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_cards(body: &str) -> Result<Vec<OpportunityCard>, ContractViolation> {
    let cards: Vec<OpportunityCard> =
        serde_json::from_str(body).map_err(|e| malformed(CARDS, e))?;
    if let Some(card) = cards.iter().find(|card| card.title.trim().is_empty()) {
        return Err(malformed(CARDS, format!("card {} has an empty title", card.id)));
    }
    Ok(cards)
}

fn parse_followups(body: &str) -> Result<Vec<String>, ContractViolation> {
    let followups: Vec<String> =
        serde_json::from_str(body).map_err(|e| malformed(FOLLOWUPS, e))?;
    if followups.iter().any(|f| f.trim().is_empty()) {
        return Err(malformed(FOLLOWUPS, "empty followup"));
    }
    // Extra suggestions are trimmed rather than discarding the whole block
    Ok(followups
        .into_iter()
        .map(|f| f.trim().to_string())
        .take(MAX_FOLLOWUPS)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_plain_prose_is_valid_but_unstructured() {
        let reply = AssistantReply::validate("Happy to help! What are you interested in?");
        assert!(!reply.structured);
        assert_eq!(reply.text, "Happy to help! What are you interested in?");
        assert!(reply.cards.is_empty());
    }

    #[test]
    fn test_parses_cards_and_followups() {
        let raw = indoc! {r#"
            Here are some environment events.
            <cards>
            [{"id": 1, "title": "Beach cleanup", "category": "environment"},
             {"id": "tp-3", "title": "Tree planting"}]
            </cards>
            <followups>
            ["Anything on weekends?", " Near Oakland? "]
            </followups>
        "#};

        let reply = AssistantReply::validate(raw);
        assert!(reply.structured);
        assert_eq!(reply.text, "Here are some environment events.");
        assert_eq!(reply.cards.len(), 2);
        assert_eq!(reply.cards[0].id, CardId::Number(1));
        assert_eq!(reply.cards[1].id, CardId::Text("tp-3".into()));
        assert_eq!(reply.cards[0].category.as_deref(), Some("environment"));
        assert_eq!(reply.followups, vec!["Anything on weekends?", "Near Oakland?"]);
    }

    #[test]
    fn test_render_is_canonical_and_revalidates() {
        let raw = "Try these:\n<cards>\n[ {\"id\": 7, \"title\": \"Food bank\"} ]\n</cards>\n\n\n\nEnjoy!";
        let reply = AssistantReply::validate(raw);
        assert!(reply.structured);
        assert_eq!(reply.text, "Try these:\n\nEnjoy!");

        let rendered = reply.render();
        assert_eq!(
            rendered,
            "Try these:\n\nEnjoy!\n\n<cards>\n[{\"id\":7,\"title\":\"Food bank\"}]\n</cards>"
        );
        assert_eq!(AssistantReply::validate(&rendered), reply);
    }

    #[test]
    fn test_malformed_json_falls_back_to_plain() {
        let raw = "Look:\n<cards>[{\"id\": 1, \"title\": }]</cards>";
        let reply = AssistantReply::validate(raw);
        assert_eq!(reply, AssistantReply::plain(raw));
        assert_eq!(reply.render(), raw);
    }

    #[test]
    fn test_structural_mismatches_fall_back_to_plain() {
        let cases = [
            "<cards>[]</followups>",
            "<cards>[]</cards><cards>[]</cards>",
            "Unclosed <cards>[{\"id\": 1, \"title\": \"x\"}]",
            "<followups>[\"a\", \"<cards>\"]</followups>",
            "<cards>[{\"id\": 1, \"title\": \"  \"}]</cards>",
            "<followups>[\"\"]</followups>",
            "<cards>{\"id\": 1, \"title\": \"x\"}</cards>",
        ];
        for raw in cases {
            let reply = AssistantReply::validate(raw);
            assert!(!reply.structured, "expected plain fallback for {raw:?}");
            assert_eq!(reply.text, raw);
        }
    }

    #[test]
    fn test_empty_blocks_leave_a_plain_reply() {
        let reply = AssistantReply::validate("Here.\n<cards>[]</cards>\n<followups>[]</followups>");
        assert_eq!(reply, AssistantReply::plain("Here."));

        let rendered = reply.render();
        assert_eq!(rendered, "Here.");
        assert_eq!(AssistantReply::validate(&rendered), reply);

        let reply = AssistantReply::validate("Here.\n<cards>[]</cards>\n<followups>[\"More?\"]</followups>");
        assert!(reply.structured);
        assert_eq!(AssistantReply::validate(&reply.render()), reply);
    }

    #[test]
    fn test_followups_are_capped() {
        let reply = AssistantReply::validate("<followups>[\"a\",\"b\",\"c\",\"d\"]</followups>");
        assert_eq!(reply.followups.len(), MAX_FOLLOWUPS);
        assert_eq!(reply.text, "");
        assert!(reply.structured);
    }

    #[test]
    fn test_violation_messages() {
        assert_eq!(
            parse("<cards>[]</followups>").unwrap_err(),
            ContractViolation::MismatchedTags {
                open: "cards".into(),
                close: "followups".into()
            }
        );
        assert_eq!(parse("a </cards> b").unwrap_err(), ContractViolation::Stray);
    }
}
