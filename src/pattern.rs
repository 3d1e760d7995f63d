//! Google-like search patterns.
//!
//! Pattern and advanced searches accept a small query language:
//!
//! * `word1 word2` -- has both word1 and word2
//! * `word1 OR word2` -- has either word1 or word2
//! * `"word1 word2"` -- has word1 followed immediately by word2
//! * `-word1` -- does not have word1
//!
//! `OR` binds greedily, so `word1 word2 OR word3 word4` means: has word1,
//! and (either word2 or word3), and word4. A parsed [`PatternExpr`] is held
//! in canonical (lowercased, re-rendered) form so that two spellings of the
//! same search produce the same signature.

use pest::Parser;
use pest_derive::Parser;

use crate::error::{RequeryError, Result};

#[derive(Parser)]
#[grammar = "pattern.pest"]
struct PatternParser;

/// One alternative inside an OR group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTerm {
    negated: bool,
    text: String,
}

impl PatternTerm {
    pub fn negated(&self) -> bool {
        self.negated
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    fn render(&self) -> String {
        let quoted = if self.text.contains(char::is_whitespace) {
            format!("\"{}\"", self.text)
        } else {
            self.text.clone()
        };
        if self.negated {
            format!("-{quoted}")
        } else {
            quoted
        }
    }
}

/// A parsed search pattern: a conjunction of OR groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternExpr {
    groups: Vec<Vec<PatternTerm>>,
}

impl PatternExpr {
    /// Parse a raw pattern string. Terms are lowercased and empty quoted
    /// phrases are dropped, so equivalent inputs compare equal.
    pub fn parse(input: &str) -> Result<PatternExpr> {
        let mut pairs =
            PatternParser::parse(Rule::pattern, input).map_err(|e| RequeryError::Parse {
                message: format!("bad search pattern: {e}"),
            })?;
        let pattern = pairs.next().ok_or_else(|| RequeryError::Parse {
            message: "bad search pattern: empty parse".to_string(),
        })?;
        let mut groups = Vec::new();
        for group in pattern.into_inner() {
            if group.as_rule() != Rule::group {
                continue; // EOI
            }
            let mut terms = Vec::new();
            for term in group.into_inner() {
                let mut negated = false;
                let mut text = String::new();
                for part in term.into_inner() {
                    match part.as_rule() {
                        Rule::neg => negated = true,
                        Rule::word => text = part.as_str().to_lowercase(),
                        Rule::phrase => {
                            for inner in part.into_inner() {
                                text = inner.as_str().trim().to_lowercase();
                            }
                        }
                        _ => {}
                    }
                }
                if !text.is_empty() {
                    terms.push(PatternTerm { negated, text });
                }
            }
            if !terms.is_empty() {
                groups.push(terms);
            }
        }
        Ok(PatternExpr { groups })
    }

    /// An empty pattern places no condition and matches everything.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Vec<PatternTerm>] {
        &self.groups
    }

    /// Canonical rendering: terms joined by ` OR ` inside a group, groups
    /// joined by single spaces, phrases quoted only when they need it.
    pub fn canonical(&self) -> String {
        self.groups
            .iter()
            .map(|terms| {
                terms
                    .iter()
                    .map(PatternTerm::render)
                    .collect::<Vec<_>>()
                    .join(" OR ")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Case-insensitive substring match of the whole expression against a
    /// haystack of searchable text.
    pub fn matches(&self, text: &str) -> bool {
        let hay = text.to_lowercase();
        self.groups.iter().all(|terms| {
            terms
                .iter()
                .any(|term| hay.contains(&term.text) != term.negated)
        })
    }
}

impl std::fmt::Display for PatternExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}
