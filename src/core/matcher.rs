//! Item matching: token-subset and pattern policies.

use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Every whitespace-separated token must be a case-insensitive substring.
    #[default]
    Tokens,
    /// The query is a case-insensitive regular expression.
    Pattern,
}

/// A query compiled once and applied to many candidates.
#[derive(Debug, Clone)]
pub struct Matcher {
    kind: Compiled,
}

#[derive(Debug, Clone)]
enum Compiled {
    All,
    Goto(usize),
    Tokens(Vec<String>),
    Pattern(Regex),
    Nothing,
}

impl Matcher {
    pub fn new(query: &str, mode: MatchMode) -> Self {
        let kind = if let Some(position) = parse_goto_query(query) {
            Compiled::Goto(position)
        } else {
            match mode {
                MatchMode::Tokens => {
                    let tokens: Vec<String> =
                        query.split_whitespace().map(str::to_lowercase).collect();
                    if tokens.is_empty() {
                        Compiled::All
                    } else {
                        Compiled::Tokens(tokens)
                    }
                }
                MatchMode::Pattern => {
                    if query.is_empty() {
                        Compiled::All
                    } else {
                        match RegexBuilder::new(query).case_insensitive(true).build() {
                            Ok(regex) => Compiled::Pattern(regex),
                            Err(err) => {
                                tracing::trace!(%err, query, "invalid search pattern");
                                Compiled::Nothing
                            }
                        }
                    }
                }
            }
        };

        Self { kind }
    }

    /// `index` is the candidate's 0-based insertion index, used by `:N` queries.
    pub fn matches(&self, text: &str, index: usize) -> bool {
        match &self.kind {
            Compiled::All => true,
            Compiled::Goto(position) => index.checked_add(1) == Some(*position),
            Compiled::Tokens(tokens) => {
                let lowered = text.to_lowercase();
                tokens.iter().all(|token| lowered.contains(token.as_str()))
            }
            Compiled::Pattern(regex) => regex.is_match(text),
            Compiled::Nothing => false,
        }
    }

    /// Rescans every candidate and returns the matching indices in insertion order.
    pub fn matched_indices<T, F>(&self, items: &[T], display: F) -> Vec<usize>
    where
        F: Fn(&T) -> String,
    {
        items
            .iter()
            .enumerate()
            .filter(|(index, item)| self.matches(&display(item), *index))
            .map(|(index, _)| index)
            .collect()
    }
}

/// One-shot form of [`Matcher::matches`]. The text has no position, so a
/// `:N` query never matches it.
pub fn matches(text: &str, query: &str, mode: MatchMode) -> bool {
    Matcher::new(query, mode).matches(text, usize::MAX)
}

/// Parses `:N` into the 1-based item position `N`.
pub fn parse_goto_query(query: &str) -> Option<usize> {
    let digits = query.strip_prefix(':')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
