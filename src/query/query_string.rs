//! Simple query string syntax.
//!
//! The syntax is meant for end users and never fails to parse:
//!
//! - `+` signifies AND, `|` signifies OR, whitespace uses the default operator
//! - `-` negates a single clause
//! - `"..."` wraps a phrase; `"..."~N` allows N positions of slop
//! - `term*` is a prefix query
//! - `term~N` is a fuzzy query with at most N edits (2 when N is omitted)
//! - `(` and `)` group clauses
//! - `\` escapes the next character
//!
//! Clauses are folded left to right: as long as the operator does not change
//! they are added to the same boolean node, and a new parent node is created
//! whenever it does. `a | b + c` therefore means `(a OR b) AND c`.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::predicate::{BoolNode, PredicateNode, PredicateOptions};
use crate::query::spi::{FieldPredicateBuilderFactory, TextField};

/// Maximum number of edits of a fuzzy clause.
pub const MAX_FUZZY_EDITS: usize = 2;

/// Operator used between clauses separated by whitespace only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultOperator {
    #[default]
    Or,
    And,
}

impl fmt::Display for DefaultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultOperator::Or => write!(f, "or"),
            DefaultOperator::And => write!(f, "and"),
        }
    }
}

/// One full-text clause, before analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuery {
    /// A bare term; if analysis yields several tokens they are combined with `operator`.
    Term {
        text: String,
        operator: DefaultOperator,
    },
    /// Terms starting with the given text.
    Prefix(String),
    /// Terms within `max_edits` of the given text.
    Fuzzy { text: String, max_edits: usize },
    /// Terms in order, allowing `slop` position moves.
    Phrase { text: String, slop: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occur {
    Must,
    Should,
}

impl From<DefaultOperator> for Occur {
    fn from(operator: DefaultOperator) -> Self {
        match operator {
            DefaultOperator::Or => Occur::Should,
            DefaultOperator::And => Occur::Must,
        }
    }
}

struct FoldState<L> {
    top: Option<PredicateNode<L>>,
    current: Option<Occur>,
    previous: Option<Occur>,
    not: usize,
}

impl<L> FoldState<L> {
    fn new() -> Self {
        FoldState {
            top: None,
            current: None,
            previous: None,
            not: 0,
        }
    }
}

fn is_terminator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | '|' | '+')
}

/// Parse `input`, building each clause with `build_leaf`.
///
/// Clauses for which `build_leaf` returns `None` are dropped; when nothing
/// remains the result is [`PredicateNode::MatchNone`].
pub fn parse_query_string<L, F>(
    input: &str,
    default_operator: DefaultOperator,
    mut build_leaf: F,
) -> Result<PredicateNode<L>>
where
    F: FnMut(&TextQuery) -> Result<Option<PredicateNode<L>>>,
{
    let chars: Vec<char> = input.chars().collect();
    let mut parser = Parser {
        chars: &chars,
        index: 0,
        default_operator,
        build_leaf: &mut build_leaf,
        _leaf: PhantomData,
    };
    let top = parser.parse_sub_query(chars.len())?;
    Ok(top.unwrap_or(PredicateNode::MatchNone))
}

/// Build a simple query string predicate over several fields.
///
/// Each clause is built for every field and the per-field clauses are OR-ed,
/// each carrying its field boost.
pub fn build_predicate<F>(
    fields: &[TextField<'_, F>],
    query: &str,
    default_operator: DefaultOperator,
) -> Result<PredicateNode<F::Leaf>>
where
    F: FieldPredicateBuilderFactory,
{
    parse_query_string(query, default_operator, |text_query| {
        let mut clauses = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(clause) = field.factory.create_text_predicate(field.path, text_query)? {
                clauses.push(PredicateOptions::default().boost(field.boost).apply(clause));
            }
        }
        Ok(match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(PredicateNode::Bool(BoolNode {
                should: clauses,
                ..BoolNode::default()
            })),
        })
    })
}

struct Parser<'a, L, F> {
    chars: &'a [char],
    index: usize,
    default_operator: DefaultOperator,
    build_leaf: &'a mut F,
    _leaf: PhantomData<L>,
}

impl<L, F> Parser<'_, L, F>
where
    F: FnMut(&TextQuery) -> Result<Option<PredicateNode<L>>>,
{
    fn parse_sub_query(&mut self, end: usize) -> Result<Option<PredicateNode<L>>> {
        let mut state = FoldState::new();
        while self.index < end {
            match self.chars[self.index] {
                '(' => {
                    let branch = self.consume_sub_query(end)?;
                    self.push_branch(&mut state, branch);
                }
                '"' => {
                    let branch = self.consume_phrase(end)?;
                    self.push_branch(&mut state, branch);
                }
                '+' => {
                    if state.current.is_none() && state.top.is_some() {
                        state.current = Some(Occur::Must);
                    }
                    self.index += 1;
                }
                '|' => {
                    if state.current.is_none() && state.top.is_some() {
                        state.current = Some(Occur::Should);
                    }
                    self.index += 1;
                }
                '-' => {
                    state.not += 1;
                    self.index += 1;
                    continue;
                }
                ')' => self.index += 1,
                c if c.is_whitespace() => self.index += 1,
                _ => {
                    let branch = self.consume_token(end)?;
                    self.push_branch(&mut state, branch);
                }
            }
            state.not = 0;
        }
        Ok(state.top)
    }

    fn consume_sub_query(&mut self, end: usize) -> Result<Option<PredicateNode<L>>> {
        self.index += 1;
        let start = self.index;
        let mut depth = 1;
        let mut close = None;
        let mut i = start;
        while i < end {
            match self.chars[i] {
                '\\' => i += 1,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        let inner_end = close.unwrap_or(end);
        let branch = self.parse_sub_query(inner_end)?;
        self.index = close.map_or(end, |c| c + 1);
        Ok(branch)
    }

    fn consume_phrase(&mut self, end: usize) -> Result<Option<PredicateNode<L>>> {
        let quote = self.index;
        let mut text = String::new();
        let mut i = quote + 1;
        let mut close = None;
        while i < end {
            match self.chars[i] {
                '\\' if i + 1 < end => {
                    text.push(self.chars[i + 1]);
                    i += 2;
                    continue;
                }
                '"' => {
                    close = Some(i);
                    break;
                }
                c => text.push(c),
            }
            i += 1;
        }
        let Some(close) = close else {
            // Unbalanced quote: ignore it and parse the rest as plain clauses.
            self.index = quote + 1;
            return Ok(None);
        };
        self.index = close + 1;

        let mut slop = 0;
        if self.index < end && self.chars[self.index] == '~' {
            self.index += 1;
            slop = self.read_number(end).unwrap_or(0);
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        (self.build_leaf)(&TextQuery::Phrase { text, slop })
    }

    fn consume_token(&mut self, end: usize) -> Result<Option<PredicateNode<L>>> {
        let mut text = String::new();
        let mut last_escaped = false;
        let mut fuzzy = None;
        while self.index < end {
            let c = self.chars[self.index];
            if c == '\\' && self.index + 1 < end {
                text.push(self.chars[self.index + 1]);
                last_escaped = true;
                self.index += 2;
                continue;
            }
            if is_terminator(c) {
                break;
            }
            if c == '~' {
                self.index += 1;
                fuzzy = Some(self.read_number(end));
                break;
            }
            text.push(c);
            last_escaped = false;
            self.index += 1;
        }

        let query = match fuzzy {
            Some(edits) => {
                let max_edits = edits.unwrap_or(MAX_FUZZY_EDITS).min(MAX_FUZZY_EDITS);
                if max_edits == 0 {
                    self.term(text)
                } else {
                    TextQuery::Fuzzy { text, max_edits }
                }
            }
            None if !last_escaped && text.len() > 1 && text.ends_with('*') => {
                text.pop();
                TextQuery::Prefix(text)
            }
            None => self.term(text),
        };
        let is_empty = match &query {
            TextQuery::Term { text, .. }
            | TextQuery::Prefix(text)
            | TextQuery::Fuzzy { text, .. }
            | TextQuery::Phrase { text, .. } => text.is_empty(),
        };
        if is_empty {
            return Ok(None);
        }
        (self.build_leaf)(&query)
    }

    fn term(&self, text: String) -> TextQuery {
        TextQuery::Term {
            text,
            operator: self.default_operator,
        }
    }

    /// Read the characters up to the next terminator as a number.
    ///
    /// `None` when there are no characters, `Some(0)` when they are not a number.
    fn read_number(&mut self, end: usize) -> Option<usize> {
        let start = self.index;
        while self.index < end && !is_terminator(self.chars[self.index]) {
            self.index += 1;
        }
        if start == self.index {
            return None;
        }
        let digits: String = self.chars[start..self.index].iter().collect();
        Some(digits.parse().unwrap_or(0))
    }

    fn push_branch(&mut self, state: &mut FoldState<L>, branch: Option<PredicateNode<L>>) {
        let Some(mut branch) = branch else {
            return;
        };
        if state.not % 2 == 1 {
            branch = negate(branch);
        }
        match state.top.take() {
            None => state.top = Some(branch),
            Some(top) => {
                let occur = state.current.unwrap_or_else(|| self.default_operator.into());
                let mut node = match top {
                    PredicateNode::Bool(node) if state.previous == Some(occur) => node,
                    top => {
                        let mut node = BoolNode::default();
                        add_clause(&mut node, top, occur);
                        node
                    }
                };
                add_clause(&mut node, branch, occur);
                state.top = Some(PredicateNode::Bool(node));
                state.previous = Some(occur);
            }
        }
        state.current = None;
    }
}

fn add_clause<L>(node: &mut BoolNode<L>, clause: PredicateNode<L>, occur: Occur) {
    match occur {
        Occur::Must => node.must.push(clause),
        Occur::Should => node.should.push(clause),
    }
}

/// Everything except documents matching `branch`.
fn negate<L>(branch: PredicateNode<L>) -> PredicateNode<L> {
    PredicateNode::Bool(BoolNode {
        must_not: vec![branch],
        should: vec![PredicateNode::MatchAll],
        ..BoolNode::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str, operator: DefaultOperator) -> PredicateNode<TextQuery> {
        parse_query_string(input, operator, |q| Ok(Some(PredicateNode::Leaf(q.clone())))).unwrap()
    }

    fn term(text: &str) -> PredicateNode<TextQuery> {
        PredicateNode::Leaf(TextQuery::Term {
            text: text.to_string(),
            operator: DefaultOperator::Or,
        })
    }

    #[test]
    fn test_whitespace_uses_default_operator() {
        let parsed = parse("word panda", DefaultOperator::Or);
        assert_eq!(
            parsed,
            PredicateNode::Bool(BoolNode {
                should: vec![term("word"), term("panda")],
                ..BoolNode::default()
            })
        );
    }

    #[test]
    fn test_operator_change_creates_parent() {
        let parsed = parse("word | panda + room", DefaultOperator::Or);
        let inner = PredicateNode::Bool(BoolNode {
            should: vec![term("word"), term("panda")],
            ..BoolNode::default()
        });
        assert_eq!(
            parsed,
            PredicateNode::Bool(BoolNode {
                must: vec![inner, term("room")],
                ..BoolNode::default()
            })
        );
    }

    #[test]
    fn test_negation() {
        let parsed = parse("word + -panda", DefaultOperator::Or);
        assert_eq!(
            parsed,
            PredicateNode::Bool(BoolNode {
                must: vec![term("word"), negate(term("panda"))],
                ..BoolNode::default()
            })
        );
        assert_eq!(parse("--panda", DefaultOperator::Or), term("panda"));
    }

    #[test]
    fn test_phrase_prefix_fuzzy() {
        assert_eq!(
            parse("\"brown fox\"~2", DefaultOperator::Or),
            PredicateNode::Leaf(TextQuery::Phrase {
                text: "brown fox".to_string(),
                slop: 2
            })
        );
        assert_eq!(
            parse("pand*", DefaultOperator::Or),
            PredicateNode::Leaf(TextQuery::Prefix("pand".to_string()))
        );
        assert_eq!(
            parse("word~1", DefaultOperator::Or),
            PredicateNode::Leaf(TextQuery::Fuzzy {
                text: "word".to_string(),
                max_edits: 1
            })
        );
        assert_eq!(
            parse("word~", DefaultOperator::Or),
            PredicateNode::Leaf(TextQuery::Fuzzy {
                text: "word".to_string(),
                max_edits: 2
            })
        );
        assert_eq!(parse("word~0", DefaultOperator::Or), term("word"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(parse("a\\+b", DefaultOperator::Or), term("a+b"));
        assert_eq!(parse("pand\\*", DefaultOperator::Or), term("pand*"));
    }

    #[test]
    fn test_groups() {
        let parsed = parse("(word | panda) + room", DefaultOperator::Or);
        let inner = PredicateNode::Bool(BoolNode {
            should: vec![term("word"), term("panda")],
            ..BoolNode::default()
        });
        assert_eq!(
            parsed,
            PredicateNode::Bool(BoolNode {
                must: vec![inner, term("room")],
                ..BoolNode::default()
            })
        );
    }

    #[test]
    fn test_and_default_operator() {
        let parsed = parse_query_string("word panda", DefaultOperator::And, |q| {
            Ok(Some(PredicateNode::Leaf(q.clone())))
        })
        .unwrap();
        match parsed {
            PredicateNode::Bool(node) => {
                assert_eq!(node.must.len(), 2);
                assert!(node.should.is_empty());
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_matches_nothing() {
        assert_eq!(parse("", DefaultOperator::Or), PredicateNode::MatchNone);
        assert_eq!(parse("   ", DefaultOperator::Or), PredicateNode::MatchNone);
        assert_eq!(parse("+ | -", DefaultOperator::Or), PredicateNode::MatchNone);
    }

    #[test]
    fn test_dropped_clauses_do_not_count() {
        let parsed = parse_query_string("the panda", DefaultOperator::Or, |q| {
            Ok(match q {
                TextQuery::Term { text, .. } if text == "the" => None,
                q => Some(PredicateNode::Leaf(q.clone())),
            })
        })
        .unwrap();
        assert_eq!(parsed, term("panda"));
    }

    #[test]
    fn test_unbalanced_input_never_fails() {
        for input in ["\"open phrase", "(open group", "close)", "\\", "*", "~"] {
            assert!(parse_query_string(input, DefaultOperator::Or, |q| {
                Ok(Some(PredicateNode::Leaf(q.clone())))
            })
            .is_ok());
        }
    }
}
