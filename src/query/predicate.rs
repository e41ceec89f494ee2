//! Predicate trees.

use std::ops::Bound;

use crate::document::field_value::FieldValue;

/// A predicate whose field-level leaves are backend-specific.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode<L> {
    /// Matches every document.
    MatchAll,
    /// Matches no document.
    MatchNone,
    /// A field-level predicate built by a backend factory.
    Leaf(L),
    /// Boolean combination of predicates.
    Bool(BoolNode<L>),
    /// A predicate with a boost and/or a constant score.
    Scored {
        inner: Box<PredicateNode<L>>,
        boost: f32,
        constant_score: bool,
    },
}

impl<L> PredicateNode<L> {
    /// Apply scoring options to this predicate.
    pub fn with_options(self, options: PredicateOptions) -> Self {
        options.apply(self)
    }

    /// Whether this predicate can never match.
    pub fn is_match_none(&self) -> bool {
        match self {
            PredicateNode::MatchNone => true,
            PredicateNode::Scored { inner, .. } => inner.is_match_none(),
            _ => false,
        }
    }
}

/// Boolean clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolNode<L> {
    /// Clauses that must match and contribute to the score.
    pub must: Vec<PredicateNode<L>>,
    /// Clauses that should match and contribute to the score.
    pub should: Vec<PredicateNode<L>>,
    /// Clauses that must not match.
    pub must_not: Vec<PredicateNode<L>>,
    /// Clauses that must match without contributing to the score.
    pub filter: Vec<PredicateNode<L>>,
    /// Minimum number of should clauses that must match.
    ///
    /// Defaults to 1 when there are no must/filter clauses, 0 otherwise.
    pub minimum_should_match: Option<usize>,
}

impl<L> Default for BoolNode<L> {
    fn default() -> Self {
        BoolNode {
            must: Vec::new(),
            should: Vec::new(),
            must_not: Vec::new(),
            filter: Vec::new(),
            minimum_should_match: None,
        }
    }
}

impl<L> BoolNode<L> {
    /// The effective minimum number of should clauses.
    pub fn effective_minimum_should_match(&self) -> usize {
        match self.minimum_should_match {
            Some(n) => n,
            None if self.must.is_empty() && self.filter.is_empty() && !self.should.is_empty() => 1,
            None => 0,
        }
    }
}

/// Boost and constant score applied when a predicate is built.
///
/// Boosting twice multiplies the boosts. A constant score drops the relevance
/// score of the wrapped predicate and keeps the boost as a flat score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateOptions {
    boost: f32,
    constant_score: bool,
}

impl Default for PredicateOptions {
    fn default() -> Self {
        PredicateOptions {
            boost: 1.0,
            constant_score: false,
        }
    }
}

impl PredicateOptions {
    /// Multiply the boost.
    pub fn boost(mut self, boost: f32) -> Self {
        self.boost *= boost;
        self
    }

    /// Use a constant score.
    pub fn constant_score(mut self) -> Self {
        self.constant_score = true;
        self
    }

    pub fn boost_value(&self) -> f32 {
        self.boost
    }

    pub fn is_constant_score(&self) -> bool {
        self.constant_score
    }

    /// Wrap a predicate with these options.
    pub fn apply<L>(self, node: PredicateNode<L>) -> PredicateNode<L> {
        if self.boost == 1.0 && !self.constant_score {
            return node;
        }
        match node {
            PredicateNode::Scored {
                inner,
                boost,
                constant_score,
            } if !self.constant_score => PredicateNode::Scored {
                inner,
                boost: boost * self.boost,
                constant_score,
            },
            node => PredicateNode::Scored {
                inner: Box::new(node),
                boost: self.boost,
                constant_score: self.constant_score,
            },
        }
    }
}

/// Bounds of a range predicate, in DSL values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<FieldValue>,
    pub upper: Bound<FieldValue>,
}

impl ValueRange {
    /// Inclusive on both ends.
    pub fn between<A: Into<FieldValue>, B: Into<FieldValue>>(lower: A, upper: B) -> Self {
        ValueRange {
            lower: Bound::Included(lower.into()),
            upper: Bound::Included(upper.into()),
        }
    }

    /// Inclusive lower bound, no upper bound.
    pub fn at_least<A: Into<FieldValue>>(lower: A) -> Self {
        ValueRange {
            lower: Bound::Included(lower.into()),
            upper: Bound::Unbounded,
        }
    }

    /// Inclusive upper bound, no lower bound.
    pub fn at_most<B: Into<FieldValue>>(upper: B) -> Self {
        ValueRange {
            lower: Bound::Unbounded,
            upper: Bound::Included(upper.into()),
        }
    }

    /// Exclusive lower bound, no upper bound.
    pub fn above<A: Into<FieldValue>>(lower: A) -> Self {
        ValueRange {
            lower: Bound::Excluded(lower.into()),
            upper: Bound::Unbounded,
        }
    }

    /// Exclusive upper bound, no lower bound.
    pub fn below<B: Into<FieldValue>>(upper: B) -> Self {
        ValueRange {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(upper.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boosts_multiply() {
        let node: PredicateNode<()> = PredicateNode::Leaf(());
        let once = PredicateOptions::default().boost(2.0).apply(node);
        let twice = PredicateOptions::default().boost(3.0).apply(once);

        assert_eq!(
            twice,
            PredicateNode::Scored {
                inner: Box::new(PredicateNode::Leaf(())),
                boost: 6.0,
                constant_score: false,
            }
        );
    }

    #[test]
    fn test_boost_over_constant_score_keeps_flag() {
        let node: PredicateNode<()> = PredicateNode::Leaf(());
        let constant = PredicateOptions::default()
            .constant_score()
            .boost(7.0)
            .apply(node);
        let boosted = PredicateOptions::default().boost(2.0).apply(constant);

        assert_eq!(
            boosted,
            PredicateNode::Scored {
                inner: Box::new(PredicateNode::Leaf(())),
                boost: 14.0,
                constant_score: true,
            }
        );
    }

    #[test]
    fn test_default_options_are_transparent() {
        let node: PredicateNode<()> = PredicateNode::MatchAll;
        assert_eq!(PredicateOptions::default().apply(node), PredicateNode::MatchAll);
    }

    #[test]
    fn test_minimum_should_match_defaults() {
        let mut node: BoolNode<()> = BoolNode::default();
        assert_eq!(node.effective_minimum_should_match(), 0);
        node.should.push(PredicateNode::MatchAll);
        assert_eq!(node.effective_minimum_should_match(), 1);
        node.must.push(PredicateNode::MatchAll);
        assert_eq!(node.effective_minimum_should_match(), 0);
    }
}
