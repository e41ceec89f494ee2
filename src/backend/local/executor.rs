//! Query evaluation over local index stores.

use std::cmp::Ordering;
use std::ops::Bound;
use std::sync::Arc;

use crate::backend::local::factory::{LocalPredicate, LocalProjection, LocalSort};
use crate::backend::local::store::{IndexStore, StoredDocument};
use crate::config::LocalBackendConfig;
use crate::document::document::Document;
use crate::document::field_value::FieldValue;
use crate::document::reference::DocumentReference;
use crate::error::Result;
use crate::query::predicate::{PredicateNode, ValueRange};
use crate::query::projection::{ProjectionNode, ProjectionValue};
use crate::query::search_query::SearchHit;
use crate::query::sort::{MissingValue, SortNode, SortOrder};
use crate::util::levenshtein::FuzzyMatcher;

/// Scores documents of one index against a predicate.
pub struct Scorer<'a> {
    store: &'a IndexStore,
    k1: f32,
    b: f32,
}

impl<'a> Scorer<'a> {
    pub fn new(store: &'a IndexStore, config: &LocalBackendConfig) -> Self {
        Scorer {
            store,
            k1: config.bm25_k1,
            b: config.bm25_b,
        }
    }

    /// The score of `doc`, or `None` when it does not match.
    pub fn score(&self, node: &PredicateNode<LocalPredicate>, doc: &StoredDocument) -> Option<f32> {
        match node {
            PredicateNode::MatchAll => Some(1.0),
            PredicateNode::MatchNone => None,
            PredicateNode::Leaf(leaf) => self.score_leaf(leaf, doc),
            PredicateNode::Bool(node) => {
                let mut score = 0.0;
                for clause in &node.must {
                    score += self.score(clause, doc)?;
                }
                for clause in &node.filter {
                    self.score(clause, doc)?;
                }
                if node.must_not.iter().any(|c| self.score(c, doc).is_some()) {
                    return None;
                }
                let mut matched = 0;
                for clause in &node.should {
                    if let Some(s) = self.score(clause, doc) {
                        matched += 1;
                        score += s;
                    }
                }
                if matched < node.effective_minimum_should_match() {
                    return None;
                }
                Some(score)
            }
            PredicateNode::Scored {
                inner,
                boost,
                constant_score,
            } => self
                .score(inner, doc)
                .map(|s| if *constant_score { *boost } else { s * boost }),
        }
    }

    fn score_leaf(&self, leaf: &LocalPredicate, doc: &StoredDocument) -> Option<f32> {
        match leaf {
            LocalPredicate::Term { path, term } => {
                let terms = doc.field_terms(path)?;
                let tf = terms.term_frequency(term);
                (tf > 0).then(|| self.bm25(path, term, tf as f32, terms.length))
            }
            LocalPredicate::Phrase { path, terms, slop } => {
                let field = doc.field_terms(path)?;
                let mut lists = Vec::with_capacity(terms.len());
                for (offset, term) in terms {
                    let positions = field.positions.get(term)?;
                    lists.push((*offset, positions.as_slice()));
                }
                let freq = sloppy_frequency(&lists, *slop);
                if freq <= 0.0 {
                    return None;
                }
                let idf: f32 = terms.iter().map(|(_, t)| self.idf(path, t)).sum();
                Some(idf * self.tf_norm(freq, field.length, path))
            }
            LocalPredicate::Prefix { path, prefix } => {
                let field = doc.field_terms(path)?;
                field
                    .positions
                    .keys()
                    .any(|t| t.starts_with(prefix.as_str()))
                    .then_some(1.0)
            }
            LocalPredicate::Fuzzy {
                path,
                term,
                max_edits,
            } => {
                let field = doc.field_terms(path)?;
                let matcher = FuzzyMatcher::new(term.as_str(), *max_edits, 0);
                field
                    .positions
                    .iter()
                    .filter(|(candidate, _)| matcher.is_match(candidate))
                    .map(|(candidate, positions)| {
                        self.bm25(path, candidate, positions.len() as f32, field.length)
                            * matcher.similarity(candidate)
                    })
                    .fold(None, |best: Option<f32>, s| Some(best.map_or(s, |b| b.max(s))))
            }
            LocalPredicate::Exact { path, value } => doc
                .document
                .values(path)
                .iter()
                .any(|v| v.compare(value) == Some(Ordering::Equal))
                .then_some(1.0),
            LocalPredicate::Range { path, range } => doc
                .document
                .values(path)
                .iter()
                .any(|v| in_range(v, range))
                .then_some(1.0),
            LocalPredicate::WithinCircle {
                path,
                center,
                radius_meters,
            } => doc
                .document
                .values(path)
                .iter()
                .filter_map(FieldValue::as_geo)
                .any(|p| p.distance_to(center) <= *radius_meters)
                .then_some(1.0),
        }
    }

    fn idf(&self, path: &str, term: &str) -> f32 {
        let Some(stats) = self.store.field_stats(path) else {
            return 0.0;
        };
        let n = stats.doc_count as f32;
        let df = stats.doc_freq(term) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    fn tf_norm(&self, tf: f32, length: usize, path: &str) -> f32 {
        let average = self
            .store
            .field_stats(path)
            .map_or(1.0, |stats| stats.average_length());
        let norm = self.k1 * (1.0 - self.b + self.b * length as f32 / average);
        tf * (self.k1 + 1.0) / (tf + norm)
    }

    fn bm25(&self, path: &str, term: &str, tf: f32, length: usize) -> f32 {
        self.idf(path, term) * self.tf_norm(tf, length, path)
    }
}

fn in_range(value: &FieldValue, range: &ValueRange) -> bool {
    let lower = match &range.lower {
        Bound::Included(b) => matches!(
            value.compare(b),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Bound::Excluded(b) => value.compare(b) == Some(Ordering::Greater),
        Bound::Unbounded => true,
    };
    let upper = match &range.upper {
        Bound::Included(b) => matches!(value.compare(b), Some(Ordering::Less | Ordering::Equal)),
        Bound::Excluded(b) => value.compare(b) == Some(Ordering::Less),
        Bound::Unbounded => true,
    };
    lower && upper
}

/// Weighted number of phrase occurrences within `slop`.
///
/// Each term position is shifted by the term offset in the phrase; an
/// occurrence is a minimal window holding one shifted position of every term,
/// and its width is the number of moves it needs. Each occurrence counts
/// `1 / (1 + width)`.
fn sloppy_frequency(lists: &[(usize, &[usize])], slop: usize) -> f32 {
    let k = lists.len();
    let mut events: Vec<(i64, usize)> = lists
        .iter()
        .enumerate()
        .flat_map(|(i, (offset, positions))| {
            positions.iter().map(move |p| (*p as i64 - *offset as i64, i))
        })
        .collect();
    events.sort_unstable();

    let mut counts = vec![0usize; k];
    let mut covered = 0;
    let mut left = 0;
    let mut freq = 0.0;
    for right in 0..events.len() {
        let list = events[right].1;
        if counts[list] == 0 {
            covered += 1;
        }
        counts[list] += 1;
        while covered == k {
            let (start, first) = events[left];
            if counts[first] > 1 {
                counts[first] -= 1;
                left += 1;
                continue;
            }
            let width = (events[right].0 - start) as usize;
            if width <= slop {
                freq += 1.0 / (1.0 + width as f32);
            }
            counts[first] -= 1;
            covered -= 1;
            left += 1;
        }
    }
    freq
}

/// A matching document, before sorting and paging.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub index_position: usize,
    pub index_name: Arc<str>,
    pub seq: u64,
    pub id: String,
    pub score: f32,
    pub document: Arc<Document>,
}

/// Collect the matching documents of one index.
pub fn collect_candidates(
    store: &IndexStore,
    index_position: usize,
    predicate: &PredicateNode<LocalPredicate>,
    config: &LocalBackendConfig,
    out: &mut Vec<Candidate>,
) {
    let scorer = Scorer::new(store, config);
    let index_name: Arc<str> = Arc::from(store.index_name());
    for doc in store.documents() {
        if let Some(score) = scorer.score(predicate, doc) {
            out.push(Candidate {
                index_position,
                index_name: Arc::clone(&index_name),
                seq: doc.seq,
                id: doc.id.clone(),
                score,
                document: Arc::clone(&doc.document),
            });
        }
    }
}

fn index_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.index_position
        .cmp(&b.index_position)
        .then(a.seq.cmp(&b.seq))
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Sort key of a field sort: the smallest value ascending, the largest descending.
fn field_key<'d>(document: &'d Document, path: &str, order: SortOrder) -> Option<&'d FieldValue> {
    let values = document.values(path);
    let pick = |a: &&FieldValue, b: &&FieldValue| a.compare(b).unwrap_or(Ordering::Equal);
    match order {
        SortOrder::Asc => values.iter().min_by(pick),
        SortOrder::Desc => values.iter().max_by(pick),
    }
}

fn compare_sort(sort: &SortNode<LocalSort>, a: &Candidate, b: &Candidate) -> Ordering {
    match sort {
        SortNode::Score(order) => directed(
            a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal),
            *order,
        ),
        SortNode::IndexOrder => index_order(a, b),
        SortNode::Field(LocalSort::Field {
            path,
            order,
            missing,
        }) => {
            let substitute = match missing {
                MissingValue::Use(value) => Some(value),
                _ => None,
            };
            let ka = field_key(&a.document, path, *order).or(substitute);
            let kb = field_key(&b.document, path, *order).or(substitute);
            match (ka, kb) {
                (Some(x), Some(y)) => directed(x.compare(y).unwrap_or(Ordering::Equal), *order),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => match missing {
                    MissingValue::First => Ordering::Less,
                    _ => Ordering::Greater,
                },
                (Some(_), None) => match missing {
                    MissingValue::First => Ordering::Greater,
                    _ => Ordering::Less,
                },
            }
        }
        SortNode::Field(LocalSort::Distance {
            path,
            center,
            order,
        }) => {
            let distance = |c: &Candidate| {
                c.document
                    .values(path)
                    .iter()
                    .filter_map(FieldValue::as_geo)
                    .map(|p| p.distance_to(center))
                    .fold(None, |best: Option<f64>, d| Some(best.map_or(d, |b| b.min(d))))
            };
            match (distance(a), distance(b)) {
                (Some(x), Some(y)) => directed(x.partial_cmp(&y).unwrap_or(Ordering::Equal), *order),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
            }
        }
    }
}

/// Order candidates; without sorts, by descending score.
pub fn sort_candidates(candidates: &mut [Candidate], sorts: &[SortNode<LocalSort>]) {
    candidates.sort_by(|a, b| {
        let ordering = if sorts.is_empty() {
            compare_sort(&SortNode::Score(SortOrder::Desc), a, b)
        } else {
            sorts
                .iter()
                .map(|sort| compare_sort(sort, a, b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        };
        ordering.then_with(|| index_order(a, b))
    });
}

/// Turn a candidate into a hit with its projections.
pub fn to_hit(
    candidate: &Candidate,
    projections: &[ProjectionNode<LocalProjection>],
) -> Result<SearchHit> {
    let reference = DocumentReference::new(candidate.index_name.as_ref(), candidate.id.as_str());
    let mut values = Vec::with_capacity(projections.len());
    for projection in projections {
        values.push(match projection {
            ProjectionNode::DocumentReference => ProjectionValue::Reference(reference.clone()),
            ProjectionNode::Score => ProjectionValue::Score(candidate.score),
            ProjectionNode::Field(field) => ProjectionValue::Values(
                candidate
                    .document
                    .values(&field.path)
                    .iter()
                    .map(|v| field.converter.convert(v, field.convert))
                    .collect::<Result<Vec<_>>>()?,
            ),
        });
    }
    Ok(SearchHit {
        reference,
        score: candidate.score,
        projections: values,
    })
}
