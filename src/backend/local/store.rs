//! In-memory document store of one local index.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::trace;

use crate::analysis::analyzer::Analyzer;
use crate::backend::local::LocalBackend;
use crate::backend::local::factory::LocalPredicateFactory;
use crate::backend::work::DocumentWork;
use crate::document::document::Document;
use crate::error::Result;
use crate::query::spi::IndexModel;

/// Position gap inserted between the values of a multi-valued text field.
const POSITION_INCREMENT_GAP: usize = 100;

/// Indexed terms of one field of one document.
#[derive(Debug, Clone, Default)]
pub struct FieldTerms {
    /// Positions of each term.
    pub positions: AHashMap<String, Vec<usize>>,
    /// Number of tokens.
    pub length: usize,
}

impl FieldTerms {
    pub fn term_frequency(&self, term: &str) -> usize {
        self.positions.get(term).map_or(0, Vec::len)
    }
}

/// A document as stored by the local backend.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    /// Insertion sequence number, used for index order.
    pub seq: u64,
    pub document: Arc<Document>,
    pub terms: AHashMap<String, FieldTerms>,
}

impl StoredDocument {
    pub fn field_terms(&self, path: &str) -> Option<&FieldTerms> {
        self.terms.get(path)
    }
}

/// Per-field term statistics.
#[derive(Debug, Clone, Default)]
pub struct FieldStats {
    /// Number of documents with at least one token in the field.
    pub doc_count: usize,
    /// Total number of tokens.
    pub total_length: usize,
    /// Number of documents containing each term.
    pub doc_freq: AHashMap<String, usize>,
}

impl FieldStats {
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    pub fn average_length(&self) -> f32 {
        if self.doc_count == 0 {
            1.0
        } else {
            self.total_length as f32 / self.doc_count as f32
        }
    }
}

enum TermSource {
    Analyzer(Arc<dyn Analyzer>),
    Keyword(Option<Arc<dyn Analyzer>>),
}

/// Documents and term statistics of one index.
pub struct IndexStore {
    index_name: String,
    sources: AHashMap<String, TermSource>,
    documents: AHashMap<String, StoredDocument>,
    stats: AHashMap<String, FieldStats>,
    next_seq: u64,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("index_name", &self.index_name)
            .field("documents", &self.documents.len())
            .finish()
    }
}

impl IndexStore {
    /// Create an empty store for the fields of `model`.
    pub fn new(model: &IndexModel<LocalBackend>) -> Self {
        let mut sources = AHashMap::new();
        for descriptor in model.schema().fields() {
            let path = descriptor.path();
            let Some(factories) = model.field(path) else {
                continue;
            };
            match &factories.predicate {
                LocalPredicateFactory::Text { analyzer, .. } => {
                    sources.insert(path.to_string(), TermSource::Analyzer(Arc::clone(analyzer)));
                }
                LocalPredicateFactory::Keyword { normalizer, .. } => {
                    sources.insert(path.to_string(), TermSource::Keyword(normalizer.clone()));
                }
                _ => {}
            }
        }
        IndexStore {
            index_name: model.name().to_string(),
            sources,
            documents: AHashMap::new(),
            stats: AHashMap::new(),
            next_seq: 0,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StoredDocument> {
        self.documents.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &StoredDocument> + '_ {
        self.documents.values()
    }

    pub fn field_stats(&self, path: &str) -> Option<&FieldStats> {
        self.stats.get(path)
    }

    /// Apply one write.
    pub fn apply(&mut self, work: DocumentWork) -> Result<()> {
        trace!(index = %self.index_name, kind = work.kind(), id = work.id(), "applying work");
        match work {
            DocumentWork::Add { id, document } | DocumentWork::Update { id, document } => {
                self.insert(id, document)
            }
            DocumentWork::Delete { id } => {
                self.remove(&id);
                Ok(())
            }
        }
    }

    fn insert(&mut self, id: String, document: Document) -> Result<()> {
        let terms = self.index_terms(&document)?;
        self.remove(&id);
        for (path, field_terms) in &terms {
            let stats = self.stats.entry(path.clone()).or_default();
            stats.doc_count += 1;
            stats.total_length += field_terms.length;
            for term in field_terms.positions.keys() {
                *stats.doc_freq.entry(term.clone()).or_default() += 1;
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.documents.insert(
            id.clone(),
            StoredDocument {
                id,
                seq,
                document: Arc::new(document),
                terms,
            },
        );
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Option<StoredDocument> {
        let removed = self.documents.remove(id)?;
        for (path, field_terms) in &removed.terms {
            if let Some(stats) = self.stats.get_mut(path) {
                stats.doc_count = stats.doc_count.saturating_sub(1);
                stats.total_length = stats.total_length.saturating_sub(field_terms.length);
                for term in field_terms.positions.keys() {
                    if let Some(freq) = stats.doc_freq.get_mut(term) {
                        *freq -= 1;
                        if *freq == 0 {
                            stats.doc_freq.remove(term);
                        }
                    }
                }
            }
        }
        Some(removed)
    }

    fn index_terms(&self, document: &Document) -> Result<AHashMap<String, FieldTerms>> {
        let mut terms = AHashMap::new();
        for (path, values) in document.fields() {
            let Some(source) = self.sources.get(path) else {
                continue;
            };
            let mut field_terms = FieldTerms::default();
            let mut base = 0;
            for value in values {
                let Some(text) = value.as_text() else {
                    continue;
                };
                match source {
                    TermSource::Analyzer(analyzer) => {
                        let mut last = None;
                        for token in analyzer.analyze(text)? {
                            let position = base + token.position;
                            field_terms
                                .positions
                                .entry(token.text)
                                .or_default()
                                .push(position);
                            field_terms.length += 1;
                            last = Some(position);
                        }
                        if let Some(last) = last {
                            base = last + 1 + POSITION_INCREMENT_GAP;
                        }
                    }
                    TermSource::Keyword(normalizer) => {
                        let term = match normalizer {
                            Some(normalizer) => {
                                normalizer.terms(text)?.into_iter().next().unwrap_or_default()
                            }
                            None => text.to_string(),
                        };
                        field_terms.positions.entry(term).or_default().push(base);
                        field_terms.length += 1;
                        base += 1;
                    }
                }
            }
            if field_terms.length > 0 {
                terms.insert(path.to_string(), field_terms);
            }
        }
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::registry::AnalysisRegistry;
    use crate::backend::local::factory::create_factories;
    use crate::document::field_value::FieldValue;
    use crate::schema::field::IndexField;
    use crate::schema::schema::IndexSchema;

    fn store() -> IndexStore {
        let schema = IndexSchema::builder("books")
            .field(IndexField::text("title"))
            .field(IndexField::keyword("code").normalizer("lowercase"))
            .build()
            .unwrap();
        let registry = AnalysisRegistry::default();
        let model = IndexModel::build(Arc::new(schema), |d| create_factories(d, &registry)).unwrap();
        IndexStore::new(&model)
    }

    fn document(title: &str) -> Document {
        let mut document = Document::new();
        document.add_value("title", FieldValue::from(title));
        document.add_value("code", FieldValue::from("AB-1"));
        document
    }

    #[test]
    fn test_terms_and_stats() {
        let mut store = store();
        store
            .apply(DocumentWork::Add {
                id: "1".to_string(),
                document: document("The quick fox"),
            })
            .unwrap();

        let stored = store.get("1").unwrap();
        let title = stored.field_terms("title").unwrap();
        assert_eq!(title.positions["quick"], vec![1]);
        assert_eq!(title.length, 2);
        assert_eq!(stored.field_terms("code").unwrap().term_frequency("ab-1"), 1);
        assert_eq!(store.field_stats("title").unwrap().doc_freq("fox"), 1);
    }

    #[test]
    fn test_update_replaces_stats() {
        let mut store = store();
        for title in ["quick fox", "lazy dog"] {
            store
                .apply(DocumentWork::Update {
                    id: "1".to_string(),
                    document: document(title),
                })
                .unwrap();
        }
        assert_eq!(store.len(), 1);
        let stats = store.field_stats("title").unwrap();
        assert_eq!(stats.doc_freq("fox"), 0);
        assert_eq!(stats.doc_freq("dog"), 1);
        assert_eq!(stats.doc_count, 1);

        store
            .apply(DocumentWork::Delete {
                id: "1".to_string(),
            })
            .unwrap();
        assert!(store.is_empty());
        assert_eq!(store.field_stats("title").unwrap().doc_count, 0);
    }

    #[test]
    fn test_multi_valued_positions_have_gap() {
        let mut store = store();
        let mut document = Document::new();
        document.add_value("title", FieldValue::from("quick fox"));
        document.add_value("title", FieldValue::from("lazy dog"));
        store
            .apply(DocumentWork::Add {
                id: "1".to_string(),
                document,
            })
            .unwrap();
        let title = store.get("1").unwrap().field_terms("title").unwrap();
        assert_eq!(title.positions["lazy"], vec![2 + POSITION_INCREMENT_GAP]);
    }
}
