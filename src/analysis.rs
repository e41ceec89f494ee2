//! Text analysis for text and keyword fields.
//!
//! Analyzers split text into positioned tokens for full-text fields;
//! normalizers turn a whole value into a single normalized token for keyword
//! fields. Both are referenced by name from field capability descriptors and
//! resolved through the [`registry::AnalysisRegistry`].
//!
//! ```
//! use spatha::analysis::analyzer::{Analyzer, StandardAnalyzer};
//!
//! let analyzer = StandardAnalyzer::new();
//! let tokens: Vec<_> = analyzer.analyze("The Quick fox").unwrap().collect();
//!
//! assert_eq!(tokens.len(), 2);
//! assert_eq!(tokens[0].text, "quick");
//! assert_eq!(tokens[0].position, 1);
//! ```

pub mod analyzer;
pub mod registry;
pub mod token;
