//! Analyzer trait and the built-in analyzers and normalizers.
//!
//! - [`StandardAnalyzer`] - Unicode word boundaries, lowercase, English stop words
//! - [`SimpleAnalyzer`] - Letter/digit runs, lowercase, no stop words
//! - [`WhitespaceAnalyzer`] - Splits on whitespace, keeps case
//! - [`KeywordAnalyzer`] - The whole input as a single token
//! - [`LowercaseNormalizer`] - The whole input, lowercased, as a single token

use std::collections::HashSet;
use std::fmt::Debug;

use lazy_static::lazy_static;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Default English stop words list.
const DEFAULT_ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

lazy_static! {
    static ref ENGLISH_STOP_WORDS: HashSet<&'static str> =
        DEFAULT_ENGLISH_STOP_WORDS.iter().copied().collect();
    static ref LETTER_OR_DIGIT_RUN: Regex =
        Regex::new(r"[\p{L}\p{N}]+").expect("static pattern is valid");
}

/// Trait for analyzers that convert text into processed tokens.
pub trait Analyzer: Send + Sync + Debug {
    /// Analyze the given text and return a stream of tokens.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Get the name of this analyzer.
    fn name(&self) -> &'static str;

    /// Analyze text and collect the token texts, dropping positions.
    fn terms(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.analyze(text)?.map(|t| t.text).collect())
    }
}

/// A standard analyzer that provides good defaults for most use cases.
#[derive(Clone, Debug, Default)]
pub struct StandardAnalyzer;

impl StandardAnalyzer {
    /// Create a new standard analyzer.
    pub fn new() -> Self {
        StandardAnalyzer
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = text
            .unicode_words()
            .enumerate()
            .map(|(position, word)| Token::new(word.to_lowercase(), position))
            .filter(|token| !ENGLISH_STOP_WORDS.contains(token.text.as_str()))
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Splits on runs of letters and digits and lowercases them.
#[derive(Clone, Debug, Default)]
pub struct SimpleAnalyzer;

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = LETTER_OR_DIGIT_RUN
            .find_iter(text)
            .enumerate()
            .map(|(position, m)| Token::new(m.as_str().to_lowercase(), position))
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Splits on whitespace and keeps the original case.
#[derive(Clone, Debug, Default)]
pub struct WhitespaceAnalyzer;

impl Analyzer for WhitespaceAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = text
            .split_whitespace()
            .enumerate()
            .map(|(position, word)| Token::new(word, position))
            .collect();
        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Emits the whole input as a single token.
#[derive(Clone, Debug, Default)]
pub struct KeywordAnalyzer;

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        Ok(Box::new(std::iter::once(Token::new(text, 0))))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Normalizer emitting the whole input, lowercased, as a single token.
#[derive(Clone, Debug, Default)]
pub struct LowercaseNormalizer;

impl Analyzer for LowercaseNormalizer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        Ok(Box::new(std::iter::once(Token::new(text.to_lowercase(), 0))))
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzer_keeps_position_gaps() {
        let tokens: Vec<_> = StandardAnalyzer::new()
            .analyze("An elephant ran past John.")
            .unwrap()
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::new("elephant", 1),
                Token::new("ran", 2),
                Token::new("past", 3),
                Token::new("john", 4),
            ]
        );
    }

    #[test]
    fn test_standard_analyzer_stop_words_only() {
        assert!(StandardAnalyzer::new().terms("the a").unwrap().is_empty());
    }

    #[test]
    fn test_simple_and_whitespace() {
        assert_eq!(
            SimpleAnalyzer.terms("Hello, World-42").unwrap(),
            vec!["hello", "world", "42"]
        );
        assert_eq!(
            WhitespaceAnalyzer.terms("Hello, World").unwrap(),
            vec!["Hello,", "World"]
        );
    }

    #[test]
    fn test_normalizer_single_token() {
        assert_eq!(
            LowercaseNormalizer.terms("Hello World").unwrap(),
            vec!["hello world"]
        );
        assert_eq!(KeywordAnalyzer.terms("Hello World").unwrap(), vec!["Hello World"]);
    }
}
