//! Shared utility modules used across spatha components.

pub mod levenshtein;
