/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file error.rs
 * @brief Translator error taxonomy
 */

use thiserror::Error;

/// The closed error taxonomy a translation attempt can fail with.
///
/// All three variants are fatal for the current call: the translator never
/// partially emits a pipeline, so a caller either gets a full
/// [`crate::TranslationOutput`] or one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    /// The expression's variant, member, or method is not in the recognized
    /// subset. Carries enough context for a caller to point a user at the
    /// offending part of their query.
    #[error("unsupported expression `{expression}` in {stage} stage")]
    UnsupportedExpression { expression: String, stage: String },

    /// An accumulator kind the dispatch table does not cover was seen, or
    /// the projection mapper received a node that was not a constructor or
    /// member-init. Indicates a bug in the caller or in the translator
    /// itself, not a malformed user query.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    /// A single sort specification repeated a key name, even in opposite
    /// directions, which would make the resulting ordering ambiguous.
    #[error("ambiguous ordering: key `{0}` appears more than once in one sort")]
    AmbiguousOrdering(String),
}

pub type Result<T> = std::result::Result<T, TranslateError>;
