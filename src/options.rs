/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file options.rs
 * @brief Explicit, caller-owned translation configuration
 */

use serde::{Deserialize, Serialize};

/// Configuration threaded explicitly into the top-level entry points.
///
/// The translator has no CLI, no config files, and no environment
/// variables of its own (SPEC_FULL.md §6) — a caller that wants to surface
/// these knobs through its own configuration layer can do so because this
/// type is plain, serializable data rather than a hidden global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateOptions {
    /// Whether field-path fusion (§4.2) replaces a single-level `$map`
    /// with a direct dotted field reference when both the source and the
    /// selector of a `Select` are bare fields. Defaults to `true`; an
    /// embedding driver disables it for a server/version where the shorter
    /// form is not equivalent (a source that may be `null` vs. missing).
    pub fuse_field_paths: bool,

    /// Prefix used for the fresh placeholder field names a `$project`
    /// stage allocates for a computed, unnamed projection (`__fldN` by
    /// default).
    pub field_slot_prefix: String,

    /// Prefix used for the fresh accumulator slot names hoisted into a
    /// `$group` stage (`__aggN` by default).
    pub accumulator_slot_prefix: String,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            fuse_field_paths: true,
            field_slot_prefix: "__fld".to_string(),
            accumulator_slot_prefix: "__agg".to_string(),
        }
    }
}
