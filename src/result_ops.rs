/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file result_ops.rs
 * @brief Result-operator lowering (Any/All/Count/Contains)
 */

use bson::{doc, Bson};

use crate::error::Result;
use crate::expr::{Expression, ResultOpKind, ScopedPredicate};
use crate::options::TranslateOptions;
use crate::scope::rewrite_fields;
use crate::value::translate_expression;

/// Lowers a result operator applied in place to an array-valued expression
/// (SPEC_FULL.md §4.6's "array value" rows). `Any()`/`All()`/`Contains()`
/// used this way are ordinary value-level expressions: they can appear
/// anywhere a `$project`/`$match` expression can, not only as the terminal
/// element of a `Pipeline`.
pub fn translate_array_result_op(
    kind: &ResultOpKind,
    source: &Expression,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    let source_val = translate_expression(source, stage, opts)?;
    match kind {
        ResultOpKind::Count => Ok(doc! { "$size": source_val }.into()),
        ResultOpKind::Any(None) => {
            Ok(doc! { "$gt": [{ "$size": source_val }, 0] }.into())
        }
        ResultOpKind::Any(Some(pred)) => {
            let mapped = map_predicate(&source_val, pred, stage, opts)?;
            Ok(doc! { "$anyElementTrue": mapped }.into())
        }
        ResultOpKind::All(pred) => {
            let mapped = map_predicate(&source_val, pred, stage, opts)?;
            Ok(doc! { "$allElementsTrue": mapped }.into())
        }
        ResultOpKind::Contains(value) => {
            let value_val = translate_expression(value, stage, opts)?;
            let mapped: Bson = doc! {
                "$map": {
                    "input": source_val,
                    "as": "x",
                    "in": { "$eq": ["$$x", value_val] },
                }
            }
            .into();
            Ok(doc! { "$anyElementTrue": mapped }.into())
        }
    }
}

fn map_predicate(
    source_val: &Bson,
    pred: &ScopedPredicate,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    let rewritten = rewrite_fields(&pred.body, &pred.var);
    let body = translate_expression(&rewritten, stage, opts)?;
    Ok(doc! {
        "$map": {
            "input": source_val.clone(),
            "as": pred.var.clone(),
            "in": body,
        }
    }
    .into())
}

/// The binding resolution for the pipeline-level `Any()` open question
/// (SPEC_FULL.md §9): append `{"$limit": 1}` then a marker `$project`
/// rather than a `$size`-style count or a second client-side query. An
/// empty result set from the resulting pipeline means `false`; one
/// document means `true`. Kept server-side in a single round trip, at the
/// cost of the caller reading "no documents" rather than a boolean field.
pub fn terminal_any_stages() -> Vec<bson::Document> {
    vec![
        doc! { "$limit": 1 },
        doc! { "$project": { "__exists": { "$literal": true }, "_id": 0 } },
    ]
}
