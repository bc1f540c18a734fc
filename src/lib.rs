/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file lib.rs
 * @brief Query-expression translator library entry point
 */

pub mod calls;
pub mod error;
pub mod expr;
pub mod options;
pub mod pipeline;
pub mod projection;
pub mod result_ops;
pub mod scope;
pub mod value;

pub use error::{Result, TranslateError};
pub use expr::{
    AccumulatorKind, BinaryOp, DateTimeMember, Expression, MethodIdentity, ResultOpKind,
    ScopedPredicate, SetOp, StaticType, UnaryOp,
};
pub use options::TranslateOptions;
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineStage, SortKey, TerminalResultOperator, TranslationOutput,
};

/// Translates a full `Pipeline` into its `TranslationOutput` — either a
/// stage list or, for a lowered pipeline-terminal `Any()`, the same stage
/// list with the marker stages from SPEC_FULL.md §9 appended.
///
/// This is the crate's main entry point; a caller that only has a single
/// array-valued expression to lower (no stage sequence) should call
/// [`translate_expression`] directly instead.
#[tracing::instrument(level = "info", skip_all)]
pub fn translate_pipeline(pipeline: &Pipeline, opts: &TranslateOptions) -> Result<TranslationOutput> {
    tracing::debug!(stage_count = pipeline.stages.len(), "translating pipeline");
    let builder = PipelineBuilder::new(opts);
    let output = builder.build(pipeline)?;
    match &output {
        TranslationOutput::Stages(stages) => {
            tracing::debug!(emitted_stages = stages.len(), "pipeline translation complete")
        }
        TranslationOutput::Value(_) => {
            tracing::debug!("pipeline translation complete (single value)")
        }
    }
    Ok(output)
}

/// Translates one expression to a BSON value without a surrounding
/// pipeline — the entry point for an array-valued `ResultOp` or any other
/// expression a caller wants to lower in isolation. `stage` names the
/// aggregation stage the value will be embedded in, and is only used to
/// enrich `TranslateError::UnsupportedExpression` should translation fail.
#[tracing::instrument(level = "info", skip(opts))]
pub fn translate_expression(
    expr: &Expression,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<bson::Bson> {
    value::translate_expression(expr, stage, opts)
}
