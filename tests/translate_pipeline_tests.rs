/*!
 * Integration tests for the query-expression translator.
 * Exercises the concrete end-to-end scenarios from SPEC_FULL.md §8.
 */

use anyhow::Result;
use bson::doc;

use linq_to_mql::{
    AccumulatorKind, BinaryOp, Expression, Pipeline, PipelineStage, SortKey, StaticType,
    TerminalResultOperator, TranslateError, TranslateOptions, TranslationOutput,
};

fn opts() -> TranslateOptions {
    TranslateOptions::default()
}

fn stages_of(output: TranslationOutput) -> Vec<bson::Document> {
    match output {
        TranslationOutput::Stages(stages) => stages,
        TranslationOutput::Value(_) => panic!("expected a stage list"),
    }
}

#[test]
fn equality_filter() -> Result<()> {
    let pipeline = Pipeline {
        stages: vec![PipelineStage::Where(Expression::binary(
            BinaryOp::Eq,
            Expression::field("A"),
            Expression::constant("Awesome", StaticType::String),
            StaticType::Other,
        ))],
        terminal: None,
    };

    let stages = stages_of(linq_to_mql::translate_pipeline(&pipeline, &opts())?);

    assert_eq!(stages, vec![doc! { "$match": { "A": "Awesome" } }]);
    Ok(())
}

#[test]
fn projection_with_concat() -> Result<()> {
    let pipeline = Pipeline {
        stages: vec![PipelineStage::Select(Expression::binary(
            BinaryOp::Add,
            Expression::binary(
                BinaryOp::Add,
                Expression::field("A"),
                Expression::constant(" ", StaticType::String),
                StaticType::String,
            ),
            Expression::field("B"),
            StaticType::String,
        ))],
        terminal: None,
    };

    let stages = stages_of(linq_to_mql::translate_pipeline(&pipeline, &opts())?);

    assert_eq!(
        stages,
        vec![doc! { "$project": { "__fld0": { "$concat": ["$A", " ", "$B"] }, "_id": 0 } }]
    );
    Ok(())
}

#[test]
fn group_with_accumulator_slot_sharing() -> Result<()> {
    let first_b = || Expression::Accumulator {
        kind: AccumulatorKind::First,
        arg: Box::new(Expression::field("B")),
    };

    let pipeline = Pipeline {
        stages: vec![
            PipelineStage::GroupBy {
                key: Expression::field("A"),
                result_selector: None,
            },
            PipelineStage::Where(Expression::binary(
                BinaryOp::Eq,
                first_b(),
                Expression::constant("Balloon", StaticType::String),
                StaticType::Other,
            )),
            PipelineStage::Select(Expression::New(vec![
                ("Key".to_string(), Expression::field("_id")),
                ("FirstB".to_string(), first_b()),
            ])),
        ],
        terminal: None,
    };

    let stages = stages_of(linq_to_mql::translate_pipeline(&pipeline, &opts())?);

    assert_eq!(
        stages,
        vec![
            doc! { "$group": { "_id": "$A", "__agg0": { "$first": "$B" } } },
            doc! { "$match": { "__agg0": "Balloon" } },
            doc! { "$project": { "Key": "$_id", "FirstB": "$__agg0", "_id": 0 } },
        ]
    );
    Ok(())
}

#[test]
fn day_of_week_adjustment() -> Result<()> {
    let expr = Expression::MemberAccess {
        target: Box::new(Expression::field("D")),
        member: "DayOfWeek".to_string(),
        declaring_type: StaticType::DateTime,
    };

    let value = linq_to_mql::translate_expression(&expr, "$project", &opts())?;

    assert_eq!(value, doc! { "$subtract": [{ "$dayOfWeek": "$D" }, 1] }.into());
    Ok(())
}

#[test]
fn distinct_then_filter_on_root() -> Result<()> {
    let pipeline = Pipeline {
        stages: vec![
            PipelineStage::Distinct(None),
            PipelineStage::Where(Expression::binary(
                BinaryOp::Eq,
                Expression::field("_id.A"),
                Expression::constant("Awesome", StaticType::String),
                StaticType::Other,
            )),
        ],
        terminal: None,
    };

    let stages = stages_of(linq_to_mql::translate_pipeline(&pipeline, &opts())?);

    assert_eq!(
        stages,
        vec![
            doc! { "$group": { "_id": "$$ROOT" } },
            doc! { "$match": { "_id.A": "Awesome" } },
        ]
    );
    Ok(())
}

#[test]
fn ambiguous_sort_is_rejected() {
    let pipeline = Pipeline {
        stages: vec![PipelineStage::OrderBy(vec![
            SortKey {
                key: Expression::field("A"),
                ascending: true,
            },
            SortKey {
                key: Expression::field("B"),
                ascending: true,
            },
            SortKey {
                key: Expression::field("A"),
                ascending: false,
            },
        ])],
        terminal: None,
    };

    let err = linq_to_mql::translate_pipeline(&pipeline, &opts()).unwrap_err();
    assert!(matches!(err, TranslateError::AmbiguousOrdering(ref key) if key == "A"));
}

#[test]
fn pipeline_terminal_any_appends_limit_and_marker() -> Result<()> {
    let pipeline = Pipeline {
        stages: vec![PipelineStage::Where(Expression::binary(
            BinaryOp::Eq,
            Expression::field("A"),
            Expression::constant("Awesome", StaticType::String),
            StaticType::Other,
        ))],
        terminal: Some(TerminalResultOperator::Any),
    };

    let stages = stages_of(linq_to_mql::translate_pipeline(&pipeline, &opts())?);

    assert_eq!(
        stages,
        vec![
            doc! { "$match": { "A": "Awesome" } },
            doc! { "$limit": 1 },
            doc! { "$project": { "__exists": { "$literal": true }, "_id": 0 } },
        ]
    );
    Ok(())
}

#[test]
fn unsupported_member_access_carries_stage_context() {
    let expr = Expression::MemberAccess {
        target: Box::new(Expression::field("X")),
        member: "Nonsense".to_string(),
        declaring_type: StaticType::Other,
    };

    let err = linq_to_mql::translate_expression(&expr, "$project", &opts()).unwrap_err();
    match err {
        TranslateError::UnsupportedExpression { expression, stage } => {
            assert_eq!(stage, "$project");
            assert!(expression.contains("Nonsense"));
        }
        other => panic!("expected UnsupportedExpression, got {other:?}"),
    }
}
