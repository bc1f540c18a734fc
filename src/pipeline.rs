/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file pipeline.rs
 * @brief Stage-shaping layer: composes a legal aggregation pipeline
 */

use std::collections::HashSet;

use bson::{doc, Bson, Document};

use crate::error::{Result, TranslateError};
use crate::expr::{AccumulatorKind, BinaryOp, Expression};
use crate::options::TranslateOptions;
use crate::result_ops::terminal_any_stages;
use crate::value::translate_expression;

/// One key/direction pair inside a single `$sort` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub key: Expression,
    pub ascending: bool,
}

/// A single element of a `Pipeline`'s stage list, in the canonical order
/// SPEC_FULL.md §4.3 describes: optional filtering, then
/// projection/grouping, then ordering, then paging.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Where(Expression),
    Select(Expression),
    GroupBy {
        key: Expression,
        result_selector: Option<Expression>,
    },
    OrderBy(Vec<SortKey>),
    Skip(i64),
    Take(i64),
    OfType {
        discriminator_field: String,
        type_name: String,
    },
    SelectMany {
        inner_path: String,
        projector: Option<Expression>,
    },
    /// `Distinct()` on the whole root (`None`) or on a projected expression.
    Distinct(Option<Expression>),
}

/// The pipeline-terminal result operator this crate resolves (SPEC_FULL.md
/// §9's Open Question): a parameterless `Any()` applied to the whole
/// pipeline, as opposed to an array-valued `ResultOp` embedded in an
/// ordinary expression (see [`crate::expr::Expression::ResultOp`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalResultOperator {
    Any,
}

/// An ordered list of stages plus an optional terminal result operator
/// (SPEC_FULL.md §3). `stages` must be non-empty; the first stage's input
/// is the source collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<PipelineStage>,
    pub terminal: Option<TerminalResultOperator>,
}

/// One of the two output shapes a translation can produce (SPEC_FULL.md
/// §6): a single BSON value for a lowered array-level result operator, or
/// an ordered stage list for a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslationOutput {
    Value(Bson),
    Stages(Vec<Document>),
}

/// Hands out fresh `__fldN`/`__aggN` slot names for one pipeline build.
/// Owned by exactly one [`PipelineBuilder`]; never shared across builds,
/// so that identical slot names never alias two different translations'
/// meanings (SPEC_FULL.md §5).
struct SlotAllocator {
    next_field: u32,
    next_accumulator: u32,
    field_prefix: String,
    accumulator_prefix: String,
}

impl SlotAllocator {
    fn new(opts: &TranslateOptions) -> Self {
        Self {
            next_field: 0,
            next_accumulator: 0,
            field_prefix: opts.field_slot_prefix.clone(),
            accumulator_prefix: opts.accumulator_slot_prefix.clone(),
        }
    }

    fn fresh_field(&mut self) -> String {
        let name = format!("{}{}", self.field_prefix, self.next_field);
        self.next_field += 1;
        name
    }

    fn fresh_accumulator(&mut self) -> String {
        let name = format!("{}{}", self.accumulator_prefix, self.next_accumulator);
        self.next_accumulator += 1;
        name
    }
}

/// Tracks the `$group` stage currently open for accumulator hoisting: the
/// index of that stage document inside `PipelineBuilder::stages`, and the
/// accumulator expressions already hoisted into it (so identical
/// accumulator expressions downstream share one slot). Stays open across
/// any number of downstream `Where`/`Select`/`SelectMany` stages — they only
/// add fields, never drop the ones `$group` produced — and is replaced when
/// a new `GroupBy` or `Distinct` starts a fresh grouped shape.
struct ActiveGroup {
    stage_index: usize,
    hoisted: Vec<(Expression, String)>,
}

/// Accumulates a list of stage documents from a `Pipeline`, allocating
/// accumulator slot names and wiring later stages that reference them
/// (SPEC_FULL.md §4.3). Constructed fresh per call to
/// [`crate::translate_pipeline`]; never reused across pipelines.
pub struct PipelineBuilder<'a> {
    opts: &'a TranslateOptions,
    allocator: SlotAllocator,
    stages: Vec<Document>,
    active_group: Option<ActiveGroup>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(opts: &'a TranslateOptions) -> Self {
        Self {
            opts,
            allocator: SlotAllocator::new(opts),
            stages: Vec::new(),
            active_group: None,
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn build(mut self, pipeline: &Pipeline) -> Result<TranslationOutput> {
        if pipeline.stages.is_empty() {
            return Err(TranslateError::InternalInvariantViolation(
                "Pipeline.stages must be non-empty".to_string(),
            ));
        }

        for stage in &pipeline.stages {
            self.emit_stage(stage)?;
        }

        match pipeline.terminal {
            None => Ok(TranslationOutput::Stages(self.stages)),
            Some(TerminalResultOperator::Any) => {
                self.stages.extend(terminal_any_stages());
                Ok(TranslationOutput::Stages(self.stages))
            }
        }
    }

    fn emit_stage(&mut self, stage: &PipelineStage) -> Result<()> {
        match stage {
            PipelineStage::Where(predicate) => self.emit_where(predicate),
            PipelineStage::Select(selector) => self.emit_select(selector),
            PipelineStage::GroupBy {
                key,
                result_selector,
            } => self.emit_group_by(key, result_selector.as_ref()),
            PipelineStage::OrderBy(keys) => self.emit_order_by(keys),
            PipelineStage::Skip(n) => {
                self.stages.push(doc! { "$skip": *n });
                Ok(())
            }
            PipelineStage::Take(n) => {
                self.stages.push(doc! { "$limit": *n });
                Ok(())
            }
            PipelineStage::OfType {
                discriminator_field,
                type_name,
            } => {
                self.stages
                    .push(doc! { "$match": { discriminator_field.clone(): type_name.clone() } });
                Ok(())
            }
            PipelineStage::SelectMany {
                inner_path,
                projector,
            } => self.emit_select_many(inner_path, projector.as_ref()),
            PipelineStage::Distinct(projection) => self.emit_distinct(projection.as_ref()),
        }
    }

    fn emit_where(&mut self, predicate: &Expression) -> Result<()> {
        let predicate = self.hoist_accumulators(predicate);
        let matched = predicate_to_query_doc(&predicate, "$match", self.opts)?;
        self.stages.push(doc! { "$match": matched });
        Ok(())
    }

    fn emit_select(&mut self, selector: &Expression) -> Result<()> {
        let selector = self.hoist_accumulators(selector);
        let project_doc = match &selector {
            Expression::New(_) => translate_expression(&selector, "$project", self.opts)?,
            Expression::Field(path) => {
                doc! { path.clone(): 1, "_id": 0 }.into()
            }
            _ => {
                let slot = self.allocator.fresh_field();
                let value = translate_expression(&selector, "$project", self.opts)?;
                doc! { slot: value, "_id": 0 }.into()
            }
        };
        self.stages.push(doc! { "$project": project_doc });
        Ok(())
    }

    fn emit_group_by(&mut self, key: &Expression, result_selector: Option<&Expression>) -> Result<()> {
        let key_val = translate_expression(key, "$group", self.opts)?;
        let mut group_doc = Document::new();
        group_doc.insert("_id", key_val);

        self.stages.push(doc! { "$group": group_doc });
        let stage_index = self.stages.len() - 1;
        self.active_group = Some(ActiveGroup {
            stage_index,
            hoisted: Vec::new(),
        });

        if let Some(result_selector) = result_selector {
            // The result selector runs against the grouped document; any
            // accumulators it references are hoisted into the $group
            // stage just pushed, exactly like a later Select/Where would.
            self.emit_select(result_selector)?;
        }
        Ok(())
    }

    fn emit_order_by(&mut self, keys: &[SortKey]) -> Result<()> {
        let mut seen = HashSet::new();
        let mut sort_doc = Document::new();
        for sort_key in keys {
            let field = match &sort_key.key {
                Expression::Field(path) => path.clone(),
                other => {
                    let value = translate_expression(other, "$sort", self.opts)?;
                    match value {
                        Bson::String(s) if s.starts_with('$') => s[1..].to_string(),
                        _ => {
                            return Err(TranslateError::InternalInvariantViolation(
                                "sort key did not translate to a field reference".to_string(),
                            ))
                        }
                    }
                }
            };
            if !seen.insert(field.clone()) {
                return Err(TranslateError::AmbiguousOrdering(field));
            }
            sort_doc.insert(field, if sort_key.ascending { 1 } else { -1 });
        }
        self.stages.push(doc! { "$sort": sort_doc });
        Ok(())
    }

    fn emit_select_many(&mut self, inner_path: &str, projector: Option<&Expression>) -> Result<()> {
        self.stages
            .push(doc! { "$unwind": format!("${inner_path}") });
        if let Some(projector) = projector {
            self.emit_select(projector)?;
        }
        Ok(())
    }

    fn emit_distinct(&mut self, projection: Option<&Expression>) -> Result<()> {
        let id_val = match projection {
            None => Bson::String("$$ROOT".to_string()),
            Some(projection) => translate_expression(projection, "$group", self.opts)?,
        };
        self.stages.push(doc! { "$group": { "_id": id_val } });
        self.active_group = None;
        Ok(())
    }

    /// Rewrites every `Accumulator` node in `expr` to a reference against
    /// the currently open `$group` stage, allocating (or reusing) a
    /// `__aggN` slot for each distinct accumulator expression. A no-op when
    /// no `$group` stage is open — the expression is returned unchanged.
    fn hoist_accumulators(&mut self, expr: &Expression) -> Expression {
        if self.active_group.is_none() {
            return expr.clone();
        }
        self.hoist_in(expr)
    }

    fn hoist_in(&mut self, expr: &Expression) -> Expression {
        use Expression::*;
        match expr {
            Accumulator { .. } => {
                let slot = self.slot_for_accumulator(expr);
                Field(slot)
            }
            Binary {
                op,
                left,
                right,
                ty,
            } => Binary {
                op: *op,
                left: Box::new(self.hoist_in(left)),
                right: Box::new(self.hoist_in(right)),
                ty: *ty,
            },
            Unary { op, operand } => Unary {
                op: *op,
                operand: Box::new(self.hoist_in(operand)),
            },
            Conditional {
                test,
                if_true,
                if_false,
            } => Conditional {
                test: Box::new(self.hoist_in(test)),
                if_true: Box::new(self.hoist_in(if_true)),
                if_false: Box::new(self.hoist_in(if_false)),
            },
            Constant { .. } | Field(_) => expr.clone(),
            MemberAccess {
                target,
                member,
                declaring_type,
            } => MemberAccess {
                target: Box::new(self.hoist_in(target)),
                member: member.clone(),
                declaring_type: *declaring_type,
            },
            MethodCall {
                receiver,
                method,
                args,
            } => MethodCall {
                receiver: receiver.as_ref().map(|r| Box::new(self.hoist_in(r))),
                method: method.clone(),
                args: args.iter().map(|a| self.hoist_in(a)).collect(),
            },
            New(members) => New(
                members
                    .iter()
                    .map(|(name, member_expr)| (name.clone(), self.hoist_in(member_expr)))
                    .collect(),
            ),
            FieldAsDocument { name, inner } => FieldAsDocument {
                name: name.clone(),
                inner: Box::new(self.hoist_in(inner)),
            },
            Select {
                source,
                var,
                selector,
            } => Select {
                source: Box::new(self.hoist_in(source)),
                var: var.clone(),
                selector: selector.clone(),
            },
            Where {
                source,
                var,
                predicate,
            } => Where {
                source: Box::new(self.hoist_in(source)),
                var: var.clone(),
                predicate: predicate.clone(),
            },
            GroupingKey(inner) => GroupingKey(Box::new(self.hoist_in(inner))),
            SetOp { op, source, other } => SetOp {
                op: *op,
                source: Box::new(self.hoist_in(source)),
                other: Box::new(self.hoist_in(other)),
            },
            ResultOp { kind, source } => ResultOp {
                kind: kind.clone(),
                source: Box::new(self.hoist_in(source)),
            },
        }
    }

    fn slot_for_accumulator(&mut self, accumulator: &Expression) -> String {
        let active_group = self
            .active_group
            .as_ref()
            .expect("hoist_in only called while a $group stage is active");

        if let Some((_, slot)) = active_group.hoisted.iter().find(|(e, _)| e == accumulator) {
            return slot.clone();
        }

        let slot = self.allocator.fresh_accumulator();
        let value = translate_accumulator_standalone(accumulator, self.opts)
            .expect("accumulator expressions translate independently of the active group");

        let active_group = self.active_group.as_mut().unwrap();
        let group_doc = self.stages[active_group.stage_index]
            .get_document_mut("$group")
            .expect("group stage always carries a $group document");
        group_doc.insert(slot.clone(), value);
        active_group.hoisted.push((accumulator.clone(), slot.clone()));
        slot
    }
}

fn translate_accumulator_standalone(expr: &Expression, opts: &TranslateOptions) -> Result<Bson> {
    match expr {
        Expression::Accumulator { kind, arg } => {
            let op = match kind {
                AccumulatorKind::Sum => "$sum",
                AccumulatorKind::Avg => "$avg",
                AccumulatorKind::Min => "$min",
                AccumulatorKind::Max => "$max",
                AccumulatorKind::First => "$first",
                AccumulatorKind::Last => "$last",
                AccumulatorKind::Push => "$push",
                AccumulatorKind::AddToSet => "$addToSet",
            };
            let arg = translate_expression(arg, "$group", opts)?;
            Ok(doc! { op: arg }.into())
        }
        other => Err(TranslateError::InternalInvariantViolation(format!(
            "slot_for_accumulator called with a non-accumulator node: {other}"
        ))),
    }
}

/// Lowers a pipeline-level `Where` predicate to the MongoDB **query**
/// document form (`{field: value}` / `{field: {$op: value}}`), matching how
/// the original mongo-csharp-driver renders a top-level `$match`. A `$match`
/// stage cannot carry a bare aggregation operator document (`{"$eq": [...]}`
/// is not a legal query predicate there), so only a field-vs-constant
/// comparison gets the query form; anything else falls back to
/// `{"$expr": <value-translated predicate>}`.
fn predicate_to_query_doc(expr: &Expression, stage: &str, opts: &TranslateOptions) -> Result<Document> {
    if let Expression::Binary { op, left, right, .. } = expr {
        if let Some(query_doc) = comparison_to_query_doc(*op, left, right, stage, opts)? {
            return Ok(query_doc);
        }
    }
    let value = translate_expression(expr, stage, opts)?;
    Ok(doc! { "$expr": value })
}

/// Recognizes `field <op> constant` (in either operand order) for the six
/// comparison operators and renders it as a query-document clause. Returns
/// `None` for anything else — a field-to-field comparison, a computed
/// operand, or a non-comparison operator — so the caller can fall back to
/// `$expr`.
fn comparison_to_query_doc(
    op: BinaryOp,
    left: &Expression,
    right: &Expression,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Option<Document>> {
    use BinaryOp::*;
    if !matches!(op, Eq | Ne | Lt | Le | Gt | Ge) {
        return Ok(None);
    }

    let (field, value_expr, op) = match (left.as_bare_field(), right) {
        (Some(field), Expression::Constant { .. }) => (field, right, op),
        _ => match (right.as_bare_field(), left) {
            (Some(field), Expression::Constant { .. }) => (field, left, flip_comparison(op)),
            _ => return Ok(None),
        },
    };

    let field = field.to_string();
    let value = translate_expression(value_expr, stage, opts)?;
    Ok(Some(match op {
        Eq => doc! { field: value },
        Ne => doc! { field: { "$ne": value } },
        Lt => doc! { field: { "$lt": value } },
        Le => doc! { field: { "$lte": value } },
        Gt => doc! { field: { "$gt": value } },
        Ge => doc! { field: { "$gte": value } },
        _ => unreachable!("matches! above restricts op to the six comparison variants"),
    }))
}

/// `constant <op> field` reads in the opposite sense of `field <op>
/// constant` for the directional comparisons; `Eq`/`Ne` are symmetric.
fn flip_comparison(op: BinaryOp) -> BinaryOp {
    use BinaryOp::*;
    match op {
        Lt => Gt,
        Le => Ge,
        Gt => Lt,
        Ge => Le,
        other => other,
    }
}
