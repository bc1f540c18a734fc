/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file value.rs
 * @brief Recursive expression -> BSON value translator
 */

use bson::{doc, Bson};

use crate::error::{Result, TranslateError};
use crate::expr::{AccumulatorKind, BinaryOp, DateTimeMember, Expression, SetOp, StaticType, UnaryOp};
use crate::options::TranslateOptions;
use crate::projection;
use crate::scope::rewrite_fields;

/// Recursively lowers a single expression to a BSON value: a scalar, a
/// field reference (`"$path"`), or an operator document. Total over the
/// recognized subset (SPEC_FULL.md §4.1); anything else is reported as
/// `UnsupportedExpression` naming `stage` as the containing stage, per §7.
#[tracing::instrument(level = "trace", skip(opts))]
pub fn translate_expression(expr: &Expression, stage: &str, opts: &TranslateOptions) -> Result<Bson> {
    use Expression::*;
    match expr {
        Binary { op, left, right, ty } => translate_binary(*op, left, right, *ty, stage, opts),
        Unary { op, operand } => translate_unary(*op, operand, stage, opts),
        Conditional {
            test,
            if_true,
            if_false,
        } => {
            let test = translate_expression(test, stage, opts)?;
            let if_true = translate_expression(if_true, stage, opts)?;
            let if_false = translate_expression(if_false, stage, opts)?;
            Ok(doc! { "$cond": [test, if_true, if_false] }.into())
        }
        Constant { value, .. } => Ok(literal_escape(value.clone())),
        MemberAccess {
            target,
            member,
            declaring_type,
        } => translate_member_access(target, member, *declaring_type, stage, opts),
        MethodCall {
            receiver,
            method,
            args,
        } => crate::calls::translate_call(receiver, method, args, stage, opts),
        New(members) => projection::project_members(members, stage, opts),
        Field(path) => Ok(Bson::String(format!("${path}"))),
        FieldAsDocument { name, inner } => {
            let inner = translate_expression(inner, stage, opts)?;
            Ok(doc! { name.clone(): inner }.into())
        }
        Select {
            source,
            var,
            selector,
        } => translate_select(source, var, selector, stage, opts),
        Where {
            source,
            var,
            predicate,
        } => translate_where(source, var, predicate, stage, opts),
        Accumulator { kind, arg } => {
            let op = accumulator_op(*kind);
            let arg = translate_expression(arg, stage, opts)?;
            Ok(doc! { op: arg }.into())
        }
        GroupingKey(_) => Err(TranslateError::InternalInvariantViolation(
            "GroupingKey reached the value translator outside a projection mapper".to_string(),
        )),
        SetOp { op, source, other } => {
            let op_name = match op {
                SetOp::Union => "$setUnion",
                SetOp::Intersect => "$setIntersection",
                SetOp::Except => "$setDifference",
            };
            let source = translate_expression(source, stage, opts)?;
            let other = translate_expression(other, stage, opts)?;
            Ok(doc! { op_name: [source, other] }.into())
        }
        ResultOp { kind, source } => {
            crate::result_ops::translate_array_result_op(kind, source, stage, opts)
        }
    }
}

/// Wraps a literal string value that begins with `$` in `{"$literal": ...}`
/// so the server does not mistake a user-provided constant for a field
/// reference. Every other value passes through unchanged.
pub fn literal_escape(value: Bson) -> Bson {
    match &value {
        Bson::String(s) if s.starts_with('$') => doc! { "$literal": value }.into(),
        _ => value,
    }
}

/// For the associative operators (`$and`, `$or`, `$add`, `$multiply`,
/// `$concat`), appends `right` to `left`'s argument array in place when
/// `left` is already a single-key document for the same operator, instead
/// of nesting a new level. Keeps left-associative chains as one call.
fn flatten(op: &str, left: Bson, right: Bson) -> Vec<Bson> {
    if let Bson::Document(doc) = &left {
        if doc.len() == 1 {
            if let Some(Bson::Array(arr)) = doc.get(op) {
                let mut arr = arr.clone();
                arr.push(right);
                return arr;
            }
        }
    }
    vec![left, right]
}

fn translate_binary(
    op: BinaryOp,
    left: &Expression,
    right: &Expression,
    ty: StaticType,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    let left_val = translate_expression(left, stage, opts)?;
    let right_val = translate_expression(right, stage, opts)?;

    let (op_name, flattens) = match op {
        BinaryOp::Add if ty == StaticType::String => ("$concat", true),
        BinaryOp::Add => ("$add", true),
        BinaryOp::Sub => ("$subtract", false),
        BinaryOp::Mul => ("$multiply", true),
        BinaryOp::Div => ("$divide", false),
        BinaryOp::Mod => ("$mod", false),
        BinaryOp::And => ("$and", true),
        BinaryOp::Or => ("$or", true),
        BinaryOp::Eq => ("$eq", false),
        BinaryOp::Ne => ("$ne", false),
        BinaryOp::Lt => ("$lt", false),
        BinaryOp::Le => ("$lte", false),
        BinaryOp::Gt => ("$gt", false),
        BinaryOp::Ge => ("$gte", false),
        BinaryOp::Coalesce => ("$ifNull", false),
    };

    let args = if flattens {
        flatten(op_name, left_val, right_val)
    } else {
        vec![left_val, right_val]
    };

    Ok(doc! { op_name: args }.into())
}

fn translate_unary(op: UnaryOp, operand: &Expression, stage: &str, opts: &TranslateOptions) -> Result<Bson> {
    let value = translate_expression(operand, stage, opts)?;
    match op {
        UnaryOp::Not => {
            let wrapped = match value {
                Bson::Array(_) => value,
                other => Bson::Array(vec![other]),
            };
            Ok(doc! { "$not": wrapped }.into())
        }
        UnaryOp::ArrayLength => Ok(doc! { "$size": value }.into()),
        UnaryOp::Convert => Ok(value),
        // Not enumerated in SPEC_FULL.md §4.1's table; resolved per the
        // standard aggregation idiom for arithmetic negation (DESIGN.md).
        UnaryOp::Negate => Ok(doc! { "$multiply": [value, -1] }.into()),
    }
}

fn translate_member_access(
    target: &Expression,
    member: &str,
    declaring_type: StaticType,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    let target_val = translate_expression(target, stage, opts)?;
    match declaring_type {
        StaticType::DateTime => {
            let member = date_time_member(member).ok_or_else(|| TranslateError::UnsupportedExpression {
                expression: format!("MemberAccess(.{member})"),
                stage: stage.to_string(),
            })?;
            Ok(translate_date_time_member(member, target_val))
        }
        StaticType::Collection if member == "Count" => Ok(doc! { "$size": target_val }.into()),
        _ => Err(TranslateError::UnsupportedExpression {
            expression: format!("MemberAccess(.{member})"),
            stage: stage.to_string(),
        }),
    }
}

fn date_time_member(member: &str) -> Option<DateTimeMember> {
    use DateTimeMember::*;
    Some(match member {
        "Day" => Day,
        "DayOfYear" => DayOfYear,
        "DayOfWeek" => DayOfWeek,
        "Hour" => Hour,
        "Minute" => Minute,
        "Second" => Second,
        "Millisecond" => Millisecond,
        "Month" => Month,
        "Year" => Year,
        _ => return None,
    })
}

/// `DayOfWeek` needs a `-1` adjustment because the server numbers Sunday=1
/// while the object model numbers Sunday=0 (SPEC_FULL.md §4.1.1).
fn translate_date_time_member(member: DateTimeMember, field: Bson) -> Bson {
    use DateTimeMember::*;
    let op = match member {
        Day => "$dayOfMonth",
        DayOfYear => "$dayOfYear",
        DayOfWeek => "$dayOfWeek",
        Hour => "$hour",
        Minute => "$minute",
        Second => "$second",
        Millisecond => "$millisecond",
        Month => "$month",
        Year => "$year",
    };
    let inner: Bson = doc! { op: field }.into();
    if member == DayOfWeek {
        doc! { "$subtract": [inner, 1] }.into()
    } else {
        inner
    }
}

fn accumulator_op(kind: AccumulatorKind) -> &'static str {
    match kind {
        AccumulatorKind::Sum => "$sum",
        AccumulatorKind::Avg => "$avg",
        AccumulatorKind::Min => "$min",
        AccumulatorKind::Max => "$max",
        AccumulatorKind::First => "$first",
        AccumulatorKind::Last => "$last",
        AccumulatorKind::Push => "$push",
        AccumulatorKind::AddToSet => "$addToSet",
    }
}

fn translate_select(
    source: &Expression,
    var: &str,
    selector: &Expression,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    if opts.fuse_field_paths {
        if let (Some(src_path), Some(sub_path)) = (source.as_bare_field(), selector.as_bare_field()) {
            return Ok(Bson::String(format!("${src_path}.{sub_path}")));
        }
    }

    let source_val = translate_expression(source, stage, opts)?;
    let rewritten = rewrite_fields(selector, var);
    let body = translate_expression(&rewritten, stage, opts)?;
    Ok(doc! { "$map": { "input": source_val, "as": var, "in": body } }.into())
}

fn translate_where(
    source: &Expression,
    var: &str,
    predicate: &Expression,
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    let source_val = translate_expression(source, stage, opts)?;
    let rewritten = rewrite_fields(predicate, var);
    let cond = translate_expression(&rewritten, stage, opts)?;
    Ok(doc! { "$filter": { "input": source_val, "as": var, "cond": cond } }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression as E;

    fn opts() -> TranslateOptions {
        TranslateOptions::default()
    }

    #[test]
    fn equality_filter() {
        let expr = E::binary(
            BinaryOp::Eq,
            E::field("A"),
            E::constant("Awesome", StaticType::String),
            StaticType::Other,
        );
        let got = translate_expression(&expr, "match", &opts()).unwrap();
        assert_eq!(got, doc! { "$eq": ["$A", "Awesome"] }.into());
    }

    #[test]
    fn string_add_becomes_concat_and_flattens() {
        let expr = E::binary(
            BinaryOp::Add,
            E::binary(
                BinaryOp::Add,
                E::field("A"),
                E::constant(" ", StaticType::String),
                StaticType::String,
            ),
            E::field("B"),
            StaticType::String,
        );
        let got = translate_expression(&expr, "project", &opts()).unwrap();
        assert_eq!(got, doc! { "$concat": ["$A", " ", "$B"] }.into());
    }

    #[test]
    fn numeric_add_is_add_not_concat() {
        let expr = E::binary(
            BinaryOp::Add,
            E::field("A"),
            E::field("B"),
            StaticType::Int32,
        );
        let got = translate_expression(&expr, "project", &opts()).unwrap();
        assert_eq!(got, doc! { "$add": ["$A", "$B"] }.into());
    }

    #[test]
    fn literal_dollar_string_is_escaped() {
        let expr = E::constant("$notAField", StaticType::String);
        let got = translate_expression(&expr, "project", &opts()).unwrap();
        assert_eq!(got, doc! { "$literal": "$notAField" }.into());
    }

    #[test]
    fn plain_field_is_never_escaped() {
        let got = translate_expression(&E::field("A"), "project", &opts()).unwrap();
        assert_eq!(got, Bson::String("$A".to_string()));
    }

    #[test]
    fn day_of_week_is_adjusted() {
        let expr = Expression::MemberAccess {
            target: Box::new(E::field("D")),
            member: "DayOfWeek".to_string(),
            declaring_type: StaticType::DateTime,
        };
        let got = translate_expression(&expr, "project", &opts()).unwrap();
        assert_eq!(
            got,
            doc! { "$subtract": [{ "$dayOfWeek": "$D" }, 1] }.into()
        );
    }

    #[test]
    fn select_with_bare_fields_fuses() {
        let expr = Expression::Select {
            source: Box::new(E::field("Address")),
            var: "a".to_string(),
            selector: Box::new(E::field("City")),
        };
        let got = translate_expression(&expr, "project", &opts()).unwrap();
        assert_eq!(got, Bson::String("$Address.City".to_string()));
    }

    #[test]
    fn select_with_computation_uses_map() {
        let expr = Expression::Select {
            source: Box::new(E::field("Items")),
            var: "i".to_string(),
            selector: Box::new(E::binary(
                BinaryOp::Mul,
                E::field("Price"),
                E::field("Qty"),
                StaticType::Int32,
            )),
        };
        let got = translate_expression(&expr, "project", &opts()).unwrap();
        assert_eq!(
            got,
            doc! { "$map": { "input": "$Items", "as": "i", "in": { "$multiply": ["$$i.Price", "$$i.Qty"] } } }
                .into()
        );
    }

    #[test]
    fn unknown_member_access_is_unsupported() {
        let expr = Expression::MemberAccess {
            target: Box::new(E::field("X")),
            member: "Nonsense".to_string(),
            declaring_type: StaticType::Other,
        };
        let err = translate_expression(&expr, "project", &opts()).unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedExpression { .. }));
    }
}
