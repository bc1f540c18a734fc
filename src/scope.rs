/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file scope.rs
 * @brief Field-path rewriter for nested $map/$filter scopes
 */

use crate::expr::{Expression, ResultOpKind};

/// Rewrites every bare `Field(path)` inside `expr` to reference the
/// scope-local variable `var`, per SPEC_FULL.md §4.2.
///
/// A `Field` whose path already begins with `$` is treated as already
/// resolved against some other scope (an outer binding threaded in from an
/// enclosing `Select`/`Where`) and is left untouched — rewriting it again
/// would shadow the binding it already names.
///
/// Does not descend into the selector/predicate of a nested scope
/// introducer (`Select`/`Where`): that subtree rebinds its own variable and
/// is rewritten separately when the value translator recurses into it. The
/// nested introducer's `source`, by contrast, is still evaluated in the
/// current scope and is rewritten here.
pub fn rewrite_fields(expr: &Expression, var: &str) -> Expression {
    use Expression::*;
    match expr {
        Field(path) => {
            if path.starts_with('$') {
                Field(path.clone())
            } else {
                Field(format!("${var}.{path}"))
            }
        }
        Binary {
            op,
            left,
            right,
            ty,
        } => Binary {
            op: *op,
            left: Box::new(rewrite_fields(left, var)),
            right: Box::new(rewrite_fields(right, var)),
            ty: *ty,
        },
        Unary { op, operand } => Unary {
            op: *op,
            operand: Box::new(rewrite_fields(operand, var)),
        },
        Conditional {
            test,
            if_true,
            if_false,
        } => Conditional {
            test: Box::new(rewrite_fields(test, var)),
            if_true: Box::new(rewrite_fields(if_true, var)),
            if_false: Box::new(rewrite_fields(if_false, var)),
        },
        Constant { .. } => expr.clone(),
        MemberAccess {
            target,
            member,
            declaring_type,
        } => MemberAccess {
            target: Box::new(rewrite_fields(target, var)),
            member: member.clone(),
            declaring_type: *declaring_type,
        },
        MethodCall {
            receiver,
            method,
            args,
        } => MethodCall {
            receiver: receiver
                .as_ref()
                .map(|r| Box::new(rewrite_fields(r, var))),
            method: method.clone(),
            args: args.iter().map(|a| rewrite_fields(a, var)).collect(),
        },
        New(members) => New(
            members
                .iter()
                .map(|(name, member_expr)| (name.clone(), rewrite_fields(member_expr, var)))
                .collect(),
        ),
        FieldAsDocument { name, inner } => FieldAsDocument {
            name: name.clone(),
            inner: Box::new(rewrite_fields(inner, var)),
        },
        Select {
            source,
            var: inner_var,
            selector,
        } => Select {
            source: Box::new(rewrite_fields(source, var)),
            var: inner_var.clone(),
            selector: selector.clone(),
        },
        Where {
            source,
            var: inner_var,
            predicate,
        } => Where {
            source: Box::new(rewrite_fields(source, var)),
            var: inner_var.clone(),
            predicate: predicate.clone(),
        },
        Accumulator { kind, arg } => Accumulator {
            kind: *kind,
            arg: Box::new(rewrite_fields(arg, var)),
        },
        GroupingKey(inner) => GroupingKey(Box::new(rewrite_fields(inner, var))),
        SetOp { op, source, other } => SetOp {
            op: *op,
            source: Box::new(rewrite_fields(source, var)),
            other: Box::new(rewrite_fields(other, var)),
        },
        ResultOp { kind, source } => ResultOp {
            kind: Box::new(rewrite_result_op_kind(kind, var)),
            source: Box::new(rewrite_fields(source, var)),
        },
    }
}

/// `ResultOpKind`'s own nested predicates rebind their own variable, just
/// like a nested `Select`/`Where`, so only their bodies are left alone.
fn rewrite_result_op_kind(kind: &ResultOpKind, var: &str) -> ResultOpKind {
    match kind {
        ResultOpKind::Count => ResultOpKind::Count,
        ResultOpKind::Any(None) => ResultOpKind::Any(None),
        ResultOpKind::Any(Some(pred)) => ResultOpKind::Any(Some(pred.clone())),
        ResultOpKind::All(pred) => ResultOpKind::All(pred.clone()),
        ResultOpKind::Contains(v) => ResultOpKind::Contains(Box::new(rewrite_fields(v, var))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, StaticType};

    #[test]
    fn rewrites_bare_field() {
        let rewritten = rewrite_fields(&Expression::field("A"), "v");
        assert_eq!(rewritten, Expression::Field("$v.A".to_string()));
    }

    #[test]
    fn leaves_already_prefixed_field_alone() {
        let already = Expression::Field("$outer.A".to_string());
        let rewritten = rewrite_fields(&already, "v");
        assert_eq!(rewritten, already);
    }

    #[test]
    fn recurses_through_binary_but_not_into_nested_selector() {
        let inner_selector = Expression::field("B");
        let nested = Expression::Select {
            source: Box::new(Expression::field("Tags")),
            var: "t".to_string(),
            selector: Box::new(inner_selector.clone()),
        };
        let expr = Expression::binary(
            BinaryOp::Eq,
            Expression::field("A"),
            nested,
            StaticType::Other,
        );
        let rewritten = rewrite_fields(&expr, "v");
        match rewritten {
            Expression::Binary { left, right, .. } => {
                assert_eq!(*left, Expression::Field("$v.A".to_string()));
                match *right {
                    Expression::Select {
                        source, selector, ..
                    } => {
                        assert_eq!(*source, Expression::Field("$v.Tags".to_string()));
                        assert_eq!(*selector, inner_selector);
                    }
                    other => panic!("expected nested Select, got {other:?}"),
                }
            }
            other => panic!("expected Binary, got {other:?}"),
        }
    }
}
