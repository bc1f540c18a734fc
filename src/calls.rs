/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file calls.rs
 * @brief Method-call dispatch closed set (SPEC_FULL.md §4.1)
 */

use bson::{doc, Bson};

use crate::error::{Result, TranslateError};
use crate::expr::{Expression, MethodIdentity};
use crate::options::TranslateOptions;
use crate::value::translate_expression;

/// Lowers the closed set of `Call` shapes the dispatch table recognizes.
/// Everything else — any method/arity/declaring-type combination not
/// listed here — fails cleanly with `UnsupportedExpression`.
pub fn translate_call(
    receiver: &Option<Box<Expression>>,
    method: &MethodIdentity,
    args: &[Expression],
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    let unsupported = || TranslateError::UnsupportedExpression {
        expression: format!("MethodCall({}.{})", method.declaring_type, method.name),
        stage: stage.to_string(),
    };

    match (method.declaring_type.as_str(), method.name.as_str(), args.len()) {
        ("String", "IsNullOrEmpty", 1) => {
            let s = translate_expression(&args[0], stage, opts)?;
            Ok(doc! {
                "$or": [
                    { "$eq": [s.clone(), Bson::Null] },
                    { "$eq": [s, ""] },
                ]
            }
            .into())
        }
        ("String", "Equals", 1) | ("String", "Equals", 2) => {
            let receiver = receiver.as_ref().ok_or_else(unsupported)?;
            let s = translate_expression(receiver, stage, opts)?;
            let t = translate_expression(&args[0], stage, opts)?;

            let case_insensitive = args
                .get(1)
                .and_then(string_comparison_mode)
                .map(|mode| mode == "OrdinalIgnoreCase")
                .unwrap_or(false);

            if case_insensitive {
                Ok(doc! { "$eq": [{ "$strcasecmp": [s, t] }, 0] }.into())
            } else {
                Ok(doc! { "$eq": [s, t] }.into())
            }
        }
        ("String", "Substring", 2) => {
            let receiver = receiver.as_ref().ok_or_else(unsupported)?;
            let s = translate_expression(receiver, stage, opts)?;
            let i = translate_expression(&args[0], stage, opts)?;
            let n = translate_expression(&args[1], stage, opts)?;
            Ok(doc! { "$substr": [s, i, n] }.into())
        }
        ("String", "ToLower", 0) | ("String", "ToLowerInvariant", 0) => {
            let receiver = receiver.as_ref().ok_or_else(unsupported)?;
            let s = translate_expression(receiver, stage, opts)?;
            Ok(doc! { "$toLower": s }.into())
        }
        ("String", "ToUpper", 0) | ("String", "ToUpperInvariant", 0) => {
            let receiver = receiver.as_ref().ok_or_else(unsupported)?;
            let s = translate_expression(receiver, stage, opts)?;
            Ok(doc! { "$toUpper": s }.into())
        }
        ("Set", "IsSubsetOf", 1) => {
            let receiver = receiver.as_ref().ok_or_else(unsupported)?;
            let h = translate_expression(receiver, stage, opts)?;
            let o = translate_expression(&args[0], stage, opts)?;
            Ok(doc! { "$setIsSubset": [h, o] }.into())
        }
        ("Set", "SetEquals", 1) => {
            let receiver = receiver.as_ref().ok_or_else(unsupported)?;
            let h = translate_expression(receiver, stage, opts)?;
            let o = translate_expression(&args[0], stage, opts)?;
            Ok(doc! { "$setEquals": [h, o] }.into())
        }
        ("Comparable", "CompareTo", 1) => {
            let receiver = receiver.as_ref().ok_or_else(unsupported)?;
            let x = translate_expression(receiver, stage, opts)?;
            let y = translate_expression(&args[0], stage, opts)?;
            Ok(doc! { "$cmp": [x, y] }.into())
        }
        _ => Err(unsupported()),
    }
}

/// A `StringComparison` argument arrives as a `Constant` carrying its enum
/// member name (`"Ordinal"`, `"OrdinalIgnoreCase"`, ...); anything else
/// (a non-constant comparison mode) is treated as not recognized here.
fn string_comparison_mode(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::Constant {
            value: Bson::String(s),
            ..
        } => Some(s.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::StaticType;

    fn opts() -> TranslateOptions {
        TranslateOptions::default()
    }

    #[test]
    fn is_null_or_empty() {
        let method = MethodIdentity::new("IsNullOrEmpty", "String", 1);
        let got = translate_call(&None, &method, &[Expression::field("A")], "match", &opts()).unwrap();
        assert_eq!(
            got,
            doc! { "$or": [{ "$eq": ["$A", Bson::Null] }, { "$eq": ["$A", ""] }] }.into()
        );
    }

    #[test]
    fn equals_ordinal_ignore_case() {
        let method = MethodIdentity::new("Equals", "String", 2);
        let receiver = Some(Box::new(Expression::field("A")));
        let args = vec![
            Expression::field("B"),
            Expression::constant("OrdinalIgnoreCase", StaticType::Other),
        ];
        let got = translate_call(&receiver, &method, &args, "match", &opts()).unwrap();
        assert_eq!(
            got,
            doc! { "$eq": [{ "$strcasecmp": ["$A", "$B"] }, 0] }.into()
        );
    }

    #[test]
    fn substring() {
        let method = MethodIdentity::new("Substring", "String", 2);
        let receiver = Some(Box::new(Expression::field("A")));
        let args = vec![
            Expression::constant(0, StaticType::Int32),
            Expression::constant(3, StaticType::Int32),
        ];
        let got = translate_call(&receiver, &method, &args, "match", &opts()).unwrap();
        assert_eq!(got, doc! { "$substr": ["$A", 0, 3] }.into());
    }

    #[test]
    fn unknown_call_is_unsupported() {
        let method = MethodIdentity::new("Frobnicate", "String", 0);
        let err = translate_call(&None, &method, &[], "match", &opts()).unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedExpression { .. }));
    }
}
