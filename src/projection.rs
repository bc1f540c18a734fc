/*
 * Copyright (c) 2025 pgElephant. All rights reserved.
 *
 * FauxDB - Production-ready MongoDB-compatible database server
 * Built with Rust for superior performance and reliability
 *
 * @file projection.rs
 * @brief Constructor / member-init -> ordered BSON document collapse
 */

use bson::{Bson, Document};

use crate::error::Result;
use crate::expr::Expression;
use crate::options::TranslateOptions;
use crate::value::translate_expression;

/// Collapses a `New`/`MemberInit` member list into an ordered BSON
/// document, per SPEC_FULL.md §4.4.
///
/// If one member's expression is a `GroupingKey`, that member is renamed to
/// `_id` and emitted first regardless of its source-level position — the
/// `_id`-first convention is server-facing, not cosmetic (§9 Design Notes).
/// Otherwise an explicit `_id: 0` is appended so this document suppresses
/// the implicit id when used as a `$project` stage.
pub fn project_members(
    members: &[(String, Expression)],
    stage: &str,
    opts: &TranslateOptions,
) -> Result<Bson> {
    let mut doc = Document::new();
    let mut has_grouping_key = false;

    if let Some((_, key_expr)) = members.iter().find(|(_, e)| matches!(e, Expression::GroupingKey(_))) {
        if let Expression::GroupingKey(inner) = key_expr {
            let key_val = translate_expression(inner, stage, opts)?;
            doc.insert("_id", key_val);
            has_grouping_key = true;
        }
    }

    for (name, member_expr) in members {
        if matches!(member_expr, Expression::GroupingKey(_)) {
            continue;
        }
        let value = translate_expression(member_expr, stage, opts)?;
        doc.insert(name.clone(), value);
    }

    if !has_grouping_key {
        doc.insert("_id", 0);
    }

    Ok(Bson::Document(doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> TranslateOptions {
        TranslateOptions::default()
    }

    #[test]
    fn grouping_key_becomes_id_first() {
        let members = vec![
            (
                "FirstB".to_string(),
                Expression::field("B"),
            ),
            (
                "Key".to_string(),
                Expression::field("A").group_by_key(),
            ),
        ];
        let got = project_members(&members, "project", &opts()).unwrap();
        let doc = got.as_document().unwrap();
        let keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "FirstB"]);
        assert_eq!(doc.get_str("_id").unwrap(), "$A");
    }

    #[test]
    fn without_grouping_key_suppresses_implicit_id() {
        let members = vec![("A".to_string(), Expression::field("A"))];
        let got = project_members(&members, "project", &opts()).unwrap();
        let doc = got.as_document().unwrap();
        assert_eq!(doc.get_i32("_id").unwrap(), 0);
    }
}
