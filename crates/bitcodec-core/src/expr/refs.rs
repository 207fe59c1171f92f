//! Extracts `#id` references from a parsed expression (spec: "Expression
//! parser" component, §4.4 dependency edges).

use super::ast::Expr;

/// The checksum/hash functions that accept either one or two `#id` arguments
/// (spec §4.3 "between" functions; see `SPEC_FULL.md` EXPANSION §E.2).
pub const BETWEEN_CAPABLE_FUNCTIONS: &[&str] = &["checksumOf", "xorOf", "crc16Of", "hashOf"];

/// Every `#id` reference appearing anywhere in the expression, in the order encountered.
pub fn node_refs(expr: &Expr) -> Vec<String> {
    let mut out = Vec::new();
    walk(expr, &mut out);
    out
}

fn walk(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::NodeRef(id) => out.push(id.clone()),
        Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Ident(_) => {}
        Expr::Unary { expr, .. } => walk(expr, out),
        Expr::Binary { lhs, rhs, .. } => {
            walk(lhs, out);
            walk(rhs, out);
        }
        Expr::Ternary { cond, if_true, if_false } => {
            walk(cond, out);
            walk(if_true, out);
            walk(if_false, out);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                walk(arg, out);
            }
        }
    }
}

/// Every "between" call (a between-capable function invoked with exactly two
/// `#id` arguments) in the expression, as `(from_id, to_id)` pairs.
pub fn between_ranges(expr: &Expr) -> Vec<(String, String)> {
    let mut out = Vec::new();
    walk_between(expr, &mut out);
    out
}

fn walk_between(expr: &Expr, out: &mut Vec<(String, String)>) {
    match expr {
        Expr::Call { name, args } => {
            if BETWEEN_CAPABLE_FUNCTIONS.contains(&name.as_str()) && args.len() == 2 {
                if let (Expr::NodeRef(a), Expr::NodeRef(b)) = (&args[0], &args[1]) {
                    out.push((a.clone(), b.clone()));
                }
            }
            for arg in args {
                walk_between(arg, out);
            }
        }
        Expr::Unary { expr, .. } => walk_between(expr, out),
        Expr::Binary { lhs, rhs, .. } => {
            walk_between(lhs, out);
            walk_between(rhs, out);
        }
        Expr::Ternary { cond, if_true, if_false } => {
            walk_between(cond, out);
            walk_between(if_true, out);
            walk_between(if_false, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    #[test]
    fn collects_all_refs_in_nested_expression() {
        let expr = parse("#a + (#b * #c)").unwrap();
        assert_eq!(node_refs(&expr), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn detects_between_call() {
        let expr = parse("crc16Of(#start, #end)").unwrap();
        assert_eq!(between_ranges(&expr), vec![("start".to_string(), "end".to_string())]);
    }

    #[test]
    fn single_arg_checksum_is_not_a_between_call() {
        let expr = parse("checksumOf(#body)").unwrap();
        assert!(between_ranges(&expr).is_empty());
        assert_eq!(node_refs(&expr), vec!["body".to_string()]);
    }
}
