//! The expression-string front-end: lowers the infix surface syntax into the
//! same [`Operator`] nodes as the object form, so both forms are
//! interchangeable after compilation.
//!
//! ```text
//! 2 * (3 + 4 / 2) - 1 == 9
//! .spec.containers | .name != "main" -> .requests.cpu
//! ```

use crate::{
    error::ParseError,
    operators::{GetValue, Operator},
};
use pest::{iterators::Pair, Parser as _};
use serde_json::Value;

// Isolates the generated parser types from the crate's missing_docs lint.
mod parser {
    #![allow(missing_docs)]
    use pest_derive::Parser;

    /// Grammar-driven parser for the expression-string syntax.
    #[derive(Parser)]
    #[grammar = "expr.pest"]
    pub struct ExprParser;
}

use parser::{ExprParser, Rule};

/// Parse an expression string into an operator tree.
pub fn parse(input: &str) -> Result<Operator, ParseError> {
    let program = ExprParser::parse(Rule::program, input)
        .map_err(|e| ParseError::Expr {
            at: String::new(),
            message: e.to_string(),
        })?
        .next()
        .expect("grammar produces a program pair");
    let body = program
        .into_inner()
        .next()
        .expect("a program contains a pipeline or expression");
    lower(body)
}

fn lower(pair: Pair<'_, Rule>) -> Result<Operator, ParseError> {
    match pair.as_rule() {
        Rule::pipeline => {
            let mut inner = pair.into_inner();
            let mut elems = lower(inner.next().expect("pipeline starts with a reference"))?;
            for stage in inner {
                let rule = stage.as_rule();
                let pred = lower(stage.into_inner().next().expect("stage carries an expression"))?;
                elems = match rule {
                    Rule::filter_stage => Operator::filter(elems, pred)?,
                    Rule::map_stage => Operator::for_each(elems, pred)?,
                    other => unreachable!("unexpected pipeline stage {other:?}"),
                };
            }
            Ok(elems)
        }
        // The grammar is not left-recursive, so a chain like `a || b || c`
        // arrives as one pair with many children; fold it back into the
        // nested binary shape, left to right.
        Rule::or_expr => fold_chain(pair, |_| Operator::or),
        Rule::and_expr => fold_chain(pair, |_| Operator::and),
        Rule::comp_expr => {
            let mut inner = pair.into_inner();
            let lhs = lower(inner.next().expect("comparison has a left side"))?;
            let Some(op) = inner.next() else {
                return Ok(lhs);
            };
            let build = match op.as_str() {
                "==" => Operator::equal,
                "!=" => Operator::not_equal,
                "<=" => Operator::less_or_equal,
                ">=" => Operator::greater_or_equal,
                "<" => Operator::less_than,
                ">" => Operator::greater_than,
                other => unreachable!("unexpected comparison operator {other}"),
            };
            let rhs = lower(inner.next().expect("comparison has a right side"))?;
            build(Operator::list(vec![lhs, rhs])?)
        }
        Rule::sum_expr => fold_chain(pair, |op| match op {
            "+" => Operator::sum,
            "-" => Operator::sub,
            "++" => Operator::strconcat,
            other => unreachable!("unexpected additive operator {other}"),
        }),
        Rule::product_expr => fold_chain(pair, |op| match op {
            "*" => Operator::mul,
            "/" => Operator::div,
            other => unreachable!("unexpected multiplicative operator {other}"),
        }),
        Rule::number => {
            let text = pair.as_str();
            let value = if text.contains(['.', 'e', 'E']) {
                Value::from(text.parse::<f64>().map_err(|e| ParseError::Expr {
                    at: String::new(),
                    message: e.to_string(),
                })?)
            } else {
                match text.parse::<i64>() {
                    Ok(i) => Value::from(i),
                    Err(_) => Value::from(text.parse::<f64>().map_err(|e| ParseError::Expr {
                        at: String::new(),
                        message: e.to_string(),
                    })?),
                }
            };
            Ok(Operator::Const(value))
        }
        Rule::boolean => Ok(Operator::Const(Value::Bool(pair.as_str() == "true"))),
        Rule::string => Ok(Operator::Const(Value::String(unescape(pair.as_str())))),
        Rule::reference => Ok(Operator::GetValue(GetValue::parse(pair.as_str())?)),
        other => unreachable!("unexpected rule {other:?}"),
    }
}

type Build = fn(Operator) -> Result<Operator, ParseError>;

/// Fold `lhs (op rhs)*` into nested binary nodes: each step wraps the
/// accumulator and the next operand in a two-element list.
fn fold_chain(pair: Pair<'_, Rule>, select: fn(&str) -> Build) -> Result<Operator, ParseError> {
    let mut inner = pair.into_inner();
    let mut acc = lower(inner.next().expect("chain has a first operand"))?;
    loop {
        let Some(next) = inner.next() else {
            return Ok(acc);
        };
        let build = match next.as_rule() {
            Rule::sum_op | Rule::product_op => select(next.as_str()),
            // `||` and `&&` are punctuation in the grammar; the next pair is
            // already the operand.
            _ => {
                let rhs = lower(next)?;
                acc = select("")(Operator::list(vec![acc, rhs])?)?;
                continue;
            }
        };
        let rhs = lower(inner.next().expect("chain operator has a right operand"))?;
        acc = build(Operator::list(vec![acc, rhs])?)?;
    }
}

/// Undo the backslash escapes of a double-quoted string literal.
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Contexts;
    use serde_json::{json, Value};

    fn eval(input: &str, object: Value) -> Value {
        let op = parse(input).unwrap();
        op.eval(&Contexts::new(&object)).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval("2 * (3 + 4 / 2) - 1", json!({})), json!(9));
        assert_eq!(eval("2*(3+4/2)-1", json!({})), json!(9));
        assert_eq!(eval("8/4/2", json!({})), json!(1));
        assert_eq!(eval("3/2", json!({})), json!(1.5));
    }

    #[test]
    fn booleans_and_comparisons() {
        assert_eq!(
            eval("1 == 1 && 1 != 0 && 0 <= 0 && 0 < 1 && 1 > 0 && 1 >= 1 && true", json!({})),
            json!(true)
        );
        assert_eq!(
            eval("1 != 1 || 1 == 0 || 0 < 0 || 0 >= 1 || 1 <= 0 || 1 < 1 || false", json!({})),
            json!(false)
        );
    }

    #[test]
    fn string_literals_and_concat() {
        assert_eq!(eval(r#""foo" == "foo" && "foo" != "bar""#, json!({})), json!(true));
        assert_eq!(eval(r#""foo" ++ "-" ++ "bar""#, json!({})), json!("foo-bar"));
        assert_eq!(eval(r#""say \"hi\"""#, json!({})), json!(r#"say "hi""#));
    }

    #[test]
    fn references_resolve_against_the_object() {
        let object = json!({"containers": [{"maxCPU": 1}, {"maxCPU": 2}]});
        assert_eq!(
            eval(".containers.0.maxCPU + 1 == .containers.1.maxCPU", object),
            json!(true)
        );
    }

    #[test]
    fn pipelines_lower_to_filter_and_map() {
        let object = json!({
            "spec": {"containers": [
                {"name": "main"},
                {"name": "side", "requests": {"cpu": 2}},
            ]}
        });
        assert_eq!(
            eval(r#".spec.containers | .name != "main" -> .requests.cpu * 0.75"#, object.clone()),
            json!([1.5])
        );
        assert_eq!(
            eval(r#".spec.containers -> .name"#, object),
            json!(["main", "side"])
        );
    }

    #[test]
    fn filter_predicate_must_be_boolean() {
        assert!(parse(".spec.containers | 1 + 1").is_err());
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "1 +", "foo", ".a .b", "(1", "1 === 2"] {
            assert!(parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn both_forms_compile_to_the_same_tree() {
        let from_string = parse("2 + 3 == 5").unwrap();
        assert_eq!(
            serde_json::to_value(&from_string).unwrap(),
            json!({"equal": [{"sum": [{"const": 2}, {"const": 3}]}, {"const": 5}]})
        );
    }
}
