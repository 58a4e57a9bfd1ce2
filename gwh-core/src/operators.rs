//! The operator tree: immutable, typed, value-producing nodes compiled from
//! the rule set and evaluated against a context stack.
//!
//! Every node declares the type it expects from its argument subtree and the
//! type it returns. When both sides are statically known the compatibility
//! check happens at compile time, in the smart constructors below; values
//! whose type is only known at evaluation time (anything reached through
//! `getValue`) are re-checked during evaluation.

use crate::{
    error::{EvalError, ParseError},
    path::{Path, Root},
    value::{self, Contexts, Num},
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// The static type of an operator's result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// A boolean.
    Bool,
    /// An integer or float.
    Number,
    /// A string.
    String,
    /// A list with the given element type.
    List(Box<Kind>),
    /// Only known at evaluation time.
    Dynamic,
}

impl Kind {
    /// A list of this kind.
    fn list(self) -> Kind {
        Kind::List(Box::new(self))
    }

    /// Whether a value of this kind can feed an input declared as `other`.
    /// `dynamic` bypasses the check in either direction.
    fn assignable_to(&self, other: &Kind) -> bool {
        match (self, other) {
            (Kind::Dynamic, _) | (_, Kind::Dynamic) => true,
            (Kind::List(a), Kind::List(b)) => a.assignable_to(b),
            _ => self == other,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Bool => f.write_str("bool"),
            Kind::Number => f.write_str("number"),
            Kind::String => f.write_str("string"),
            Kind::List(elem) => write!(f, "list[{elem}]"),
            Kind::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A reference into the context stack: the value half of `getValue`.
///
/// Besides producing the referenced value, a reference can enumerate every
/// location it addresses together with its pointer, which is what gives
/// `forEach` patches their per-element prefixes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetValue {
    path: Path,
}

impl GetValue {
    /// Parse a dotted reference such as `.spec.containers` or `$.metadata.name`.
    pub fn parse(s: &str) -> Result<GetValue, ParseError> {
        Ok(GetValue { path: s.parse()? })
    }

    /// The underlying path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn frame<'a>(&self, ctx: &Contexts<'a>) -> &'a Value {
        match self.path.root() {
            Root::Absolute => ctx.root(),
            Root::Relative => ctx.innermost(),
        }
    }

    /// Resolve the reference to a value. Missing map keys and out-of-range
    /// list indices resolve to `null`; descending into a scalar is an error.
    pub fn eval(&self, ctx: &Contexts<'_>) -> Result<Value, EvalError> {
        resolve(self.frame(ctx), self.path.segments())
    }

    /// Enumerate `(value, pointer)` pairs for every location this reference
    /// addresses in its frame. A `*` segment fans out over all children; a
    /// reference whose final node is a list fans out over its elements.
    pub fn iter_refs(&self, ctx: &Contexts<'_>) -> Result<Vec<(Value, Vec<String>)>, EvalError> {
        let mut out = Vec::new();
        collect_refs(self.frame(ctx), self.path.segments(), Vec::new(), &mut out)?;
        Ok(out)
    }
}

fn resolve(node: &Value, segments: &[String]) -> Result<Value, EvalError> {
    let Some(segment) = segments.first() else {
        return Ok(node.clone());
    };
    if segment.is_empty() {
        return Ok(node.clone());
    }
    let rest = &segments[1..];
    if segment == "*" {
        let children: Vec<&Value> = match node {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            other => {
                return Err(EvalError::PathThroughScalar {
                    at: segment.clone(),
                    got: value::type_name(other),
                })
            }
        };
        return children
            .into_iter()
            .map(|child| resolve(child, rest))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    match node {
        Value::Object(map) => match map.get(segment) {
            Some(child) => resolve(child, rest),
            None => Ok(Value::Null),
        },
        Value::Array(items) => {
            let idx: usize = segment
                .parse()
                .map_err(|_| EvalError::BadListIndex(segment.clone()))?;
            match items.get(idx) {
                Some(child) => resolve(child, rest),
                None => Ok(Value::Null),
            }
        }
        other => Err(EvalError::PathThroughScalar {
            at: segment.clone(),
            got: value::type_name(other),
        }),
    }
}

fn collect_refs(
    node: &Value,
    segments: &[String],
    pointer: Vec<String>,
    out: &mut Vec<(Value, Vec<String>)>,
) -> Result<(), EvalError> {
    let segment = match segments.first() {
        Some(s) if !s.is_empty() => s,
        // End of the path: a list fans out once more, per element.
        _ => {
            if let Value::Array(items) = node {
                for (i, item) in items.iter().enumerate() {
                    let mut p = pointer.clone();
                    p.push(i.to_string());
                    out.push((item.clone(), p));
                }
            } else {
                out.push((node.clone(), pointer));
            }
            return Ok(());
        }
    };
    let rest = &segments[1..];
    if segment == "*" {
        match node {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let mut p = pointer.clone();
                    p.push(i.to_string());
                    collect_refs(item, rest, p, out)?;
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let mut p = pointer.clone();
                    p.push(key.clone());
                    collect_refs(item, rest, p, out)?;
                }
            }
            other => {
                return Err(EvalError::PathThroughScalar {
                    at: segment.clone(),
                    got: value::type_name(other),
                })
            }
        }
        return Ok(());
    }
    match node {
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                let mut p = pointer;
                p.push(segment.clone());
                collect_refs(child, rest, p, out)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            let idx: usize = segment
                .parse()
                .map_err(|_| EvalError::BadListIndex(segment.clone()))?;
            if let Some(child) = items.get(idx) {
                let mut p = pointer;
                p.push(segment.clone());
                collect_refs(child, rest, p, out)?;
            }
            Ok(())
        }
        other => Err(EvalError::PathThroughScalar {
            at: segment.clone(),
            got: value::type_name(other),
        }),
    }
}

/// A compiled rule node.
///
/// Construct nodes through the checked constructors (`Operator::and`,
/// `Operator::sum`, ...) so the static type rule holds for the whole tree.
#[derive(Clone, Debug)]
pub enum Operator {
    /// A compile-time literal.
    Const(Value),
    /// A reference into the context stack.
    GetValue(GetValue),
    /// Evaluates each child in order into a list.
    List(Vec<Operator>),
    /// Logical conjunction of a list of booleans; empty is `true`.
    And(Box<Operator>),
    /// Logical disjunction of a list of booleans; empty is `false`.
    Or(Box<Operator>),
    /// Boolean negation of a single argument.
    Not(Box<Operator>),
    /// Numeric addition over a list; empty is `0`.
    Sum(Box<Operator>),
    /// Numeric subtraction, left to right.
    Sub(Box<Operator>),
    /// Numeric multiplication, left to right.
    Mul(Box<Operator>),
    /// Numeric division, left to right.
    Div(Box<Operator>),
    /// Deep equality of exactly two values.
    Equal(Box<Operator>),
    /// Negated deep equality.
    NotEqual(Box<Operator>),
    /// `<` on two numbers or two strings.
    LessThan(Box<Operator>),
    /// `<=` on two numbers or two strings.
    LessOrEqual(Box<Operator>),
    /// `>` on two numbers or two strings.
    GreaterThan(Box<Operator>),
    /// `>=` on two numbers or two strings.
    GreaterOrEqual(Box<Operator>),
    /// String concatenation over a list.
    StrConcat(Box<Operator>),
    /// Membership test: does `elements` contain `value`?
    Contain {
        /// The list to search.
        elements: Box<Operator>,
        /// The needle, evaluated once under the current stack.
        value: Box<Operator>,
    },
    /// Evaluate `op` once per element, with the element pushed as the
    /// innermost context frame. A `null` element list yields an empty list.
    ForEach {
        /// The list to iterate.
        elements: Box<Operator>,
        /// The projection applied to each element.
        op: Box<Operator>,
    },
    /// Keep the elements for which `op` evaluates truthy.
    Filter {
        /// The list to iterate.
        elements: Box<Operator>,
        /// The boolean predicate applied to each element.
        op: Box<Operator>,
    },
}

/// Check the spec's rule for operators whose input is `list[T]`: the
/// argument must be list-shaped and its element type must be assignable to
/// `T`. Dynamic arguments are deferred to evaluation.
fn check_list_arg(arg: &Operator, elem: &Kind) -> Result<(), ParseError> {
    match arg.kind() {
        Kind::Dynamic => Ok(()),
        Kind::List(got) if got.assignable_to(elem) => Ok(()),
        got => Err(ParseError::TypeMismatch {
            at: String::new(),
            expected: elem.clone().list().to_string(),
            got: got.to_string(),
        }),
    }
}

fn check_scalar_arg(arg: &Operator, expected: &Kind) -> Result<(), ParseError> {
    let got = arg.kind();
    if got.assignable_to(expected) {
        Ok(())
    } else {
        Err(ParseError::TypeMismatch {
            at: String::new(),
            expected: expected.to_string(),
            got: got.to_string(),
        })
    }
}

impl Operator {
    /// Conjunction over `args`, which must produce a list of booleans.
    pub fn and(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Bool)?;
        Ok(Operator::And(Box::new(args)))
    }

    /// Disjunction over `args`, which must produce a list of booleans.
    pub fn or(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Bool)?;
        Ok(Operator::Or(Box::new(args)))
    }

    /// Negation of a single boolean argument.
    pub fn not(arg: Operator) -> Result<Operator, ParseError> {
        check_scalar_arg(&arg, &Kind::Bool)?;
        Ok(Operator::Not(Box::new(arg)))
    }

    /// Addition over a list of numbers.
    pub fn sum(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Number)?;
        Ok(Operator::Sum(Box::new(args)))
    }

    /// Subtraction over a list of numbers, left to right.
    pub fn sub(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Number)?;
        Ok(Operator::Sub(Box::new(args)))
    }

    /// Multiplication over a list of numbers, left to right.
    pub fn mul(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Number)?;
        Ok(Operator::Mul(Box::new(args)))
    }

    /// Division over a list of numbers, left to right.
    pub fn div(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Number)?;
        Ok(Operator::Div(Box::new(args)))
    }

    /// Deep equality over a pair of values of any type.
    pub fn equal(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Dynamic)?;
        Ok(Operator::Equal(Box::new(args)))
    }

    /// Negated deep equality.
    pub fn not_equal(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Dynamic)?;
        Ok(Operator::NotEqual(Box::new(args)))
    }

    /// `<` over a pair of values.
    pub fn less_than(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Dynamic)?;
        Ok(Operator::LessThan(Box::new(args)))
    }

    /// `<=` over a pair of values.
    pub fn less_or_equal(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Dynamic)?;
        Ok(Operator::LessOrEqual(Box::new(args)))
    }

    /// `>` over a pair of values.
    pub fn greater_than(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Dynamic)?;
        Ok(Operator::GreaterThan(Box::new(args)))
    }

    /// `>=` over a pair of values.
    pub fn greater_or_equal(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::Dynamic)?;
        Ok(Operator::GreaterOrEqual(Box::new(args)))
    }

    /// Concatenation over a list of strings.
    pub fn strconcat(args: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&args, &Kind::String)?;
        Ok(Operator::StrConcat(Box::new(args)))
    }

    /// A `list` node. The children's static return types must agree;
    /// dynamic children are ignored when unifying.
    pub fn list(children: Vec<Operator>) -> Result<Operator, ParseError> {
        unify_kinds(&children).ok_or(ParseError::MixedListTypes(String::new()))?;
        Ok(Operator::List(children))
    }

    /// Membership test.
    pub fn contain(elements: Operator, value: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&elements, &Kind::Dynamic)?;
        Ok(Operator::Contain {
            elements: Box::new(elements),
            value: Box::new(value),
        })
    }

    /// Map `op` over `elements`.
    pub fn for_each(elements: Operator, op: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&elements, &Kind::Dynamic)?;
        Ok(Operator::ForEach {
            elements: Box::new(elements),
            op: Box::new(op),
        })
    }

    /// Keep the elements of `elements` matching the boolean predicate `op`.
    pub fn filter(elements: Operator, op: Operator) -> Result<Operator, ParseError> {
        check_list_arg(&elements, &Kind::Dynamic)?;
        check_scalar_arg(&op, &Kind::Bool)?;
        Ok(Operator::Filter {
            elements: Box::new(elements),
            op: Box::new(op),
        })
    }

    /// The static type this node returns.
    pub fn kind(&self) -> Kind {
        match self {
            Operator::Const(v) => kind_of_value(v),
            Operator::GetValue(_) => Kind::Dynamic,
            Operator::List(children) => unify_kinds(children).unwrap_or(Kind::Dynamic).list(),
            Operator::And(_) | Operator::Or(_) | Operator::Not(_) => Kind::Bool,
            Operator::Equal(_)
            | Operator::NotEqual(_)
            | Operator::LessThan(_)
            | Operator::LessOrEqual(_)
            | Operator::GreaterThan(_)
            | Operator::GreaterOrEqual(_)
            | Operator::Contain { .. } => Kind::Bool,
            Operator::Sum(_) | Operator::Sub(_) | Operator::Mul(_) | Operator::Div(_) => {
                Kind::Number
            }
            Operator::StrConcat(_) => Kind::String,
            Operator::ForEach { op, .. } => op.kind().list(),
            Operator::Filter { elements, .. } => match elements.kind() {
                k @ Kind::List(_) => k,
                _ => Kind::Dynamic.list(),
            },
        }
    }

    /// Evaluate this node against the context stack.
    pub fn eval(&self, ctx: &Contexts<'_>) -> Result<Value, EvalError> {
        match self {
            Operator::Const(v) => Ok(v.clone()),
            Operator::GetValue(get) => get.eval(ctx),
            Operator::List(children) => children
                .iter()
                .map(|c| c.eval(ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Operator::And(args) => {
                let items = eval_list(args, ctx)?;
                Ok(Value::Bool(items.iter().all(value::truthy)))
            }
            Operator::Or(args) => {
                let items = eval_list(args, ctx)?;
                Ok(Value::Bool(items.iter().any(value::truthy)))
            }
            Operator::Not(arg) => Ok(Value::Bool(!value::truthy(&arg.eval(ctx)?))),
            Operator::Sum(args) => reduce_numeric(args, ctx, Num::add),
            Operator::Sub(args) => reduce_numeric(args, ctx, Num::sub),
            Operator::Mul(args) => reduce_numeric(args, ctx, Num::mul),
            Operator::Div(args) => reduce_numeric(args, ctx, Num::div),
            Operator::Equal(args) => compare_pair(args, ctx, |a, b| Ok(value::json_eq(a, b))),
            Operator::NotEqual(args) => compare_pair(args, ctx, |a, b| Ok(!value::json_eq(a, b))),
            Operator::LessThan(args) => {
                compare_pair(args, ctx, |a, b| Ok(order(a, b)? == Ordering::Less))
            }
            Operator::LessOrEqual(args) => {
                compare_pair(args, ctx, |a, b| Ok(order(a, b)? != Ordering::Greater))
            }
            Operator::GreaterThan(args) => {
                compare_pair(args, ctx, |a, b| Ok(order(a, b)? == Ordering::Greater))
            }
            Operator::GreaterOrEqual(args) => {
                compare_pair(args, ctx, |a, b| Ok(order(a, b)? != Ordering::Less))
            }
            Operator::StrConcat(args) => {
                let items = eval_list(args, ctx)?;
                let mut out = String::new();
                for item in &items {
                    out.push_str(&value::coerce_string(item)?);
                }
                Ok(Value::String(out))
            }
            Operator::Contain { elements, value } => {
                let needle = value.eval(ctx)?;
                let items = eval_list(elements, ctx)?;
                Ok(Value::Bool(items.iter().any(|i| value::json_eq(i, &needle))))
            }
            Operator::ForEach { elements, op } => match elements.eval(ctx)? {
                Value::Null => Ok(Value::Array(Vec::new())),
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in &items {
                        let inner = ctx.with(item);
                        out.push(op.eval(&inner)?);
                    }
                    Ok(Value::Array(out))
                }
                other => Err(EvalError::NotAList(value::type_name(&other))),
            },
            Operator::Filter { elements, op } => match elements.eval(ctx)? {
                Value::Null => Ok(Value::Array(Vec::new())),
                Value::Array(items) => {
                    let mut out = Vec::new();
                    for item in items {
                        let keep = {
                            let inner = ctx.with(&item);
                            value::truthy(&op.eval(&inner)?)
                        };
                        if keep {
                            out.push(item);
                        }
                    }
                    Ok(Value::Array(out))
                }
                other => Err(EvalError::NotAList(value::type_name(&other))),
            },
        }
    }
}

fn eval_list(op: &Operator, ctx: &Contexts<'_>) -> Result<Vec<Value>, EvalError> {
    match op.eval(ctx)? {
        Value::Array(items) => Ok(items),
        other => Err(EvalError::NotAList(value::type_name(&other))),
    }
}

fn reduce_numeric(
    args: &Operator,
    ctx: &Contexts<'_>,
    f: fn(Num, Num) -> Result<Num, EvalError>,
) -> Result<Value, EvalError> {
    let items = eval_list(args, ctx)?;
    let mut nums = items.iter().map(Num::from_value);
    let Some(first) = nums.next() else {
        return Ok(Value::from(0));
    };
    let mut acc = first?;
    for num in nums {
        acc = f(acc, num?)?;
    }
    acc.into_value()
}

fn compare_pair(
    args: &Operator,
    ctx: &Contexts<'_>,
    pred: fn(&Value, &Value) -> Result<bool, EvalError>,
) -> Result<Value, EvalError> {
    let items = eval_list(args, ctx)?;
    match items.as_slice() {
        [] | [_] => Ok(Value::Bool(true)),
        [a, b] => Ok(Value::Bool(pred(a, b)?)),
        more => Err(EvalError::TooManyOperands(more.len())),
    }
}

fn order(a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            let (x, y) = (Num::from_value(a)?, Num::from_value(b)?);
            x.cmp(y).ok_or(EvalError::Incomparable {
                lhs: value::type_name(a),
                rhs: value::type_name(b),
            })
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(EvalError::Incomparable {
            lhs: value::type_name(a),
            rhs: value::type_name(b),
        }),
    }
}

fn kind_of_value(v: &Value) -> Kind {
    match v {
        Value::Bool(_) => Kind::Bool,
        Value::Number(_) => Kind::Number,
        Value::String(_) => Kind::String,
        Value::Array(items) => {
            let mut unified: Option<Kind> = None;
            for item in items {
                match (kind_of_value(item), &unified) {
                    (Kind::Dynamic, _) => {}
                    (k, None) => unified = Some(k),
                    (k, Some(u)) if &k == u => {}
                    _ => return Kind::Dynamic.list(),
                }
            }
            unified.unwrap_or(Kind::Dynamic).list()
        }
        Value::Null | Value::Object(_) => Kind::Dynamic,
    }
}

/// Unify the static return types of a `list` node's children. `None` means
/// the children disagree; dynamic children are ignored.
fn unify_kinds(children: &[Operator]) -> Option<Kind> {
    let mut unified: Option<Kind> = None;
    for child in children {
        match (child.kind(), &unified) {
            (Kind::Dynamic, _) => {}
            (k, None) => unified = Some(k),
            (k, Some(u)) if &k == u => {}
            _ => return None,
        }
    }
    Some(unified.unwrap_or(Kind::Dynamic))
}

// === Serialization back to the one-key surface form ===

/// Serializes an operator argument the way the config is written: an inline
/// sequence when the argument is a `list` node, a nested operator otherwise.
struct ArgsSurface<'a>(&'a Operator);

impl Serialize for ArgsSurface<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Operator::List(children) => children.serialize(serializer),
            other => other.serialize(serializer),
        }
    }
}

struct Pair<'a, T: ?Sized> {
    elements: &'a Operator,
    second_key: &'static str,
    second: &'a T,
}

impl<T: Serialize + ?Sized> Serialize for Pair<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("elements", &ArgsSurface(self.elements))?;
        map.serialize_entry(self.second_key, self.second)?;
        map.end()
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Operator::Const(v) => map.serialize_entry("const", v)?,
            Operator::GetValue(get) => {
                map.serialize_entry("getValue", &get.path().to_string())?
            }
            Operator::List(children) => map.serialize_entry("list", children)?,
            Operator::And(args) => map.serialize_entry("and", &ArgsSurface(args))?,
            Operator::Or(args) => map.serialize_entry("or", &ArgsSurface(args))?,
            Operator::Not(arg) => map.serialize_entry("not", arg)?,
            Operator::Sum(args) => map.serialize_entry("sum", &ArgsSurface(args))?,
            Operator::Sub(args) => map.serialize_entry("sub", &ArgsSurface(args))?,
            Operator::Mul(args) => map.serialize_entry("mul", &ArgsSurface(args))?,
            Operator::Div(args) => map.serialize_entry("div", &ArgsSurface(args))?,
            Operator::Equal(args) => map.serialize_entry("equal", &ArgsSurface(args))?,
            Operator::NotEqual(args) => map.serialize_entry("notEqual", &ArgsSurface(args))?,
            Operator::LessThan(args) => map.serialize_entry("lessThan", &ArgsSurface(args))?,
            Operator::LessOrEqual(args) => {
                map.serialize_entry("lessOrEqual", &ArgsSurface(args))?
            }
            Operator::GreaterThan(args) => {
                map.serialize_entry("greaterThan", &ArgsSurface(args))?
            }
            Operator::GreaterOrEqual(args) => {
                map.serialize_entry("greaterOrEqual", &ArgsSurface(args))?
            }
            Operator::StrConcat(args) => map.serialize_entry("strconcat", &ArgsSurface(args))?,
            Operator::Contain { elements, value } => map.serialize_entry(
                "contain",
                &Pair {
                    elements,
                    second_key: "value",
                    second: value.as_ref(),
                },
            )?,
            Operator::ForEach { elements, op } => map.serialize_entry(
                "forEach",
                &Pair {
                    elements,
                    second_key: "op",
                    second: op.as_ref(),
                },
            )?,
            Operator::Filter { elements, op } => map.serialize_entry(
                "filter",
                &Pair {
                    elements,
                    second_key: "op",
                    second: op.as_ref(),
                },
            )?,
        }
        map.end()
    }
}
