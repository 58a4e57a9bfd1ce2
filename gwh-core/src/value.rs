//! Runtime values for operator evaluation: the context stack, the numeric
//! tower and the coercion rules shared by the operators.

use crate::error::EvalError;
use serde_json::Value;
use std::cmp::Ordering;

/// The stack of JSON frames visible to operator evaluation.
///
/// Frame 0 is the original admission object; the last frame is the innermost
/// one, pushed by the nearest enclosing `forEach`. The stack is never empty
/// and frames are never mutated, only extended.
#[derive(Clone, Debug)]
pub struct Contexts<'a> {
    frames: Vec<&'a Value>,
}

impl<'a> Contexts<'a> {
    /// A stack with a single frame: the object under admission.
    pub fn new(object: &'a Value) -> Self {
        Contexts { frames: vec![object] }
    }

    /// Frame 0, the original object.
    pub fn root(&self) -> &'a Value {
        self.frames[0]
    }

    /// The innermost frame.
    pub fn innermost(&self) -> &'a Value {
        self.frames[self.frames.len() - 1]
    }

    /// A new stack with `frame` pushed on top. The original stack is shared,
    /// not mutated, so sibling iterations never observe each other.
    pub fn with<'b>(&self, frame: &'b Value) -> Contexts<'b>
    where
        'a: 'b,
    {
        let mut frames: Vec<&'b Value> = self.frames.clone();
        frames.push(frame);
        Contexts { frames }
    }
}

/// A JSON number, kept as an integer for as long as the arithmetic is exact.
#[derive(Clone, Copy, Debug)]
pub enum Num {
    /// An integral value.
    Int(i64),
    /// A floating point value.
    Float(f64),
}

impl Num {
    /// Coerce a JSON value to a number: integers and floats pass through,
    /// strings are parsed (integer first, float second), everything else
    /// fails.
    pub fn from_value(v: &Value) -> Result<Num, EvalError> {
        match v {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Num::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Num::Float(f))
                } else {
                    Err(EvalError::NotANumber(n.to_string()))
                }
            }
            Value::String(s) => s
                .parse::<i64>()
                .map(Num::Int)
                .or_else(|_| s.parse::<f64>().map(Num::Float))
                .map_err(|_| EvalError::NotANumber(s.clone())),
            other => Err(EvalError::NotANumber(type_name(other).to_string())),
        }
    }

    /// Back to a JSON value. Fails on NaN or infinite floats, which JSON
    /// cannot represent.
    pub fn into_value(self) -> Result<Value, EvalError> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or(EvalError::NotRepresentable),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    /// Addition, promoting to float on overflow.
    pub fn add(self, rhs: Num) -> Result<Num, EvalError> {
        match (self, rhs) {
            (Num::Int(a), Num::Int(b)) => Ok(a
                .checked_add(b)
                .map(Num::Int)
                .unwrap_or_else(|| Num::Float(a as f64 + b as f64))),
            (a, b) => Ok(Num::Float(a.as_f64() + b.as_f64())),
        }
    }

    /// Subtraction, promoting to float on overflow.
    pub fn sub(self, rhs: Num) -> Result<Num, EvalError> {
        match (self, rhs) {
            (Num::Int(a), Num::Int(b)) => Ok(a
                .checked_sub(b)
                .map(Num::Int)
                .unwrap_or_else(|| Num::Float(a as f64 - b as f64))),
            (a, b) => Ok(Num::Float(a.as_f64() - b.as_f64())),
        }
    }

    /// Multiplication, promoting to float on overflow.
    pub fn mul(self, rhs: Num) -> Result<Num, EvalError> {
        match (self, rhs) {
            (Num::Int(a), Num::Int(b)) => Ok(a
                .checked_mul(b)
                .map(Num::Int)
                .unwrap_or_else(|| Num::Float(a as f64 * b as f64))),
            (a, b) => Ok(Num::Float(a.as_f64() * b.as_f64())),
        }
    }

    /// Division. Two integers stay an integer only when the quotient is
    /// exact; otherwise the result is a float. Dividing by zero fails.
    pub fn div(self, rhs: Num) -> Result<Num, EvalError> {
        if rhs.as_f64() == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        match (self, rhs) {
            (Num::Int(a), Num::Int(b)) if a % b == 0 => Ok(Num::Int(a / b)),
            (a, b) => Ok(Num::Float(a.as_f64() / b.as_f64())),
        }
    }

    /// Numeric ordering across the integer/float divide.
    pub fn cmp(self, rhs: Num) -> Option<Ordering> {
        match (self, rhs) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// The truthiness used by `and`, `or` and `filter` when coercing a
/// non-boolean operand: `null`, `false`, zero, the empty string and empty
/// containers are false, everything else is true.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Deep structural equality with numbers compared numerically, so that an
/// integer and the equal float are the same value (`9 == 9.0`).
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Coerce a value to a string for `strconcat`.
pub fn coerce_string(v: &Value) -> Result<String, EvalError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(EvalError::NotAString(type_name(other))),
    }
}

/// A short name for a value's JSON type, for error messages.
pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn contexts_share_outer_frames() {
        let object = json!({"spec": {}});
        let ctx = Contexts::new(&object);
        let elem = json!({"name": "main"});
        let inner = ctx.with(&elem);
        assert_eq!(inner.root(), &object);
        assert_eq!(inner.innermost(), &elem);
        // the original stack is untouched
        assert_eq!(ctx.innermost(), &object);
    }

    #[test]
    fn integer_division_falls_back_to_float() {
        let exact = Num::Int(8).div(Num::Int(4)).unwrap();
        assert!(matches!(exact, Num::Int(2)));
        let inexact = Num::Int(3).div(Num::Int(2)).unwrap();
        assert!(matches!(inexact, Num::Float(f) if f == 1.5));
        assert!(Num::Int(1).div(Num::Int(0)).is_err());
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert!(json_eq(&json!(9), &json!(9.0)));
        assert!(!json_eq(&json!(9), &json!(9.5)));
        assert!(json_eq(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
    }

    #[test]
    fn truthiness_matches_the_coercion_table() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(!truthy(&falsy), "{falsy} should be falsy");
        }
        for true_ in [json!(true), json!(1), json!("x"), json!([0]), json!({"a": 0})] {
            assert!(truthy(&true_), "{true_} should be truthy");
        }
    }

    #[test]
    fn string_coercion() {
        assert_eq!(coerce_string(&json!("a")).unwrap(), "a");
        assert_eq!(coerce_string(&json!(3)).unwrap(), "3");
        assert_eq!(coerce_string(&json!(true)).unwrap(), "true");
        assert!(coerce_string(&json!([])).is_err());
    }

    #[test]
    fn number_coercion_tries_integer_then_float() {
        assert!(matches!(Num::from_value(&json!("42")).unwrap(), Num::Int(42)));
        assert!(matches!(Num::from_value(&json!("1.5")).unwrap(), Num::Float(_)));
        assert!(Num::from_value(&json!("nope")).is_err());
        assert!(Num::from_value(&json!({})).is_err());
    }
}
