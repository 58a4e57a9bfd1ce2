//! The config compiler: parses a `GenericWebhookConfig` YAML document into a
//! compiled [`Manifest`], selecting the operator and patch dialect from the
//! `apiVersion` field.
//!
//! The dialect is an explicit table of operator-name to parser entries built
//! when the manifest is compiled; over-specification anywhere in the
//! document (keys left over after extraction) rejects the manifest.

use crate::{
    error::ParseError,
    expr,
    operators::Operator,
    patch::PatchOp,
    path::Path,
    value,
    webhook::{Action, Manifest, Webhook},
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The API group every manifest must declare.
pub const API_GROUP: &str = "generic-webhook";
/// The kind every manifest must declare.
pub const KIND: &str = "GenericWebhookConfig";

/// A versioned bundle of operator and patch parsers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// The original operator set; no expression strings.
    V1Alpha1,
    /// Adds aliases, comparisons, arithmetic, `filter`, `strconcat`, the
    /// `expr`/`forEach` patch operations and the expression-string syntax.
    V1Beta1,
}

impl FromStr for Dialect {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1alpha1" => Ok(Dialect::V1Alpha1),
            "v1beta1" => Ok(Dialect::V1Beta1),
            other => Err(ParseError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::V1Alpha1 => f.write_str("v1alpha1"),
            Dialect::V1Beta1 => f.write_str("v1beta1"),
        }
    }
}

type Constructor = fn(Operator) -> Result<Operator, ParseError>;

/// How to parse the value under an operator key.
#[derive(Clone, Copy)]
enum OpEntry {
    /// An n-ary operator taking a list-producing argument.
    Reduce(Constructor),
    /// An operator taking a single nested operator.
    Unary(Constructor),
    /// The explicit `list` operator.
    List,
    /// A compile-time literal.
    Const,
    /// A dotted reference.
    GetValue,
    /// `{elements, op}` iteration.
    ForEach,
    /// `{elements, op}` filtering.
    Filter,
    /// `{elements, value}` membership.
    Contain,
}

/// How to parse a patch operation.
#[derive(Clone, Copy)]
enum PatchEntry {
    Add,
    Remove,
    Replace,
    Copy,
    Move,
    Test,
    Expr,
    ForEach,
}

const V1ALPHA1_OPS: &[(&str, OpEntry)] = &[
    ("and", OpEntry::Reduce(Operator::and)),
    ("or", OpEntry::Reduce(Operator::or)),
    ("equal", OpEntry::Reduce(Operator::equal)),
    ("sum", OpEntry::Reduce(Operator::sum)),
    ("not", OpEntry::Unary(Operator::not)),
    ("list", OpEntry::List),
    ("forEach", OpEntry::ForEach),
    ("contain", OpEntry::Contain),
    ("const", OpEntry::Const),
    ("getValue", OpEntry::GetValue),
];

const V1BETA1_OPS: &[(&str, OpEntry)] = &[
    ("and", OpEntry::Reduce(Operator::and)),
    ("all", OpEntry::Reduce(Operator::and)),
    ("or", OpEntry::Reduce(Operator::or)),
    ("any", OpEntry::Reduce(Operator::or)),
    ("equal", OpEntry::Reduce(Operator::equal)),
    ("notEqual", OpEntry::Reduce(Operator::not_equal)),
    ("lessThan", OpEntry::Reduce(Operator::less_than)),
    ("lessOrEqual", OpEntry::Reduce(Operator::less_or_equal)),
    ("greaterThan", OpEntry::Reduce(Operator::greater_than)),
    ("greaterOrEqual", OpEntry::Reduce(Operator::greater_or_equal)),
    ("sum", OpEntry::Reduce(Operator::sum)),
    ("sub", OpEntry::Reduce(Operator::sub)),
    ("mul", OpEntry::Reduce(Operator::mul)),
    ("div", OpEntry::Reduce(Operator::div)),
    ("strconcat", OpEntry::Reduce(Operator::strconcat)),
    ("not", OpEntry::Unary(Operator::not)),
    ("list", OpEntry::List),
    ("forEach", OpEntry::ForEach),
    ("map", OpEntry::ForEach),
    ("filter", OpEntry::Filter),
    ("contain", OpEntry::Contain),
    ("const", OpEntry::Const),
    ("getValue", OpEntry::GetValue),
];

const V1ALPHA1_PATCH: &[(&str, PatchEntry)] = &[
    ("add", PatchEntry::Add),
    ("remove", PatchEntry::Remove),
    ("replace", PatchEntry::Replace),
    ("copy", PatchEntry::Copy),
    ("move", PatchEntry::Move),
    ("test", PatchEntry::Test),
];

const V1BETA1_PATCH: &[(&str, PatchEntry)] = &[
    ("add", PatchEntry::Add),
    ("remove", PatchEntry::Remove),
    ("replace", PatchEntry::Replace),
    ("copy", PatchEntry::Copy),
    ("move", PatchEntry::Move),
    ("test", PatchEntry::Test),
    ("expr", PatchEntry::Expr),
    ("forEach", PatchEntry::ForEach),
];

/// The per-dialect parser tables.
struct Registry {
    ops: HashMap<&'static str, OpEntry>,
    patches: HashMap<&'static str, PatchEntry>,
    exprs: bool,
}

impl Registry {
    fn new(dialect: Dialect) -> Result<Registry, ParseError> {
        let (ops, patches, exprs) = match dialect {
            Dialect::V1Alpha1 => (V1ALPHA1_OPS, V1ALPHA1_PATCH, false),
            Dialect::V1Beta1 => (V1BETA1_OPS, V1BETA1_PATCH, true),
        };
        let mut op_table = HashMap::with_capacity(ops.len());
        for (name, entry) in ops {
            if op_table.insert(*name, *entry).is_some() {
                return Err(ParseError::DuplicateParser(name.to_string()));
            }
        }
        let mut patch_table = HashMap::with_capacity(patches.len());
        for (name, entry) in patches {
            if patch_table.insert(*name, *entry).is_some() {
                return Err(ParseError::DuplicateParser(name.to_string()));
            }
        }
        Ok(Registry {
            ops: op_table,
            patches: patch_table,
            exprs,
        })
    }

    /// Parse anything the config accepts where an operator is expected: a
    /// one-key map, an expression string (v1beta1) or an implicit list.
    fn parse_operator(&self, spec: Value, at: &str) -> Result<Operator, ParseError> {
        match spec {
            Value::Object(mut map) => {
                if map.len() != 1 {
                    return Err(ParseError::NotSingleKey(at.to_string()));
                }
                let (name, inner) = map.iter_mut().next().map(|(k, v)| (k.clone(), v.take()))
                    .expect("map has one entry");
                let Some(entry) = self.ops.get(name.as_str()) else {
                    return Err(ParseError::UnknownOperator {
                        name,
                        at: at.to_string(),
                    });
                };
                let at = format!("{at}.{name}");
                self.parse_entry(*entry, inner, &at)
            }
            Value::String(s) => {
                if self.exprs {
                    expr::parse(&s).map_err(|e| e.at(at))
                } else {
                    Err(ParseError::ExprNotSupported(at.to_string()))
                }
            }
            Value::Array(items) => self.parse_list(items, at),
            other => Err(ParseError::WrongValueType {
                at: at.to_string(),
                expected: "an operator (map, string or list)",
                got: value::type_name(&other),
            }),
        }
    }

    fn parse_entry(&self, entry: OpEntry, spec: Value, at: &str) -> Result<Operator, ParseError> {
        match entry {
            OpEntry::Reduce(build) => build(self.parse_args(spec, at)?).map_err(|e| e.at(at)),
            OpEntry::Unary(build) => build(self.parse_operator(spec, at)?).map_err(|e| e.at(at)),
            OpEntry::List => match spec {
                Value::Array(items) => self.parse_list(items, at),
                other => Err(ParseError::WrongValueType {
                    at: at.to_string(),
                    expected: "a list of operators",
                    got: value::type_name(&other),
                }),
            },
            OpEntry::Const => Ok(Operator::Const(spec)),
            OpEntry::GetValue => match spec {
                Value::String(s) => Ok(Operator::GetValue(
                    crate::operators::GetValue::parse(&s).map_err(|e| e.at(at))?,
                )),
                other => Err(ParseError::WrongValueType {
                    at: at.to_string(),
                    expected: "a dotted reference string",
                    got: value::type_name(&other),
                }),
            },
            OpEntry::ForEach => {
                let mut map = into_map(spec, at)?;
                let elements = take(&mut map, "elements", at)?;
                let elements = self.parse_operator(elements, &format!("{at}.elements"))?;
                let op = take(&mut map, "op", at)?;
                let op = self.parse_operator(op, &format!("{at}.op"))?;
                ensure_empty(&map, at)?;
                Operator::for_each(elements, op).map_err(|e| e.at(at))
            }
            OpEntry::Filter => {
                let mut map = into_map(spec, at)?;
                let elements = take(&mut map, "elements", at)?;
                let elements = self.parse_operator(elements, &format!("{at}.elements"))?;
                let op = take(&mut map, "op", at)?;
                let op = self.parse_operator(op, &format!("{at}.op"))?;
                ensure_empty(&map, at)?;
                Operator::filter(elements, op).map_err(|e| e.at(at))
            }
            OpEntry::Contain => {
                let mut map = into_map(spec, at)?;
                let elements = take(&mut map, "elements", at)?;
                let elements = self.parse_operator(elements, &format!("{at}.elements"))?;
                let needle = take(&mut map, "value", at)?;
                let needle = self.parse_operator(needle, &format!("{at}.value"))?;
                ensure_empty(&map, at)?;
                Operator::contain(elements, needle).map_err(|e| e.at(at))
            }
        }
    }

    /// The argument of an n-ary operator: an inline list or a nested
    /// operator that produces one.
    fn parse_args(&self, spec: Value, at: &str) -> Result<Operator, ParseError> {
        match spec {
            Value::Array(items) => self.parse_list(items, at),
            Value::Object(_) | Value::String(_) => self.parse_operator(spec, at),
            other => Err(ParseError::WrongValueType {
                at: at.to_string(),
                expected: "a map or list",
                got: value::type_name(&other),
            }),
        }
    }

    fn parse_list(&self, items: Vec<Value>, at: &str) -> Result<Operator, ParseError> {
        let children = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.parse_operator(item, &format!("{at}.{i}")))
            .collect::<Result<Vec<_>, _>>()?;
        Operator::list(children).map_err(|e| match e {
            ParseError::MixedListTypes(_) => ParseError::MixedListTypes(at.to_string()),
            other => other.at(at),
        })
    }

    fn parse_patch(&self, raw: Value, at: &str) -> Result<Vec<PatchOp>, ParseError> {
        let Value::Array(items) = raw else {
            return Err(ParseError::WrongValueType {
                at: at.to_string(),
                expected: "a list of patch operations",
                got: value::type_name(&raw),
            });
        };
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.parse_patch_op(item, &format!("{at}.{i}")))
            .collect()
    }

    fn parse_patch_op(&self, raw: Value, at: &str) -> Result<PatchOp, ParseError> {
        let mut map = into_map(raw, at)?;
        let name = take_string(&mut map, "op", at)?;
        let Some(entry) = self.patches.get(name.as_str()) else {
            return Err(ParseError::UnknownOperator {
                name,
                at: at.to_string(),
            });
        };
        let parsed = match entry {
            PatchEntry::Add => PatchOp::Add {
                path: take_patch_path(&mut map, "path", at)?,
                value: take(&mut map, "value", at)?,
            },
            PatchEntry::Remove => PatchOp::Remove {
                path: take_patch_path(&mut map, "path", at)?,
            },
            PatchEntry::Replace => PatchOp::Replace {
                path: take_patch_path(&mut map, "path", at)?,
                value: take(&mut map, "value", at)?,
            },
            PatchEntry::Copy => PatchOp::Copy {
                path: take_patch_path(&mut map, "path", at)?,
                from: take_patch_path(&mut map, "from", at)?,
            },
            PatchEntry::Move => PatchOp::Move {
                path: take_patch_path(&mut map, "path", at)?,
                from: take_patch_path(&mut map, "from", at)?,
            },
            PatchEntry::Test => PatchOp::Test {
                path: take_patch_path(&mut map, "path", at)?,
                value: take(&mut map, "value", at)?,
            },
            PatchEntry::Expr => {
                let path = take_patch_path(&mut map, "path", at)?;
                let raw_value = take(&mut map, "value", at)?;
                PatchOp::Expr {
                    path,
                    value: self.parse_operator(raw_value, &format!("{at}.value"))?,
                }
            }
            PatchEntry::ForEach => {
                let raw_elements = take(&mut map, "elements", at)?;
                let elements =
                    match self.parse_operator(raw_elements, &format!("{at}.elements"))? {
                        Operator::GetValue(get) => get,
                        _ => {
                            return Err(ParseError::WrongValueType {
                                at: format!("{at}.elements"),
                                expected: "a reference to elements in the object being patched",
                                got: "operator",
                            })
                        }
                    };
                let raw_patch = take(&mut map, "patch", at)?;
                PatchOp::ForEach {
                    elements,
                    patch: self.parse_patch(raw_patch, &format!("{at}.patch"))?,
                }
            }
        };
        ensure_empty(&map, at)?;
        Ok(parsed)
    }

    fn parse_action(&self, raw: Value, at: &str) -> Result<Action, ParseError> {
        let mut map = into_map(raw, at)?;
        let condition = match map.remove("condition") {
            Some(raw) => self.parse_operator(raw, &format!("{at}.condition"))?,
            None => Operator::Const(Value::Bool(true)),
        };
        let patch = match map.remove("patch") {
            Some(raw) => self.parse_patch(raw, &format!("{at}.patch"))?,
            None => Vec::new(),
        };
        let accept = match map.remove("accept") {
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(ParseError::WrongValueType {
                    at: format!("{at}.accept"),
                    expected: "a boolean",
                    got: value::type_name(&other),
                })
            }
            None => true,
        };
        ensure_empty(&map, at)?;
        Ok(Action::new(condition, patch, accept))
    }

    fn parse_webhook(&self, raw: Value, at: &str) -> Result<Webhook, ParseError> {
        let mut map = into_map(raw, at)?;
        let name = take_string(&mut map, "name", at)?;
        let path = take_string(&mut map, "path", at)?;
        let raw_actions = take(&mut map, "actions", at)?;
        let Value::Array(items) = raw_actions else {
            return Err(ParseError::WrongValueType {
                at: format!("{at}.actions"),
                expected: "a list of actions",
                got: value::type_name(&raw_actions),
            });
        };
        let actions = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| self.parse_action(item, &format!("{at}.actions.{i}")))
            .collect::<Result<Vec<_>, _>>()?;
        ensure_empty(&map, at)?;
        Ok(Webhook::new(name, path, actions))
    }
}

fn into_map(raw: Value, at: &str) -> Result<Map<String, Value>, ParseError> {
    match raw {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::WrongValueType {
            at: at.to_string(),
            expected: "a map",
            got: value::type_name(&other),
        }),
    }
}

fn take(map: &mut Map<String, Value>, key: &str, at: &str) -> Result<Value, ParseError> {
    map.remove(key).ok_or_else(|| ParseError::MissingKey {
        key: key.to_string(),
        at: at.to_string(),
    })
}

fn take_string(map: &mut Map<String, Value>, key: &str, at: &str) -> Result<String, ParseError> {
    match take(map, key, at)? {
        Value::String(s) => Ok(s),
        other => Err(ParseError::WrongValueType {
            at: format!("{at}.{key}"),
            expected: "a string",
            got: value::type_name(&other),
        }),
    }
}

fn take_patch_path(map: &mut Map<String, Value>, key: &str, at: &str) -> Result<Path, ParseError> {
    let raw = take_string(map, key, at)?;
    let path: Path = raw.parse()?;
    let segments = path.segments();
    for (i, segment) in segments.iter().enumerate() {
        let append_mid_path = segment == "-" && i + 1 != segments.len();
        if segment == "*" || append_mid_path {
            return Err(ParseError::InvalidPatchSegment {
                segment: segment.clone(),
                path: raw,
            });
        }
    }
    Ok(path)
}

fn ensure_empty(map: &Map<String, Value>, at: &str) -> Result<(), ParseError> {
    if map.is_empty() {
        Ok(())
    } else {
        Err(ParseError::UnexpectedKeys {
            keys: map.keys().cloned().collect(),
            at: at.to_string(),
        })
    }
}

/// Compile a raw config document into a [`Manifest`].
pub fn parse_manifest(raw: Value) -> Result<Manifest, ParseError> {
    let mut map = into_map(raw, "")?;
    let raw_api_version = take_string(&mut map, "apiVersion", "")?;
    let (group, version) = raw_api_version
        .split_once('/')
        .unwrap_or((raw_api_version.as_str(), ""));
    if group != API_GROUP {
        return Err(ParseError::InvalidApiGroup(group.to_string()));
    }
    let kind = take_string(&mut map, "kind", "")?;
    if kind != KIND {
        return Err(ParseError::InvalidKind(kind));
    }
    let dialect: Dialect = version.parse()?;
    let registry = Registry::new(dialect)?;
    let raw_webhooks = take(&mut map, "webhooks", "")?;
    let Value::Array(items) = raw_webhooks else {
        return Err(ParseError::WrongValueType {
            at: "webhooks".to_string(),
            expected: "a list of webhooks",
            got: value::type_name(&raw_webhooks),
        });
    };
    let webhooks = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| registry.parse_webhook(item, &format!("webhooks.{i}")))
        .collect::<Result<Vec<_>, _>>()?;
    ensure_empty(&map, "the manifest level")?;
    Ok(Manifest::new(dialect, webhooks))
}

/// Compile a YAML config document into a [`Manifest`].
pub fn from_yaml(s: &str) -> Result<Manifest, ParseError> {
    let raw: Value = serde_yaml::from_str(s)?;
    parse_manifest(raw)
}
