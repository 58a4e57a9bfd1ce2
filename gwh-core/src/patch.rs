//! Builders that turn the patch half of an action into RFC 6902 operations.
//!
//! Each builder receives the context stack and the pointer prefix of the
//! enclosing `forEach` iteration (empty at the top level) and emits zero or
//! more [`json_patch::PatchOperation`]s with absolute pointers.

use crate::{
    error::EvalError,
    operators::{GetValue, Operator},
    path::{Path, Root},
    value::{self, Contexts},
};
use json_patch::{
    AddOperation, CopyOperation, MoveOperation, PatchOperation, RemoveOperation, ReplaceOperation,
    TestOperation,
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// A compiled patch operation.
#[derive(Clone, Debug)]
pub enum PatchOp {
    /// Assign `value` at `path`, creating the missing part of the path.
    Add {
        /// Target location.
        path: Path,
        /// Literal value to add.
        value: Value,
    },
    /// Remove the value at `path`.
    Remove {
        /// Target location.
        path: Path,
    },
    /// Replace the value at `path`.
    Replace {
        /// Target location.
        path: Path,
        /// Literal replacement.
        value: Value,
    },
    /// Copy the value at `from` to `path`.
    Copy {
        /// Target location.
        path: Path,
        /// Source location.
        from: Path,
    },
    /// Move the value at `from` to `path`.
    Move {
        /// Target location.
        path: Path,
        /// Source location.
        from: Path,
    },
    /// Assert the value at `path` equals `value`.
    Test {
        /// Target location.
        path: Path,
        /// Expected value.
        value: Value,
    },
    /// Like `Add`, but the value is an operator evaluated against the
    /// current context stack.
    Expr {
        /// Target location.
        path: Path,
        /// Expression producing the value.
        value: Operator,
    },
    /// Run `patch` once per element addressed by `elements`, with the
    /// element pushed as the innermost context frame and its pointer used as
    /// the prefix for relative paths.
    ForEach {
        /// The reference enumerating the elements to patch.
        elements: GetValue,
        /// The patch operations repeated per element.
        patch: Vec<PatchOp>,
    },
}

impl PatchOp {
    /// Emit the RFC 6902 operations for this builder.
    pub fn generate_patch(
        &self,
        ctx: &Contexts<'_>,
        prefix: &[String],
    ) -> Result<Vec<PatchOperation>, EvalError> {
        match self {
            PatchOp::Add { path, value } => build_add(path, value.clone(), ctx, prefix),
            PatchOp::Remove { path } => Ok(vec![PatchOperation::Remove(RemoveOperation {
                path: path.pointer(prefix),
            })]),
            PatchOp::Replace { path, value } => {
                Ok(vec![PatchOperation::Replace(ReplaceOperation {
                    path: path.pointer(prefix),
                    value: value.clone(),
                })])
            }
            PatchOp::Copy { path, from } => Ok(vec![PatchOperation::Copy(CopyOperation {
                path: path.pointer(prefix),
                from: from.pointer(prefix),
            })]),
            PatchOp::Move { path, from } => Ok(vec![PatchOperation::Move(MoveOperation {
                path: path.pointer(prefix),
                from: from.pointer(prefix),
            })]),
            PatchOp::Test { path, value } => Ok(vec![PatchOperation::Test(TestOperation {
                path: path.pointer(prefix),
                value: value.clone(),
            })]),
            PatchOp::Expr { path, value } => {
                let resolved = value.eval(ctx)?;
                build_add(path, resolved, ctx, prefix)
            }
            PatchOp::ForEach { elements, patch } => {
                let mut out = Vec::new();
                for (element, pointer) in elements.iter_refs(ctx)? {
                    // Relative references compose with the outer prefix;
                    // absolute ones restart from the document root.
                    let inner_prefix: Vec<String> = match elements.path().root() {
                        Root::Absolute => pointer,
                        Root::Relative => prefix.iter().cloned().chain(pointer).collect(),
                    };
                    let inner = ctx.with(&element);
                    for op in patch {
                        out.extend(op.generate_patch(&inner, &inner_prefix)?);
                    }
                }
                Ok(out)
            }
        }
    }
}

/// The `add` walk: find the first missing key along the path, then wrap the
/// value in the remaining segments (a map per regular key, a single-element
/// list for `-` or `0`) so one operation creates the whole missing subtree.
fn build_add(
    path: &Path,
    value: Value,
    ctx: &Contexts<'_>,
    prefix: &[String],
) -> Result<Vec<PatchOperation>, EvalError> {
    let mut node = match path.root() {
        Root::Absolute => ctx.root(),
        Root::Relative => ctx.innermost(),
    };
    let segments = path.segments();

    let mut existing: Vec<String> = Vec::new();
    let mut first_missing: Option<String> = None;
    for segment in segments {
        match node {
            Value::Object(map) => match map.get(segment) {
                Some(child) => node = child,
                None => {
                    first_missing = Some(segment.clone());
                    break;
                }
            },
            Value::Array(items) => {
                // Appending to an existing list needs no wrapping.
                if segment == "-" {
                    existing.push(segment.clone());
                    break;
                }
                let idx: usize = segment
                    .parse()
                    .map_err(|_| EvalError::BadListIndex(segment.clone()))?;
                match items.get(idx) {
                    Some(child) => node = child,
                    None => {
                        first_missing = Some(segment.clone());
                        break;
                    }
                }
            }
            other => {
                return Err(EvalError::PathThroughScalar {
                    at: segment.clone(),
                    got: value::type_name(other),
                })
            }
        }
        existing.push(segment.clone());
    }

    let (final_segments, final_value) = match first_missing {
        Some(missing) => {
            let mut segs = existing;
            segs.push(missing);
            // Everything past the first missing key wraps the value instead.
            let mut wrapped = value;
            for segment in segments[segs.len()..].iter().rev() {
                wrapped = if segment == "-" || segment == "0" {
                    Value::Array(vec![wrapped])
                } else {
                    let mut map = serde_json::Map::new();
                    map.insert(segment.clone(), wrapped);
                    Value::Object(map)
                };
            }
            (segs, wrapped)
        }
        None => (existing, value),
    };

    Ok(vec![PatchOperation::Add(AddOperation {
        path: crate::path::format_pointer(path.root(), &final_segments, prefix),
        value: final_value,
    })])
}

impl Serialize for PatchOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PatchOp::Add { path, value } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", "add")?;
                map.serialize_entry("path", &path.to_string())?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            PatchOp::Remove { path } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("op", "remove")?;
                map.serialize_entry("path", &path.to_string())?;
                map.end()
            }
            PatchOp::Replace { path, value } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", "replace")?;
                map.serialize_entry("path", &path.to_string())?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            PatchOp::Copy { path, from } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", "copy")?;
                map.serialize_entry("path", &path.to_string())?;
                map.serialize_entry("from", &from.to_string())?;
                map.end()
            }
            PatchOp::Move { path, from } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", "move")?;
                map.serialize_entry("path", &path.to_string())?;
                map.serialize_entry("from", &from.to_string())?;
                map.end()
            }
            PatchOp::Test { path, value } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", "test")?;
                map.serialize_entry("path", &path.to_string())?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            PatchOp::Expr { path, value } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", "expr")?;
                map.serialize_entry("path", &path.to_string())?;
                map.serialize_entry("value", value)?;
                map.end()
            }
            PatchOp::ForEach { elements, patch } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", "forEach")?;
                map.serialize_entry("elements", &Operator::GetValue(elements.clone()))?;
                map.serialize_entry("patch", patch)?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn apply(op: &PatchOp, mut doc: Value) -> Value {
        let delta = op.generate_patch(&Contexts::new(&doc), &[]).unwrap();
        json_patch::patch(&mut doc, &delta).unwrap();
        doc
    }

    fn add(path: &str, value: Value) -> PatchOp {
        PatchOp::Add {
            path: path.parse().unwrap(),
            value,
        }
    }

    #[test]
    fn add_overwrites_an_existing_key() {
        let doc = json!({"spec": {}, "metadata": {}});
        assert_eq!(
            apply(&add(".spec", json!("foo")), doc),
            json!({"spec": "foo", "metadata": {}})
        );
    }

    #[test]
    fn add_creates_one_missing_subkey() {
        let doc = json!({"spec": {}, "metadata": {}});
        assert_eq!(
            apply(&add(".spec.subkey", json!("foo")), doc),
            json!({"spec": {"subkey": "foo"}, "metadata": {}})
        );
    }

    #[test]
    fn add_wraps_two_missing_subkeys() {
        let doc = json!({"spec": {}, "metadata": {}});
        assert_eq!(
            apply(&add(".spec.subkey1.subkey2", json!("foo")), doc),
            json!({"spec": {"subkey1": {"subkey2": "foo"}}, "metadata": {}})
        );
    }

    #[test]
    fn add_appends_to_an_existing_list() {
        let empty = json!({"spec": {"containers": []}, "metadata": {}});
        assert_eq!(
            apply(&add(".spec.containers.-", json!({"name": "main"})), empty),
            json!({"spec": {"containers": [{"name": "main"}]}, "metadata": {}})
        );
        let nonempty = json!({"spec": {"containers": [{"name": "sidecar"}]}, "metadata": {}});
        assert_eq!(
            apply(&add(".spec.containers.-", json!({"name": "main"})), nonempty),
            json!({"spec": {"containers": [{"name": "sidecar"}, {"name": "main"}]}, "metadata": {}})
        );
    }

    #[test]
    fn add_creates_a_missing_list() {
        let doc = json!({"spec": {}, "metadata": {}});
        assert_eq!(
            apply(&add(".spec.containers.-", json!({"name": "main"})), doc),
            json!({"spec": {"containers": [{"name": "main"}]}, "metadata": {}})
        );
    }

    #[test]
    fn add_descends_through_list_indices() {
        let doc = json!({"spec": {"containers": [{"name": "main"}]}, "metadata": {}});
        assert_eq!(
            apply(&add(".spec.containers.0.metadata", json!({})), doc),
            json!({"spec": {"containers": [{"name": "main", "metadata": {}}]}, "metadata": {}})
        );
    }

    #[test]
    fn remove_emits_the_op_unchanged() {
        let doc = json!({"spec": {}, "metadata": {}});
        let op = PatchOp::Remove {
            path: ".spec".parse().unwrap(),
        };
        assert_eq!(apply(&op, doc), json!({"metadata": {}}));
    }

    #[test]
    fn replace_copy_move_test() {
        let doc = json!({"spec": {"containers": [{"name": "bar"}]}, "metadata": {"name": "foo"}});
        let replace = PatchOp::Replace {
            path: ".metadata.name".parse().unwrap(),
            value: json!("baz"),
        };
        assert_eq!(
            apply(&replace, doc.clone())["metadata"]["name"],
            json!("baz")
        );
        let copy = PatchOp::Copy {
            path: ".metadata.name".parse().unwrap(),
            from: ".spec.containers.0.name".parse().unwrap(),
        };
        assert_eq!(apply(&copy, doc.clone())["metadata"]["name"], json!("bar"));
        let mv = PatchOp::Move {
            path: ".metadata.name".parse().unwrap(),
            from: ".spec.containers.0.name".parse().unwrap(),
        };
        let moved = apply(&mv, doc.clone());
        assert_eq!(moved["metadata"]["name"], json!("bar"));
        assert_eq!(moved["spec"]["containers"][0], json!({}));
        let test = PatchOp::Test {
            path: ".metadata.name".parse().unwrap(),
            value: json!("foo"),
        };
        assert_eq!(apply(&test, doc.clone()), doc);
    }

    #[test]
    fn expr_evaluates_then_adds() {
        let doc = json!({"spec": {"replicas": 2}});
        let op = PatchOp::Expr {
            path: ".spec.replicas".parse().unwrap(),
            value: Operator::sum(
                Operator::list(vec![
                    Operator::GetValue(GetValue::parse(".spec.replicas").unwrap()),
                    Operator::Const(json!(1)),
                ])
                .unwrap(),
            )
            .unwrap(),
        };
        assert_eq!(apply(&op, doc), json!({"spec": {"replicas": 3}}));
    }

    #[test]
    fn for_each_prefixes_each_element() {
        let doc = json!({"spec": {"containers": [{"name": "a"}, {"name": "b"}]}});
        let op = PatchOp::ForEach {
            elements: GetValue::parse(".spec.containers").unwrap(),
            patch: vec![add(".resources.requests.cpu", json!("100m"))],
        };
        let delta = op.generate_patch(&Contexts::new(&doc), &[]).unwrap();
        let pointers: Vec<String> = delta
            .iter()
            .map(|op| match op {
                PatchOperation::Add(add) => add.path.to_string(),
                other => panic!("expected add, got {other:?}"),
            })
            .collect();
        assert_eq!(
            pointers,
            [
                "/spec/containers/0/resources/requests/cpu",
                "/spec/containers/1/resources/requests/cpu",
            ]
        );
        let mut patched = doc;
        json_patch::patch(&mut patched, &delta).unwrap();
        assert_eq!(
            patched["spec"]["containers"][0]["resources"]["requests"]["cpu"],
            json!("100m")
        );
    }

    #[test]
    fn for_each_absolute_paths_escape_the_prefix() {
        let doc = json!({"spec": {"containers": [{"name": "a"}]}, "metadata": {}});
        let op = PatchOp::ForEach {
            elements: GetValue::parse(".spec.containers").unwrap(),
            patch: vec![add("$.metadata.seen", json!(true))],
        };
        let delta = op.generate_patch(&Contexts::new(&doc), &[]).unwrap();
        match &delta[0] {
            PatchOperation::Add(add) => assert_eq!(add.path.to_string(), "/metadata/seen"),
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn serializes_to_the_surface_form() {
        let op = PatchOp::ForEach {
            elements: GetValue::parse(".spec.containers").unwrap(),
            patch: vec![add(".resources.requests.cpu", json!("100m"))],
        };
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({
                "op": "forEach",
                "elements": {"getValue": ".spec.containers"},
                "patch": [{"op": "add", "path": ".resources.requests.cpu", "value": "100m"}],
            })
        );
    }
}
