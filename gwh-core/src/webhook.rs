//! The compiled manifest model and the action evaluator.
//!
//! A [`Manifest`] is an ordered list of [`Webhook`]s, each an ordered list of
//! [`Action`]s. Evaluation is pure: the same manifest and object always
//! produce the same verdict and patch.

use crate::{
    config::{Dialect, API_GROUP, KIND},
    error::EvalError,
    operators::Operator,
    patch::PatchOp,
    value::{self, Contexts},
};
use json_patch::{Patch, PatchOperation};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

/// A compiled `GenericWebhookConfig` document.
#[derive(Clone, Debug)]
pub struct Manifest {
    dialect: Dialect,
    webhooks: Vec<Webhook>,
}

impl Manifest {
    pub(crate) fn new(dialect: Dialect, webhooks: Vec<Webhook>) -> Manifest {
        Manifest { dialect, webhooks }
    }

    /// The dialect the manifest was compiled with.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The webhooks, in declaration order.
    pub fn webhooks(&self) -> &[Webhook] {
        &self.webhooks
    }
}

/// A single logical webhook: a name, the URL path it answers and its actions.
#[derive(Clone, Debug)]
pub struct Webhook {
    name: String,
    path: String,
    actions: Vec<Action>,
}

impl Webhook {
    pub(crate) fn new(name: String, path: String, actions: Vec<Action>) -> Webhook {
        Webhook { name, path, actions }
    }

    /// The webhook's name, used by the CLI to select it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The URL path this webhook answers.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The actions, in declaration order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Evaluate the webhook against an object: the first action whose
    /// condition holds decides the verdict and produces the patch. With no
    /// matching action the object is accepted unpatched.
    pub fn process(&self, object: &Value) -> Result<(bool, Patch), EvalError> {
        for action in &self.actions {
            if action.check_condition(object)? {
                let patch = action.build_patch(object)?;
                return Ok((action.accept, patch));
            }
        }
        Ok((true, Patch(Vec::new())))
    }
}

/// A (condition, patch, accept) triple.
#[derive(Clone, Debug)]
pub struct Action {
    condition: Operator,
    patch: Vec<PatchOp>,
    accept: bool,
}

impl Action {
    pub(crate) fn new(condition: Operator, patch: Vec<PatchOp>, accept: bool) -> Action {
        Action { condition, patch, accept }
    }

    /// The compiled condition.
    pub fn condition(&self) -> &Operator {
        &self.condition
    }

    /// Whether a matching object is accepted or denied.
    pub fn accept(&self) -> bool {
        self.accept
    }

    /// Evaluate the condition with the object as the only context frame.
    pub fn check_condition(&self, object: &Value) -> Result<bool, EvalError> {
        Ok(value::truthy(&self.condition.eval(&Contexts::new(object))?))
    }

    /// Generate the action's patch. Each operator sees the object as
    /// patched by the operators before it, so later paths can rely on what
    /// earlier operations created; the returned patch is the concatenation
    /// of every delta.
    pub fn build_patch(&self, object: &Value) -> Result<Patch, EvalError> {
        let mut doc = object.clone();
        let mut accumulated: Vec<PatchOperation> = Vec::new();
        for op in &self.patch {
            let delta = op.generate_patch(&Contexts::new(&doc), &[])?;
            json_patch::patch(&mut doc, &delta)?;
            accumulated.extend(delta);
        }
        Ok(Patch(accumulated))
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Manifest", 3)?;
        state.serialize_field("apiVersion", &format!("{API_GROUP}/{}", self.dialect))?;
        state.serialize_field("kind", KIND)?;
        state.serialize_field("webhooks", &self.webhooks)?;
        state.end()
    }
}

impl Serialize for Webhook {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Webhook", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("path", &self.path)?;
        state.serialize_field("actions", &self.actions)?;
        state.end()
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.patch.is_empty() { 2 } else { 3 };
        let mut state = serializer.serialize_struct("Action", fields)?;
        state.serialize_field("condition", &self.condition)?;
        state.serialize_field("accept", &self.accept)?;
        if !self.patch.is_empty() {
            state.serialize_field("patch", &self.patch)?;
        }
        state.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::from_yaml;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn accepts_on_a_constant_arithmetic_condition() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1alpha1
            kind: GenericWebhookConfig
            webhooks:
              - name: check-sum
                path: /check-sum
                actions:
                  - condition:
                      equal:
                        - sum:
                            - const: 2
                            - const: 3
                        - const: 5
            "#,
        )
        .unwrap();
        let (accept, patch) = manifest.webhooks()[0].process(&json!({})).unwrap();
        assert!(accept);
        assert!(patch.0.is_empty());
    }

    #[test]
    fn denies_only_when_the_condition_matches() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1alpha1
            kind: GenericWebhookConfig
            webhooks:
              - name: deny-pods
                path: /deny-pods
                actions:
                  - condition:
                      equal:
                        - getValue: .kind
                        - const: Pod
                    accept: false
            "#,
        )
        .unwrap();
        let webhook = &manifest.webhooks()[0];
        // condition false: falls through to the default accept
        let (accept, patch) = webhook.process(&json!({"kind": "Service"})).unwrap();
        assert!(accept);
        assert!(patch.0.is_empty());
        // condition true: the action denies
        let (accept, patch) = webhook.process(&json!({"kind": "Pod"})).unwrap();
        assert!(!accept);
        assert!(patch.0.is_empty());
    }

    #[test]
    fn patches_create_missing_paths() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1alpha1
            kind: GenericWebhookConfig
            webhooks:
              - name: add-main
                path: /add-main
                actions:
                  - patch:
                      - op: add
                        path: .spec.containers.-
                        value:
                          name: main
            "#,
        )
        .unwrap();
        let object = json!({"spec": {}});
        let (accept, patch) = manifest.webhooks()[0].process(&object).unwrap();
        assert!(accept);
        let mut patched = object;
        json_patch::patch(&mut patched, &patch.0).unwrap();
        assert_json_eq!(patched, json!({"spec": {"containers": [{"name": "main"}]}}));
    }

    #[test]
    fn for_each_patches_every_container() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1beta1
            kind: GenericWebhookConfig
            webhooks:
              - name: cpu-requests
                path: /cpu-requests
                actions:
                  - patch:
                      - op: forEach
                        elements: .spec.containers
                        patch:
                          - op: add
                            path: .resources.requests.cpu
                            value: 100m
            "#,
        )
        .unwrap();
        let object = json!({"spec": {"containers": [{"name": "a"}, {"name": "b"}]}});
        let (_, patch) = manifest.webhooks()[0].process(&object).unwrap();
        let pointers: Vec<String> = patch
            .0
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
    }

    #[test]
    fn later_patch_operators_observe_earlier_deltas() {
        // the first op creates the list the second op appends to
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1alpha1
            kind: GenericWebhookConfig
            webhooks:
              - name: two-step
                path: /two-step
                actions:
                  - patch:
                      - op: add
                        path: .spec.tolerations.-
                        value: first
                      - op: add
                        path: .spec.tolerations.-
                        value: second
            "#,
        )
        .unwrap();
        let object = json!({"spec": {}});
        let (_, patch) = manifest.webhooks()[0].process(&object).unwrap();
        let mut patched = object;
        json_patch::patch(&mut patched, &patch.0).unwrap();
        assert_json_eq!(patched, json!({"spec": {"tolerations": ["first", "second"]}}));
    }

    #[test]
    fn evaluation_is_pure() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1beta1
            kind: GenericWebhookConfig
            webhooks:
              - name: pure
                path: /pure
                actions:
                  - condition: ".spec.replicas > 1"
                    patch:
                      - op: replace
                        path: .spec.replicas
                        value: 1
            "#,
        )
        .unwrap();
        let object = json!({"spec": {"replicas": 3}});
        let first = manifest.webhooks()[0].process(&object).unwrap();
        let second = manifest.webhooks()[0].process(&object).unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(
            serde_json::to_value(&first.1).unwrap(),
            serde_json::to_value(&second.1).unwrap()
        );
        // the input object is never mutated
        assert_eq!(object, json!({"spec": {"replicas": 3}}));
    }

    #[test]
    fn no_matching_action_accepts_without_a_patch() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1alpha1
            kind: GenericWebhookConfig
            webhooks:
              - name: never
                path: /never
                actions:
                  - condition:
                      const: false
                    accept: false
                    patch:
                      - op: remove
                        path: .spec
            "#,
        )
        .unwrap();
        let (accept, patch) = manifest.webhooks()[0].process(&json!({"spec": {}})).unwrap();
        assert!(accept);
        assert!(patch.0.is_empty());
    }

    #[test]
    fn first_matching_action_wins() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1alpha1
            kind: GenericWebhookConfig
            webhooks:
              - name: ordered
                path: /ordered
                actions:
                  - condition:
                      equal:
                        - getValue: .tier
                        - const: critical
                    accept: false
                  - accept: true
            "#,
        )
        .unwrap();
        let webhook = &manifest.webhooks()[0];
        assert!(!webhook.process(&json!({"tier": "critical"})).unwrap().0);
        assert!(webhook.process(&json!({"tier": "batch"})).unwrap().0);
    }

    #[test]
    fn expr_patches_read_the_object() {
        let manifest = from_yaml(
            r#"
            apiVersion: generic-webhook/v1beta1
            kind: GenericWebhookConfig
            webhooks:
              - name: double-replicas
                path: /double-replicas
                actions:
                  - patch:
                      - op: expr
                        path: .spec.replicas
                        value: ".spec.replicas * 2"
            "#,
        )
        .unwrap();
        let object = json!({"spec": {"replicas": 2}});
        let (_, patch) = manifest.webhooks()[0].process(&object).unwrap();
        let mut patched = object;
        json_patch::patch(&mut patched, &patch.0).unwrap();
        assert_json_eq!(patched, json!({"spec": {"replicas": 4}}));
    }
}
