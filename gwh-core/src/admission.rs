//! Contains types for the AdmissionReview wire envelope.
//!
//! For more information on admission controllers, see:
//! <https://kubernetes.io/docs/reference/access-authn-authz/admission-controllers/>
//! <https://github.com/kubernetes/api/blob/master/admission/v1/types.go>
//!
//! The engine is generic: the object under admission is a raw
//! [`serde_json::Value`], not a typed resource.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to serialize patch")]
/// Failed to serialize patch.
pub struct SerializePatchError(#[source] serde_json::Error);

#[derive(Debug, Error)]
#[error("failed to convert AdmissionReview into AdmissionRequest")]
/// Failed to convert `AdmissionReview` into `AdmissionRequest`.
pub struct ConvertAdmissionReviewError;

/// The `kind` field in [`TypeMeta`].
pub const META_KIND: &str = "AdmissionReview";
/// The `api_version` field in [`TypeMeta`] on the v1 version.
pub const META_API_VERSION_V1: &str = "admission.k8s.io/v1";

/// The API version and type of an AdmissionReview.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// The version of the API.
    #[serde(default)]
    pub api_version: String,
    /// The name of the API type.
    #[serde(default)]
    pub kind: String,
}

/// The fully qualified type of an object referenced in a request.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupVersionKind {
    /// The API group.
    #[serde(default)]
    pub group: String,
    /// The API version.
    #[serde(default)]
    pub version: String,
    /// The kind.
    #[serde(default)]
    pub kind: String,
}

/// The fully qualified resource being requested.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupVersionResource {
    /// The API group.
    #[serde(default)]
    pub group: String,
    /// The API version.
    #[serde(default)]
    pub version: String,
    /// The plural resource name.
    #[serde(default)]
    pub resource: String,
}

/// The operation specified in an [`AdmissionRequest`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// An operation that creates a resource.
    Create,
    /// An operation that updates a resource.
    Update,
    /// An operation that deletes a resource.
    Delete,
    /// An operation that connects to a resource.
    Connect,
}

/// The top level struct used for serializing and deserializing
/// AdmissionReview requests and responses. It is both what the API server
/// sends to the webhook and what the webhook answers with.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    /// Contains the API version and type of the request.
    #[serde(flatten)]
    pub types: TypeMeta,
    /// Describes the attributes for the admission request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    /// Describes the attributes for the admission response.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub response: Option<AdmissionResponse>,
}

impl TryFrom<AdmissionReview> for AdmissionRequest {
    type Error = ConvertAdmissionReviewError;

    fn try_from(review: AdmissionReview) -> Result<Self, Self::Error> {
        match review.request {
            Some(mut req) => {
                req.types = review.types;
                Ok(req)
            }
            None => Err(ConvertAdmissionReviewError),
        }
    }
}

/// An incoming [`AdmissionReview`] request.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Copied from the containing [`AdmissionReview`] and used to specify a
    /// response type and version when constructing an [`AdmissionResponse`].
    #[serde(skip)]
    pub types: TypeMeta,
    /// An identifier for the individual request/response pair, suitable for
    /// correlating log entries between the webhook and the API server.
    pub uid: String,
    /// The fully qualified type of object being submitted.
    #[serde(default)]
    pub kind: GroupVersionKind,
    /// The fully qualified resource being requested.
    #[serde(default)]
    pub resource: GroupVersionResource,
    /// The name of the object as presented in the request. Empty on CREATE
    /// when the server has not generated a name yet.
    #[serde(default)]
    pub name: String,
    /// The namespace associated with the request, if any.
    #[serde(default)]
    pub namespace: Option<String>,
    /// The operation being performed. This may differ from the operation
    /// requested, e.g. a patch can result in either a CREATE or an UPDATE.
    #[serde(default)]
    pub operation: Option<Operation>,
    /// Information about the requesting user, passed through untyped.
    #[serde(default)]
    pub user_info: Value,
    /// The object from the incoming request. `None` for DELETE operations.
    #[serde(default)]
    pub object: Option<Value>,
    /// The existing object. Only populated for DELETE and UPDATE requests.
    #[serde(default)]
    pub old_object: Option<Value>,
    /// Specifies that modifications will definitely not be persisted.
    #[serde(default)]
    pub dry_run: bool,
}

/// An outgoing [`AdmissionReview`] response, constructed from the
/// corresponding [`AdmissionRequest`] with [`AdmissionResponse::from`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Copied from the corresponding [`AdmissionRequest`].
    #[serde(skip)]
    pub types: TypeMeta,
    /// Identifier copied over from the corresponding AdmissionRequest.
    pub uid: String,
    /// Indicates whether or not the admission request was permitted.
    pub allowed: bool,
    /// Extra details into why an admission request was denied. Not consulted
    /// in any way when `allowed` is true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// The patch body, a base64 encoded RFC 6902 JSON Patch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// The type of patch. JSONPatch is the only supported value.
    #[serde(skip_serializing_if = "Option::is_none")]
    patch_type: Option<PatchType>,
}

/// A status carried by a denying [`AdmissionResponse`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// A human readable description of the denial.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl From<&AdmissionRequest> for AdmissionResponse {
    fn from(req: &AdmissionRequest) -> Self {
        let types = if req.types.api_version.is_empty() {
            TypeMeta {
                api_version: META_API_VERSION_V1.to_owned(),
                kind: META_KIND.to_owned(),
            }
        } else {
            req.types.clone()
        };
        Self {
            types,
            uid: req.uid.clone(),
            allowed: true,
            status: None,
            patch: None,
            patch_type: None,
        }
    }
}

impl AdmissionResponse {
    /// Constructs an invalid [`AdmissionResponse`]. It doesn't copy the uid
    /// from the corresponding [`AdmissionRequest`], so should only be used
    /// when the original request cannot be read.
    pub fn invalid<T: ToString>(reason: T) -> Self {
        Self {
            types: TypeMeta {
                api_version: META_API_VERSION_V1.to_owned(),
                kind: META_KIND.to_owned(),
            },
            uid: Default::default(),
            allowed: false,
            status: Some(Status {
                message: reason.to_string(),
            }),
            patch: None,
            patch_type: None,
        }
    }

    /// Deny the request with a reason. The reason is sent to the original caller.
    #[must_use]
    pub fn deny<T: ToString>(mut self, reason: T) -> Self {
        self.allowed = false;
        self.status = Some(Status {
            message: reason.to_string(),
        });
        self
    }

    /// Attach a JSON Patch to the response, modifying the object from the
    /// request. An empty patch leaves the response untouched.
    pub fn with_patch(mut self, patch: &json_patch::Patch) -> Result<Self, SerializePatchError> {
        if !patch.0.is_empty() {
            let raw = serde_json::to_vec(patch).map_err(SerializePatchError)?;
            self.patch = Some(BASE64.encode(raw));
            self.patch_type = Some(PatchType::JsonPatch);
        }
        Ok(self)
    }

    /// Converts an [`AdmissionResponse`] into an [`AdmissionReview`] that can
    /// be used as a webhook response.
    pub fn into_review(self) -> AdmissionReview {
        AdmissionReview {
            types: self.types.clone(),
            request: None,
            response: Some(self),
        }
    }
}

/// The type of patch returned in an [`AdmissionResponse`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum PatchType {
    /// Specifies the patch body implements RFC 6902.
    #[serde(rename = "JSONPatch")]
    JsonPatch,
}

#[cfg(test)]
mod test {
    use super::*;
    use json_patch::{AddOperation, Patch, PatchOperation};
    use serde_json::json;

    const WEBHOOK_BODY: &str = r#"{
        "kind": "AdmissionReview",
        "apiVersion": "admission.k8s.io/v1",
        "request": {
            "uid": "0c9a8d74-9cb7-44dd-b98e-09fd62def2f4",
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "name": "echo-pod",
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {"username": "admin", "groups": ["system:authenticated"]},
            "object": {"kind": "Pod", "spec": {"containers": [{"name": "echo"}]}},
            "oldObject": null,
            "dryRun": false
        }
    }"#;

    #[test]
    fn v1_webhook_unmarshals() {
        let review: AdmissionReview = serde_json::from_str(WEBHOOK_BODY).unwrap();
        let req: AdmissionRequest = review.try_into().unwrap();
        assert_eq!(req.uid, "0c9a8d74-9cb7-44dd-b98e-09fd62def2f4");
        assert_eq!(req.kind.kind, "Pod");
        assert_eq!(req.operation, Some(Operation::Create));
        assert_eq!(req.object.unwrap()["spec"]["containers"][0]["name"], json!("echo"));
    }

    #[test]
    fn version_passes_through() {
        let review: AdmissionReview = serde_json::from_str(WEBHOOK_BODY).unwrap();
        let types = review.types.clone();
        let req: AdmissionRequest = review.try_into().unwrap();
        let res = AdmissionResponse::from(&req).into_review();
        assert_ne!(types.api_version, "");
        assert_eq!(types, res.types);
    }

    #[test]
    fn review_without_a_request_does_not_convert() {
        let review: AdmissionReview =
            serde_json::from_str(r#"{"kind": "AdmissionReview", "apiVersion": "admission.k8s.io/v1"}"#)
                .unwrap();
        assert!(AdmissionRequest::try_from(review).is_err());
    }

    #[test]
    fn patches_are_base64_encoded_json() {
        let review: AdmissionReview = serde_json::from_str(WEBHOOK_BODY).unwrap();
        let req: AdmissionRequest = review.try_into().unwrap();
        let patch = Patch(vec![PatchOperation::Add(AddOperation {
            path: json_patch::jsonptr::PointerBuf::from_tokens(["metadata", "labels"]),
            value: json!({}),
        })]);
        let res = AdmissionResponse::from(&req).with_patch(&patch).unwrap();
        let serialized = serde_json::to_value(res.into_review()).unwrap();
        assert_eq!(serialized["response"]["patchType"], json!("JSONPatch"));
        let decoded = BASE64
            .decode(serialized["response"]["patch"].as_str().unwrap())
            .unwrap();
        let decoded: Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(
            decoded,
            json!([{"op": "add", "path": "/metadata/labels", "value": {}}])
        );
    }

    #[test]
    fn empty_patches_are_omitted() {
        let review: AdmissionReview = serde_json::from_str(WEBHOOK_BODY).unwrap();
        let req: AdmissionRequest = review.try_into().unwrap();
        let res = AdmissionResponse::from(&req).with_patch(&Patch(vec![])).unwrap();
        let serialized = serde_json::to_value(res.into_review()).unwrap();
        assert!(serialized["response"].get("patch").is_none());
        assert!(serialized["response"].get("patchType").is_none());
    }
}
