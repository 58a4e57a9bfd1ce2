//! Error handling in [`gwh-core`][crate]
//!
//! Compile-time rejection of a rule set is a [`ParseError`]; a failure while
//! evaluating a compiled rule set against an object is an [`EvalError`].
//! Parse errors abort the manifest load, evaluation errors abort the current
//! request only.

use thiserror::Error;

/// Possible errors when compiling a webhook configuration.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The operator name is not part of the selected dialect.
    #[error("the operator {name} in {at} is not defined")]
    UnknownOperator {
        /// Name found in the config.
        name: String,
        /// Config location.
        at: String,
    },

    /// Two parsers were registered under the same operator name.
    #[error("duplicated operator parser {0}")]
    DuplicateParser(String),

    /// An operator map must have exactly one key naming the operator.
    #[error("expected exactly one key under {0}")]
    NotSingleKey(String),

    /// A required sub-key is absent.
    #[error("missing required key {key} in {at}")]
    MissingKey {
        /// The absent key.
        key: String,
        /// Config location.
        at: String,
    },

    /// Keys were left over after all known keys were extracted.
    #[error("unexpected keys {keys:?} in {at}")]
    UnexpectedKeys {
        /// The unconsumed keys.
        keys: Vec<String>,
        /// Config location.
        at: String,
    },

    /// A value had the wrong surface shape (e.g. a list where a string is required).
    #[error("in {at}, expected {expected} but got {got}")]
    WrongValueType {
        /// Config location.
        at: String,
        /// What the parser needed.
        expected: &'static str,
        /// What it found.
        got: &'static str,
    },

    /// Static type check failure between an operator and its argument subtree.
    #[error("in {at}, expected {expected} as input but got {got}")]
    TypeMismatch {
        /// Config location, filled in by the compiler.
        at: String,
        /// The declared input type.
        expected: String,
        /// The argument's return type.
        got: String,
    },

    /// A `list` operator whose children disagree on their static return type.
    #[error("non homogeneous return type in {0}")]
    MixedListTypes(String),

    /// A dotted path that starts with something other than `.` or `$`.
    #[error("invalid path root {root:?}: a path must start with '.' or '$'")]
    InvalidPathRoot {
        /// The offending first segment.
        root: String,
    },

    /// A patch path placing `-` or `*` where they are not allowed.
    #[error("invalid segment {segment:?} in patch path {path}")]
    InvalidPatchSegment {
        /// The offending segment.
        segment: String,
        /// The whole dotted path.
        path: String,
    },

    /// The expression-string front-end rejected the input.
    #[error("error parsing expression in {at}: {message}")]
    Expr {
        /// Config location, filled in by the compiler.
        at: String,
        /// Rendered grammar error.
        message: String,
    },

    /// String expressions require the v1beta1 dialect.
    #[error("string expressions are not supported in {0}")]
    ExprNotSupported(String),

    /// The manifest's API group is not `generic-webhook`.
    #[error("invalid apigroup {0}. Must be generic-webhook")]
    InvalidApiGroup(String),

    /// The manifest's kind is not `GenericWebhookConfig`.
    #[error("invalid kind {0}. Must be GenericWebhookConfig")]
    InvalidKind(String),

    /// The version half of `apiVersion` names no known dialect.
    #[error("the api version {0} is not supported")]
    UnsupportedVersion(String),

    /// Failed to read the config document as YAML.
    #[error("error deserializing config")]
    Yaml(#[from] serde_yaml::Error),
}

impl ParseError {
    /// Fill in the config location on errors raised below the compiler,
    /// where the location is not known yet.
    pub(crate) fn at(mut self, location: &str) -> Self {
        match &mut self {
            ParseError::TypeMismatch { at, .. } | ParseError::Expr { at, .. } => {
                if at.is_empty() {
                    *at = location.to_string();
                }
            }
            _ => {}
        }
        self
    }
}

/// Possible errors when evaluating a compiled rule set against an object.
#[derive(Error, Debug)]
pub enum EvalError {
    /// An operator expecting a list argument received something else.
    #[error("expected a list, but got {0}")]
    NotAList(&'static str),

    /// A value could not be coerced to a number.
    #[error("cannot convert {0} to a number")]
    NotANumber(String),

    /// A value could not be coerced to a string.
    #[error("cannot convert a {0} to a string")]
    NotAString(&'static str),

    /// Division by zero in a numeric reduction.
    #[error("division by zero")]
    DivisionByZero,

    /// A numeric result not representable as JSON (NaN or infinite).
    #[error("numeric result is not representable")]
    NotRepresentable,

    /// A path descended into a scalar with segments left to consume.
    #[error("expected an object or list at {at}, but got {got}")]
    PathThroughScalar {
        /// The segment being resolved.
        at: String,
        /// The scalar's type.
        got: &'static str,
    },

    /// A non-integer segment was used to index a list.
    #[error("invalid list index {0:?}")]
    BadListIndex(String),

    /// Comparison operators take at most two operands.
    #[error("comparison takes at most two operands, got {0}")]
    TooManyOperands(usize),

    /// Two values that cannot be ordered relative to each other.
    #[error("cannot compare {lhs} with {rhs}")]
    Incomparable {
        /// Left operand type.
        lhs: &'static str,
        /// Right operand type.
        rhs: &'static str,
    },

    /// A generated patch failed to apply to the object.
    #[error("failed to apply patch")]
    Apply(#[from] json_patch::PatchError),
}
