//! Dotted paths into a JSON document and their RFC 6901 pointer form.
//!
//! The config surface addresses document locations with a dotted notation:
//! `.spec.containers.0.name` resolves from the current context frame, while
//! `$.metadata.name` resolves from the original admission object. A literal
//! dot inside a segment is escaped as `\.`.

use crate::error::ParseError;
use json_patch::jsonptr::PointerBuf;
use std::fmt;
use std::str::FromStr;

/// Where a [`Path`] starts resolving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Root {
    /// Leading `.`: the innermost context frame (the element pushed by the
    /// nearest enclosing `forEach`, or the object itself at the top level).
    Relative,
    /// Leading `$`: the original object, context frame 0.
    Absolute,
}

/// A parsed dotted path: a root marker plus an ordered list of segments.
///
/// Segments are plain strings; a segment made of digits addresses a list
/// index, `-` (in patch paths) means "append", and `*` (in expression-string
/// references) enumerates all children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    root: Root,
    segments: Vec<String>,
}

impl Path {
    /// The root marker.
    pub fn root(&self) -> Root {
        self.root
    }

    /// The segments after the root marker.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl FromStr for Path {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut elems = split_unescaped(s);
        let head = elems.remove(0);
        let root = match head.as_str() {
            "" => Root::Relative,
            "$" => Root::Absolute,
            other => {
                return Err(ParseError::InvalidPathRoot {
                    root: other.to_string(),
                })
            }
        };
        Ok(Path { root, segments: elems })
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.root == Root::Absolute {
            f.write_str("$")?;
        }
        if self.segments.is_empty() {
            // A bare relative root still needs its dot.
            if self.root == Root::Relative {
                f.write_str(".")?;
            }
            return Ok(());
        }
        for segment in &self.segments {
            write!(f, ".{}", segment.replace('.', "\\."))?;
        }
        Ok(())
    }
}

/// Split a dotted path on unescaped dots and de-escape `\.` into `.`.
fn split_unescaped(s: &str) -> Vec<String> {
    let mut out = vec![String::new()];
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                chars.next();
                out.last_mut().expect("never empty").push('.');
            }
            '.' => out.push(String::new()),
            other => out.last_mut().expect("never empty").push(other),
        }
    }
    out
}

/// Format an RFC 6901 pointer from path segments and an optional prefix.
///
/// The prefix is prepended unless the path is absolute, in which case the
/// segments stand on their own.
pub fn format_pointer(root: Root, segments: &[String], prefix: &[String]) -> PointerBuf {
    match root {
        Root::Absolute => PointerBuf::from_tokens(segments.iter().map(String::as_str)),
        Root::Relative => PointerBuf::from_tokens(
            prefix
                .iter()
                .chain(segments.iter())
                .map(String::as_str),
        ),
    }
}

impl Path {
    /// The pointer this path addresses, given the prefix of the enclosing
    /// `forEach` iteration (empty at the top level).
    pub fn pointer(&self, prefix: &[String]) -> PointerBuf {
        format_pointer(self.root, &self.segments, prefix)
    }
}
