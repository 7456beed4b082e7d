//! Request-local scope and path-addressed assignment.
//!
//! The scope maps parameter and intermediate names to values. Pipeline
//! steps write their results through [`Scope::set_path`], which accepts
//! nested paths (`user.profile.name`) and array-indexed paths
//! (`items[i].order`) where the index is itself a scope variable
//! holding an integer.

use std::collections::BTreeMap;

use thiserror::Error;

use super::value::Value;

/// Errors raised by the path writer when the path contract is violated.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("cannot navigate path at `{prefix}`: not a map")]
    NotAMap { prefix: String },
    #[error("array `{name}` not found in scope")]
    MissingArray { name: String },
    #[error("index variable `{name}` not found in scope")]
    MissingIndex { name: String },
    #[error("index variable `{name}` is not an integer")]
    IndexNotInteger { name: String },
    #[error("index {index} out of bounds for array of length {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("cannot index into `{name}`: not a list")]
    NotAList { name: String },
    #[error("invalid path `{path}`")]
    InvalidSyntax { path: String },
    #[error("indexed path `{path}` has no trailing segment")]
    EmptyIndexedLeaf { path: String },
}

/// A request-local mapping of names to values.
///
/// Created on request entry, discarded at response emission. Never
/// shared between requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    entries: BTreeMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a dotted path (`user.profile.name`) against the scope.
    ///
    /// Returns `None` when any segment is missing or an intermediate
    /// value is not a map.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.entries.get(segments.next()?)?;
        for segment in segments {
            match current {
                Value::Map(entries) => current = entries.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Write `value` at `path`, creating missing intermediate maps.
    ///
    /// Paths containing an index segment (`items[i].order`) require the
    /// named array to already exist as a list and the index variable to
    /// hold an in-bounds integer. The element at that position is
    /// replaced by an empty map when it is not already a map.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        if path.contains('[') {
            return self.set_indexed(path, value);
        }
        set_nested(&mut self.entries, path, value)
    }

    fn set_indexed(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        let (array_name, index_name, rest) = parse_indexed_path(path)?;

        if rest.is_empty() {
            // The legacy behaviour stored the value under the array's own
            // name inside the element; an explicit error keeps the path
            // grammar total.
            return Err(PathError::EmptyIndexedLeaf {
                path: path.to_string(),
            });
        }

        let index = match self.entries.get(index_name) {
            Some(Value::Int(i)) => *i,
            Some(_) => {
                return Err(PathError::IndexNotInteger {
                    name: index_name.to_string(),
                });
            }
            None => {
                return Err(PathError::MissingIndex {
                    name: index_name.to_string(),
                });
            }
        };

        let items = match self.entries.get_mut(array_name) {
            Some(Value::List(items)) => items,
            Some(_) => {
                return Err(PathError::NotAList {
                    name: array_name.to_string(),
                });
            }
            None => {
                return Err(PathError::MissingArray {
                    name: array_name.to_string(),
                });
            }
        };

        let len = items.len();
        if index < 0 || index as usize >= len {
            return Err(PathError::OutOfBounds { index, len });
        }

        let element = &mut items[index as usize];
        if !matches!(element, Value::Map(_)) {
            *element = Value::Map(BTreeMap::new());
        }
        let Value::Map(entries) = element else {
            unreachable!("element was just coerced to a map");
        };

        set_nested(entries, rest, value)
    }
}

impl FromIterator<(String, Value)> for Scope {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn set_nested(
    entries: &mut BTreeMap<String, Value>,
    path: &str,
    value: Value,
) -> Result<(), PathError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(PathError::InvalidSyntax {
            path: path.to_string(),
        });
    }

    let mut current = entries;
    for (depth, segment) in segments[..segments.len() - 1].iter().enumerate() {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        match entry {
            Value::Map(next) => current = next,
            _ => {
                return Err(PathError::NotAMap {
                    prefix: segments[..=depth].join("."),
                });
            }
        }
    }

    current.insert(segments[segments.len() - 1].to_string(), value);
    Ok(())
}

/// Split `items[i].rest` into `("items", "i", "rest")`.
fn parse_indexed_path(path: &str) -> Result<(&str, &str, &str), PathError> {
    let invalid = || PathError::InvalidSyntax {
        path: path.to_string(),
    };

    let open = path.find('[').ok_or_else(invalid)?;
    let close = path.find(']').ok_or_else(invalid)?;
    if close < open {
        return Err(invalid());
    }

    let array_name = &path[..open];
    let index_name = &path[open + 1..close];
    if array_name.is_empty()
        || index_name.is_empty()
        || !is_identifier(array_name)
        || !is_identifier(index_name)
    {
        return Err(invalid());
    }

    let rest = match &path[close + 1..] {
        "" => "",
        tail => tail.strip_prefix('.').ok_or_else(invalid)?,
    };

    Ok((array_name, index_name, rest))
}

fn is_identifier(input: &str) -> bool {
    let mut chars = input.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
