//! Named-parameter expansion.
//!
//! Rewrites `:name` placeholders to positional `$n` binds. Parameter
//! names may be dotted scope paths (`:it.id`). String literals and
//! `::type` casts are left untouched; a repeated name reuses its bind
//! position.

use crate::application::executor::ExecutorError;
use crate::domain::scope::Scope;
use crate::domain::value::Value;

/// Expand placeholders and resolve their values from the scope.
pub(crate) fn prepare(sql: &str, params: &Scope) -> Result<(String, Vec<Value>), ExecutorError> {
    let (expanded, names) = expand_named_parameters(sql);

    let mut binds = Vec::with_capacity(names.len());
    for name in names {
        let value = params
            .get_path(&name)
            .cloned()
            .ok_or(ExecutorError::UnknownParameter { name })?;
        binds.push(value);
    }

    Ok((expanded, binds))
}

/// Rewrite `:name` placeholders to `$n`, returning the rewritten SQL
/// and the parameter names in bind order.
pub fn expand_named_parameters(sql: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();

    let mut pos = 0;
    let mut in_single = false;
    let mut in_double = false;

    while pos < chars.len() {
        let c = chars[pos];

        if in_single {
            out.push(c);
            if c == '\'' {
                in_single = false;
            }
            pos += 1;
            continue;
        }
        if in_double {
            out.push(c);
            if c == '"' {
                in_double = false;
            }
            pos += 1;
            continue;
        }

        match c {
            '\'' => {
                in_single = true;
                out.push(c);
                pos += 1;
            }
            '"' => {
                in_double = true;
                out.push(c);
                pos += 1;
            }
            ':' if chars.get(pos + 1) == Some(&':') => {
                out.push_str("::");
                pos += 2;
            }
            ':' => {
                let start = pos + 1;
                let mut end = start;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric()
                        || chars[end] == '_'
                        || chars[end] == '.')
                {
                    end += 1;
                }
                while end > start && chars[end - 1] == '.' {
                    end -= 1;
                }

                let starts_identifier = chars
                    .get(start)
                    .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_');
                if end == start || !starts_identifier {
                    out.push(':');
                    pos += 1;
                    continue;
                }

                let name: String = chars[start..end].iter().collect();
                let position = match names.iter().position(|known| *known == name) {
                    Some(index) => index + 1,
                    None => {
                        names.push(name);
                        names.len()
                    }
                };
                out.push('$');
                out.push_str(&position.to_string());
                pos = end;
            }
            _ => {
                out.push(c);
                pos += 1;
            }
        }
    }

    (out, names)
}
