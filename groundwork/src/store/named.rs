//! Named-parameter statements
//!
//! Statements may reference arguments as `:name`. [`compile`] rewrites them
//! to positional `?` placeholders and returns the arguments in placeholder
//! order; [`rebind`] then converts `?` to `$1..$n` for backends that number
//! their parameters.
//!
//! A [`SqlValue::List`] argument expands to one placeholder per element, so
//! `id IN (:ids)` works with any number of ids.

use crate::error::StoreError;
use crate::record::{NamedArgs, SqlValue};

/// Rewrite `:name` references to `?` and collect their values in order
///
/// Postgres casts (`::text`) and anything inside quotes are left untouched.
/// A reference with no matching argument, or a list argument with no
/// elements, is an error.
pub fn compile(sql: &str, args: &NamedArgs) -> Result<(String, Vec<SqlValue>), StoreError> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            ':' => match chars.peek() {
                Some(&(_, ':')) => {
                    chars.next();
                    out.push_str("::");
                }
                Some(&(start, next)) if next.is_ascii_alphabetic() || next == '_' => {
                    let mut end = start;
                    while let Some(&(i, n)) = chars.peek() {
                        if n.is_ascii_alphanumeric() || n == '_' {
                            end = i + n.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let name = &sql[start..end];
                    let value = args.get(name).ok_or_else(|| {
                        StoreError::invalid_statement(format!("could not find name {name} in arguments"))
                    })?;
                    push_value(&mut out, &mut values, name, value)?;
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }

    Ok((out, values))
}

fn push_value(
    out: &mut String,
    values: &mut Vec<SqlValue>,
    name: &str,
    value: &SqlValue,
) -> Result<(), StoreError> {
    match value {
        SqlValue::List(items) if items.is_empty() => Err(StoreError::invalid_statement(format!(
            "empty list passed for :{name}"
        ))),
        SqlValue::List(items) => {
            let placeholders = vec!["?"; items.len()].join(", ");
            out.push_str(&placeholders);
            values.extend(items.iter().cloned());
            Ok(())
        }
        other => {
            out.push('?');
            values.push(other.clone());
            Ok(())
        }
    }
}

/// Convert `?` placeholders to `$1..$n`, skipping quoted text
pub fn rebind(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(c),
            },
        }
    }

    out
}
