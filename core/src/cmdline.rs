//! Command-line rendering and environment block encoding
//!
//! Windows hands a child one flat command-line string rather than an argument
//! vector, so the argument list has to be quoted such that the child's C
//! runtime splits it back into exactly the same list.
//!
//! ## Quoting rule
//!
//! - An argument that is empty or contains whitespace or a `"` is wrapped in
//!   double quotes
//! - A `"` inside an argument is escaped as `\"`, and the run of backslashes
//!   immediately preceding it is doubled
//! - A run of backslashes at the end of a quoted argument is doubled so the
//!   closing quote is not escaped
//! - Backslashes anywhere else are literal

use crate::{CoreError, Result};
use std::collections::BTreeMap;
use std::iter;

fn needs_quotes(arg: &str) -> bool {
    arg.is_empty()
        || arg
            .chars()
            .any(|c| matches!(c, ' ' | '\t' | '\n' | '\x0b' | '"'))
}

/// Quote a single argument for inclusion in a command line
pub fn quote_arg(arg: &str) -> String {
    let quoted = needs_quotes(arg);
    let mut out = String::with_capacity(arg.len() + 2);
    if quoted {
        out.push('"');
    }

    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(iter::repeat('\\').take(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }

    if quoted {
        out.extend(iter::repeat('\\').take(backslashes * 2));
        out.push('"');
    } else {
        out.extend(iter::repeat('\\').take(backslashes));
    }
    out
}

/// Render an argument list as a single command-line string
pub fn render_command_line<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| quote_arg(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a command line with the C runtime's argument-splitting rule
///
/// This is the inverse of [`render_command_line`]: 2n backslashes before a
/// quote yield n backslashes and a quote toggle, 2n+1 yield n backslashes and
/// a literal quote, and `""` inside a quoted region is a literal quote.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut count = 1usize;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    count += 1;
                }
                if chars.peek() == Some(&'"') {
                    current.extend(iter::repeat('\\').take(count / 2));
                    if count % 2 == 1 {
                        chars.next();
                        current.push('"');
                    }
                } else {
                    current.extend(iter::repeat('\\').take(count));
                }
                in_token = true;
            }
            '"' => {
                in_token = true;
                if in_quotes && chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ' ' | '\t' if !in_quotes => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }
    args
}

/// Reject strings the platform cannot carry (embedded NUL)
pub fn ensure_no_nul(value: &str, what: &str) -> Result<()> {
    if value.contains('\0') {
        return Err(CoreError::ValidationError(format!(
            "{}: must not contain NUL characters",
            what
        )));
    }
    Ok(())
}

/// Encode an environment mapping as a UTF-16 environment block
///
/// The block is a run of `KEY=VALUE\0` entries sorted case-insensitively by
/// key and terminated by an extra `\0`. An empty mapping encodes as two NULs.
pub fn encode_environment_block(env: &BTreeMap<String, String>) -> Result<Vec<u16>> {
    let mut entries: Vec<(&String, &String)> = env.iter().collect();
    entries.sort_by_cached_key(|(k, _)| k.to_uppercase());

    let mut block = Vec::new();
    if entries.is_empty() {
        block.push(0);
    }

    for (key, value) in entries {
        if key.is_empty() {
            return Err(CoreError::ValidationError(
                "env: variable name cannot be empty".to_string(),
            ));
        }
        // A leading '=' is allowed for the per-drive current directory entries
        if key.chars().skip(1).any(|c| c == '=') {
            return Err(CoreError::ValidationError(format!(
                "env.{}: variable name cannot contain '='",
                key
            )));
        }
        ensure_no_nul(key, "env")?;
        ensure_no_nul(value, &format!("env.{}", key))?;

        block.extend(key.encode_utf16());
        block.push('=' as u16);
        block.extend(value.encode_utf16());
        block.push(0);
    }
    block.push(0);
    Ok(block)
}
