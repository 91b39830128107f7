//! Command tokenization and validation.
//!
//! User commands are split with POSIX-style quoting rules and passed to
//! the transcoder as a plain argv, never through a shell. The validator
//! additionally rejects shell metacharacters as defense-in-depth against
//! downstream mis-handling and transcoder options that shell out
//! themselves.

use crate::runtime::types::TaskError;

/// The placeholder token users put where the staged input path goes.
///
/// Matching is exact: a token must *equal* the placeholder, not merely
/// contain it. Tokens that embed it (`prefix${INPUT_MEDIA}`) fail the
/// metacharacter check because of the `$`.
pub const INPUT_MEDIA_PLACEHOLDER: &str = "${INPUT_MEDIA}";

const FORBIDDEN: &[char] = &['|', '&', ';', '`', '$', '(', ')', '<', '>'];

#[derive(PartialEq)]
enum QuoteState {
    None,
    Single,
    Double,
}

/// Split a command string into an argument vector.
///
/// Supports single quotes (everything literal), double quotes
/// (backslash escapes `"`, `\`, `` ` `` and `$`), and bare backslash
/// escapes. No variable, glob, or command-substitution expansion is
/// performed; this only splits.
pub fn split_command(command: &str) -> Result<Vec<String>, TaskError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut state = QuoteState::None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match state {
            QuoteState::None => match c {
                '\'' => {
                    state = QuoteState::Single;
                    in_token = true;
                }
                '"' => {
                    state = QuoteState::Double;
                    in_token = true;
                }
                '\\' => match chars.next() {
                    Some(next) => {
                        current.push(next);
                        in_token = true;
                    }
                    None => {
                        return Err(TaskError::Syntax(
                            "trailing backslash at end of command".into(),
                        ))
                    }
                },
                c if c.is_whitespace() => {
                    if in_token {
                        args.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
            QuoteState::Single => match c {
                '\'' => state = QuoteState::None,
                c => current.push(c),
            },
            QuoteState::Double => match c {
                '"' => state = QuoteState::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => {
                        return Err(TaskError::Syntax("unterminated double quote".into()));
                    }
                },
                c => current.push(c),
            },
        }
    }

    if state != QuoteState::None {
        return Err(TaskError::Syntax("unterminated quote".into()));
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

/// Validate a split argument vector.
///
/// Requires at least one token equal to [`INPUT_MEDIA_PLACEHOLDER`] and
/// rejects any other token containing a shell metacharacter.
pub fn validate_args(args: &[String]) -> Result<(), TaskError> {
    let mut has_input = false;
    for arg in args {
        if arg == INPUT_MEDIA_PLACEHOLDER {
            has_input = true;
        } else if arg.contains(FORBIDDEN) {
            return Err(TaskError::DisallowedCharacter(arg.clone()));
        }
    }

    if !has_input {
        return Err(TaskError::MissingPlaceholder);
    }
    Ok(())
}
