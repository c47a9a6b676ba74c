//! Password resolution.
//!
//! The password is looked up, in order, in:
//! 1. a file (first line, surrounding whitespace trimmed)
//! 2. the `MAILGRAB_PASSWORD` environment variable
//! 3. an interactive prompt that does not echo
//!
//! It is wrapped in a [`SecretString`] as soon as it is read.

use std::path::Path;

use secrecy::SecretString;

use crate::error::{MailgrabError, Result};

/// Environment variable consulted when no password file is given.
pub const PASSWORD_ENV: &str = "MAILGRAB_PASSWORD";

/// Resolve the password from `file`, then the `env_var` variable, then `prompt`.
pub fn resolve_password(
    file: Option<&Path>,
    env_var: &str,
    prompt: impl FnOnce() -> std::io::Result<String>,
) -> Result<SecretString> {
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path).map_err(|e| MailgrabError::io(path, e))?;
        let password = contents.lines().next().unwrap_or_default().trim();
        if password.is_empty() {
            return Err(MailgrabError::Secret(format!(
                "password file '{}' is empty",
                path.display()
            )));
        }
        return Ok(SecretString::from(password.to_string()));
    }

    match std::env::var(env_var) {
        Ok(value) if !value.is_empty() => return Ok(SecretString::from(value)),
        Ok(_) | Err(std::env::VarError::NotPresent) => {}
        Err(std::env::VarError::NotUnicode(_)) => {
            return Err(MailgrabError::Secret(format!(
                "environment variable {env_var} is not valid UTF-8"
            )))
        }
    }

    let entered = prompt().map_err(|e| MailgrabError::Secret(e.to_string()))?;
    let entered = entered.trim_end_matches(['\r', '\n']);
    if entered.is_empty() {
        return Err(MailgrabError::Secret("no password entered".into()));
    }
    Ok(SecretString::from(entered.to_string()))
}

/// Ask for the password on the terminal without echoing it.
pub fn prompt_hidden(address: &str) -> std::io::Result<String> {
    rpassword::prompt_password(format!("Password for {address}: "))
}
