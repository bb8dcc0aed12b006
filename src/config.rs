//! Runtime configuration from the environment, optionally seeded from a `.env` file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::client::ClientError;

pub const DEFAULT_API_URL: &str = "https://api.netatmo.com";

pub const ENV_CLIENT_ID: &str = "NETATMO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "NETATMO_CLIENT_SECRET";
pub const ENV_USERNAME: &str = "NETATMO_USERNAME";
pub const ENV_PASSWORD: &str = "NETATMO_PASSWORD";
pub const ENV_REFRESH_TOKEN: &str = "NETATMO_REFRESH_TOKEN";
pub const ENV_API_URL: &str = "NETATMO_API_URL";

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Refresh token captured from an earlier session; tried before the password grant.
    pub refresh_token: Option<String>,
    /// API root, without trailing slash.
    pub api_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Config {
            client_id: get(ENV_CLIENT_ID),
            client_secret: get(ENV_CLIENT_SECRET),
            username: get(ENV_USERNAME),
            password: get(ENV_PASSWORD),
            refresh_token: get(ENV_REFRESH_TOKEN),
            api_url: get(ENV_API_URL)
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        }
    }

    pub fn has_password_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Fails listing every missing variable at once.
    pub fn validate(&self) -> Result<(), ClientError> {
        let mut missing = Vec::new();
        if self.client_id.is_none() {
            missing.push(ENV_CLIENT_ID.to_string());
        }
        if self.client_secret.is_none() {
            missing.push(ENV_CLIENT_SECRET.to_string());
        }
        if !self.has_password_credentials() && self.refresh_token.is_none() {
            missing.push(format!("{} and {} (or {})", ENV_USERNAME, ENV_PASSWORD, ENV_REFRESH_TOKEN));
        }

        if missing.is_empty() {
            return Ok(());
        }
        Err(ClientError::Configuration(format!(
            "missing environment variables: {}\n\
             Create a .env file with at least:\n  \
             - {}\n  \
             - {}\n  \
             - {} and {} (for the first authentication)\n  \
             - or {} (if you already have a refresh token)",
            missing.join(", "),
            ENV_CLIENT_ID,
            ENV_CLIENT_SECRET,
            ENV_USERNAME,
            ENV_PASSWORD,
            ENV_REFRESH_TOKEN
        )))
    }
}

/// Loads `KEY=value` assignments into the process environment.
/// Variables already present in the environment are left untouched.
/// Returns the number of variables set.
pub fn load_env_file(path: &Path) -> Result<usize, String> {
    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    let mut applied = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        let Some((key, value)) = parse_env_line(&line).map_err(|e| format!("{}:{}: {}", path.display(), index + 1, e))?
        else {
            continue;
        };
        if std::env::var_os(&key).is_none() {
            // Single-threaded at this point: called before logging or any client starts.
            unsafe {
                std::env::set_var(key, value);
            }
            applied += 1;
        }
    }
    Ok(applied)
}

/// Parses one `.env` line. Blank lines and comments yield `None`.
pub fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let assignment = trimmed.strip_prefix("export ").map(str::trim_start).unwrap_or(trimmed);

    let (key, raw_value) = assignment
        .split_once('=')
        .ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let raw_value = raw_value.trim();
    let value = if let Some(rest) = raw_value.strip_prefix('"') {
        unquote(rest, '"', true)?
    } else if let Some(rest) = raw_value.strip_prefix('\'') {
        unquote(rest, '\'', false)?
    } else {
        strip_inline_comment(raw_value).to_string()
    };
    Ok(Some((key.to_string(), value)))
}

/// An unquoted value only ends at a `#` preceded by whitespace.
fn strip_inline_comment(value: &str) -> &str {
    let end = value
        .char_indices()
        .find(|&(i, c)| c == '#' && value[..i].ends_with(char::is_whitespace))
        .map_or(value.len(), |(i, _)| i);
    value[..end].trim_end()
}

fn unquote(input: &str, quote: char, escapes: bool) -> Result<String, String> {
    let mut out = String::new();
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if escapes && ch == '\\' {
            let escaped = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence in quoted value".to_string())?;
            out.push(match escaped {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
        } else if ch == quote {
            let rest = chars.as_str().trim();
            if rest.is_empty() || rest.starts_with('#') {
                return Ok(out);
            }
            return Err(format!("unexpected characters after closing {} quote", quote));
        } else {
            out.push(ch);
        }
    }
    Err(format!("unterminated {}-quoted value", quote))
}
