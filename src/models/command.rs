use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Tokens that survive POSIX shell parsing without quoting.
static SHELL_SAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_@%+=:,./-]+$").expect("Invalid shell-safe regex"));

/// Tokens that need quoting for `cmd.exe` display.
static WINDOWS_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s()]").expect("Invalid windows quoting regex"));

const REDACTED: &str = "******";

/// One external program invocation: `[executable, ...flags, target]`.
///
/// Tokens are passed to the OS as-is; quoting only happens in
/// [`preview`](Self::preview). Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildCommand {
    tokens: Vec<String>,
    sensitive: Vec<usize>,
}

impl BuildCommand {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            sensitive: Vec::new(),
        }
    }

    /// Mark the token at `index` as secret so it never reaches logs or previews.
    pub fn with_sensitive(mut self, index: usize) -> Self {
        if index < self.tokens.len() && !self.sensitive.contains(&index) {
            self.sensitive.push(index);
        }
        self
    }

    pub fn program(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn display_tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().enumerate().map(|(i, token)| {
            if self.sensitive.contains(&i) {
                REDACTED
            } else {
                token.as_str()
            }
        })
    }

    /// Tokens joined by single spaces, secrets redacted.
    pub fn display_line(&self) -> String {
        self.display_tokens().collect::<Vec<_>>().join(" ")
    }

    /// Shell-quoted rendering for the host platform, secrets redacted.
    pub fn preview(&self) -> String {
        self.display_tokens()
            .map(quote_token)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Quote a single token for display using the host platform convention.
pub fn quote_token(token: &str) -> String {
    if cfg!(windows) {
        quote_windows(token)
    } else {
        quote_posix(token)
    }
}

/// `cmd.exe` style: wrap in double quotes when whitespace or parentheses appear.
pub fn quote_windows(token: &str) -> String {
    if token.is_empty() {
        "\"\"".to_string()
    } else if WINDOWS_UNSAFE.is_match(token) {
        format!("\"{}\"", token)
    } else {
        token.to_string()
    }
}

/// POSIX shell style: single quotes, embedded `'` written as `'\''`.
pub fn quote_posix(token: &str) -> String {
    if token.is_empty() {
        "''".to_string()
    } else if SHELL_SAFE.is_match(token) {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
