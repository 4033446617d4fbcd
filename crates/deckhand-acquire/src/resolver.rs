use std::{fmt, sync::OnceLock};

use regex::Regex;

use crate::error::ResolveError;

/// Length of the identifiers issued by the storage provider.
pub const TOKEN_LEN: usize = 33;

const TOKEN_CLASS: &str = "[A-Za-z0-9_-]";

/// Canonical handle for a remote archive, e.g. a Drive file id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier(String);

impl ResourceIdentifier {
    /// Accepts a raw token of at least [`TOKEN_LEN`] token characters.
    pub fn new(token: &str) -> Result<Self, ResolveError> {
        let valid = token.len() >= TOKEN_LEN
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(token.to_string()))
        } else {
            Err(ResolveError::NotFound {
                input: token.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extraction patterns in precedence order; capture group 1 is the token.
fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let token = format!("({TOKEN_CLASS}{{{TOKEN_LEN},}})");
        [
            token.clone(),
            format!(r"(?i:/d/){token}(?:[/?]|$)"),
            format!(r"(?i:file/d/){token}"),
            format!(r"(?i:id=){token}"),
            format!(r#"(?i:uc\?)[^"]*(?i:id=){token}"#),
        ]
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::error!("invalid identifier pattern {pattern}: {err}");
                None
            }
        })
        .collect()
    })
}

fn normalize_input(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed.strip_prefix('/').unwrap_or(trimmed).trim()
}

/// Resolves free-form operator text (a bare id or a share link) into an id.
pub fn resolve(text: &str) -> Result<ResourceIdentifier, ResolveError> {
    let input = normalize_input(text);
    for pattern in patterns() {
        if let Some(token) = pattern.captures(input).and_then(|caps| caps.get(1)) {
            tracing::debug!("resolved identifier with pattern {}", pattern.as_str());
            return Ok(ResourceIdentifier(token.as_str().to_string()));
        }
    }
    Err(ResolveError::NotFound {
        input: text.trim().to_string(),
    })
}

/// Examples shown to the operator when resolution fails.
pub const EXAMPLE_INPUTS: [&str; 2] = [
    "1k1TS7j5jv05xo_mBqU1kitYPyOIJDkJv",
    "https://drive.google.com/file/d/1k1TS7j5jv05xo_mBqU1kitYPyOIJDkJv/view",
];

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "1k1TS7j5jv05xo_mBqU1kitYPyOIJDkJv";
    const OTHER: &str = "Zz9-8yXwVuTsRqPoNmLkJiHgFeDcBa765";

    #[test]
    fn fixtures_have_provider_length() {
        assert_eq!(TOKEN.len(), TOKEN_LEN);
        assert_eq!(OTHER.len(), TOKEN_LEN);
    }

    #[test]
    fn resolves_every_accepted_shape() {
        let inputs = [
            TOKEN.to_string(),
            format!("https://drive.google.com/drive/folders/x/d/{TOKEN}/edit"),
            format!("https://drive.google.com/file/d/{TOKEN}"),
            format!("https://drive.google.com/open?usp=sharing&id={TOKEN}"),
            format!("https://drive.google.com/uc?export=download&id={TOKEN}"),
        ];
        for input in inputs {
            let id = resolve(&input).unwrap();
            assert_eq!(id.as_str(), TOKEN, "input: {input}");
        }
    }

    #[test]
    fn strips_whitespace_and_one_leading_slash() {
        let id = resolve(&format!("  /{TOKEN}\n")).unwrap();
        assert_eq!(id.as_str(), TOKEN);
    }

    #[test]
    fn structural_markers_ignore_case() {
        let id = resolve(&format!("HTTPS://DRIVE.GOOGLE.COM/FILE/D/{TOKEN}/VIEW")).unwrap();
        assert_eq!(id.as_str(), TOKEN);
    }

    #[test]
    fn token_case_is_preserved() {
        let upper = TOKEN.to_ascii_uppercase();
        assert_eq!(resolve(&upper).unwrap().as_str(), upper);
        assert_ne!(resolve(&upper).unwrap().as_str(), TOKEN);
    }

    #[test]
    fn bare_token_wins_over_structured_token() {
        let input = format!("{OTHER} https://drive.google.com/file/d/{TOKEN}/view");
        assert_eq!(resolve(&input).unwrap().as_str(), OTHER);

        let input = format!("https://drive.google.com/file/d/{TOKEN}/view?id={OTHER}");
        assert_eq!(resolve(&input).unwrap().as_str(), TOKEN);
    }

    #[test]
    fn long_runs_are_kept_whole() {
        let id = resolve("https://store.example/file/d/ABCDEFGHIJKLMNOPQRSTUVWXYZ012345678/view")
            .unwrap();
        assert_eq!(id.as_str(), "ABCDEFGHIJKLMNOPQRSTUVWXYZ012345678");
    }

    #[test]
    fn short_or_missing_tokens_are_not_found() {
        for input in [
            "",
            "   ",
            "ABC123",
            "https://drive.google.com/file/d/ABC123/view",
            "https://drive.google.com/uc?id=short-token",
            "1k1TS7j5jv05xo.mBqU1kitYPyOIJDkJv",
        ] {
            assert!(
                matches!(resolve(input), Err(ResolveError::NotFound { .. })),
                "input: {input}"
            );
        }
    }

    #[test]
    fn identifier_constructor_validates_charset_and_length() {
        assert!(ResourceIdentifier::new(TOKEN).is_ok());
        assert!(ResourceIdentifier::new("short").is_err());
        assert!(ResourceIdentifier::new(&format!("{}!", &TOKEN[..32])).is_err());
    }
}
