//! Sensitive data: placeholder substitution and redaction.
//!
//! The model only ever sees placeholder names. It writes
//! `<secret>name</secret>` into action parameters; the real value is
//! substituted right before the handler runs and redacted back out of any
//! text that flows toward the model or the run log.

use regex_lite::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use wayfarer_core::error::ActionError;

static SECRET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<secret>(\w+)</secret>").expect("secret tag pattern is valid"));

/// Placeholder name → real value for one task.
#[derive(Clone, Default)]
pub struct SensitiveData {
    values: BTreeMap<String, String>,
}

impl std::fmt::Debug for SensitiveData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensitiveData")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SensitiveData {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Whether `text` contains any placeholder tag.
    pub fn has_placeholders(text: &str) -> bool {
        SECRET_TAG.is_match(text)
    }

    /// Replace every `<secret>name</secret>` with its value.
    ///
    /// Returns the substituted text and the names that were used. An unknown
    /// name is an error; nothing is partially substituted.
    pub fn substitute(&self, text: &str) -> Result<(String, Vec<String>), ActionError> {
        if let Some(unknown) = SECRET_TAG
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .find(|name| !self.values.contains_key(name))
        {
            return Err(ActionError::UnknownSecret(unknown));
        }

        let mut used = Vec::new();
        let replaced = SECRET_TAG.replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            used.push(name.to_string());
            self.values.get(name).cloned().unwrap_or_default()
        });
        Ok((replaced.into_owned(), used))
    }

    /// Replace every real value in `text` with its placeholder tag.
    ///
    /// Longer values are replaced first so a value that contains another
    /// value is not split.
    pub fn redact(&self, text: &str) -> String {
        let mut pairs: Vec<(&String, &String)> =
            self.values.iter().filter(|(_, v)| !v.is_empty()).collect();
        pairs.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut out = text.to_string();
        for (name, value) in pairs {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), &format!("<secret>{name}</secret>"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> SensitiveData {
        SensitiveData::new(BTreeMap::from([
            ("user".to_string(), "alice".to_string()),
            ("password".to_string(), "s3cr3t!".to_string()),
        ]))
    }

    #[test]
    fn substitutes_known_placeholders() {
        let (text, used) = data()
            .substitute("login <secret>user</secret> / <secret>password</secret>")
            .unwrap();
        assert_eq!(text, "login alice / s3cr3t!");
        assert_eq!(used, vec!["user", "password"]);
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let err = data().substitute("<secret>token</secret>").unwrap_err();
        assert!(matches!(err, ActionError::UnknownSecret(ref n) if n == "token"));
    }

    #[test]
    fn plain_text_passes_through() {
        let (text, used) = data().substitute("no secrets here").unwrap();
        assert_eq!(text, "no secrets here");
        assert!(used.is_empty());
    }

    #[test]
    fn redacts_values() {
        let redacted = data().redact("typed s3cr3t! for alice");
        assert_eq!(
            redacted,
            "typed <secret>password</secret> for <secret>user</secret>"
        );
    }

    #[test]
    fn debug_hides_values() {
        let debug = format!("{:?}", data());
        assert!(debug.contains("password"));
        assert!(!debug.contains("s3cr3t!"));
    }

    #[test]
    fn substitution_and_redaction_are_inverse() {
        let data = data();
        let (typed, _) = data.substitute("<secret>password</secret>").unwrap();
        assert_eq!(typed, "s3cr3t!");
        assert_eq!(data.redact(&typed), "<secret>password</secret>");
    }

    #[test]
    fn detects_placeholders() {
        assert!(SensitiveData::has_placeholders("<secret>x</secret>"));
        assert!(!SensitiveData::has_placeholders("<secret></secret>"));
    }
}
