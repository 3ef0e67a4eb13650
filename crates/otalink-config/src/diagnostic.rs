// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration errors as miette diagnostics.
//!
//! Unknown names are checked against the section layout of
//! [`OtalinkConfig`]: a key that belongs to another section is reported as
//! misplaced, anything else is matched against the keys of its own section.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::collections::BTreeMap;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::OtalinkConfig;

/// Minimum Jaro-Winkler similarity for a name to be offered as a fix.
const SIMILARITY_FLOOR: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration section `[{section}]`")]
    #[diagnostic(
        code(otalink::config::unknown_section),
        help("{}", name_help(suggestion.as_deref(), "sections", valid_sections))
    )]
    UnknownSection {
        section: String,
        suggestion: Option<String>,
        valid_sections: String,
        #[label("not an otalink section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("unknown key `{key}` in `[{section}]`")]
    #[diagnostic(
        code(otalink::config::unknown_key),
        help("{}", name_help(suggestion.as_deref(), "keys", valid_keys))
    )]
    UnknownKey {
        key: String,
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a key of this section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("key `{key}` does not belong in `[{section}]`")]
    #[diagnostic(
        code(otalink::config::misplaced_key),
        help("move `{key}` to the `[{home}]` section")
    )]
    MisplacedKey {
        key: String,
        section: String,
        home: String,
        #[label("defined in `[{home}]`")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(otalink::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(code(otalink::config::missing_key))]
    MissingKey { key: String },

    #[error("validation error: {message}")]
    #[diagnostic(code(otalink::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(otalink::config::other))]
    Other(String),
}

fn name_help(suggestion: Option<&str>, what: &str, valid: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid {what}: {valid}"),
        None => format!("valid {what}: {valid}"),
    }
}

/// Section name to key names, read off the serialized defaults so it can
/// never disagree with the model.
struct Layout(BTreeMap<String, Vec<String>>);

impl Layout {
    fn of_defaults() -> Self {
        let mut sections = BTreeMap::new();
        if let Ok(toml::Value::Table(root)) = toml::Value::try_from(OtalinkConfig::default()) {
            for (name, value) in root {
                if let toml::Value::Table(keys) = value {
                    sections.insert(name, keys.into_iter().map(|(key, _)| key).collect());
                }
            }
        }
        Self(sections)
    }

    /// The section other than `section` that defines `key`.
    fn home_of(&self, key: &str, section: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, keys)| name.as_str() != section && keys.iter().any(|k| k == key))
            .map(|(name, _)| name.as_str())
    }
}

/// Converts a `figment::Error` (which may hold several errors) into
/// diagnostics. `toml_sources` pairs file paths with their content and is
/// used to point at the offending line.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    let layout = Layout::of_defaults();
    err.into_iter()
        .map(|error| {
            let section = error.path.first().cloned();
            match (&error.kind, section) {
                (Kind::UnknownField(name, expected), None) => {
                    let (span, src) = locate(&error, None, name, toml_sources);
                    ConfigError::UnknownSection {
                        section: name.clone(),
                        suggestion: closest(name, expected),
                        valid_sections: expected.join(", "),
                        span,
                        src,
                    }
                }
                (Kind::UnknownField(key, expected), Some(section)) => {
                    let (span, src) = locate(&error, Some(&section), key, toml_sources);
                    match layout.home_of(key, &section) {
                        Some(home) => ConfigError::MisplacedKey {
                            key: key.clone(),
                            home: home.to_string(),
                            section,
                            span,
                            src,
                        },
                        None => ConfigError::UnknownKey {
                            key: key.clone(),
                            suggestion: closest(key, expected),
                            valid_keys: expected.join(", "),
                            section,
                            span,
                            src,
                        },
                    }
                }
                (Kind::MissingField(field), _) => ConfigError::MissingKey {
                    key: error
                        .path
                        .iter()
                        .map(String::as_str)
                        .chain([field.as_ref()])
                        .collect::<Vec<_>>()
                        .join("."),
                },
                (Kind::InvalidType(actual, expected) | Kind::InvalidValue(actual, expected), _) => {
                    ConfigError::InvalidType {
                        key: error.path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Span of `name` in whichever TOML source produced `error`.
fn locate(
    error: &figment::error::Error,
    section: Option<&str>,
    name: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    // Inline sources carry no file metadata.
    let source = match origin {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };

    source
        .and_then(|(path, content)| {
            let offset = name_offset(content, section, name)?;
            Some((
                Some(SourceSpan::new(offset.into(), name.len())),
                Some(NamedSource::new(path, content.clone())),
            ))
        })
        .unwrap_or((None, None))
}

/// Byte offset of `name` in `content`. With a `section`, finds the key
/// assignment inside that section; without one, finds a section header
/// or top-level key of that name.
pub fn name_offset(content: &str, section: Option<&str>, name: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let body = line.trim_start();
        let indent = line.len() - body.len();
        if let Some(header) = body.strip_prefix('[') {
            current = header.split(']').next().map(str::trim);
            let lead = header.len() - header.trim_start().len();
            if section.is_none() && current == Some(name) {
                return Some(offset + indent + 1 + lead);
            }
        } else if current == section
            && body
                .strip_prefix(name)
                .is_some_and(|rest| rest.trim_start().starts_with('='))
        {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

/// Closest candidate to `unknown` above [`SIMILARITY_FLOOR`].
pub fn closest(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|c| (strsim::jaro_winkler(unknown, c), *c))
        .filter(|(score, _)| *score > SIMILARITY_FLOOR)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.to_string())
}

/// Renders errors to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_knows_every_section() {
        let layout = Layout::of_defaults();
        let sections: Vec<_> = layout.0.keys().map(String::as_str).collect();
        assert_eq!(
            sections,
            ["bus", "dispatch", "facade", "log", "queue", "storage", "update"]
        );
        assert_eq!(layout.home_of("max_retries", "update"), Some("queue"));
        assert_eq!(layout.home_of("max_retries", "queue"), None);
        assert_eq!(layout.home_of("nonsense", "queue"), None);
    }

    #[test]
    fn closest_picks_the_nearest_key() {
        let keys = &["default_ttl_ms", "max_retries", "sweep_batch_size", "claim_lease_ms"];
        assert_eq!(closest("max_retrys", keys), Some("max_retries".to_string()));
        assert_eq!(closest("zzzzzz", &["capacity"]), None);
    }

    #[test]
    fn name_offset_is_scoped_to_section() {
        let content = "[queue]\nmax_retries = 3\n\n[update]\nmax_retrys = 1\n";
        let offset = name_offset(content, Some("update"), "max_retrys").unwrap();
        assert_eq!(&content[offset..offset + 10], "max_retrys");
        assert_eq!(name_offset(content, Some("queue"), "max_retrys"), None);
    }

    #[test]
    fn name_offset_finds_section_headers() {
        let content = "[bus]\n   capacity= 8\n\n[ telemtry ]\nenabled = true\n";
        let offset = name_offset(content, None, "telemtry").unwrap();
        assert_eq!(&content[offset..offset + 8], "telemtry");

        let offset = name_offset(content, Some("bus"), "capacity").unwrap();
        assert_eq!(offset, content.find("capacity").unwrap());
    }
}
