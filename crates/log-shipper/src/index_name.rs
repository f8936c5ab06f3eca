// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Index name resolution.
//!
//! An index name pattern may contain `%date{<pattern>}` tokens, expanded with the current
//! UTC time. The date pattern uses the common letter notation (`yyyy-MM-dd`, `HH:mm:ss.SSS`,
//! quoted `'literals'`). The expanded name is then made acceptable to the cluster:
//!
//! - uppercase letters are lowercased
//! - `\ / * ? " < > | , :` and spaces are replaced
//! - `.` and `..` are not valid names and are replaced
//! - leading `_`, `-` and `+` are stripped
//! - an empty result becomes `logs`

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};

use crate::error::Error;
use crate::reporter::ErrorReporter;

pub const DEFAULT_REPLACEMENT: &str = "_";
pub const FALLBACK_INDEX_NAME: &str = "logs";

const INVALID_CHARACTERS: [char; 11] = ['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', ':'];
const INVALID_START_CHARACTERS: [char; 3] = ['_', '-', '+'];

/// Resolves `pattern` against the current time with the default replacement.
pub fn resolve_index_name(pattern: &str, reporter: &dyn ErrorReporter) -> String {
    IndexNameResolver::new(pattern, DEFAULT_REPLACEMENT).resolve(reporter)
}

/// Resolves an index name pattern, remembering the last result.
///
/// Diagnostics are only reported when the expanded name changes, so a shipper resolving
/// the name for every batch reports a bad pattern once per distinct name.
#[derive(Debug)]
pub struct IndexNameResolver {
    pattern: String,
    replacement: String,
    last: Mutex<Option<(String, String)>>,
}

impl IndexNameResolver {
    #[must_use]
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn resolve(&self, reporter: &dyn ErrorReporter) -> String {
        self.resolve_at(Utc::now(), reporter)
    }

    pub fn resolve_at(&self, now: DateTime<Utc>, reporter: &dyn ErrorReporter) -> String {
        let (expanded, errors) = expand_dates(&self.pattern, now);

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((last_expanded, last_name)) = last.as_ref() {
            if *last_expanded == expanded {
                return last_name.clone();
            }
        }

        for error in errors {
            reporter.report_error(
                &format!(
                    "Could not convert date pattern in index name '{}'",
                    self.pattern
                ),
                Some(&Error::IndexName(error)),
            );
        }
        let name = sanitize(&expanded, &self.replacement, reporter);
        *last = Some((expanded, name.clone()));
        name
    }
}

#[allow(clippy::expect_used)]
fn date_token_regex() -> &'static Regex {
    static DATE_TOKEN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    DATE_TOKEN.get_or_init(|| Regex::new(r"%date\{([^}]*)\}").expect("valid regex"))
}

/// Expands every `%date{..}` token. Tokens with an invalid date pattern stay as they are
/// and their error is returned.
fn expand_dates(pattern: &str, now: DateTime<Utc>) -> (String, Vec<String>) {
    let mut errors = Vec::new();
    let expanded = date_token_regex()
        .replace_all(pattern, |captures: &Captures| {
            let date_pattern = &captures[1];
            match to_chrono_format(date_pattern) {
                Ok(format) => now.format(&format).to_string(),
                Err(e) => {
                    errors.push(e);
                    captures[0].to_string()
                }
            }
        })
        .into_owned();
    (expanded, errors)
}

/// Translates a letter based date pattern into a chrono format string.
fn to_chrono_format(pattern: &str) -> Result<String, String> {
    if pattern.is_empty() {
        return Err("date pattern is empty".to_string());
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut format = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // '' is an escaped quote, anything else up to the closing quote is literal
            if chars.get(i + 1) == Some(&'\'') {
                format.push('\'');
                i += 2;
                continue;
            }
            let Some(end) = chars[i + 1..].iter().position(|&q| q == '\'') else {
                return Err(format!("unterminated quote in date pattern '{pattern}'"));
            };
            for &literal in &chars[i + 1..i + 1 + end] {
                push_literal(&mut format, literal);
            }
            i += end + 2;
            continue;
        }

        if c.is_ascii_alphabetic() {
            let run = chars[i..].iter().take_while(|&&r| r == c).count();
            let Some(specifier) = specifier(c, run) else {
                return Err(format!(
                    "unsupported field '{}' in date pattern '{pattern}'",
                    c.to_string().repeat(run)
                ));
            };
            format.push_str(specifier);
            i += run;
            continue;
        }

        push_literal(&mut format, c);
        i += 1;
    }

    Ok(format)
}

fn specifier(letter: char, count: usize) -> Option<&'static str> {
    let specifier = match (letter, count) {
        ('y', 2) => "%y",
        ('y', _) => "%Y",
        ('M', 1) => "%-m",
        ('M', 2) => "%m",
        ('M', 3) => "%b",
        ('M', _) => "%B",
        ('d', 1) => "%-d",
        ('d', 2) => "%d",
        ('D', _) => "%j",
        ('H', 1) => "%-H",
        ('H', 2) => "%H",
        ('m', 1) => "%-M",
        ('m', 2) => "%M",
        ('s', 1) => "%-S",
        ('s', 2) => "%S",
        ('S', 3) => "%3f",
        ('S', 6) => "%6f",
        ('S', 9) => "%9f",
        _ => return None,
    };
    Some(specifier)
}

fn push_literal(format: &mut String, c: char) {
    if c == '%' {
        format.push_str("%%");
    } else {
        format.push(c);
    }
}

/// Makes `name` a valid index name, reporting every change.
pub fn sanitize(name: &str, replacement: &str, reporter: &dyn ErrorReporter) -> String {
    let mut name = name.to_string();

    if name.chars().any(char::is_uppercase) {
        let lowercased = name.to_lowercase();
        reporter.report_info(&format!(
            "Index name '{name}' contains uppercase characters, using '{lowercased}' instead"
        ));
        name = lowercased;
    }

    for invalid in INVALID_CHARACTERS {
        if name.contains(invalid) {
            let replaced = name.replace(invalid, replacement);
            reporter.report_info(&format!(
                "Index name '{name}' contains invalid character '{invalid}', using '{replaced}' instead"
            ));
            name = replaced;
        }
    }

    if name == "." || name == ".." {
        reporter.report_error(
            &format!("Index name must not be '{name}', using '{replacement}' instead"),
            Some(&Error::IndexName(name.clone())),
        );
        name = replacement.to_string();
    }

    while let Some(first) = name.chars().next() {
        if !INVALID_START_CHARACTERS.contains(&first) {
            break;
        }
        let stripped = name[first.len_utf8()..].to_string();
        reporter.report_info(&format!(
            "Index name '{name}' must not start with '{first}', using '{stripped}' instead"
        ));
        name = stripped;
    }

    if name.is_empty() {
        name = FALLBACK_INDEX_NAME.to_string();
    }

    name
}
