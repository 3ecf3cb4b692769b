//! Configuration validation engine.
//!
//! Detects unknown/misspelled fields in TOML files and checks a loaded
//! [`BridgeConfig`] for missing credentials and risky settings.

use secrecy::ExposeSecret;

use crate::schema::BridgeConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "missing", "range", "security"
    pub category: &'static str,
    /// Dotted path, e.g. "whatsapp.access_token"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.category, self.path, self.message
        )
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: &str,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Known sections and their fields.
const KNOWN_FIELDS: &[(&str, &[&str])] = &[
    ("server", &["bind", "port"]),
    (
        "whatsapp",
        &[
            "access_token",
            "phone_number_id",
            "verify_token",
            "app_secret",
            "api_base_url",
            "request_timeout_secs",
        ],
    ),
    ("access", &["allowed_senders"]),
    ("poller", &["list_url", "interval_secs"]),
    (
        "processor",
        &["interval_secs", "ack_replies", "task_template", "ack_template"],
    ),
    ("responder", &["max_attempts", "retry_delay_ms"]),
    ("queue", &["data_dir"]),
];

/// Levenshtein distance, used for "did you mean" suggestions.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

fn unknown_field_message(key: &str, candidates: &[&str]) -> String {
    match suggest(key, candidates, 3) {
        Some(s) => format!("unknown field \"{key}\" (did you mean \"{s}\"?)"),
        None => format!("unknown field \"{key}\""),
    }
}

/// Validate raw TOML: syntax, unknown fields, then semantic checks.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut result = ValidationResult::default();

    let table: toml::Table = match toml_str.parse() {
        Ok(t) => t,
        Err(e) => {
            result.push(Severity::Error, "syntax", "", e.to_string());
            return result;
        },
    };

    let sections: Vec<&str> = KNOWN_FIELDS.iter().map(|(s, _)| *s).collect();
    for (key, value) in &table {
        let Some((_, fields)) = KNOWN_FIELDS.iter().find(|(s, _)| s == key) else {
            result.push(
                Severity::Warning,
                "unknown-field",
                key,
                unknown_field_message(key, &sections),
            );
            continue;
        };
        if let Some(inner) = value.as_table() {
            for field in inner.keys() {
                if !fields.contains(&field.as_str()) {
                    result.push(
                        Severity::Warning,
                        "unknown-field",
                        &format!("{key}.{field}"),
                        unknown_field_message(field, fields),
                    );
                }
            }
        }
    }

    match toml::from_str::<BridgeConfig>(toml_str) {
        Ok(config) => result.diagnostics.extend(validate(&config).diagnostics),
        Err(e) => result.push(Severity::Error, "syntax", "", e.to_string()),
    }

    result
}

/// Semantic checks on a fully loaded config (file + environment).
#[must_use]
pub fn validate(config: &BridgeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let wa = &config.whatsapp;

    if wa.access_token.expose_secret().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "whatsapp.access_token",
            "access token is required (TASKBRIDGE_ACCESS_TOKEN)",
        );
    }
    if wa.phone_number_id.trim().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "whatsapp.phone_number_id",
            "phone number ID is required (TASKBRIDGE_PHONE_NUMBER_ID)",
        );
    }
    if wa.verify_token.expose_secret().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "whatsapp.verify_token",
            "webhook verify token is required (TASKBRIDGE_VERIFY_TOKEN)",
        );
    }
    if !is_http_url(&wa.api_base_url) {
        result.push(
            Severity::Error,
            "range",
            "whatsapp.api_base_url",
            format!("expected an http(s) URL, got {:?}", wa.api_base_url),
        );
    }
    if wa.request_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "range",
            "whatsapp.request_timeout_secs",
            "request timeout must be at least 1 second",
        );
    }
    if wa.app_secret.is_none() {
        result.push(
            Severity::Warning,
            "security",
            "whatsapp.app_secret",
            "app secret not set; webhook signatures will not be verified",
        );
    }

    if config.access.allowed_senders.is_empty() {
        result.push(
            Severity::Warning,
            "security",
            "access.allowed_senders",
            "allowlist is empty; every inbound message will be dropped",
        );
    }

    if let Some(url) = config.poller.list_url.as_deref()
        && config.poller.enabled()
        && !is_http_url(url)
    {
        result.push(
            Severity::Error,
            "range",
            "poller.list_url",
            format!("expected an http(s) URL, got {url:?}"),
        );
    }
    if config.poller.enabled() && config.poller.interval_secs == 0 {
        result.push(
            Severity::Error,
            "range",
            "poller.interval_secs",
            "poll interval must be at least 1 second",
        );
    }

    if config.processor.interval_secs == 0 {
        result.push(
            Severity::Error,
            "range",
            "processor.interval_secs",
            "processor interval must be at least 1 second",
        );
    }
    if !config.processor.task_template.contains("{body}") {
        result.push(
            Severity::Warning,
            "range",
            "processor.task_template",
            "template has no {body} placeholder; message text will be dropped",
        );
    }

    if config.responder.max_attempts == 0 {
        result.push(
            Severity::Error,
            "range",
            "responder.max_attempts",
            "at least one send attempt is required",
        );
    }

    if config.server.port == 0 {
        result.push(
            Severity::Info,
            "range",
            "server.port",
            "port 0 binds a random free port",
        );
    }

    result
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
