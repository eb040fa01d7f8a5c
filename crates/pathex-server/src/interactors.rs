//! Custom interactor submissions.
//!
//! A submission is a named list of plain-text interaction tuples. It is parsed once, stored in
//! the token store under a token derived from its name and raw bytes, and can then be used to
//! decorate renders. Re-submitting identical content under the same name yields the same token.

use pathex_cache::{SaveOutcome, Token, TokenStore};
use pathex_core::ExportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

const MAX_NAME_CHARS: usize = 256;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub a: String,
    pub b: String,
    pub score: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTuples {
    pub interactions: Vec<Interaction>,
    pub warnings: Vec<String>,
}

/// Parses one interaction per line.
///
/// Fields are separated by tabs, commas or runs of whitespace. Blank lines and lines starting
/// with `#` are skipped. Anything else that is not two identifiers plus an optional numeric
/// score becomes a warning naming its 1-based line number.
pub fn parse_tuples(text: &str) -> ParsedTuples {
    let mut parsed = ParsedTuples::default();
    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line
            .split(|c: char| c == '\t' || c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .collect();
        match fields.as_slice() {
            [a, b] => parsed.interactions.push(Interaction {
                a: (*a).to_owned(),
                b: (*b).to_owned(),
                score: None,
            }),
            [a, b, score] => match score.parse::<f64>() {
                Ok(score) if score.is_finite() => parsed.interactions.push(Interaction {
                    a: (*a).to_owned(),
                    b: (*b).to_owned(),
                    score: Some(score),
                }),
                _ => parsed
                    .warnings
                    .push(format!("line {line_no}: score {score:?} is not a number")),
            },
            _ => parsed.warnings.push(format!(
                "line {line_no}: expected 2 or 3 fields, found {}",
                fields.len()
            )),
        }
    }
    parsed
}

/// What the token store holds for a submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredInteractors {
    pub name: String,
    pub interactions: Vec<Interaction>,
    pub warnings: Vec<String>,
}

impl StoredInteractors {
    fn summary(&self, token: &Token) -> SubmissionSummary {
        let interactors: BTreeSet<&str> = self
            .interactions
            .iter()
            .flat_map(|interaction| [interaction.a.as_str(), interaction.b.as_str()])
            .collect();
        SubmissionSummary {
            token: token.to_string(),
            name: self.name.clone(),
            interactors: interactors.len(),
            interactions: self.interactions.len(),
            warnings: self.warnings.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub token: String,
    pub name: String,
    /// Distinct identifiers across all interactions.
    pub interactors: usize,
    pub interactions: usize,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct InteractorService {
    store: Arc<TokenStore>,
    max_payload_bytes: u64,
    fetch_timeout: Duration,
}

impl InteractorService {
    pub fn new(store: Arc<TokenStore>, max_payload_bytes: u64) -> Self {
        Self {
            store,
            max_payload_bytes,
            fetch_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn max_payload_bytes(&self) -> u64 {
        self.max_payload_bytes
    }

    /// Parses and stores `payload` under `name`. Blocking; async callers use the blocking pool.
    pub fn submit(&self, name: &str, payload: &[u8]) -> Result<SubmissionSummary, ExportError> {
        let name = validate_name(name)?;
        if payload.len() as u64 > self.max_payload_bytes {
            return Err(ExportError::Unsupported(format!(
                "payload exceeds {} bytes",
                self.max_payload_bytes
            )));
        }
        let text = std::str::from_utf8(payload)
            .map_err(|_| ExportError::Unsupported("payload is not valid UTF-8".to_owned()))?;

        let parsed = parse_tuples(text);
        if parsed.interactions.is_empty() {
            return Err(ExportError::Unsupported(format!(
                "no valid interactions in submission {name:?}"
            )));
        }

        let token = Token::derive(name, payload);
        let stored = StoredInteractors {
            name: name.to_owned(),
            interactions: parsed.interactions,
            warnings: parsed.warnings,
        };
        let outcome = self.store.save(&token, &stored).map_err(|err| {
            tracing::error!(
                target: "pathex.tokens",
                token = %token,
                error = %err,
                "failed to store interactor submission"
            );
            ExportError::Internal("failed to store submission".to_owned())
        })?;

        tracing::info!(
            target: "pathex.tokens",
            token = %token,
            name,
            interactions = stored.interactions.len(),
            warnings = stored.warnings.len(),
            reused = outcome == SaveOutcome::AlreadyPresent,
            "stored interactor submission"
        );
        Ok(stored.summary(&token))
    }

    /// Downloads a payload from `url`, refusing anything larger than the payload cap.
    pub fn fetch_url(&self, url: &str) -> Result<Vec<u8>, ExportError> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ExportError::Unsupported(format!(
                "only http(s) URLs can be fetched, got {url:?}"
            )));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(self.fetch_timeout)
            .build();
        let response = agent.get(url).call().map_err(|err| {
            let message = match err {
                ureq::Error::Status(code, _response) => {
                    format!("server returned status {code} for {url}")
                }
                ureq::Error::Transport(transport) => {
                    format!("transport error for {url}: {transport}")
                }
            };
            ExportError::Unsupported(message)
        })?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(self.max_payload_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|err| ExportError::Unsupported(format!("failed to read {url}: {err}")))?;
        if body.len() as u64 > self.max_payload_bytes {
            return Err(ExportError::Unsupported(format!(
                "payload at {url} exceeds {} bytes",
                self.max_payload_bytes
            )));
        }
        Ok(body)
    }

    /// `None` for unknown, expired or malformed tokens.
    pub fn summary(&self, raw_token: &str) -> Option<SubmissionSummary> {
        let token = Token::parse(raw_token)?;
        let stored: StoredInteractors = self.store.load(&token)?;
        Some(stored.summary(&token))
    }
}

fn validate_name(name: &str) -> Result<&str, ExportError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ExportError::Unsupported(
            "submission name must not be empty".to_owned(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS || name.chars().any(char::is_control) {
        return Err(ExportError::Unsupported(format!(
            "invalid submission name {name:?}"
        )));
    }
    Ok(name)
}
