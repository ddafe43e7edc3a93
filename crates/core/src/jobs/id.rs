//! Job identifiers.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

/// Accepted job id shape. Ids double as file-name stems in the job store.
pub const JOB_ID_PATTERN: &str = r"^[a-f0-9-]+$";

/// Upper bound on id length; generated ids are 36 characters.
const MAX_JOB_ID_LEN: usize = 64;

static JOB_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(JOB_ID_PATTERN).expect("valid regex"));

/// Opaque, validated job identifier.
///
/// The only ways to obtain one are [`JobId::generate`] and [`JobId::parse`],
/// so a `JobId` is always safe to embed in a path or URL component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

/// A raw id that does not match [`JOB_ID_PATTERN`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("Invalid job id '{0}': must match {JOB_ID_PATTERN}")]
pub struct InvalidJobId(pub String);

impl JobId {
    /// Allocate a fresh id (UUID v4, lowercase hyphenated).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied id.
    pub fn parse(raw: &str) -> Result<Self, InvalidJobId> {
        if raw.len() > MAX_JOB_ID_LEN || !JOB_ID_RE.is_match(raw) {
            return Err(InvalidJobId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
