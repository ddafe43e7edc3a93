/// Database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Caller-supplied tool parameter overrides (logical name -> scalar value).
///
/// Keys iterate in sorted order, so the generated flag list is deterministic.
pub type Overrides = serde_json::Map<String, serde_json::Value>;
