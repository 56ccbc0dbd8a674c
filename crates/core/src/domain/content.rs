// Content Domain Model
//
// Content hashes are for deduplication, not for security.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content row shared by every queue item carrying the same normalized text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub content: String,
    pub content_type: Option<String>,
    pub platform: Option<String>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// Canonical form used for hashing
///
/// Lower-cases, trims, and collapses blank lines and runs of spaces so that
/// cosmetic edits of the same post hash identically.
pub fn normalize_content(content: &str) -> String {
    let mut normalized = content.trim().to_lowercase();
    while normalized.contains("\n\n") {
        normalized = normalized.replace("\n\n", "\n");
    }
    while normalized.contains("  ") {
        normalized = normalized.replace("  ", " ");
    }
    normalized
}

/// SHA-256 of the normalized content, lower-case hex
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(normalize_content(content).as_bytes());
    hex::encode(digest)
}
