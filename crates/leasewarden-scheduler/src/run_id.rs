//! Run identifiers: `{job}-{epoch_millis}-{suffix}`.
//!
//! Millis are zero-padded so ids of the same job sort by start time.

use chrono::{DateTime, Utc};
use rand::Rng;

const SUFFIX_LEN: usize = 6;
const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier shared by every audit entry of one execution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate(job_type: &str) -> Self {
        Self::at(job_type, Utc::now())
    }

    pub fn at(job_type: &str, started_at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!(
            "{job_type}-{:013}-{suffix}",
            started_at.timestamp_millis().max(0)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let id = RunId::at("expire", t);
        let parts: Vec<&str> = id.as_str().splitn(3, '-').collect();
        assert_eq!(parts[0], "expire");
        assert_eq!(parts[1], t.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_unique_and_time_sortable() {
        let t = Utc::now();
        let a = RunId::at("delete", t);
        let b = RunId::at("delete", t);
        assert_ne!(a, b);
        let later = RunId::at("delete", t + chrono::Duration::seconds(1));
        assert!(later > a && later > b);
    }
}
