//! Wire-adjacent types shared by the connector and the sync pipeline
//!
//! These are the normalized shapes the orchestrator consumes. Raw platform
//! payloads are parsed in the client and mapped into these; each shape
//! keeps the full payload in its `raw` field for anything not promoted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Opaque pagination cursor.
///
/// Treated as a token to echo back verbatim; no structure is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page from a paginated list endpoint
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// A final page with no continuation
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// Time bounds for a history fetch.
///
/// `oldest = None` means full history from the beginning.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncWindow {
    pub oldest: Option<DateTime<Utc>>,
}

impl SyncWindow {
    /// Full history
    pub fn full() -> Self {
        Self { oldest: None }
    }

    /// History since the given instant
    pub fn since(oldest: DateTime<Utc>) -> Self {
        Self {
            oldest: Some(oldest),
        }
    }

    /// Lower bound in platform timestamp format, when set
    pub fn oldest_ts(&self) -> Option<String> {
        self.oldest.map(|t| datetime_to_ts(&t))
    }
}

/// Team metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInfo {
    pub team_id: String,
    pub name: String,
    pub domain: Option<String>,
}

/// Workspace member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub is_bot: bool,
    pub deleted: bool,
    /// Full payload for fields not promoted above
    pub raw: serde_json::Value,
}

/// Conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub is_archived: bool,
    pub member_count: Option<i32>,
    /// Full payload for fields not promoted above
    pub raw: serde_json::Value,
}

/// Emoji reaction on a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionInfo {
    pub name: String,
    pub count: i32,
}

/// A message from conversation history or a thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageItem {
    /// Platform timestamp string, unique within a channel
    pub ts: String,
    pub author: Option<String>,
    pub text: Option<String>,
    /// Parent thread timestamp; equals `ts` on thread roots
    pub thread_ts: Option<String>,
    pub reply_count: i32,
    pub edited: bool,
    pub reactions: Vec<ReactionInfo>,
    /// Full payload for fields not promoted above
    pub raw: serde_json::Value,
}

impl MessageItem {
    /// Posting time parsed from the timestamp string
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        ts_to_datetime(&self.ts)
    }

    /// Whether this message starts a thread
    pub fn is_thread_root(&self) -> bool {
        match &self.thread_ts {
            Some(parent) => parent == &self.ts && self.reply_count > 0,
            None => false,
        }
    }

    /// Whether this message is a reply inside a thread
    pub fn is_thread_reply(&self) -> bool {
        match &self.thread_ts {
            Some(parent) => parent != &self.ts,
            None => false,
        }
    }
}

/// A shared file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub mimetype: Option<String>,
    pub size_bytes: i64,
    pub author: Option<String>,
    pub url: Option<String>,
    pub created: i64,
    /// Full payload for fields not promoted above
    pub raw: serde_json::Value,
}

impl FileInfo {
    pub fn posted_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.created, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Parse a platform timestamp ("1700000000.123456") into a UTC instant.
pub fn ts_to_datetime(ts: &str) -> Option<DateTime<Utc>> {
    let mut parts = ts.splitn(2, '.');
    let secs: i64 = parts.next()?.parse().ok()?;
    let micros: u32 = match parts.next() {
        Some(frac) if !frac.is_empty() => {
            // Fractions are microseconds, possibly fewer than 6 digits
            let padded = format!("{:0<6}", frac);
            padded.get(..6)?.parse().ok()?
        }
        _ => 0,
    };

    Utc.timestamp_opt(secs, micros * 1000).single()
}

/// Format a UTC instant as a platform timestamp string.
pub fn datetime_to_ts(t: &DateTime<Utc>) -> String {
    format!("{}.{:06}", t.timestamp(), t.timestamp_subsec_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamp_with_fraction() {
        let t = ts_to_datetime("1700000000.123456").unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
        assert_eq!(t.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn parses_timestamp_without_fraction() {
        let t = ts_to_datetime("1700000000").unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
        assert_eq!(t.timestamp_subsec_micros(), 0);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(ts_to_datetime("not-a-ts").is_none());
        assert!(ts_to_datetime("").is_none());
    }

    #[test]
    fn timestamp_round_trip() {
        let ts = "1700000000.000042";
        let t = ts_to_datetime(ts).unwrap();
        assert_eq!(datetime_to_ts(&t), ts);
    }

    #[test]
    fn thread_root_detection() {
        let root = MessageItem {
            ts: "1.000000".into(),
            author: None,
            text: Some("root".into()),
            thread_ts: Some("1.000000".into()),
            reply_count: 3,
            edited: false,
            reactions: vec![],
            raw: serde_json::json!({}),
        };
        assert!(root.is_thread_root());
        assert!(!root.is_thread_reply());

        let reply = MessageItem {
            thread_ts: Some("1.000000".into()),
            ts: "2.000000".into(),
            reply_count: 0,
            ..root.clone()
        };
        assert!(reply.is_thread_reply());
        assert!(!reply.is_thread_root());
    }
}
