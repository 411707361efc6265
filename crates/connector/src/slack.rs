//! Slack Web API client
//!
//! All calls go through a shared pacer and bounded retry. The API reports
//! most failures as HTTP 200 with `ok: false` and an error code, so
//! classification happens on the payload as well as the status line.
//! Malformed items inside otherwise valid pages are quarantined (logged
//! and skipped) rather than failing the page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use threadline_common::config::ConnectorConfig;
use threadline_common::errors::{Result, SyncError};

use crate::client::{CredentialRefresher, PlatformClient};
use crate::limiter::Pacer;
use crate::retry::{with_retries, RetryPolicy};
use crate::types::{
    ts_to_datetime, ChannelInfo, Cursor, FileInfo, MemberInfo, MessageItem, Page, ReactionInfo,
    SyncWindow, TeamInfo,
};

/// Slack Web API client for one workspace credential
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<String>,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    pacer: Pacer,
    policy: RetryPolicy,
    page_size: usize,
}

impl SlackClient {
    pub fn new(config: &ConnectorConfig, token: String) -> Result<Self> {
        Self::with_refresher(config, token, None)
    }

    pub fn with_refresher(
        config: &ConnectorConfig,
        token: String,
        refresher: Option<Arc<dyn CredentialRefresher>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token),
            refresher,
            pacer: Pacer::new(config.requests_per_second),
            policy: RetryPolicy::from_config(config),
            page_size: config.page_size,
        })
    }

    /// One paced HTTP round trip, classified but not retried.
    async fn call_once(
        &self,
        method: &str,
        params: &[(&str, String)],
        entity: &'static str,
        entity_id: &str,
    ) -> Result<Value> {
        self.pacer.acquire().await;

        let token = self.token.read().await.clone();
        let url = format!("{}/{}", self.base_url, method);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SyncError::RateLimited { retry_after });
        }

        if status.is_server_error() {
            return Err(SyncError::transient(format!(
                "{} returned {}",
                method, status
            )));
        }

        if status.as_u16() == 401 {
            return Err(SyncError::auth(format!("{} returned 401", method)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SyncError::transient(format!("{}: invalid response body: {}", method, e)))?;

        if body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(body);
        }

        let code = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");

        Err(classify_error(code, entity, entity_id))
    }

    /// Round trip with a one-shot credential refresh on expiry.
    async fn call_refreshing(
        &self,
        method: &str,
        params: &[(&str, String)],
        entity: &'static str,
        entity_id: &str,
    ) -> Result<Value> {
        match self.call_once(method, params, entity, entity_id).await {
            Err(SyncError::Auth { message }) if message == "token_expired" => {
                let Some(refresher) = &self.refresher else {
                    return Err(SyncError::Auth { message });
                };

                tracing::info!(method, "Access token expired, refreshing");
                let fresh = refresher.refresh().await?;
                *self.token.write().await = fresh;

                self.call_once(method, params, entity, entity_id).await
            }
            other => other,
        }
    }

    /// Full call path: pacing, refresh, bounded retry.
    async fn call(
        &self,
        method: &'static str,
        params: Vec<(&'static str, String)>,
        entity: &'static str,
        entity_id: &str,
    ) -> Result<Value> {
        with_retries(&self.policy, method, || {
            self.call_refreshing(method, &params, entity, entity_id)
        })
        .await
    }

    fn limit(&self) -> String {
        self.page_size.to_string()
    }
}

#[async_trait]
impl PlatformClient for SlackClient {
    async fn team_info(&self) -> Result<TeamInfo> {
        let body = self.call("team.info", vec![], "team", "").await?;

        let team = body
            .get("team")
            .ok_or_else(|| SyncError::transient("team.info missing team object"))?;

        Ok(TeamInfo {
            team_id: required_str(team, "id", "team.info")?,
            name: required_str(team, "name", "team.info")?,
            domain: team
                .get("domain")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn list_members(&self, cursor: Option<Cursor>) -> Result<Page<MemberInfo>> {
        let mut params = vec![("limit", self.limit())];
        if let Some(cursor) = &cursor {
            params.push(("cursor", cursor.0.clone()));
        }

        let body = self.call("users.list", params, "member", "").await?;

        Ok(Page {
            items: parse_members(&body),
            next_cursor: next_cursor(&body),
        })
    }

    async fn list_channels(&self, cursor: Option<Cursor>) -> Result<Page<ChannelInfo>> {
        let mut params = vec![
            ("limit", self.limit()),
            ("types", "public_channel,private_channel".to_string()),
            ("exclude_archived", "false".to_string()),
        ];
        if let Some(cursor) = &cursor {
            params.push(("cursor", cursor.0.clone()));
        }

        let body = self.call("conversations.list", params, "channel", "").await?;

        Ok(Page {
            items: parse_channels(&body),
            next_cursor: next_cursor(&body),
        })
    }

    async fn channel_history(
        &self,
        channel_id: &str,
        window: &SyncWindow,
        cursor: Option<Cursor>,
    ) -> Result<Page<MessageItem>> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("limit", self.limit()),
        ];
        if let Some(oldest) = window.oldest_ts() {
            params.push(("oldest", oldest));
        }
        if let Some(cursor) = &cursor {
            params.push(("cursor", cursor.0.clone()));
        }

        let body = self
            .call("conversations.history", params, "channel", channel_id)
            .await?;

        Ok(Page {
            items: parse_messages(&body, channel_id),
            next_cursor: next_cursor(&body),
        })
    }

    async fn thread_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<MessageItem>> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", self.limit()),
        ];
        if let Some(cursor) = &cursor {
            params.push(("cursor", cursor.0.clone()));
        }

        let body = self
            .call("conversations.replies", params, "thread", thread_ts)
            .await?;

        Ok(Page {
            items: parse_messages(&body, channel_id),
            next_cursor: next_cursor(&body),
        })
    }

    async fn list_files(
        &self,
        window: &SyncWindow,
        cursor: Option<Cursor>,
    ) -> Result<Page<FileInfo>> {
        // files.list paginates by page number, carried in the cursor
        let page: u64 = cursor
            .as_ref()
            .and_then(|c| c.0.parse().ok())
            .unwrap_or(1);

        let mut params = vec![
            ("count", self.limit()),
            ("page", page.to_string()),
        ];
        if let Some(oldest) = window.oldest {
            params.push(("ts_from", oldest.timestamp().to_string()));
        }

        let body = self.call("files.list", params, "file", "").await?;

        let pages = body
            .get("paging")
            .and_then(|p| p.get("pages"))
            .and_then(Value::as_u64)
            .unwrap_or(1);

        let next = if page < pages {
            Some(Cursor((page + 1).to_string()))
        } else {
            None
        };

        Ok(Page {
            items: parse_files(&body),
            next_cursor: next,
        })
    }
}

// ============================================================================
// Payload parsing
// ============================================================================

#[derive(Deserialize)]
struct UserWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: ProfileWire,
}

#[derive(Deserialize, Default)]
struct ProfileWire {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ChannelWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    num_members: Option<i32>,
}

#[derive(Deserialize)]
struct FileWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    url_private: Option<String>,
    #[serde(default)]
    created: i64,
}

fn parse_array<'a>(body: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    body.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .unwrap_or_default()
}

fn parse_members(body: &Value) -> Vec<MemberInfo> {
    parse_array(body, "members")
        .filter_map(|entry| match serde_json::from_value::<UserWire>(entry.clone()) {
            Ok(user) => Some(MemberInfo {
                id: user.id,
                username: user.name,
                display_name: user.profile.display_name.filter(|s| !s.is_empty()),
                email: user.profile.email,
                is_bot: user.is_bot,
                deleted: user.deleted,
                raw: entry.clone(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed member entry");
                None
            }
        })
        .collect()
}

fn parse_channels(body: &Value) -> Vec<ChannelInfo> {
    parse_array(body, "channels")
        .filter_map(|entry| match serde_json::from_value::<ChannelWire>(entry.clone()) {
            Ok(channel) => Some(ChannelInfo {
                id: channel.id,
                name: channel.name,
                is_private: channel.is_private,
                is_archived: channel.is_archived,
                member_count: channel.num_members,
                raw: entry.clone(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed channel entry");
                None
            }
        })
        .collect()
}

fn parse_messages(body: &Value, channel_id: &str) -> Vec<MessageItem> {
    parse_array(body, "messages")
        .filter_map(|entry| match parse_message(entry) {
            Some(message) => Some(message),
            None => {
                tracing::warn!(channel_id, "Skipping malformed message entry");
                None
            }
        })
        .collect()
}

fn parse_message(entry: &Value) -> Option<MessageItem> {
    let ts = entry.get("ts").and_then(Value::as_str)?.to_string();

    // A timestamp that does not parse cannot be keyed or ordered
    ts_to_datetime(&ts)?;

    let reactions = entry
        .get("reactions")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|r| {
                    Some(ReactionInfo {
                        name: r.get("name").and_then(Value::as_str)?.to_string(),
                        count: r.get("count").and_then(Value::as_i64)? as i32,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(MessageItem {
        author: entry.get("user").and_then(Value::as_str).map(str::to_string),
        text: entry.get("text").and_then(Value::as_str).map(str::to_string),
        thread_ts: entry
            .get("thread_ts")
            .and_then(Value::as_str)
            .map(str::to_string),
        reply_count: entry
            .get("reply_count")
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32,
        edited: entry.get("edited").is_some(),
        reactions,
        raw: entry.clone(),
        ts,
    })
}

fn parse_files(body: &Value) -> Vec<FileInfo> {
    parse_array(body, "files")
        .filter_map(|entry| match serde_json::from_value::<FileWire>(entry.clone()) {
            Ok(file) => Some(FileInfo {
                id: file.id,
                name: file.name,
                title: file.title,
                mimetype: file.mimetype,
                size_bytes: file.size,
                author: file.user,
                url: file.url_private,
                created: file.created,
                raw: entry.clone(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed file entry");
                None
            }
        })
        .collect()
}

/// Extract the continuation cursor; an empty string means the scan is done.
fn next_cursor(body: &Value) -> Option<Cursor> {
    body.get("response_metadata")
        .and_then(|m| m.get("next_cursor"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(|c| Cursor(c.to_string()))
}

fn required_str(value: &Value, key: &str, context: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SyncError::transient(format!("{} missing field '{}'", context, key)))
}

fn classify_error(code: &str, entity: &'static str, entity_id: &str) -> SyncError {
    match code {
        "ratelimited" => SyncError::RateLimited { retry_after: None },

        "token_expired" => SyncError::Auth {
            message: "token_expired".to_string(),
        },

        "invalid_auth" | "not_authed" | "token_revoked" | "account_inactive"
        | "missing_scope" => SyncError::auth(code),

        "channel_not_found" | "not_in_channel" | "thread_not_found" | "user_not_found"
        | "file_not_found" | "is_archived" => SyncError::ItemAccess {
            entity,
            id: entity_id.to_string(),
            message: code.to_string(),
        },

        other => SyncError::transient(format!("API error: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_history_page() {
        let body = json!({
            "ok": true,
            "messages": [
                {
                    "ts": "1700000001.000100",
                    "user": "U01",
                    "text": "deploy finished",
                    "thread_ts": "1700000001.000100",
                    "reply_count": 2,
                    "reactions": [{"name": "tada", "count": 3}]
                },
                {
                    "ts": "1700000000.000100",
                    "user": "U02",
                    "text": "kicking off deploy",
                    "edited": {"user": "U02", "ts": "1700000005.000000"}
                },
                {"user": "U03", "text": "no ts, quarantined"}
            ],
            "response_metadata": {"next_cursor": "dXNlcjpVMDYxTkZUVDI="}
        });

        let messages = parse_messages(&body, "C01");
        assert_eq!(messages.len(), 2);

        assert!(messages[0].is_thread_root());
        assert_eq!(messages[0].reactions[0].name, "tada");
        assert_eq!(messages[0].reactions[0].count, 3);

        assert!(messages[1].edited);
        assert!(!messages[1].is_thread_root());

        assert_eq!(
            next_cursor(&body),
            Some(Cursor("dXNlcjpVMDYxTkZUVDI=".to_string()))
        );
    }

    #[test]
    fn empty_next_cursor_ends_pagination() {
        let body = json!({
            "ok": true,
            "messages": [],
            "response_metadata": {"next_cursor": ""}
        });
        assert_eq!(next_cursor(&body), None);

        let no_metadata = json!({"ok": true, "messages": []});
        assert_eq!(next_cursor(&no_metadata), None);
    }

    #[test]
    fn parses_member_page_with_quarantine() {
        let body = json!({
            "ok": true,
            "members": [
                {
                    "id": "U01",
                    "name": "ayla",
                    "is_bot": false,
                    "profile": {"display_name": "Ayla R", "email": "ayla@example.com"}
                },
                {"id": "U02", "name": "deploybot", "is_bot": true, "profile": {"display_name": ""}},
                {"name": "missing-id"}
            ]
        });

        let members = parse_members(&body);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].display_name.as_deref(), Some("Ayla R"));
        // Empty display names fall back to username downstream
        assert_eq!(members[1].display_name, None);
        assert!(members[1].is_bot);
    }

    #[test]
    fn parses_channel_page() {
        let body = json!({
            "ok": true,
            "channels": [
                {"id": "C01", "name": "general", "is_private": false, "num_members": 42},
                {"id": "C02", "name": "incidents", "is_private": true, "is_archived": true}
            ]
        });

        let channels = parse_channels(&body);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].member_count, Some(42));
        assert!(channels[1].is_archived);
    }

    #[test]
    fn classifies_api_error_codes() {
        assert!(matches!(
            classify_error("ratelimited", "channel", "C01"),
            SyncError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            classify_error("invalid_auth", "team", ""),
            SyncError::Auth { .. }
        ));
        assert!(matches!(
            classify_error("not_in_channel", "channel", "C01"),
            SyncError::ItemAccess { entity: "channel", .. }
        ));
        assert!(matches!(
            classify_error("fatal_error", "channel", "C01"),
            SyncError::Transient { .. }
        ));
    }
}
