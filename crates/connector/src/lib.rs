//! Threadline Platform Connector
//!
//! Cursor-paginated access to the workspace platform API:
//! - Normalized page/item types consumed by the sync pipeline
//! - Token-bucket pacing on every outbound request
//! - Bounded retry with server-hinted or exponential backoff
//! - One-shot credential refresh on token expiry

pub mod client;
pub mod limiter;
pub mod retry;
pub mod slack;
pub mod types;

pub use client::{CredentialRefresher, PlatformClient};
pub use limiter::Pacer;
pub use retry::{with_retries, RetryPolicy};
pub use slack::SlackClient;
pub use types::{
    ChannelInfo, Cursor, FileInfo, MemberInfo, MessageItem, Page, ReactionInfo, SyncWindow,
    TeamInfo,
};
