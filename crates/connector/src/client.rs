//! Platform client trait
//!
//! The sync orchestrator talks to the platform exclusively through this
//! trait, which keeps the fetch loops testable against in-memory fakes.

use async_trait::async_trait;
use threadline_common::errors::Result;

use crate::types::{ChannelInfo, Cursor, FileInfo, MemberInfo, MessageItem, Page, SyncWindow, TeamInfo};

/// One page per call; passing back the returned cursor continues the scan.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Team metadata for the connected workspace
    async fn team_info(&self) -> Result<TeamInfo>;

    /// Workspace member roster
    async fn list_members(&self, cursor: Option<Cursor>) -> Result<Page<MemberInfo>>;

    /// Conversations visible to the credential
    async fn list_channels(&self, cursor: Option<Cursor>) -> Result<Page<ChannelInfo>>;

    /// Messages in a conversation, newest first, bounded below by the window
    async fn channel_history(
        &self,
        channel_id: &str,
        window: &SyncWindow,
        cursor: Option<Cursor>,
    ) -> Result<Page<MessageItem>>;

    /// Replies under a thread root (includes the root itself)
    async fn thread_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<MessageItem>>;

    /// Files shared in the workspace, bounded below by the window
    async fn list_files(
        &self,
        window: &SyncWindow,
        cursor: Option<Cursor>,
    ) -> Result<Page<FileInfo>>;
}

/// Exchanges an expired token for a fresh one.
///
/// Invoked at most once per failing call; a second expiry in the same
/// call propagates as an auth error.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String>;
}
