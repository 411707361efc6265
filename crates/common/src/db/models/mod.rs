//! SeaORM entity models
//!
//! Database entities for Threadline

mod channel;
mod embedding;
mod file;
mod member;
mod message;
mod reaction;
mod sync_run;
mod workspace;

pub use workspace::{
    Entity as WorkspaceEntity,
    Model as Workspace,
    ActiveModel as WorkspaceActiveModel,
    Column as WorkspaceColumn,
};

pub use channel::{
    Entity as ChannelEntity,
    Model as Channel,
    ActiveModel as ChannelActiveModel,
    Column as ChannelColumn,
};

pub use member::{
    Entity as MemberEntity,
    Model as Member,
    ActiveModel as MemberActiveModel,
    Column as MemberColumn,
};

pub use message::{
    Entity as MessageEntity,
    Model as Message,
    ActiveModel as MessageActiveModel,
    Column as MessageColumn,
};

pub use file::{
    Entity as FileEntity,
    Model as File,
    ActiveModel as FileActiveModel,
    Column as FileColumn,
};

pub use reaction::{
    Entity as ReactionEntity,
    Model as Reaction,
    ActiveModel as ReactionActiveModel,
    Column as ReactionColumn,
};

pub use sync_run::{
    Entity as SyncRunEntity,
    Model as SyncRun,
    ActiveModel as SyncRunActiveModel,
    Column as SyncRunColumn,
    RunStatus,
};

pub use embedding::{
    Entity as EmbeddingEntity,
    Model as Embedding,
    ActiveModel as EmbeddingActiveModel,
    Column as EmbeddingColumn,
};
