//! Messages exchanged over the real-time channel.
//!
//! Both directions are JSON objects tagged by `type`, e.g.
//! `{"type":"joinThread","threadId":"..."}`.

use serde::{Deserialize, Serialize};

use crate::models::{Post, PostId, ThreadId};

/// A post submission, shared by the real-time and HTTP paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPostRequest {
    pub thread_id: ThreadId,
    pub content: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `data:image/...;base64,` payload.
    #[serde(default)]
    pub image: Option<String>,
    /// Opaque bearer token.
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinThread {
        thread_id: ThreadId,
        /// Nickname the client already holds for this thread, if any.
        #[serde(default)]
        name: Option<String>,
    },
    LeaveThread {
        thread_id: ThreadId,
    },
    NewPost(NewPostRequest),
    RequestNickname {
        thread_id: ThreadId,
    },
    ConfirmNickname {
        thread_id: ThreadId,
        nickname: String,
        #[serde(default)]
        first_attempt: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Joined {
        thread_id: ThreadId,
    },
    NewPost {
        post: Post,
    },
    PostDeleted {
        thread_id: ThreadId,
        post_id: PostId,
    },
    /// Only ever sent to the connection whose request failed.
    PostError {
        message: String,
    },
    NicknameProposed {
        thread_id: ThreadId,
        nickname: String,
    },
    NicknameAccepted {
        thread_id: ThreadId,
        nickname: String,
    },
    NicknameRejected {
        thread_id: ThreadId,
        reason: String,
        /// The caller should retry with a freshly generated candidate.
        regenerate: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
    },
}
