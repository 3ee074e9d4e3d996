//! Request and response shapes of the Bot API methods we call.

use courier_core::types::ChatRef;
use serde::{Deserialize, Serialize};

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Message {
    pub message_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct User {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub photo: Option<ChatPhoto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatPhoto {
    pub big_file_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct File {
    pub file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMember {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub chat_id: &'a ChatRef,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMessage<'a> {
    pub chat_id: &'a ChatRef,
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendPoll<'a> {
    pub chat_id: &'a ChatRef,
    pub question: &'a str,
    pub options: &'a [String],
    pub is_anonymous: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SendMediaGroup<'a> {
    pub chat_id: &'a ChatRef,
    pub media: Vec<InputMedia<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InputMedia<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetChatMember<'a> {
    pub chat_id: &'a ChatRef,
    pub user_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct GetFile<'a> {
    pub file_id: &'a str,
}
