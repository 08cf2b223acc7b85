//! Protocol messages exchanged between the transport and the application.
//!
//! The wire shape mirrors the ASGI message format: every message is a record
//! tagged by a dotted `type` field. The dispatch wrapper only ever inspects
//! `http.response.start`; everything else is forwarded opaquely.

use serde::{Deserialize, Serialize};

/// A single protocol message flowing through a [`Sender`](crate::app::Sender)
/// or [`Receive`](crate::app::Receive) channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Response headers are about to be transmitted; the response is now in
    /// flight and can no longer be replaced.
    #[serde(rename = "http.response.start")]
    ResponseStart {
        status: u16,
        #[serde(default)]
        headers: Vec<(String, String)>,
    },

    /// A chunk of the response body. `more_body: false` closes the response.
    #[serde(rename = "http.response.body")]
    ResponseBody {
        #[serde(default)]
        body: Vec<u8>,
        #[serde(default)]
        more_body: bool,
    },

    #[serde(rename = "websocket.accept")]
    WebSocketAccept,

    #[serde(rename = "websocket.send")]
    WebSocketSend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<Vec<u8>>,
    },

    #[serde(rename = "websocket.close")]
    WebSocketClose {
        code: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Message {
    /// The dotted tag carried in the `type` field of the wire shape.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ResponseStart { .. } => "http.response.start",
            Message::ResponseBody { .. } => "http.response.body",
            Message::WebSocketAccept => "websocket.accept",
            Message::WebSocketSend { .. } => "websocket.send",
            Message::WebSocketClose { .. } => "websocket.close",
        }
    }

    /// True only for `http.response.start`, the message that flips the
    /// response-started flag in the dispatch wrapper.
    pub fn starts_response(&self) -> bool {
        matches!(self, Message::ResponseStart { .. })
    }

    /// Shorthand for a headerless `http.response.start`.
    pub fn response_start(status: u16) -> Self {
        Message::ResponseStart {
            status,
            headers: Vec::new(),
        }
    }

    /// Shorthand for a final `http.response.body` chunk.
    pub fn final_body(body: impl Into<Vec<u8>>) -> Self {
        Message::ResponseBody {
            body: body.into(),
            more_body: false,
        }
    }
}
