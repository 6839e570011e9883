use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command name of the request a descendant sends to the root.
pub const SUBPROCESS_ANNOUNCEMENT: &str = "subprocessAnnouncement";

/// Port value announced by a descendant that won't accept an incoming debugger connection.
pub const NO_INCOMING_PORT: u16 = 0;

/// Handshake request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

impl Request {
    pub fn new(seq: i64, command: impl Into<String>, arguments: Value) -> Self {
        Self {
            seq,
            r#type: "request".to_string(),
            command: command.into(),
            arguments,
        }
    }
}

/// Handshake response envelope.
///
/// A failed response carries an error text in `message` and no `body`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    pub r#type: String,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn success(seq: i64, request: &Request, body: Value) -> Self {
        Self {
            seq,
            r#type: "response".to_string(),
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body: Some(body),
        }
    }

    pub fn error(seq: i64, request: &Request, message: impl Into<String>) -> Self {
        Self {
            seq,
            r#type: "response".to_string(),
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.into()),
            body: None,
        }
    }
}

/// Any message that may arrive on a handshake connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request {
        seq: i64,
        command: String,
        #[serde(default)]
        arguments: Value,
    },
    Response {
        seq: i64,
        request_seq: i64,
        success: bool,
        command: String,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        body: Option<Value>,
    },
}

impl Message {
    pub fn into_request(self) -> Option<Request> {
        match self {
            Message::Request {
                seq,
                command,
                arguments,
            } => Some(Request::new(seq, command, arguments)),
            Message::Response { .. } => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Message::Response {
                seq,
                request_seq,
                success,
                command,
                message,
                body,
            } => Some(Response {
                seq,
                r#type: "response".to_string(),
                request_seq,
                success,
                command,
                message,
                body,
            }),
            Message::Request { .. } => None,
        }
    }
}

/// Arguments of a `subprocessAnnouncement` request, as sent by a descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubprocessAnnouncement {
    pub parent_process_id: u32,
    pub process_id: u32,
    /// Port for an incoming debugger connection, [`NO_INCOMING_PORT`] if there is none.
    pub port: u16,
}

/// Announcement enriched by the root process before it is queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(flatten)]
    pub subprocess: SubprocessAnnouncement,
    pub root_process_id: u32,
    /// Request that started the debug session of the whole process tree, passed verbatim.
    pub root_start_request: Value,
}

impl Announcement {
    pub fn enrich(
        subprocess: SubprocessAnnouncement,
        root_process_id: u32,
        root_start_request: Value,
    ) -> Self {
        Self {
            subprocess,
            root_process_id,
            root_start_request,
        }
    }
}

/// Root decision for a descendant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementResponse {
    /// If true, a debugger will connect to the port from the announcement
    /// and the descendant must wait for it before running user code.
    pub incoming_connection: bool,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_announcement_wire_format() {
        let announcement = Announcement::enrich(
            SubprocessAnnouncement {
                parent_process_id: 10,
                process_id: 42,
                port: NO_INCOMING_PORT,
            },
            1,
            json!({"command": "launch"}),
        );

        assert_eq!(
            serde_json::to_value(&announcement).unwrap(),
            json!({
                "parentProcessId": 10,
                "processId": 42,
                "port": 0,
                "rootProcessId": 1,
                "rootStartRequest": {"command": "launch"},
            })
        );
        assert_eq!(
            serde_json::to_value(AnnouncementResponse::default()).unwrap(),
            json!({"incomingConnection": false})
        );
    }

    #[test]
    fn test_message_dispatch() {
        let raw = json!({"seq": 3, "type": "request", "command": "x", "arguments": {"a": 1}});
        let msg: Message = serde_json::from_value(raw).unwrap();
        let req = msg.into_request().unwrap();
        assert_eq!(req.seq, 3);
        assert_eq!(req.arguments, json!({"a": 1}));

        let raw = json!({"seq": 4, "type": "response", "request_seq": 3, "success": false, "command": "x", "message": "nope"});
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert!(msg.clone().into_request().is_none());
        let resp = msg.into_response().unwrap();
        assert_eq!(resp.request_seq, 3);
        assert_eq!(resp.message.as_deref(), Some("nope"));
        assert!(resp.body.is_none());
    }
}
