//! Wire shapes exchanged with the assistant service.
//!
//! Every request carries the whole editor buffer, never a diff. Replies carry
//! the assistant's text and, when the assistant touched the file, its new
//! contents.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// A chat turn sent to the assistant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundRequest {
    message: String,
    file_content: String,
    file_path: String,
}

impl OutboundRequest {
    /// Build a request. The message is kept as typed but must contain
    /// something other than whitespace.
    pub fn new(
        message: impl Into<String>,
        file_content: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Result<Self, CodecError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(CodecError::EmptyMessage);
        }
        Ok(Self {
            message,
            file_content: file_content.into(),
            file_path: file_path.into(),
        })
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file_content(&self) -> &str {
        &self.file_content
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}

/// A reply from the assistant. Missing file fields mean the file was left alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

pub fn encode_request(request: &OutboundRequest) -> Result<String, CodecError> {
    Ok(serde_json::to_string(request)?)
}

pub fn decode_event(frame: &str) -> Result<InboundEvent, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_exactly_three_fields() {
        let req = OutboundRequest::new("add a docstring", "print(1)", "main.py").unwrap();
        let json: serde_json::Value = serde_json::from_str(&encode_request(&req).unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["message"], "add a docstring");
        assert_eq!(obj["file_content"], "print(1)");
        assert_eq!(obj["file_path"], "main.py");
    }

    #[test]
    fn decodes_reply_with_file_fields() {
        let frame = r#"{"message":"done","file_content":"\"\"\"doc\"\"\"\nprint(1)","file_path":"main.py"}"#;
        let event = decode_event(frame).unwrap();
        assert_eq!(event.message, "done");
        assert_eq!(
            event.file_content.as_deref(),
            Some("\"\"\"doc\"\"\"\nprint(1)")
        );
        assert_eq!(event.file_path.as_deref(), Some("main.py"));
    }

    #[test]
    fn decodes_reply_without_file_fields() {
        let event = decode_event(r#"{"message":"ok"}"#).unwrap();
        assert_eq!(event.message, "ok");
        assert!(event.file_content.is_none());
        assert!(event.file_path.is_none());
    }

    #[test]
    fn empty_file_content_is_kept_verbatim() {
        let event = decode_event(r#"{"message":"cleared","file_content":""}"#).unwrap();
        assert_eq!(event.file_content.as_deref(), Some(""));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let event = decode_event(r#"{"message":"ok","tokens":12}"#).unwrap();
        assert_eq!(event.message, "ok");
    }

    #[test]
    fn missing_message_is_malformed() {
        let err = decode_event(r#"{"file_content":"x"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn null_message_is_malformed() {
        let err = decode_event(r#"{"message":null}"#).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            decode_event("hello"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn blank_messages_are_rejected() {
        assert!(matches!(
            OutboundRequest::new("  \n\t", "x", "main.py"),
            Err(CodecError::EmptyMessage)
        ));
    }

    #[test]
    fn message_is_not_trimmed() {
        let req = OutboundRequest::new("  rename foo  ", "", "a.py").unwrap();
        assert_eq!(req.message(), "  rename foo  ");
        assert_eq!(req.file_content(), "");
    }
}
