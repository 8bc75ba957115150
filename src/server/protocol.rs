// Wire format between the daemon and the browser extension
//
// Inbound frames use a `{"type": ..., "data": {...}}` envelope. Outbound
// frames are flat objects tagged by `type`. Everything goes through serde;
// no JSON is assembled by hand.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::downloader::models::DestinationCandidate;

/// Requests a client can make
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Probe `url` and offer destinations
    Download { url: String },
    /// Answer to a `choose_path` offer
    PickedPath {
        url: String,
        id: String,
        audio_only: bool,
    },
}

/// Result of decoding one text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(ClientMessage),
    /// Envelope was valid but the `type` is not one we handle
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct DownloadData {
    url: String,
}

#[derive(Deserialize)]
struct PickedPathData {
    url: String,
    id: String,
    #[serde(default, rename = "audioOnly")]
    audio_only: Option<bool>,
}

/// Decode one inbound text frame
pub fn decode(text: &str) -> Result<Inbound, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    let message = match envelope.kind.as_str() {
        "download" => {
            let data: DownloadData = serde_json::from_value(envelope.data)?;
            ClientMessage::Download { url: data.url }
        }
        "picked_path" => {
            let data: PickedPathData = serde_json::from_value(envelope.data)?;
            ClientMessage::PickedPath {
                url: data.url,
                id: data.id,
                audio_only: data.audio_only.unwrap_or(false),
            }
        }
        _ => return Ok(Inbound::Unknown(envelope.kind)),
    };

    Ok(Inbound::Message(message))
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "choose_path")]
    ChoosePath {
        url: String,
        paths: Vec<DestinationCandidate>,
    },
    #[serde(rename = "error")]
    Error { error: String, message: String },
    #[serde(rename = "download-started")]
    DownloadStarted {
        url: String,
        title: String,
        path: String,
    },
    #[serde(rename = "download-finished")]
    DownloadFinished {
        url: String,
        title: String,
        path: String,
        file: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            error: key.into(),
            message: message.into(),
        }
    }

    /// Value of the `type` field, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChoosePath { .. } => "choose_path",
            Self::Error { .. } => "error",
            Self::DownloadStarted { .. } => "download-started",
            Self::DownloadFinished { .. } => "download-finished",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_download() {
        let inbound = decode(r#"{"type":"download","data":{"url":"https://a.com/v"}}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Message(ClientMessage::Download {
                url: "https://a.com/v".into()
            })
        );
    }

    #[test]
    fn test_decode_picked_path() {
        let inbound =
            decode(r#"{"type":"picked_path","data":{"url":"u1","id":"2","audioOnly":true}}"#)
                .unwrap();
        assert_eq!(
            inbound,
            Inbound::Message(ClientMessage::PickedPath {
                url: "u1".into(),
                id: "2".into(),
                audio_only: true,
            })
        );

        // the extension sends audioOnly: undefined, which JSON.stringify drops
        let inbound = decode(r#"{"type":"picked_path","data":{"url":"u1","id":"2"}}"#).unwrap();
        assert!(matches!(
            inbound,
            Inbound::Message(ClientMessage::PickedPath { audio_only: false, .. })
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        let inbound = decode(r#"{"type":"ping","data":{}}"#).unwrap();
        assert_eq!(inbound, Inbound::Unknown("ping".into()));

        let inbound = decode(r#"{"type":"status"}"#).unwrap();
        assert_eq!(inbound, Inbound::Unknown("status".into()));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"type":"download","data":{}}"#).is_err());
    }

    #[test]
    fn test_choose_path_shape() {
        let message = ServerMessage::ChoosePath {
            url: "https://a.com/v".into(),
            paths: vec![DestinationCandidate::new("1", "Music", "/m", ["music"])],
        };
        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "choose_path",
                "url": "https://a.com/v",
                "paths": [{"id": "1", "name": "Music", "path": "/m", "keywords": ["music"]}]
            })
        );
    }

    #[test]
    fn test_error_text_is_escaped() {
        let message = ServerMessage::error("run", "ERROR: \"bad\"\nsecond line");
        let encoded = message.to_json().unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"], "run");
        assert_eq!(value["message"], "ERROR: \"bad\"\nsecond line");
    }

    #[test]
    fn test_finished_shape() {
        let message = ServerMessage::DownloadFinished {
            url: "u".into(),
            title: "t".into(),
            path: "/m".into(),
            file: None,
        };
        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "download-finished");
        assert_eq!(value["file"], Value::Null);
        assert_eq!(message.kind(), "download-finished");
    }
}
