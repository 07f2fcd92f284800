use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::Result;
use crate::kind::EnvelopeType;

/// Pairing mode that asks the user to confirm on the device screen.
pub const PAIRING_PROMPT: &str = "PROMPT";

/// Capabilities requested in every registration manifest.
pub const DEFAULT_PERMISSIONS: &[&str] = &[
    "LAUNCH",
    "CONTROL_AUDIO",
    "CONTROL_POWER",
    "CONTROL_PLAYBACK",
    "CONTROL_INPUT_TV",
    "READ_TV_CHANNEL_LIST",
    "READ_CURRENT_CHANNEL",
    "READ_RUNNING_APPS",
    "READ_INSTALLED_APPS",
    "READ_INPUT_LIST",
];

/// An envelope sent to the device.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope<'a, P> {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'a P>,
}

impl<'a> OutboundEnvelope<'a, RegisterPayload> {
    /// Build a `register` envelope.
    pub fn register(id: u64, payload: &'a RegisterPayload) -> Self {
        Self {
            id,
            kind: EnvelopeType::Register.as_str(),
            uri: None,
            payload: Some(payload),
        }
    }
}

impl<'a, P> OutboundEnvelope<'a, P> {
    /// Build a `request` envelope for the operation at `uri`.
    pub fn request(id: u64, uri: &'a str, payload: Option<&'a P>) -> Self {
        Self {
            id,
            kind: EnvelopeType::Request.as_str(),
            uri: Some(uri),
            payload,
        }
    }
}

/// Payload of a `register` envelope.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterPayload {
    #[serde(rename = "pairingType")]
    pub pairing_type: String,
    pub manifest: Manifest,
    /// Previously issued client key, or empty for first-time pairing.
    /// Treated as credential material and redacted in debug output.
    #[serde(rename = "client-key")]
    pub client_key: String,
}

impl RegisterPayload {
    /// Prompt-pairing payload for the given permissions and client key.
    pub fn prompt(permissions: &[String], client_key: &str) -> Self {
        Self {
            pairing_type: PAIRING_PROMPT.to_string(),
            manifest: Manifest {
                permissions: permissions.to_vec(),
            },
            client_key: client_key.to_string(),
        }
    }
}

impl fmt::Debug for RegisterPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterPayload")
            .field("pairing_type", &self.pairing_type)
            .field("manifest", &self.manifest)
            .field(
                "client_key",
                &format_args!("<redacted:{} bytes>", self.client_key.len()),
            )
            .finish()
    }
}

/// Permission manifest sent with a registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub permissions: Vec<String>,
}

/// Payload of a `registered` envelope.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct RegisteredPayload {
    #[serde(rename = "client-key")]
    pub client_key: String,
}

impl fmt::Debug for RegisteredPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredPayload")
            .field(
                "client_key",
                &format_args!("<redacted:{} bytes>", self.client_key.len()),
            )
            .finish()
    }
}

/// Generic `response` payload used when the caller registered no shape.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AckPayload {
    #[serde(rename = "returnValue", default)]
    pub return_value: bool,
}

/// Payload that carries no data.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmptyPayload {}

/// Envelope fields common to every inbound message, payload still unparsed.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl RawEnvelope {
    /// Parse the declared type.
    pub fn envelope_type(&self) -> Result<EnvelopeType> {
        EnvelopeType::parse_inbound(&self.kind)
    }

    /// The remote-reported error message, if non-empty.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|message| !message.is_empty())
    }

    /// Payload JSON text; a missing or `null` payload reads as an empty object.
    pub fn payload_json(&self) -> &str {
        self.payload.as_deref().map(RawValue::get).unwrap_or("{}")
    }
}

/// A fully decoded inbound message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<T> {
    /// Handshake completed; carries the issued client key.
    Registered(RegisteredPayload),
    /// Reply decoded into the caller-supplied shape.
    Response(T),
    /// Remote failure with its message (possibly empty).
    Error(String),
}

impl<T> Inbound<T> {
    /// Type tag this body was decoded from.
    pub fn envelope_type(&self) -> EnvelopeType {
        match self {
            Inbound::Registered(_) => EnvelopeType::Registered,
            Inbound::Response(_) => EnvelopeType::Response,
            Inbound::Error(_) => EnvelopeType::Error,
        }
    }
}
