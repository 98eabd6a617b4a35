//! Events delivered from the broker connection to the pipeline.

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::ConnectReturnCode as ConnectReasonCode;
use rumqttc::{ConnectReturnCode, ConnectionError};

/// A discrete event produced by the bus connection.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// The broker accepted the connection
    Connected,
    /// The broker confirmed a subscription
    Subscribed { filter: String },
    /// A subscription request was rejected or could not be sent
    SubscriptionFailed { filter: String, reason: String },
    /// A published message
    Message { topic: String, payload: Bytes },
    /// The connection failed
    ConnectionError {
        kind: ConnectionErrorKind,
        message: String,
        fatal: bool,
    },
}

/// Classification of connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The broker refused the CONNECT (credentials, client id, protocol)
    Refused,
    /// Protocol violation or unexpected packet
    Protocol,
    /// Network, TLS, or timeout
    Transport,
}

impl ConnectionErrorKind {
    /// Only transport failures can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }
}

/// Classifies a rumqttc connection error.
pub fn classify(err: &ConnectionError) -> ConnectionErrorKind {
    match err {
        ConnectionError::ConnectionRefused(_) => ConnectionErrorKind::Refused,
        ConnectionError::MqttState(_) | ConnectionError::NotConnAck(_) => {
            ConnectionErrorKind::Protocol
        }
        _ => ConnectionErrorKind::Transport,
    }
}

/// Human readable message for a connection error.
pub fn describe(err: &ConnectionError) -> String {
    match err {
        ConnectionError::ConnectionRefused(code) => describe_refusal(code).to_string(),
        other => other.to_string(),
    }
}

/// Classifies an MQTT 5 connection error.
pub fn classify_v5(err: &rumqttc::v5::ConnectionError) -> ConnectionErrorKind {
    use rumqttc::v5::ConnectionError as V5Error;

    match err {
        V5Error::ConnectionRefused(_) => ConnectionErrorKind::Refused,
        V5Error::MqttState(_) | V5Error::NotConnAck(_) => ConnectionErrorKind::Protocol,
        _ => ConnectionErrorKind::Transport,
    }
}

/// Human readable message for an MQTT 5 connection error.
pub fn describe_v5(err: &rumqttc::v5::ConnectionError) -> String {
    match err {
        rumqttc::v5::ConnectionError::ConnectionRefused(code) => describe_reason(code),
        other => other.to_string(),
    }
}

/// Describes an MQTT 5 CONNACK reason code.
pub fn describe_reason(code: &ConnectReasonCode) -> String {
    let text = match code {
        ConnectReasonCode::Success => ConnectReturnCode::Success,
        ConnectReasonCode::RefusedProtocolVersion
        | ConnectReasonCode::UnsupportedProtocolVersion => ConnectReturnCode::RefusedProtocolVersion,
        ConnectReasonCode::BadClientId | ConnectReasonCode::ClientIdentifierNotValid => {
            ConnectReturnCode::BadClientId
        }
        ConnectReasonCode::ServiceUnavailable
        | ConnectReasonCode::ServerUnavailable
        | ConnectReasonCode::ServerBusy => ConnectReturnCode::ServiceUnavailable,
        ConnectReasonCode::BadUserNamePassword => ConnectReturnCode::BadUserNamePassword,
        ConnectReasonCode::NotAuthorized | ConnectReasonCode::Banned => {
            ConnectReturnCode::NotAuthorized
        }
        other => return format!("The broker refused the connection: {:?}", other),
    };
    describe_refusal(&text).to_string()
}

/// Describes why the broker refused a connection.
pub fn describe_refusal(code: &ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "No error occurred.",
        ConnectReturnCode::RefusedProtocolVersion => {
            "The broker does not accept a connection using the specified protocol version."
        }
        ConnectReturnCode::BadClientId => "The client ID is malformed or was rejected.",
        ConnectReturnCode::ServiceUnavailable => {
            "The network connection has been established, but the service is unavailable on the broker side."
        }
        ConnectReturnCode::BadUserNamePassword => "The data in the username or password is malformed.",
        ConnectReturnCode::NotAuthorized => "The client is not authorized to connect.",
    }
}
