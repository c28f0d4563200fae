use std::borrow::Cow;

use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Stable wallet RPC error codes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WalletRpcErrorCode {
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ValidationFailed,
    NotFound,
    IntegrityViolation,
    InsufficientFunds,
    SigningFailed,
    Unsupported,
    PoolRejected,
    PoolUnavailable,
    StatePoisoned,
    Custom(String),
}

impl WalletRpcErrorCode {
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            WalletRpcErrorCode::InvalidRequest => Cow::Borrowed("INVALID_REQUEST"),
            WalletRpcErrorCode::MethodNotFound => Cow::Borrowed("METHOD_NOT_FOUND"),
            WalletRpcErrorCode::InvalidParams => Cow::Borrowed("INVALID_PARAMS"),
            WalletRpcErrorCode::InternalError => Cow::Borrowed("INTERNAL_ERROR"),
            WalletRpcErrorCode::ValidationFailed => Cow::Borrowed("VALIDATION_FAILED"),
            WalletRpcErrorCode::NotFound => Cow::Borrowed("NOT_FOUND"),
            WalletRpcErrorCode::IntegrityViolation => Cow::Borrowed("INTEGRITY_VIOLATION"),
            WalletRpcErrorCode::InsufficientFunds => Cow::Borrowed("INSUFFICIENT_FUNDS"),
            WalletRpcErrorCode::SigningFailed => Cow::Borrowed("SIGNING_FAILED"),
            WalletRpcErrorCode::Unsupported => Cow::Borrowed("UNSUPPORTED"),
            WalletRpcErrorCode::PoolRejected => Cow::Borrowed("POOL_REJECTED"),
            WalletRpcErrorCode::PoolUnavailable => Cow::Borrowed("POOL_UNAVAILABLE"),
            WalletRpcErrorCode::StatePoisoned => Cow::Borrowed("STATE_POISONED"),
            WalletRpcErrorCode::Custom(other) => Cow::Borrowed(other.as_str()),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            WalletRpcErrorCode::InvalidRequest => -32600,
            WalletRpcErrorCode::MethodNotFound => -32601,
            WalletRpcErrorCode::InvalidParams => -32602,
            WalletRpcErrorCode::InternalError => -32603,
            WalletRpcErrorCode::ValidationFailed => -32010,
            WalletRpcErrorCode::NotFound => -32011,
            WalletRpcErrorCode::IntegrityViolation => -32012,
            WalletRpcErrorCode::InsufficientFunds => -32020,
            WalletRpcErrorCode::SigningFailed => -32021,
            WalletRpcErrorCode::Unsupported => -32022,
            WalletRpcErrorCode::PoolRejected => -32030,
            WalletRpcErrorCode::PoolUnavailable => -32031,
            WalletRpcErrorCode::StatePoisoned => -32080,
            WalletRpcErrorCode::Custom(_) => -32090,
        }
    }

    pub fn data_payload(&self, details: Option<Value>) -> Value {
        let mut payload = serde_json::Map::new();
        payload.insert(
            "code".to_string(),
            Value::String(self.as_str().into_owned()),
        );
        if let Some(details) = details {
            payload.insert("details".to_string(), details);
        }
        Value::Object(payload)
    }
}

impl Serialize for WalletRpcErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for WalletRpcErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "INVALID_REQUEST" => WalletRpcErrorCode::InvalidRequest,
            "METHOD_NOT_FOUND" => WalletRpcErrorCode::MethodNotFound,
            "INVALID_PARAMS" => WalletRpcErrorCode::InvalidParams,
            "INTERNAL_ERROR" => WalletRpcErrorCode::InternalError,
            "VALIDATION_FAILED" => WalletRpcErrorCode::ValidationFailed,
            "NOT_FOUND" => WalletRpcErrorCode::NotFound,
            "INTEGRITY_VIOLATION" => WalletRpcErrorCode::IntegrityViolation,
            "INSUFFICIENT_FUNDS" => WalletRpcErrorCode::InsufficientFunds,
            "SIGNING_FAILED" => WalletRpcErrorCode::SigningFailed,
            "UNSUPPORTED" => WalletRpcErrorCode::Unsupported,
            "POOL_REJECTED" => WalletRpcErrorCode::PoolRejected,
            "POOL_UNAVAILABLE" => WalletRpcErrorCode::PoolUnavailable,
            "STATE_POISONED" => WalletRpcErrorCode::StatePoisoned,
            other => WalletRpcErrorCode::Custom(other.to_string()),
        })
    }
}

impl From<&str> for WalletRpcErrorCode {
    fn from(value: &str) -> Self {
        WalletRpcErrorCode::deserialize(value.into_deserializer())
            .unwrap_or_else(|_: serde::de::value::Error| WalletRpcErrorCode::Custom(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_their_names() {
        for code in [
            WalletRpcErrorCode::ValidationFailed,
            WalletRpcErrorCode::IntegrityViolation,
            WalletRpcErrorCode::InsufficientFunds,
            WalletRpcErrorCode::PoolRejected,
        ] {
            assert_eq!(WalletRpcErrorCode::from(code.as_str().as_ref()), code);
        }
        assert_eq!(
            WalletRpcErrorCode::from("SOMETHING_ELSE"),
            WalletRpcErrorCode::Custom("SOMETHING_ELSE".into())
        );
    }

    #[test]
    fn payload_carries_code_and_details() {
        let payload = WalletRpcErrorCode::NotFound.data_payload(Some(serde_json::json!({ "id": "ab" })));
        assert_eq!(payload["code"], "NOT_FOUND");
        assert_eq!(payload["details"]["id"], "ab");
    }
}
