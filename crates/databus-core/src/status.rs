//! Normalisation of raw transport status codes into [`DataBusError`]s.
//!
//! Native transports report every outcome as a status string where `"0"`
//! means success and anything else is an opaque failure message (for
//! example an OPC UA status name such as `"BadConnectionRejected"`).

use std::fmt;

use databus_types::DataBusError;
use tracing::error;

const SUCCESS: &str = "0";

/// Transport operation that produced a [`TransportStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOp {
    CreateContext,
    Send,
    Subscribe,
    Unsubscribe,
    DestroyContext,
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportOp::CreateContext => "create_context",
            TransportOp::Send => "send",
            TransportOp::Subscribe => "subscribe",
            TransportOp::Unsubscribe => "unsubscribe",
            TransportOp::DestroyContext => "destroy_context",
        };
        f.write_str(name)
    }
}

/// Raw status returned by a [`Transport`][crate::transport::Transport] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportStatus(String);

impl TransportStatus {
    pub fn ok() -> Self {
        Self(SUCCESS.to_string())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn is_success(&self) -> bool {
        self.0 == SUCCESS
    }

    pub fn message(&self) -> &str {
        &self.0
    }

    /// Convert into a `Result`, wrapping a failure in the error variant that
    /// matches `op`.
    pub fn into_result(self, op: TransportOp) -> Result<(), DataBusError> {
        if self.is_success() {
            return Ok(());
        }
        error!(op = %op, status = %self.0, "transport call failed");
        Err(match op {
            TransportOp::CreateContext => DataBusError::TransportCreateFailed(self.0),
            TransportOp::Send => DataBusError::TransportSendFailed(self.0),
            TransportOp::Subscribe | TransportOp::Unsubscribe => {
                DataBusError::TransportSubscribeFailed(self.0)
            }
            TransportOp::DestroyContext => DataBusError::TransportDestroyFailed(self.0),
        })
    }
}

impl From<&str> for TransportStatus {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TransportStatus {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i32> for TransportStatus {
    fn from(code: i32) -> Self {
        Self(code.to_string())
    }
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_success() {
        assert!(TransportStatus::ok().is_success());
        assert!(TransportStatus::from("0").is_success());
        assert!(TransportStatus::from(0).is_success());
        assert!(TransportStatus::ok().into_result(TransportOp::Send).is_ok());
    }

    #[test]
    fn failure_maps_to_operation_variant() {
        let status = TransportStatus::failed("Unable to load certificate file");
        assert_eq!(
            status.clone().into_result(TransportOp::CreateContext),
            Err(DataBusError::TransportCreateFailed(
                "Unable to load certificate file".to_string()
            ))
        );
        assert!(matches!(
            status.clone().into_result(TransportOp::Send),
            Err(DataBusError::TransportSendFailed(_))
        ));
        assert!(matches!(
            status.clone().into_result(TransportOp::Unsubscribe),
            Err(DataBusError::TransportSubscribeFailed(_))
        ));
        assert!(matches!(
            status.into_result(TransportOp::DestroyContext),
            Err(DataBusError::TransportDestroyFailed(_))
        ));
    }

    #[test]
    fn non_zero_integer_code_is_failure() {
        let status = TransportStatus::from(-1);
        assert!(!status.is_success());
        assert_eq!(status.message(), "-1");
    }
}
