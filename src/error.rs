//! Unified error handling for fxchatd.
//!
//! Validation errors map to client-visible error frames; routing errors
//! wrap the layers below. Each error carries a static code used both as
//! the wire error code and the metrics label.

use crate::proto::{ErrorBody, Frame};
use thiserror::Error;

/// Errors raised while validating an inbound message envelope.
///
/// A validation failure is reported back to the sending connection and
/// stops the message before persistence and fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unrecognized message type")]
    UnknownType,

    #[error("peer message body is missing")]
    MissingPeerBody,

    #[error("channel message body is missing")]
    MissingChannelBody,

    #[error("invalid receiver id")]
    InvalidReceiver,

    #[error("invalid channel id")]
    InvalidChannel,

    #[error("message content cannot be empty")]
    EmptyContent,

    #[error("only channel admins can send messages")]
    NotChannelAdmin,
}

impl ValidationError {
    /// Static code string, used on the wire and for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownType => "unknown_type",
            Self::MissingPeerBody => "missing_peer_body",
            Self::MissingChannelBody => "missing_channel_body",
            Self::InvalidReceiver => "invalid_receiver",
            Self::InvalidChannel => "invalid_channel",
            Self::EmptyContent => "empty_content",
            Self::NotChannelAdmin => "not_channel_admin",
        }
    }

    /// Convert to the error frame sent back to the originating connection.
    pub fn to_frame(&self) -> Frame {
        Frame::Error {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        }
    }
}

/// Errors raised on the message routing path.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("persistence error: {0}")]
    Db(#[from] crate::db::DbError),
}

impl RouteError {
    /// Static code string for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::Db(_) => "persistence_error",
        }
    }

    /// Convert to the error frame sent back to the originating connection.
    ///
    /// Persistence failures are surfaced with a generic code; the detail
    /// stays in the server log.
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Validation(e) => e.to_frame(),
            Self::Db(_) => Frame::Error {
                error: ErrorBody {
                    code: "persistence_error".to_string(),
                    message: "message could not be saved".to_string(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_codes() {
        assert_eq!(ValidationError::UnknownType.error_code(), "unknown_type");
        assert_eq!(ValidationError::EmptyContent.error_code(), "empty_content");
        assert_eq!(
            ValidationError::NotChannelAdmin.error_code(),
            "not_channel_admin"
        );
    }

    #[test]
    fn validation_error_to_frame() {
        let frame = ValidationError::NotChannelAdmin.to_frame();
        match frame {
            Frame::Error { error } => {
                assert_eq!(error.code, "not_channel_admin");
                assert!(error.message.contains("admins"));
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }
}
