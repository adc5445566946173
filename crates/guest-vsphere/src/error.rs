//! Error types for the vSphere guest operations crate.

use std::fmt;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestErrorKind {
    /// A required flag / environment variable was not supplied
    MissingInput,
    /// Endpoint unreachable or session could not be established
    ConnectionError,
    /// Login rejected (InvalidLogin fault / 401)
    AuthenticationError,
    /// Datacenter, VM or guest file not found
    NotFound,
    /// SOAP fault returned by the vim25 endpoint
    SoapFault,
    /// HTTP error with status code
    ApiError(u16),
    /// Transfer URL upload / download failed
    TransferError,
    /// XML / URL / timestamp parse error
    ParseError,
    /// Flag combination not supported for the target guest
    Unsupported,
    /// Guest program finished with a non-zero exit code
    RemoteExit(i32),
    /// Wait aborted by the caller
    Cancelled,
    /// Local file I/O
    Io,
    /// Timeout
    Timeout,
    /// Generic
    Other,
}

/// Crate error type carrying a kind + human-readable message.
#[derive(Debug, Clone)]
pub struct GuestError {
    pub kind: GuestErrorKind,
    pub message: String,
}

impl GuestError {
    pub fn new(kind: GuestErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::MissingInput, msg)
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::ConnectionError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::AuthenticationError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::NotFound, msg)
    }

    pub fn fault(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::SoapFault, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::ApiError(status), msg)
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::TransferError, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::ParseError, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::Unsupported, msg)
    }

    pub fn remote_exit(code: i32) -> Self {
        Self::new(
            GuestErrorKind::RemoteExit(code),
            format!("command exited with code {code}"),
        )
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::Cancelled, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(GuestErrorKind::Timeout, msg)
    }

    /// Prefix the message with the operation that failed, keeping the kind.
    pub fn context(self, what: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{what}: {}", self.message),
        }
    }

    /// Exit code relayed from the guest, if this error carries one.
    pub fn remote_exit_code(&self) -> Option<i32> {
        match self.kind {
            GuestErrorKind::RemoteExit(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for GuestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GuestError {}

impl From<reqwest::Error> for GuestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else {
            Self::new(GuestErrorKind::Other, format!("HTTP error: {e}"))
        }
    }
}

impl From<std::io::Error> for GuestError {
    fn from(e: std::io::Error) -> Self {
        Self::new(GuestErrorKind::Io, e.to_string())
    }
}

impl From<url::ParseError> for GuestError {
    fn from(e: url::ParseError) -> Self {
        Self::parse(format!("Invalid URL: {e}"))
    }
}

impl From<quick_xml::Error> for GuestError {
    fn from(e: quick_xml::Error) -> Self {
        Self::parse(format!("XML parse error: {e}"))
    }
}

/// Convenience alias.
pub type GuestResult<T> = Result<T, GuestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_exit_message_and_code() {
        let err = GuestError::remote_exit(7);
        assert_eq!(err.to_string(), "command exited with code 7");
        assert_eq!(err.remote_exit_code(), Some(7));
        assert_eq!(GuestError::fault("boom").remote_exit_code(), None);
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = GuestError::not_found("vm 'web01'").context("failed to find VM web01");
        assert_eq!(err.kind, GuestErrorKind::NotFound);
        assert_eq!(err.to_string(), "failed to find VM web01: vm 'web01'");
    }
}
