//! # Error Handling
//!
//! This module provides the error type shared by every Z3R0 codec component.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                      │
//! │  │                                                                      │
//! │  ├── Armor Errors                                                       │
//! │  │   ├── MalformedArmor        - Missing markers, bad base64            │
//! │  │   └── ArmorChecksumMismatch - CRC24 line does not match              │
//! │  │                                                                      │
//! │  ├── Packet Errors                                                      │
//! │  │   ├── TruncatedPacket       - Declared length exceeds input          │
//! │  │   └── MalformedPacket       - Invalid header or body layout          │
//! │  │                                                                      │
//! │  ├── Key Errors                                                         │
//! │  │   ├── InvalidKeyFormat      - Not a usable certificate / key         │
//! │  │   ├── UnknownAlgorithm      - Algorithm or curve not supported       │
//! │  │   ├── WrongPassphrase       - Secret material could not be opened    │
//! │  │   ├── UnprotectedKey        - Cleartext secret key refused           │
//! │  │   ├── BadSelfSignature      - Self-signature fails verification      │
//! │  │   └── KeyGenerationFailed   - Backend refused to build the key       │
//! │  │                                                                      │
//! │  ├── Cipher Errors                                                      │
//! │  │   ├── NoMatchingRecipient   - No session key addressed to us         │
//! │  │   ├── IntegrityCheckFailed  - MDC / AEAD tag / key unwrap failed     │
//! │  │   ├── InvalidMessage        - Decrypted payload is not a message     │
//! │  │   └── EncryptionFailed      - Backend refused to encrypt             │
//! │  │                                                                      │
//! │  ├── Session / Config Errors                                            │
//! │  │   ├── InvalidInput          - Missing email, passphrase, message     │
//! │  │   ├── InvalidConfig         - Configuration out of range             │
//! │  │   ├── ConfigIo              - Configuration file unreadable          │
//! │  │   └── Cancelled             - Operation cancelled by the caller      │
//! │  │                                                                      │
//! │  └── Internal Errors                                                    │
//! │      └── Internal              - Should not happen                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Handling Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ERROR HANDLING FLOW                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Internal (Rust)            Boundary                 CLI / UI           │
//! │  ──────────────────────────────────────────────────────────────────     │
//! │                                                                         │
//! │  Result<T, Error>  ──────►  ErrorReport  ──────►  "error 302: ..."      │
//! │                             (code + kind + message)                     │
//! │                                                                         │
//! │  Example:                                                               │
//! │  Err(Error::WrongPassphrase)  →  { code: 302, kind: WrongPassphrase }   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure is surfaced as exactly one of these variants. No operation
//! returns a partially valid result alongside an error.

use std::fmt;

use thiserror::Error;

/// Result type alias for Z3R0 codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Z3R0 codec
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Armor Errors (100-199)
    // ========================================================================

    /// Armor framing is absent or broken
    #[error("Malformed armor: {0}")]
    MalformedArmor(String),

    /// The CRC24 line does not match the decoded payload
    #[error("Malformed armor: checksum mismatch (expected {expected:06X}, computed {computed:06X})")]
    ArmorChecksumMismatch {
        /// Checksum carried by the armor
        expected: u32,
        /// Checksum of the decoded payload
        computed: u32,
    },

    // ========================================================================
    // Packet Errors (200-299)
    // ========================================================================

    /// A declared length runs past the end of the input
    #[error("Truncated packet: tag {tag} declares {declared} octets but only {remaining} remain")]
    TruncatedPacket {
        /// Raw packet tag
        tag: u8,
        /// Octets the header (or field) declares
        declared: usize,
        /// Octets actually left in the input
        remaining: usize,
    },

    /// Packet header or body layout is invalid
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    // ========================================================================
    // Key Errors (300-399)
    // ========================================================================

    /// The input is not a usable OpenPGP key
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Algorithm, curve or protection mode the codec does not implement
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The passphrase did not open the secret key material
    #[error("Wrong passphrase: the private key could not be unlocked")]
    WrongPassphrase,

    /// A cleartext secret key was supplied while unprotected keys are disabled
    #[error("Invalid key format: private key is not passphrase protected")]
    UnprotectedKey,

    /// A self-signature does not verify against the primary key
    #[error("Invalid key format: bad self-signature ({0})")]
    BadSelfSignature(String),

    /// Key generation failed inside the crypto backend
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    // ========================================================================
    // Cipher Errors (400-499)
    // ========================================================================

    /// No session-key packet is addressed to the supplied key
    #[error("No matching recipient: the message is not encrypted to this key")]
    NoMatchingRecipient,

    /// MDC, AEAD tag, key wrap or session-key checksum failed
    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// The message (or its decrypted payload) has the wrong structure
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Encryption failed inside the crypto backend
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    // ========================================================================
    // Session / Config Errors (500-599)
    // ========================================================================

    /// Caller-supplied input was rejected before any work was done
    #[error("{0}")]
    InvalidInput(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    ConfigIo(String),

    /// The operation was cancelled through its `CancelToken`
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, distinguishable error kinds exposed at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Armor markers missing or checksum mismatch
    MalformedArmor,
    /// Declared packet length exceeds the input
    TruncatedPacket,
    /// Packet framing is invalid
    MalformedPacket,
    /// Unsupported algorithm
    UnknownAlgorithm,
    /// Passphrase does not open the key
    WrongPassphrase,
    /// Message is not addressed to the key
    NoMatchingRecipient,
    /// Authentication of ciphertext failed
    IntegrityCheckFailed,
    /// Key material is unusable
    InvalidKeyFormat,
    /// Message structure is unusable
    InvalidMessage,
    /// Caller input rejected
    InvalidInput,
    /// Caller cancelled the operation
    Cancelled,
    /// Bug or backend failure
    Internal,
}

impl ErrorKind {
    /// Name of the kind as shown to users
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedArmor => "MalformedArmor",
            ErrorKind::TruncatedPacket => "TruncatedPacket",
            ErrorKind::MalformedPacket => "MalformedPacket",
            ErrorKind::UnknownAlgorithm => "UnknownAlgorithm",
            ErrorKind::WrongPassphrase => "WrongPassphrase",
            ErrorKind::NoMatchingRecipient => "NoMatchingRecipient",
            ErrorKind::IntegrityCheckFailed => "IntegrityCheckFailed",
            ErrorKind::InvalidKeyFormat => "InvalidKeyFormat",
            ErrorKind::InvalidMessage => "InvalidMessage",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by component:
    /// - 100-199: Armor
    /// - 200-299: Packet
    /// - 300-399: Keys
    /// - 400-499: Cipher
    /// - 500-599: Session / config
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Armor (100-199)
            Error::MalformedArmor(_) => 100,
            Error::ArmorChecksumMismatch { .. } => 101,

            // Packet (200-299)
            Error::TruncatedPacket { .. } => 200,
            Error::MalformedPacket(_) => 201,

            // Keys (300-399)
            Error::InvalidKeyFormat(_) => 300,
            Error::UnknownAlgorithm(_) => 301,
            Error::WrongPassphrase => 302,
            Error::UnprotectedKey => 303,
            Error::BadSelfSignature(_) => 304,
            Error::KeyGenerationFailed(_) => 305,

            // Cipher (400-499)
            Error::NoMatchingRecipient => 400,
            Error::IntegrityCheckFailed(_) => 401,
            Error::InvalidMessage(_) => 402,
            Error::EncryptionFailed(_) => 403,

            // Session / config (500-599)
            Error::InvalidInput(_) => 500,
            Error::InvalidConfig(_) => 501,
            Error::ConfigIo(_) => 502,
            Error::Cancelled => 503,

            // Internal (900-999)
            Error::Internal(_) => 900,
        }
    }

    /// Stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedArmor(_) | Error::ArmorChecksumMismatch { .. } => {
                ErrorKind::MalformedArmor
            }
            Error::TruncatedPacket { .. } => ErrorKind::TruncatedPacket,
            Error::MalformedPacket(_) => ErrorKind::MalformedPacket,
            Error::InvalidKeyFormat(_) | Error::UnprotectedKey | Error::BadSelfSignature(_) => {
                ErrorKind::InvalidKeyFormat
            }
            Error::UnknownAlgorithm(_) => ErrorKind::UnknownAlgorithm,
            Error::WrongPassphrase => ErrorKind::WrongPassphrase,
            Error::NoMatchingRecipient => ErrorKind::NoMatchingRecipient,
            Error::IntegrityCheckFailed(_) => ErrorKind::IntegrityCheckFailed,
            Error::InvalidMessage(_) => ErrorKind::InvalidMessage,
            Error::InvalidInput(_) | Error::InvalidConfig(_) | Error::ConfigIo(_) => {
                ErrorKind::InvalidInput
            }
            Error::Cancelled => ErrorKind::Cancelled,
            Error::KeyGenerationFailed(_) | Error::EncryptionFailed(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Check if this error was caused by what the user supplied
    ///
    /// User errors can be fixed by correcting the input (passphrase,
    /// key text, message text). Everything else points at a bug or a
    /// backend failure.
    pub fn is_user_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal | ErrorKind::Cancelled)
    }

    /// Shorthand for truncated-field errors raised while reading bodies
    pub(crate) fn truncated(tag: u8, declared: usize, remaining: usize) -> Self {
        Error::TruncatedPacket {
            tag,
            declared,
            remaining,
        }
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::MalformedArmor(format!("invalid base64: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::ConfigIo(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("background task failed: {}", err))
    }
}

// ============================================================================
// BOUNDARY ERROR REPRESENTATION
// ============================================================================

/// Flat error representation handed to the CLI and other front ends
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Numeric error code
    pub code: i32,
    /// Stable error kind
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Whether correcting the input can fix the error
    pub user_error: bool,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
            user_error: err.is_user_error(),
        }
    }
}

impl From<Error> for ErrorReport {
    fn from(err: Error) -> Self {
        ErrorReport::from(&err)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.code, self.kind, self.message)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::MalformedArmor("x".into()).code(), 100);
        assert_eq!(Error::truncated(6, 10, 2).code(), 200);
        assert_eq!(Error::InvalidKeyFormat("x".into()).code(), 300);
        assert_eq!(Error::NoMatchingRecipient.code(), 400);
        assert_eq!(Error::InvalidInput("x".into()).code(), 500);
        assert_eq!(Error::Internal("x".into()).code(), 900);
    }

    #[test]
    fn test_error_kinds() {
        let checksum = Error::ArmorChecksumMismatch {
            expected: 1,
            computed: 2,
        };
        assert_eq!(checksum.kind(), ErrorKind::MalformedArmor);
        assert_eq!(Error::UnprotectedKey.kind(), ErrorKind::InvalidKeyFormat);
        assert_eq!(Error::WrongPassphrase.kind(), ErrorKind::WrongPassphrase);
        assert_eq!(
            Error::IntegrityCheckFailed("tag".into()).kind(),
            ErrorKind::IntegrityCheckFailed
        );
    }

    #[test]
    fn test_user_errors() {
        assert!(Error::WrongPassphrase.is_user_error());
        assert!(Error::MalformedArmor("x".into()).is_user_error());
        assert!(!Error::Internal("x".into()).is_user_error());
        assert!(!Error::Cancelled.is_user_error());
    }

    #[test]
    fn test_truncated_message_names_lengths() {
        let msg = Error::truncated(6, 300, 12).to_string();
        assert!(msg.contains("300"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_error_report_conversion() {
        let report: ErrorReport = Error::WrongPassphrase.into();

        assert_eq!(report.code, 302);
        assert_eq!(report.kind, ErrorKind::WrongPassphrase);
        assert!(report.message.contains("passphrase"));
        assert!(report.user_error);
        assert!(report.to_string().starts_with("[302 WrongPassphrase]"));
    }
}
