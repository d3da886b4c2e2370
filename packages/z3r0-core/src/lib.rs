//! # Z3R0 Core
//!
//! An OpenPGP codec: armor, packet framing, key material and message
//! encryption, with a text-in/text-out session layer on top.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Z3R0 CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                       ┌──────────────────────┐                          │
//! │                       │       Session        │                          │
//! │                       │ generate / encrypt / │                          │
//! │                       │       decrypt        │                          │
//! │                       └──────────┬───────────┘                          │
//! │                  ┌───────────────┴───────────────┐                      │
//! │                  ▼                               ▼                      │
//! │  ┌───────────────────────────┐   ┌───────────────────────────┐          │
//! │  │           Keys            │   │          Cipher           │          │
//! │  │ - Generate / parse        │◄──│ - PKESK v3 / v6           │          │
//! │  │ - Self-signatures         │   │ - SEIPD v1 / v2           │          │
//! │  │ - Lock / unlock / wipe    │   │ - Literal / compressed    │          │
//! │  └─────────────┬─────────────┘   └─────────────┬─────────────┘          │
//! │                └───────────────┬───────────────┘                        │
//! │                                ▼                                        │
//! │  ┌─────────────┐  ┌─────────────────────┐  ┌────────────────────────┐   │
//! │  │   Armor     │  │      Packet         │  │        Crypto          │   │
//! │  │ - CRC24     │─▶│ - Old / new headers │  │ - ECC, RSA, AES        │   │
//! │  │ - Tolerant  │  │ - Partial lengths   │  │ - HKDF, S2K, key wrap  │   │
//! │  └─────────────┘  └─────────────────────┘  └────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error taxonomy with stable kinds and codes
//! - [`config`] - TOML-loadable codec configuration
//! - [`armor`] - ASCII armor codec with the tolerant two-stage parse
//! - [`packet`] - Packet framing and body readers
//! - [`crypto`] - Algorithm registries and primitives
//! - [`keys`] - Certificates, private keys, generation and unlock
//! - [`cipher`] - Message encryption and decryption
//! - [`session`] - Armored text entry points
//!
//! ## Quick Start
//!
//! ```ignore
//! use z3r0_core::{Algorithm, CodecConfig, Session};
//!
//! let session = Session::new(CodecConfig::default())?;
//! let pair = session.generate("a@example.com", "correct-horse", Algorithm::Curve25519)?;
//! let message = session.encrypt("hello", &pair.public_key)?;
//! let text = session.decrypt(&message, &pair.private_key, "correct-horse")?;
//! assert_eq!(text, "hello");
//! ```
//!
//! ## Security Model
//!
//! | Concern | Handling |
//! |---------|----------|
//! | Secrets at rest | Argon2 S2K + AES-256-GCM key protection |
//! | Secrets in memory | `Zeroizing` buffers, wiped on unlock scope exit |
//! | Message integrity | AEAD per chunk plus a final tag, or MDC for legacy input |
//! | Comparisons | Constant time through `subtle` |
//! | Partial output | Never: plaintext is released only after every check |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod armor;
pub mod cipher;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod packet;
pub mod session;
/// Timestamp helpers for OpenPGP's 32-bit creation times.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use armor::BlockType;
pub use cipher::{decrypt, encrypt, EncryptedMessage, Plaintext, Recipient};
pub use config::{CodecConfig, KdfLimits, KdfParams};
pub use error::{Error, ErrorKind, Result};
pub use keys::{
    generate, Algorithm, CancelToken, Fingerprint, KeyId, KeyState, PrivateKeyMaterial,
    PublicKeyMaterial, UnlockedKey,
};
pub use packet::{Packet, Tag};
pub use session::{GeneratedKeyPair, Session};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Z3R0 Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        #[cfg(target_os = "macos")]
        target: "macos",
        #[cfg(target_os = "linux")]
        target: "linux",
        #[cfg(target_os = "windows")]
        target: "windows",
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        target: "unknown",
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert!(matches!(info.profile, "debug" | "release"));
    }
}
