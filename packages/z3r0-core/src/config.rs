//! # Codec Configuration
//!
//! Runtime knobs for the codec, loaded from TOML or built in code.
//!
//! ```toml
//! allow_unprotected_keys = false
//! chunk_size_octet = 12
//! armor_comment = "z3r0"
//! compress = false
//! verify_self_signatures = true
//!
//! [kdf]
//! passes = 3
//! parallelism = 4
//! memory_exponent = 16   # 2^16 KiB = 64 MiB
//!
//! [kdf_limits]
//! max_passes = 32
//! max_parallelism = 64
//! max_memory_exponent = 21   # 2 GiB
//! ```
//!
//! Every field is optional; missing fields take the defaults shown above.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest AEAD chunk size octet accepted (chunk size = 2^(c+6) octets)
pub const MAX_CHUNK_SIZE_OCTET: u8 = 16;

/// Argon2 work factors written into new S2K specifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KdfParams {
    /// Number of passes (t)
    pub passes: u8,
    /// Degree of parallelism (p)
    pub parallelism: u8,
    /// Memory size exponent: memory = 2^memory_exponent KiB
    pub memory_exponent: u8,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            passes: 3,
            parallelism: 4,
            memory_exponent: 16,
        }
    }
}

impl KdfParams {
    /// Cheapest parameters that still pass validation. Tests only.
    #[doc(hidden)]
    pub fn insecure_fast() -> Self {
        Self {
            passes: 1,
            parallelism: 1,
            memory_exponent: 10,
        }
    }

    /// Check the parameters against the Argon2 S2K encoding limits
    ///
    /// The memory exponent must be at least `3 + ceil(log2(parallelism))`
    /// (Argon2 needs 8 KiB per lane) and at most 31.
    pub fn validate(&self) -> Result<()> {
        if self.passes == 0 {
            return Err(Error::InvalidConfig("kdf.passes must be at least 1".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidConfig(
                "kdf.parallelism must be at least 1".into(),
            ));
        }
        let lanes_log2 = u32::from(self.parallelism).next_power_of_two().trailing_zeros();
        let min_exponent = 3 + lanes_log2;
        if u32::from(self.memory_exponent) < min_exponent || self.memory_exponent > 31 {
            return Err(Error::InvalidConfig(format!(
                "kdf.memory_exponent must be between {} and 31 for parallelism {}",
                min_exponent, self.parallelism
            )));
        }
        Ok(())
    }

    /// Memory cost in KiB
    pub fn memory_kib(&self) -> u32 {
        1u32 << self.memory_exponent
    }
}

/// Ceilings on the Argon2 work factors a key packet may demand
///
/// Read from the packet being unlocked, so they bound what a hostile key can
/// cost in memory and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KdfLimits {
    /// Largest accepted number of passes
    pub max_passes: u8,
    /// Largest accepted degree of parallelism
    pub max_parallelism: u8,
    /// Largest accepted memory exponent (2^m KiB)
    pub max_memory_exponent: u8,
}

impl Default for KdfLimits {
    fn default() -> Self {
        Self {
            max_passes: 32,
            max_parallelism: 64,
            max_memory_exponent: 21,
        }
    }
}

impl KdfLimits {
    /// Check `params` stay within the ceilings
    pub fn permits(&self, params: &KdfParams) -> bool {
        params.passes <= self.max_passes
            && params.parallelism <= self.max_parallelism
            && params.memory_exponent <= self.max_memory_exponent
    }

    fn validate(&self) -> Result<()> {
        if self.max_passes == 0 || self.max_parallelism == 0 {
            return Err(Error::InvalidConfig(
                "kdf_limits ceilings must be at least 1".into(),
            ));
        }
        if self.max_memory_exponent > 31 {
            return Err(Error::InvalidConfig(
                "kdf_limits.max_memory_exponent must be at most 31".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for a [`Session`](crate::session::Session)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Argon2 parameters for newly protected keys
    pub kdf: KdfParams,
    /// Argon2 ceilings enforced when unlocking keys
    pub kdf_limits: KdfLimits,
    /// Accept (and generate, given an empty passphrase) cleartext secret keys
    pub allow_unprotected_keys: bool,
    /// AEAD chunk size octet for SEIPD v2 output
    pub chunk_size_octet: u8,
    /// Optional `Comment:` armor header
    pub armor_comment: Option<String>,
    /// Wrap the literal data in a ZLIB compressed data packet
    pub compress: bool,
    /// Verify self-signatures while parsing keys
    pub verify_self_signatures: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            kdf_limits: KdfLimits::default(),
            allow_unprotected_keys: false,
            chunk_size_octet: 12,
            armor_comment: None,
            compress: false,
            verify_self_signatures: true,
        }
    }
}

impl CodecConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CodecConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigIo(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded codec configuration");
        Ok(config)
    }

    /// Check every field is within range
    pub fn validate(&self) -> Result<()> {
        self.kdf.validate()?;
        self.kdf_limits.validate()?;
        if !self.kdf_limits.permits(&self.kdf) {
            return Err(Error::InvalidConfig(
                "kdf parameters exceed kdf_limits; generated keys could not be unlocked".into(),
            ));
        }
        if self.chunk_size_octet > MAX_CHUNK_SIZE_OCTET {
            return Err(Error::InvalidConfig(format!(
                "chunk_size_octet must be at most {}",
                MAX_CHUNK_SIZE_OCTET
            )));
        }
        if let Some(comment) = &self.armor_comment {
            if comment.contains(['\r', '\n']) {
                return Err(Error::InvalidConfig(
                    "armor_comment must be a single line".into(),
                ));
            }
        }
        Ok(())
    }

    /// Fast configuration for tests: weak KDF, everything else default
    #[doc(hidden)]
    pub fn insecure_fast() -> Self {
        Self {
            kdf: KdfParams::insecure_fast(),
            ..Self::default()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CodecConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kdf.memory_kib(), 65536);
        assert!(!config.allow_unprotected_keys);
        assert!(config.verify_self_signatures);
    }

    #[test]
    fn test_insecure_fast_is_valid() {
        assert!(KdfParams::insecure_fast().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CodecConfig::from_toml_str(
            r#"
            allow_unprotected_keys = true

            [kdf]
            passes = 1
            "#,
        )
        .unwrap();

        assert!(config.allow_unprotected_keys);
        assert_eq!(config.kdf.passes, 1);
        assert_eq!(config.kdf.parallelism, 4);
        assert_eq!(config.chunk_size_octet, 12);
    }

    #[test]
    fn test_memory_exponent_bounds() {
        let too_small = KdfParams {
            passes: 1,
            parallelism: 4,
            memory_exponent: 4,
        };
        assert!(too_small.validate().is_err());

        let minimal = KdfParams {
            memory_exponent: 5,
            ..too_small
        };
        assert!(minimal.validate().is_ok());

        let too_big = KdfParams {
            memory_exponent: 32,
            ..minimal
        };
        assert!(too_big.validate().is_err());
    }

    #[test]
    fn test_rejects_large_chunk_size() {
        let err = CodecConfig::from_toml_str("chunk_size_octet = 17").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = CodecConfig::from_toml_str("compression_level = 9").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_multiline_comment() {
        let config = CodecConfig {
            armor_comment: Some("one\ntwo".into()),
            ..CodecConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kdf_limits_from_toml() {
        let config = CodecConfig::from_toml_str(
            r#"
            [kdf_limits]
            max_memory_exponent = 18
            "#,
        )
        .unwrap();
        assert_eq!(config.kdf_limits.max_memory_exponent, 18);
        assert_eq!(config.kdf_limits.max_passes, 32);
    }

    #[test]
    fn test_kdf_must_fit_limits() {
        let err = CodecConfig::from_toml_str(
            r#"
            [kdf]
            memory_exponent = 20

            [kdf_limits]
            max_memory_exponent = 19
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = CodecConfig::from_toml_str("[kdf_limits]\nmax_memory_exponent = 32").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "armor_comment = \"z3r0 test\"").unwrap();

        let config = CodecConfig::from_file(file.path()).unwrap();
        assert_eq!(config.armor_comment.as_deref(), Some("z3r0 test"));
    }

    #[test]
    fn test_missing_file() {
        let err = CodecConfig::from_file("/nonexistent/z3r0.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigIo(_)));
    }
}
