//! Target platform configuration for the middle end.
//!
//! Passes never look up a global target. Every pass that needs one takes a
//! [`Target`] argument, built from a triple or loaded from a JSON config file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use derive_more::Display;
use serde::Deserialize;
use target_lexicon::{Architecture, Triple};
use tessera_ir::Intrinsic;
use tessera_ir::intrinsic::UnknownIntrinsic;

/// Largest allocation kept on the stack on most targets, in bytes.
pub const DEFAULT_STACK_THRESHOLD: u64 = 16 * 1024;

/// Hexagon DSPs have a much larger stack.
pub const HEXAGON_STACK_THRESHOLD: u64 = 128 * 1024;

/// Target platform information for the middle end.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    /// Target triple (e.g., "hexagon-unknown-none-elf")
    pub triple: Triple,
    /// Allocations of at most this many bytes with a constant size live on the stack.
    pub stack_threshold: u64,
    /// Intrinsics the code generator implements natively. Everything else is
    /// lowered to core arithmetic.
    pub native_intrinsics: BTreeSet<Intrinsic>,
}

impl Target {
    /// Create target info from a triple, with that architecture's defaults.
    pub fn from_triple(triple: Triple) -> Self {
        let stack_threshold = match triple.architecture {
            Architecture::Hexagon => HEXAGON_STACK_THRESHOLD,
            _ => DEFAULT_STACK_THRESHOLD,
        };
        Self {
            triple,
            stack_threshold,
            native_intrinsics: BTreeSet::new(),
        }
    }

    /// Get the default target for the current host
    pub fn host() -> Self {
        Self::from_triple(Triple::host())
    }

    pub fn parse(triple: &str) -> Result<Self, ConfigError> {
        let triple =
            Triple::from_str(triple).map_err(|_| ConfigError::UnknownTriple(triple.to_owned()))?;
        Ok(Self::from_triple(triple))
    }

    pub fn with_native_intrinsics(mut self, kinds: impl IntoIterator<Item = Intrinsic>) -> Self {
        self.native_intrinsics.extend(kinds);
        self
    }

    pub fn is_allocation_on_stack(&self, bytes: i64) -> bool {
        u64::try_from(bytes).is_ok_and(|bytes| bytes <= self.stack_threshold)
    }

    pub fn has_native(&self, kind: Intrinsic) -> bool {
        self.native_intrinsics.contains(&kind)
    }

    /// Build a target from a parsed config. Missing fields take the defaults
    /// of the configured triple (or of the host).
    pub fn from_config(config: &TargetConfig) -> Result<Self, ConfigError> {
        let mut target = match &config.triple {
            Some(triple) => Self::parse(triple)?,
            None => Self::host(),
        };
        if let Some(threshold) = config.stack_threshold {
            target.stack_threshold = threshold;
        }
        for name in &config.native_intrinsics {
            target.native_intrinsics.insert(name.parse()?);
        }
        Ok(target)
    }

    /// Load a JSON target config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_config(&TargetConfig::load(path)?)
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::host()
    }
}

/// On-disk form of a [`Target`].
///
/// ```json
/// { "triple": "hexagon-unknown-none-elf", "native_intrinsics": ["saturating_add"] }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub triple: Option<String>,
    pub stack_threshold: Option<u64>,
    #[serde(default)]
    pub native_intrinsics: Vec<String>,
}

impl TargetConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[display("malformed target config: {_0}")]
    Json(serde_json::Error),

    #[display("unknown target triple `{_0}`")]
    UnknownTriple(String),

    #[display("{_0}")]
    UnknownIntrinsic(UnknownIntrinsic),
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json(e) => Some(e),
            ConfigError::UnknownTriple(_) => None,
            ConfigError::UnknownIntrinsic(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        ConfigError::Json(error)
    }
}

impl From<UnknownIntrinsic> for ConfigError {
    fn from(error: UnknownIntrinsic) -> Self {
        ConfigError::UnknownIntrinsic(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hexagon_has_larger_stack() {
        let target = Target::parse("hexagon-unknown-none-elf").unwrap();
        assert_eq!(target.stack_threshold, HEXAGON_STACK_THRESHOLD);
        assert!(target.is_allocation_on_stack(128 * 1024));
        assert!(!target.is_allocation_on_stack(128 * 1024 + 1));
    }

    #[test]
    fn test_x86_64_defaults() {
        let target = Target::parse("x86_64-unknown-linux-gnu").unwrap();
        assert_eq!(target.stack_threshold, DEFAULT_STACK_THRESHOLD);
        assert!(target.native_intrinsics.is_empty());
        assert!(!target.is_allocation_on_stack(-1));
    }

    #[test]
    fn test_unknown_triple() {
        let err = Target::parse("not-a-real-triple-at-all").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTriple(_)));
    }

    #[test]
    fn test_config_overrides_defaults() {
        let config = TargetConfig::from_json(
            r#"{
                "triple": "x86_64-unknown-linux-gnu",
                "stack_threshold": 1024,
                "native_intrinsics": ["saturating_add", "rounding_halving_add"]
            }"#,
        )
        .unwrap();
        let target = Target::from_config(&config).unwrap();
        assert_eq!(target.stack_threshold, 1024);
        assert!(target.has_native(Intrinsic::SaturatingAdd));
        assert!(target.has_native(Intrinsic::HalvingAdd { rounding: true }));
        assert!(!target.has_native(Intrinsic::HalvingAdd { rounding: false }));
    }

    #[test]
    fn test_config_rejects_unknown_fields_and_names() {
        let err = TargetConfig::from_json(r#"{ "stack": 1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));

        let config = TargetConfig::from_json(r#"{ "native_intrinsics": ["fma"] }"#).unwrap();
        let err = Target::from_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "unknown intrinsic `fma`");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "triple": "hexagon-unknown-none-elf" }}"#).unwrap();
        let target = Target::load(file.path()).unwrap();
        assert_eq!(target.triple.architecture, Architecture::Hexagon);

        let missing = file.path().with_extension("missing");
        assert!(matches!(Target::load(&missing), Err(ConfigError::Io { .. })));
    }
}
