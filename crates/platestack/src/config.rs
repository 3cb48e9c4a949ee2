//! Combiner configuration.
//!
//! The defaults match archives exported by Bambu Studio and OrcaSlicer.
//! Hosts can override them from TOML:
//!
//! ```toml
//! max_plates = 16
//! plate_member_prefix = "Metadata/plate_"
//! gcode_extension = ".gcode"
//! max_copies = 99
//! output_prefix = "combined"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PlateStackError, Result};

/// Highest copy count any file may carry.
pub const MAX_COPIES: u32 = 99;

/// Settings shared by extraction, the work queue, and packaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Highest conventional plate index checked (`plate_1` through `plate_<max_plates>`).
    pub max_plates: u32,
    /// Member path prefix for conventional plates.
    pub plate_member_prefix: String,
    /// File suffix of G-code members.
    pub gcode_extension: String,
    /// Upper bound for a file's copy count, at most [`MAX_COPIES`].
    pub max_copies: u32,
    /// Prefix of the suggested output file name.
    pub output_prefix: String,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            max_plates: 16,
            plate_member_prefix: "Metadata/plate_".into(),
            gcode_extension: ".gcode".into(),
            max_copies: MAX_COPIES,
            output_prefix: "combined".into(),
        }
    }
}

impl CombinerConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| PlateStackError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.max_plates == 0 {
            return Err(PlateStackError::Config("max_plates must be at least 1".into()));
        }
        if self.max_copies == 0 || self.max_copies > MAX_COPIES {
            return Err(PlateStackError::Config(format!(
                "max_copies must be between 1 and {MAX_COPIES}"
            )));
        }
        if self.gcode_extension.is_empty() {
            return Err(PlateStackError::Config("gcode_extension is empty".into()));
        }
        if self.output_prefix.is_empty() {
            return Err(PlateStackError::Config("output_prefix is empty".into()));
        }
        Ok(())
    }

    /// Archive member name of conventional plate `index`.
    pub fn plate_member(&self, index: u32) -> String {
        format!("{}{}{}", self.plate_member_prefix, index, self.gcode_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plate_member() {
        let config = CombinerConfig::default();
        assert_eq!(config.plate_member(1), "Metadata/plate_1.gcode");
        assert_eq!(config.plate_member(16), "Metadata/plate_16.gcode");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_keep_defaults() {
        let config = CombinerConfig::from_toml_str("max_copies = 10\n").unwrap();
        assert_eq!(config.max_copies, 10);
        assert_eq!(config.max_plates, 16);
        assert_eq!(config.output_prefix, "combined");
    }

    #[test]
    fn test_toml_rejects_invalid() {
        assert!(matches!(
            CombinerConfig::from_toml_str("max_plates = 0"),
            Err(PlateStackError::Config(_))
        ));
        assert!(matches!(
            CombinerConfig::from_toml_str("gcode_extension = \"\""),
            Err(PlateStackError::Config(_))
        ));
        assert!(CombinerConfig::from_toml_str("max_plates = \"many\"").is_err());
        assert!(matches!(
            CombinerConfig::from_toml_str("max_copies = 500"),
            Err(PlateStackError::Config(_))
        ));
        assert!(CombinerConfig::from_toml_str("max_copies = 99").is_ok());
    }
}
