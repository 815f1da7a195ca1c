//! Driver configuration
//!
//! Mirrors the teacher's builder-pattern `CompilerConfig`, but loaded from
//! TOML (`serde`/`toml`) rather than assembled purely in Rust code, since a
//! real front end ships effect-default manifests and module search paths as
//! data. Validated once at load time, distinct from the compile-time
//! conflicts `EffectEnv::pin` raises against a single session's pins.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// One `effect.default(name=impl)` entry loaded from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectDefault {
    pub effect_name: String,
    pub impl_symbol: String,
}

/// §9 Open Question: whether `goto_begin` is a distinct always-legal-to-any-
/// visible-label form, or sugar for plain `goto` (identical visibility
/// rule). The driver defaults to treating them as distinct, matching how
/// `cfg.rs` validates each independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GotoBeginAliasMode {
    Distinct,
    AliasOfGoto,
}

impl Default for GotoBeginAliasMode {
    fn default() -> Self {
        GotoBeginAliasMode::Distinct
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Directories searched, in order, for a module's default-effect
    /// manifest when none is given explicitly.
    pub module_search_path: Vec<PathBuf>,

    /// Effect defaults installed into a fresh `EffectEnv` before compiling.
    /// Two entries naming the same effect is a configuration error, caught
    /// by `validate()` rather than left to silently shadow one another.
    pub effect_defaults: Vec<EffectDefault>,

    pub goto_begin_alias_mode: GotoBeginAliasMode,

    /// §9 Open Question: reject a `goto_end` to a sibling/uncle label
    /// (default, matches `cfg.rs`'s `GotoEndToUncle`) instead of merely
    /// warning.
    pub strict_goto_end_visibility: bool,

    /// §9 Open Question: whether reading a union field through a variant
    /// other than the one last written is a hard error (`true`) or
    /// implementation-defined passthrough (`false`, the default — matches
    /// a C union's native behavior, the least surprising choice for a
    /// language whose structs/unions are meant to sit directly on top of
    /// an FFI boundary).
    pub strict_union_field_reads: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            module_search_path: Vec::new(),
            effect_defaults: Vec::new(),
            goto_begin_alias_mode: GotoBeginAliasMode::Distinct,
            strict_goto_end_visibility: true,
            strict_union_field_reads: false,
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        DriverConfig::default()
    }

    pub fn with_module_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_search_path.push(path.into());
        self
    }

    pub fn with_effect_default(mut self, effect_name: impl Into<String>, impl_symbol: impl Into<String>) -> Self {
        self.effect_defaults.push(EffectDefault {
            effect_name: effect_name.into(),
            impl_symbol: impl_symbol.into(),
        });
        self
    }

    /// Parse and validate a TOML configuration document.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let config: DriverConfig = toml::from_str(text).map_err(|e| format!("invalid driver config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for d in &self.effect_defaults {
            if !seen.insert(d.effect_name.as_str()) {
                return Err(format!(
                    "duplicate effect default for '{}'; a module manifest may only set one default per effect",
                    d.effect_name
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_effect_defaults() {
        let config = DriverConfig::new()
            .with_effect_default("rng", "system_rng")
            .with_effect_default("clock", "system_clock");
        assert_eq!(config.effect_defaults.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_effect_default_is_rejected() {
        let config = DriverConfig::new()
            .with_effect_default("rng", "system_rng")
            .with_effect_default("rng", "other_rng");
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip_with_defaults() {
        let text = r#"
            strict_union_field_reads = true

            [[effect_defaults]]
            effect_name = "rng"
            impl_symbol = "system_rng"
        "#;
        let config = DriverConfig::from_toml(text).unwrap();
        assert!(config.strict_union_field_reads);
        assert_eq!(config.goto_begin_alias_mode, GotoBeginAliasMode::Distinct);
        assert_eq!(config.effect_defaults[0].impl_symbol, "system_rng");
    }

    #[test]
    fn toml_rejects_duplicate_effect_defaults() {
        let text = r#"
            [[effect_defaults]]
            effect_name = "rng"
            impl_symbol = "a"

            [[effect_defaults]]
            effect_name = "rng"
            impl_symbol = "b"
        "#;
        assert!(DriverConfig::from_toml(text).is_err());
    }
}
