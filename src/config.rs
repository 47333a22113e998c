use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{Command, CommandKind, EffectId, Quant};

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub devices: DeviceConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Key-binding table. Empty means the built-in layout.
    #[serde(default)]
    pub keys: Vec<KeyBinding>,
}

/// Device configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Audio device index or name
    pub audio: Option<String>,

    /// MIDI clock input index or name
    pub midiin: Option<String>,
}

/// Tunable defaults
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DefaultsConfig {
    /// Global quantization grid: "1/32", "1/16", "1/8" or "1/4"
    #[serde(default)]
    pub quantization: Option<String>,

    /// Choke crossfade in milliseconds
    #[serde(default)]
    pub fade_ms: Option<f32>,

    /// Quantized-onset lookahead in samples
    #[serde(default)]
    pub lookahead: Option<u32>,
}

/// One front-panel key bound to an effect. Press/release kinds default to
/// the momentary enable/disable pair.
#[derive(Debug, Deserialize, Serialize)]
pub struct KeyBinding {
    /// Single character, matched against key events
    pub key: char,

    /// Effect name: "freeze", "choke", "stutter" or "func"
    pub effect: String,

    #[serde(default)]
    pub press: Option<String>,

    #[serde(default)]
    pub release: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if let Some(ref quant) = self.defaults.quantization {
            parse_quant(quant)?;
        }

        if let Some(fade_ms) = self.defaults.fade_ms {
            if !(0.5..=50.0).contains(&fade_ms) {
                anyhow::bail!("fade_ms must be between 0.5 and 50.0, got {}", fade_ms);
            }
        }

        if let Some(lookahead) = self.defaults.lookahead {
            if lookahead > 1024 {
                anyhow::bail!("lookahead must be at most 1024 samples, got {}", lookahead);
            }
        }

        for binding in &self.keys {
            parse_effect(&binding.effect)
                .with_context(|| format!("key '{}' binding", binding.key))?;
            if let Some(ref press) = binding.press {
                parse_kind(press).with_context(|| format!("key '{}' press kind", binding.key))?;
            }
            if let Some(ref release) = binding.release {
                parse_kind(release)
                    .with_context(|| format!("key '{}' release kind", binding.key))?;
            }
        }

        Ok(())
    }

    pub fn quantization(&self) -> Quant {
        self.defaults
            .quantization
            .as_deref()
            .and_then(|q| parse_quant(q).ok())
            .unwrap_or_default()
    }

    /// The key table, resolved to command pairs. Falls back to the
    /// built-in layout when the config names no keys.
    pub fn key_table(&self) -> Vec<ResolvedBinding> {
        if self.keys.is_empty() {
            return default_key_table();
        }

        self.keys
            .iter()
            .filter_map(|binding| {
                let effect = parse_effect(&binding.effect).ok()?;
                let press_kind = match binding.press.as_deref() {
                    Some(kind) => parse_kind(kind).ok()?,
                    None => CommandKind::Enable,
                };
                let release_kind = match binding.release.as_deref() {
                    Some(kind) => parse_kind(kind).ok()?,
                    None => CommandKind::Disable,
                };

                Some(ResolvedBinding {
                    key: binding.key,
                    press: Command::new(press_kind, effect),
                    release: Command::new(release_kind, effect),
                })
            })
            .collect()
    }
}

/// A key binding with its commands resolved
#[derive(Debug, Clone, Copy)]
pub struct ResolvedBinding {
    pub key: char,
    pub press: Command,
    pub release: Command,
}

/// Built-in layout: f FREEZE, c CHOKE, s STUTTER, space FUNC
pub fn default_key_table() -> Vec<ResolvedBinding> {
    [
        ('f', EffectId::Freeze),
        ('c', EffectId::Choke),
        ('s', EffectId::Stutter),
        (' ', EffectId::Func),
    ]
    .iter()
    .map(|&(key, effect)| ResolvedBinding {
        key,
        press: Command::new(CommandKind::Enable, effect),
        release: Command::new(CommandKind::Disable, effect),
    })
    .collect()
}

fn parse_quant(name: &str) -> Result<Quant> {
    match name {
        "1/32" => Ok(Quant::Q32),
        "1/16" => Ok(Quant::Q16),
        "1/8" => Ok(Quant::Q8),
        "1/4" => Ok(Quant::Q4),
        other => anyhow::bail!("unknown quantization '{}' (use 1/32, 1/16, 1/8 or 1/4)", other),
    }
}

fn parse_effect(name: &str) -> Result<EffectId> {
    match name.to_lowercase().as_str() {
        "freeze" => Ok(EffectId::Freeze),
        "choke" => Ok(EffectId::Choke),
        "stutter" => Ok(EffectId::Stutter),
        "func" => Ok(EffectId::Func),
        other => anyhow::bail!("unknown effect '{}'", other),
    }
}

fn parse_kind(name: &str) -> Result<CommandKind> {
    match name.to_lowercase().as_str() {
        "enable" => Ok(CommandKind::Enable),
        "disable" => Ok(CommandKind::Disable),
        "toggle" => Ok(CommandKind::Toggle),
        "none" => Ok(CommandKind::None),
        other => anyhow::bail!("unknown command kind '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quantization(), Quant::Q16);
    }

    #[test]
    fn test_default_key_table() {
        let table = default_key_table();
        assert_eq!(table.len(), 4);
        assert_eq!(table[0].key, 'f');
        assert_eq!(table[0].press.target, EffectId::Freeze);
        assert_eq!(table[0].press.kind, CommandKind::Enable);
        assert_eq!(table[3].press.target, EffectId::Func);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
devices:
  audio: "2"
defaults:
  quantization: "1/8"
  fade_ms: 5.0
keys:
  - key: g
    effect: choke
    press: toggle
    release: none
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.quantization(), Quant::Q8);
        assert_eq!(config.defaults.fade_ms, Some(5.0));

        let table = config.key_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].key, 'g');
        assert_eq!(table[0].press.kind, CommandKind::Toggle);
        assert_eq!(table[0].release.kind, CommandKind::None);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.defaults.fade_ms = Some(500.0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.defaults.quantization = Some("1/7".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.keys.push(KeyBinding {
            key: 'x',
            effect: "reverb".into(),
            press: None,
            release: None,
        });
        assert!(config.validate().is_err());
    }
}
