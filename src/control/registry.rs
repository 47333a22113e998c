//! The command plane's fallback layer: a small registry mapping effect ids
//! to engine handles, and the dispatch from command kind to engine
//! operation. Controllers intercept first; whatever they pass through
//! lands here.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::audio::choke::ChokeShared;
use crate::audio::freeze::FreezeShared;
use crate::audio::stutter::{StutterRequest, StutterShared};
use crate::types::{Command, CommandKind, EffectId, ScheduleMode};

/// Uniform engine surface the dispatch table drives
pub trait EffectHandle: Send + Sync {
    #[allow(dead_code)]
    fn name(&self) -> &'static str;
    fn enable(&self);
    fn disable(&self);
    fn toggle(&self);
    fn is_enabled(&self) -> bool;

    /// SET_PARAM extension point. The named effects use it for their
    /// FREE/QUANTIZED mode bits only.
    fn set_param(&self, index: u8, value: u32);
}

impl EffectHandle for ChokeShared {
    fn name(&self) -> &'static str {
        "Choke"
    }

    fn enable(&self) {
        self.engage();
    }

    fn disable(&self) {
        self.release();
    }

    fn toggle(&self) {
        ChokeShared::toggle(self);
    }

    fn is_enabled(&self) -> bool {
        ChokeShared::is_enabled(self)
    }

    fn set_param(&self, index: u8, value: u32) {
        match index {
            0 => self.set_length_mode(ScheduleMode::from_u8(value as u8)),
            1 => self.set_onset_mode(ScheduleMode::from_u8(value as u8)),
            _ => {}
        }
    }
}

impl EffectHandle for FreezeShared {
    fn name(&self) -> &'static str {
        "Freeze"
    }

    fn enable(&self) {
        self.engage();
    }

    fn disable(&self) {
        self.release();
    }

    fn toggle(&self) {
        FreezeShared::toggle(self);
    }

    fn is_enabled(&self) -> bool {
        FreezeShared::is_enabled(self)
    }

    fn set_param(&self, index: u8, value: u32) {
        match index {
            0 => self.set_length_mode(ScheduleMode::from_u8(value as u8)),
            1 => self.set_onset_mode(ScheduleMode::from_u8(value as u8)),
            _ => {}
        }
    }
}

impl EffectHandle for StutterShared {
    fn name(&self) -> &'static str {
        "Stutter"
    }

    fn enable(&self) {
        self.request(StutterRequest::StartPlayback);
    }

    fn disable(&self) {
        self.request(StutterRequest::StopPlayback);
    }

    fn toggle(&self) {
        if self.is_enabled() {
            self.disable();
        } else {
            self.enable();
        }
    }

    fn is_enabled(&self) -> bool {
        !self.state().is_idle()
    }

    fn set_param(&self, index: u8, value: u32) {
        let mode = ScheduleMode::from_u8(value as u8);
        match index {
            0 => self.set_length_mode(mode),
            1 => self.set_onset_mode(mode),
            2 => self.set_capture_start_mode(mode),
            3 => self.set_capture_end_mode(mode),
            _ => {}
        }
    }
}

/// At most this many registered effects
pub const MAX_EFFECTS: usize = 4;

/// Effect id -> engine handle registry.
pub struct EffectRegistry {
    entries: Vec<(EffectId, Arc<dyn EffectHandle>)>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::with_capacity(MAX_EFFECTS) }
    }

    /// Register an engine. Duplicate ids and the NONE id are
    /// configuration errors; the registry keeps its prior entries.
    pub fn register(&mut self, id: EffectId, handle: Arc<dyn EffectHandle>) -> Result<()> {
        if id == EffectId::None {
            bail!("cannot register the NONE effect id");
        }
        if self.entries.len() >= MAX_EFFECTS {
            bail!("effect registry full ({} entries)", MAX_EFFECTS);
        }
        if self.entries.iter().any(|(existing, _)| *existing == id) {
            bail!("effect id {:?} already registered", id);
        }

        self.entries.push((id, handle));
        Ok(())
    }

    pub fn get(&self, id: EffectId) -> Option<&Arc<dyn EffectHandle>> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, handle)| handle)
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fallback dispatch. Returns true if the command reached an engine;
    /// false for unknown kinds or unregistered targets (callers log and
    /// discard — never fatal).
    pub fn execute(&self, cmd: &Command) -> bool {
        if cmd.kind == CommandKind::None {
            return true;
        }

        let handle = match self.get(cmd.target) {
            Some(handle) => handle,
            None => return false,
        };

        match cmd.kind {
            CommandKind::Toggle => handle.toggle(),
            CommandKind::Enable => handle.enable(),
            CommandKind::Disable => handle.disable(),
            CommandKind::SetParam => handle.set_param(cmd.param1, cmd.value),
            CommandKind::None => {}
        }

        true
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_choke() -> (EffectRegistry, Arc<ChokeShared>) {
        let mut registry = EffectRegistry::new();
        let choke = Arc::new(ChokeShared::new());
        registry.register(EffectId::Choke, choke.clone()).unwrap();
        (registry, choke)
    }

    #[test]
    fn test_register_and_lookup() {
        let (registry, _choke) = registry_with_choke();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(EffectId::Choke).is_some());
        assert!(registry.get(EffectId::Freeze).is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let (mut registry, choke) = registry_with_choke();
        assert!(registry.register(EffectId::Choke, choke).is_err());
        // Survivor intact
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_none_id_rejected() {
        let mut registry = EffectRegistry::new();
        let choke = Arc::new(ChokeShared::new());
        assert!(registry.register(EffectId::None, choke).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_enable_disable_toggle() {
        let (registry, choke) = registry_with_choke();

        assert!(registry.execute(&Command::new(CommandKind::Enable, EffectId::Choke)));
        assert!(choke.is_enabled());

        assert!(registry.execute(&Command::new(CommandKind::Disable, EffectId::Choke)));
        assert!(!choke.is_enabled());

        assert!(registry.execute(&Command::new(CommandKind::Toggle, EffectId::Choke)));
        assert!(choke.is_enabled());
        assert!(registry.execute(&Command::new(CommandKind::Toggle, EffectId::Choke)));
        assert!(!choke.is_enabled());
    }

    #[test]
    fn test_dispatch_set_param_mode_bits() {
        let (registry, choke) = registry_with_choke();

        assert!(registry.execute(&Command::with_param(
            CommandKind::SetParam,
            EffectId::Choke,
            1,
            1
        )));
        assert_eq!(choke.onset_mode(), ScheduleMode::Quantized);
        assert_eq!(choke.length_mode(), ScheduleMode::Free);
    }

    #[test]
    fn test_unregistered_target_reports_false() {
        let (registry, _choke) = registry_with_choke();
        assert!(!registry.execute(&Command::new(CommandKind::Enable, EffectId::Freeze)));
    }

    #[test]
    fn test_none_command_is_noop() {
        let registry = EffectRegistry::new();
        assert!(registry.execute(&Command::default()));
    }
}
