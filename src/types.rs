/// Audio sample rate (Hz). All timing math assumes this rate.
pub const SAMPLE_RATE: u32 = 44_100;

/// Samples per audio block (per channel). The effect pipeline always
/// processes whole blocks of this size.
pub const BLOCK_SAMPLES: usize = 128;

/// External clock pulses per quarter note
pub const PPQN: u32 = 24;

/// Beats per bar (4/4 time signature)
pub const BEATS_PER_BAR: u32 = 4;

/// What action a command performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CommandKind {
    /// No-op (used for unbound keys)
    #[default]
    None = 0,
    /// Flip the effect's current state
    Toggle = 1,
    /// Force enable (button press)
    Enable = 2,
    /// Force disable (button release)
    Disable = 3,
    /// Set an effect parameter (param1 = index, value = data)
    SetParam = 4,
}

/// Which effect a command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EffectId {
    #[default]
    None = 0,
    Stutter = 1,
    Freeze = 2,
    Choke = 3,
    /// Function modifier key (no standalone effect)
    Func = 4,
}

impl EffectId {
    pub fn name(self) -> &'static str {
        match self {
            EffectId::None => "None",
            EffectId::Stutter => "Stutter",
            EffectId::Freeze => "Freeze",
            EffectId::Choke => "Choke",
            EffectId::Func => "Func",
        }
    }
}

/// Command message passed through the lock-free queues.
///
/// 8 bytes, trivially copyable, no hidden state. Safe to transport by copy
/// between the input side and the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command {
    /// What action (1 byte)
    pub kind: CommandKind,
    /// Which effect (1 byte)
    pub target: EffectId,
    /// Generic parameter slot 1 (SetParam: parameter index)
    pub param1: u8,
    /// Generic parameter slot 2 (reserved)
    pub param2: u8,
    /// Generic 32-bit value (SetParam: parameter data)
    pub value: u32,
}

impl Command {
    pub const fn new(kind: CommandKind, target: EffectId) -> Self {
        Self { kind, target, param1: 0, param2: 0, value: 0 }
    }

    #[allow(dead_code)]
    pub const fn with_param(kind: CommandKind, target: EffectId, param1: u8, value: u32) -> Self {
        Self { kind, target, param1, param2: 0, value }
    }
}

// Queue elements must stay an 8-byte POD
const _: () = assert!(std::mem::size_of::<Command>() == 8);
const _: () = assert!(std::mem::size_of::<CommandKind>() == 1);
const _: () = assert!(std::mem::size_of::<EffectId>() == 1);

/// Global quantization grid selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Quant {
    /// 1/32 note (1/8 of a beat)
    Q32 = 0,
    /// 1/16 note (default)
    #[default]
    Q16 = 1,
    /// 1/8 note
    Q8 = 2,
    /// 1/4 note (one full beat)
    Q4 = 3,
}

impl Quant {
    /// Subdivisions per beat for this grid
    pub fn divisor(self) -> u32 {
        match self {
            Quant::Q32 => 8,
            Quant::Q16 => 4,
            Quant::Q8 => 2,
            Quant::Q4 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Quant::Q32 => "1/32",
            Quant::Q16 => "1/16",
            Quant::Q8 => "1/8",
            Quant::Q4 => "1/4",
        }
    }

    pub fn from_index(index: u8) -> Quant {
        match index {
            0 => Quant::Q32,
            1 => Quant::Q16,
            2 => Quant::Q8,
            _ => Quant::Q4,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Whether an effect transition happens immediately or on the beat grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ScheduleMode {
    /// Act immediately on press/release (default)
    #[default]
    Free = 0,
    /// Snap to the next quantization boundary
    Quantized = 1,
}

impl ScheduleMode {
    pub fn from_u8(value: u8) -> ScheduleMode {
        if value == 0 { ScheduleMode::Free } else { ScheduleMode::Quantized }
    }

    #[allow(dead_code)]
    pub fn name(self) -> &'static str {
        match self {
            ScheduleMode::Free => "Free",
            ScheduleMode::Quantized => "Quantized",
        }
    }
}

/// Transport state published by the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransportState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Recording = 2,
}

impl TransportState {
    pub fn from_u8(value: u8) -> TransportState {
        match value {
            1 => TransportState::Playing,
            2 => TransportState::Recording,
            _ => TransportState::Stopped,
        }
    }
}
