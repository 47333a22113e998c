pub mod choke_ctl;
pub mod encoder;
pub mod freeze_ctl;
pub mod quantize;
pub mod registry;
pub mod stutter_ctl;
