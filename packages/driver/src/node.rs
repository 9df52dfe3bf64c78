use std::collections::BTreeMap;
use zwh_core::prelude::*;

mod storage;
pub use storage::*;

/// What an endpoint knows about one of its command classes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommandClassInfo {
    pub supported: bool,
    pub controlled: bool,
    /// The version the device implements; 0 while unknown
    pub version: u8,
    /// Whether this CC must be wrapped in Security encapsulation
    pub secure: bool,
}

impl CommandClassInfo {
    pub fn supported() -> Self {
        Self {
            supported: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct EndpointStorage {
    pub generic_device_class: u8,
    pub specific_device_class: u8,
    cc_info: BTreeMap<CommandClasses, CommandClassInfo>,
}

impl EndpointStorage {
    pub fn supports_cc(&self, cc: CommandClasses) -> bool {
        self.cc_info.get(&cc).map(|i| i.supported).unwrap_or(false)
    }

    pub fn controls_cc(&self, cc: CommandClasses) -> bool {
        self.cc_info.get(&cc).map(|i| i.controlled).unwrap_or(false)
    }

    pub fn cc_version(&self, cc: CommandClasses) -> u8 {
        self.cc_info.get(&cc).map(|i| i.version).unwrap_or(0)
    }

    pub fn supported_ccs(&self) -> Vec<CommandClasses> {
        self.cc_info
            .iter()
            .filter(|(_, info)| info.supported)
            .map(|(cc, _)| *cc)
            .collect()
    }

    pub fn controlled_ccs(&self) -> Vec<CommandClasses> {
        self.cc_info
            .iter()
            .filter(|(_, info)| info.controlled)
            .map(|(cc, _)| *cc)
            .collect()
    }

    pub fn modify_cc_info(&mut self, cc: CommandClasses, modify: impl FnOnce(&mut CommandClassInfo)) {
        modify(self.cc_info.entry(cc).or_default());
    }

    pub fn remove_cc(&mut self, cc: CommandClasses) {
        self.cc_info.remove(&cc);
    }
}
