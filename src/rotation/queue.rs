//! Rotation queue of upcoming presets

use std::collections::VecDeque;
use std::fmt;

use crate::store::catalog::PresetFile;

/// Session configuration for one game, filled progressively
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preset {
    pub name: Option<String>,
    pub level: Option<String>,
    pub mod_name: Option<String>,
    /// Loading time in percent
    pub loading_time: Option<u32>,
}

impl Preset {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Fill the fields that are still unset from a preset file
    pub fn merge_missing(&mut self, file: &PresetFile) {
        if self.level.is_none() {
            self.level = file.level.clone();
        }
        if self.mod_name.is_none() {
            self.mod_name = file.mod_name.clone();
        }
        if self.loading_time.is_none() {
            self.loading_time = file.loading_time;
        }
    }

    /// Apply the supplied fields of an override
    pub fn apply(&mut self, changes: &PresetOverride) {
        if let Some(name) = &changes.name {
            self.name = Some(name.clone());
        }
        if let Some(level) = &changes.level {
            self.level = Some(level.clone());
        }
        if let Some(mod_name) = &changes.mod_name {
            self.mod_name = Some(mod_name.clone());
        }
        if let Some(loading_time) = changes.loading_time {
            self.loading_time = Some(loading_time);
        }
    }
}

impl fmt::Display for Preset {
    /// "Preset <name> map <level> mod <mod> LT <n>", unset parts omitted
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Preset")?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        if let Some(level) = &self.level {
            write!(f, " map {}", level)?;
        }
        if let Some(mod_name) = &self.mod_name {
            write!(f, " mod {}", mod_name)?;
        }
        if let Some(loading_time) = self.loading_time {
            write!(f, " LT {}", loading_time)?;
        }
        Ok(())
    }
}

/// Changes to the next preset requested by an admin or a passed vote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetOverride {
    pub name: Option<String>,
    pub level: Option<String>,
    pub mod_name: Option<String>,
    pub loading_time: Option<u32>,
    /// Play the result this many times; zero only touches the head
    pub repeat: usize,
}

/// Ordered backlog of presets, refilled whenever it runs dry
pub struct RotationQueue {
    upcoming: VecDeque<Preset>,
    /// Configured rotation; discovered presets are used when empty
    configured: Vec<String>,
}

impl RotationQueue {
    pub fn new(configured: Vec<String>) -> Self {
        Self {
            upcoming: VecDeque::new(),
            configured,
        }
    }

    /// Refill from the configured list, or `available` if none is configured
    pub fn fill(&mut self, available: &[String]) {
        if !self.upcoming.is_empty() {
            return;
        }
        let source = if self.configured.is_empty() {
            available
        } else {
            &self.configured
        };
        self.upcoming.extend(source.iter().map(Preset::named));
    }

    /// Take the head, leaving the queue filled for the next call
    pub fn pop_next(&mut self, available: &[String]) -> Option<Preset> {
        self.fill(available);
        let next = self.upcoming.pop_front();
        self.fill(available);
        next
    }

    pub fn head_mut(&mut self, available: &[String]) -> Option<&mut Preset> {
        self.fill(available);
        self.upcoming.front_mut()
    }

    /// Replace the whole queue with `times` copies of the head
    pub fn repeat_head(&mut self, times: usize) {
        if let Some(head) = self.upcoming.front().cloned() {
            self.upcoming = std::iter::repeat(head).take(times).collect();
        }
    }

}
