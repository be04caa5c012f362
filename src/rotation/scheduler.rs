//! Preset scheduler: picks the next preset and turns it into engine commands

use tracing::warn;

use super::queue::{Preset, PresetOverride, RotationQueue};
use crate::engine::Command;
use crate::store::catalog::Catalog;

pub const MOD_NAME_VAR: &str = "GameOptions.GameInfo.ModName";
pub const LEVEL_NAME_VAR: &str = "GameOptions.GameInfo.LevelName";
pub const LOADING_TIME_VAR: &str = "GameOptions.GameInfo.LoadingTime";

/// A preset made active, with the commands that apply it
#[derive(Debug, Clone)]
pub struct Activation {
    pub preset: Preset,
    /// Announcements followed by `setvar`s, in send order
    pub commands: Vec<Command>,
    /// The preset had no file; the catalog should be rescanned
    pub file_missing: bool,
}

/// Rotation queue feeding preset activations
pub struct PresetScheduler {
    queue: RotationQueue,
}

impl PresetScheduler {
    pub fn new(configured: Vec<String>) -> Self {
        Self {
            queue: RotationQueue::new(configured),
        }
    }

    /// Activate the head of the queue
    ///
    /// Returns `None` only when the catalog knows no presets at all.
    pub fn advance(&mut self, catalog: &Catalog) -> Option<Activation> {
        let mut preset = self.queue.pop_next(catalog.presets())?;

        let announcement = match &preset.name {
            Some(name) => format!("Preset {}", name),
            None => preset.to_string(),
        };
        let mut commands = vec![
            Command::ConsoleMsg(announcement.clone()),
            Command::ChatMsg(announcement),
        ];

        let defaults = catalog.defaults();
        if let Some(defaults) = defaults {
            commands.extend(defaults.var_pairs().map(setvar));
        }

        let mut file_missing = false;
        if let Some(name) = preset.name.clone() {
            match catalog.preset_file(&name) {
                Some(file) => {
                    commands.extend(file.var_pairs().map(setvar));
                    preset.merge_missing(file);
                }
                None => {
                    // A bare name with no file selects the mod of that name
                    warn!(preset = %name, "No preset file, using the name as mod");
                    file_missing = true;
                    if preset.mod_name.is_none() {
                        preset.mod_name = Some(name);
                    }
                }
            }
        }
        if let Some(defaults) = defaults {
            preset.merge_missing(defaults);
        }

        if let Some(mod_name) = &preset.mod_name {
            commands.push(setvar((MOD_NAME_VAR.to_string(), mod_name.clone())));
        }
        if let Some(level) = &preset.level {
            commands.push(setvar((LEVEL_NAME_VAR.to_string(), level.clone())));
        }
        if let Some(loading_time) = preset.loading_time {
            commands.push(setvar((LOADING_TIME_VAR.to_string(), loading_time.to_string())));
        }

        Some(Activation {
            preset,
            commands,
            file_missing,
        })
    }

    /// Change the next preset; returns it as it now stands
    pub fn override_next(&mut self, catalog: &Catalog, changes: &PresetOverride) -> Option<Preset> {
        let head = self.queue.head_mut(catalog.presets())?;
        head.apply(changes);
        let next = head.clone();
        if changes.repeat > 0 {
            self.queue.repeat_head(changes.repeat);
        }
        Some(next)
    }
}

fn setvar((name, value): (String, String)) -> Command {
    Command::SetVar { name, value }
}
