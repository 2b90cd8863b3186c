use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logger;
use crate::types::{CaptureRect, SLOT_COUNT};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Regex matched against window titles of the target client.
    pub window_pattern: String,
    /// Directory the client writes `<name>_alert.txt` / `<name>_exp.txt` into.
    pub signal_dir: PathBuf,
    /// Directory holding the reference images.
    pub assets_dir: PathBuf,
    pub goal: Goal,
    pub poll_interval_secs: u64,
    /// Display name -> slot indices to skip.
    pub ignored_slots: HashMap<String, Vec<usize>>,
    /// Window title -> display name, for clients whose title is not the character name.
    pub aliases: HashMap<String, String>,
    pub retry: RetrySettings,
    pub timings: Timings,
    pub merge: MergeConfig,
    pub ocr: OcrSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window_pattern: "Godswar Origin".into(),
            signal_dir: PathBuf::from(r"C:\Godswar Origin\Localization\en_us\Settings\User"),
            assets_dir: PathBuf::from("assets"),
            goal: Goal::default(),
            poll_interval_secs: 10,
            ignored_slots: HashMap::new(),
            aliases: HashMap::new(),
            retry: RetrySettings::default(),
            timings: Timings::default(),
            merge: MergeConfig::default(),
            ocr: OcrSettings::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                logger::info(&format!("no settings at {}, using defaults", path.display()));
                return Self::default();
            }
        };
        match serde_json::from_str::<Settings>(&text) {
            Ok(mut s) => {
                s.merge = s.merge.validated();
                s
            }
            Err(e) => {
                logger::warn(&format!("invalid settings {}: {}, using defaults", path.display(), e));
                Self::default()
            }
        }
    }

    /// Write as pretty JSON. Failures are logged; returns whether the file was written.
    pub fn save(&self, path: &Path) -> bool {
        let written = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        match written {
            Ok(()) => true,
            Err(e) => {
                logger::warn(&format!("could not save settings to {}: {}", path.display(), e));
                false
            }
        }
    }

    /// Ignored slots for a display name, restricted to valid slot indices.
    pub fn ignored_for(&self, name: &str) -> Vec<usize> {
        let Some(list) = self.ignored_slots.get(name) else { return Vec::new() };
        let mut out = Vec::new();
        for &idx in list {
            if idx >= SLOT_COUNT {
                logger::warn(&format!("ignoring out-of-range slot {} for {}", idx, name));
            } else if !out.contains(&idx) {
                out.push(idx);
            }
        }
        out.sort_unstable();
        out
    }

    /// Display name for a window title.
    pub fn display_name(&self, title: &str, pid: u32) -> String {
        if let Some(alias) = self.aliases.get(title) {
            return alias.clone();
        }
        let trimmed = title.trim();
        if trimmed.is_empty() {
            format!("instance-{}", pid)
        } else {
            trimmed.to_string()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Level goal shared by every instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Goal {
    pub target_level: u32,
    /// Overrides the experience-table threshold when set.
    pub target_metric: Option<u64>,
}

impl Default for Goal {
    fn default() -> Self {
        Self { target_level: 30, target_metric: None }
    }
}

impl Goal {
    /// Metric a slot needs before it can be levelled to the target.
    pub fn metric_threshold(&self) -> u64 {
        self.target_metric
            .unwrap_or_else(|| crate::exp_table::accumulated_for(self.target_level))
    }

    /// Whether a slot holding `metric` can be levelled to the target now.
    pub fn is_ready(&self, metric: u64) -> bool {
        match self.target_metric {
            Some(threshold) => metric >= threshold,
            None => crate::exp_table::is_ready_for_level(metric, self.target_level),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub backoff_ms: u64,
    /// None polls forever.
    pub max_attempts: Option<u32>,
    /// Emit a progress line every N misses.
    pub log_every: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { backoff_ms: 500, max_attempts: None, log_every: 20 }
    }
}

/// Fixed waits, tuned to the client's rendering latency (milliseconds).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    pub click_settle_ms: u64,
    pub scan_settle_ms: u64,
    pub activate_ms: u64,
    pub minimize_ms: u64,
    pub record_wait_ms: u64,
    pub drag_step_ms: u64,
    pub portal_clicks: u32,
    pub portal_click_window_ms: u64,
    pub portal_wait_ms: u64,
    pub pet_manager_wait_ms: u64,
    pub merge_open_ms: u64,
    pub merge_confirm_ms: u64,
    pub catalyst_click_ms: u64,
    pub bag_click_ms: u64,
    pub close_click_ms: u64,
    pub mount_wait_ms: u64,
    pub dismount_ms: u64,
    pub transporter_wait_ms: u64,
    pub hover_settle_ms: u64,
    pub npc_dialog_ms: u64,
    pub ok_wait_ms: u64,
    pub thermopylae_wait_ms: u64,
    pub thebes_wait_ms: u64,
    pub mycenae_npc_ms: u64,
    pub mycenae_wait_ms: u64,
    pub mycenae_inner_ms: u64,
    pub larissa_hop_ms: u64,
    pub larissa_wait_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            click_settle_ms: 500,
            scan_settle_ms: 700,
            activate_ms: 800,
            minimize_ms: 300,
            record_wait_ms: 2_000,
            drag_step_ms: 100,
            portal_clicks: 20,
            portal_click_window_ms: 4_000,
            portal_wait_ms: 12_000,
            pet_manager_wait_ms: 21_000,
            merge_open_ms: 500,
            merge_confirm_ms: 800,
            catalyst_click_ms: 300,
            bag_click_ms: 1_000,
            close_click_ms: 300,
            mount_wait_ms: 11_000,
            dismount_ms: 1_000,
            transporter_wait_ms: 29_000,
            hover_settle_ms: 1_000,
            npc_dialog_ms: 2_500,
            ok_wait_ms: 3_000,
            thermopylae_wait_ms: 200_000,
            thebes_wait_ms: 5_000,
            mycenae_npc_ms: 3_000,
            mycenae_wait_ms: 2_000,
            mycenae_inner_ms: 5_000,
            larissa_hop_ms: 2_000,
            larissa_wait_ms: 65_000,
        }
    }
}

impl Timings {
    /// Every wait collapsed to zero; the simulated platform has no latency.
    pub fn instant() -> Self {
        Self {
            click_settle_ms: 0,
            scan_settle_ms: 0,
            activate_ms: 0,
            minimize_ms: 0,
            record_wait_ms: 0,
            drag_step_ms: 0,
            portal_clicks: 20,
            portal_click_window_ms: 0,
            portal_wait_ms: 0,
            pet_manager_wait_ms: 0,
            merge_open_ms: 0,
            merge_confirm_ms: 0,
            catalyst_click_ms: 0,
            bag_click_ms: 0,
            close_click_ms: 0,
            mount_wait_ms: 0,
            dismount_ms: 0,
            transporter_wait_ms: 0,
            hover_settle_ms: 0,
            npc_dialog_ms: 0,
            ok_wait_ms: 0,
            thermopylae_wait_ms: 0,
            thebes_wait_ms: 0,
            mycenae_npc_ms: 0,
            mycenae_wait_ms: 0,
            mycenae_inner_ms: 0,
            larissa_hop_ms: 0,
            larissa_wait_ms: 0,
        }
    }
}

/// Where the character parks after merging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Thermopylae,
    Larissa,
}

impl std::str::FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thermopylae" | "thermo" => Ok(Destination::Thermopylae),
            "larissa" => Ok(Destination::Larissa),
            other => Err(format!("unknown destination '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MergeConfig {
    pub receiver_slot: usize,
    pub provider_slot: usize,
    pub use_catalyst: bool,
    pub max_merges: Option<u32>,
    pub final_slot: usize,
    pub destination: Destination,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            receiver_slot: 0,
            provider_slot: 7,
            use_catalyst: false,
            max_merges: None,
            final_slot: 0,
            destination: Destination::Thermopylae,
        }
    }
}

impl MergeConfig {
    /// Slots outside the pet window fall back to their defaults, with a warning.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        for (field, slot, fallback) in [
            ("receiver_slot", &mut self.receiver_slot, defaults.receiver_slot),
            ("provider_slot", &mut self.provider_slot, defaults.provider_slot),
            ("final_slot", &mut self.final_slot, defaults.final_slot),
        ] {
            if *slot >= SLOT_COUNT {
                logger::warn(&format!("merge.{} = {} is not a slot, using {}", field, slot, fallback));
                *slot = fallback;
            }
        }
        self
    }

    /// Providers occupy every slot from `provider_slot` to the last one.
    pub fn total_to_merge(&self) -> u32 {
        SLOT_COUNT.saturating_sub(self.provider_slot) as u32
    }

    pub fn iterations(&self) -> u32 {
        let total = self.total_to_merge();
        self.max_merges.map_or(total, |cap| total.min(cap))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OcrSettings {
    /// Window-relative rectangle of the rendered metric in the detail view.
    pub metric_region: Option<CaptureRect>,
}
