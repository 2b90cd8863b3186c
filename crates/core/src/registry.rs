//! Shared table of managed instances.
//!
//! The orchestrator is the only writer of workflow fields; the watchdog only ever
//! flips an instance to `Disconnected` through a [`DisconnectHandle`], and the
//! status surface reads snapshots. Running workflows check the same handle at
//! every checkpoint and stop driving a disconnected window.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::logger;
use crate::platform::Platform;
use crate::settings::Settings;
use crate::types::{InstanceState, ManagedInstance, WindowInfo, SLOT_COUNT};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<Vec<ManagedInstance>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ManagedInstance>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track `info` as a new instance. Returns false if its window is already tracked.
    pub fn insert(&self, info: &WindowInfo, settings: &Settings) -> bool {
        let mut list = self.lock();
        if list.iter().any(|i| i.window_id == info.window_id) {
            return false;
        }
        let name = settings.display_name(&info.title, info.pid);
        let ignored = settings.ignored_for(&name);
        logger::register_prefix(&name, logger::COLOR_BLUE);
        if ignored.is_empty() {
            logger::info(&format!("tracking {} (pid {})", name, info.pid));
        } else {
            let shown: Vec<String> = ignored.iter().map(|s| (s + 1).to_string()).collect();
            logger::info(&format!(
                "tracking {} (pid {}), ignoring slot(s) {}",
                name,
                info.pid,
                shown.join(", ")
            ));
        }
        list.push(ManagedInstance::new(info, name, ignored));
        true
    }

    /// Sync with the live windows: add new ones, drop the ones that vanished.
    /// Returns the number of instances now tracked.
    pub fn discover(&self, platform: &dyn Platform, settings: &Settings) -> usize {
        let live = platform.get_instances(&settings.window_pattern);
        {
            let mut list = self.lock();
            list.retain(|inst| {
                let alive = live.iter().any(|w| w.window_id == inst.window_id);
                if !alive {
                    logger::info(&format!("{} window closed, dropping", inst.name));
                }
                alive
            });
        }
        for info in &live {
            self.insert(info, settings);
        }
        self.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every instance, for status reporting.
    pub fn snapshot(&self) -> Vec<ManagedInstance> {
        self.lock().clone()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.lock().iter().map(|i| i.pid).collect()
    }

    pub fn get(&self, pid: u32) -> Option<ManagedInstance> {
        self.lock().iter().find(|i| i.pid == pid).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ManagedInstance> {
        self.lock().iter().find(|i| i.name.eq_ignore_ascii_case(name)).cloned()
    }

    /// Mutate one instance in place.
    pub fn with<R>(&self, pid: u32, f: impl FnOnce(&mut ManagedInstance) -> R) -> Option<R> {
        self.lock().iter_mut().find(|i| i.pid == pid).map(f)
    }

    pub fn state(&self, pid: u32) -> Option<InstanceState> {
        self.with(pid, |i| i.state)
    }

    /// Move an instance to `state`. A disconnected instance stays disconnected.
    pub fn set_state(&self, pid: u32, state: InstanceState, status: Option<&str>) {
        self.with(pid, |inst| {
            if inst.state == InstanceState::Disconnected && state != InstanceState::Disconnected {
                return;
            }
            if inst.state != state {
                logger::info_p(
                    &inst.name,
                    &format!("{} -> {}", inst.state.label(), state.label()),
                );
            }
            inst.state = state;
            if let Some(s) = status {
                inst.status = s.to_string();
            }
        });
    }

    /// Record `slot` as the carried one. Ignored or out-of-range slots are refused.
    pub fn set_active(&self, pid: u32, slot: Option<usize>) -> bool {
        self.with(pid, |inst| match slot {
            Some(s) if s >= SLOT_COUNT || inst.is_ignored(s) => {
                logger::warn_p(&inst.name, &format!("refusing to activate slot {}", s + 1));
                false
            }
            _ => {
                inst.active_slot = slot;
                true
            }
        })
        .unwrap_or(false)
    }

    pub fn disconnect_handle(&self) -> DisconnectHandle {
        DisconnectHandle { registry: self.clone() }
    }

    /// Every instance finished or out of play.
    pub fn all_settled(&self) -> bool {
        self.lock().iter().all(|i| i.state.is_terminal())
    }
}

/// Handle given to the disconnect watchdog.
#[derive(Debug, Clone)]
pub struct DisconnectHandle {
    registry: Registry,
}

impl DisconnectHandle {
    pub fn mark_disconnected(&self, pid: u32) {
        if self.registry.get(pid).is_none() {
            logger::warn(&format!("disconnect reported for unknown pid {}", pid));
            return;
        }
        self.registry.set_state(pid, InstanceState::Disconnected, Some("Disconnected"));
    }

    pub fn is_disconnected(&self, pid: u32) -> bool {
        self.registry.state(pid) == Some(InstanceState::Disconnected)
    }
}
