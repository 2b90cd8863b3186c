use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};

use crate::error::{ActionError, ActionResult};
use crate::logger;
use crate::pause::{PauseToken, RetryPolicy};
use crate::platform::{Platform, WindowHandle};
use crate::registry::Registry;
use crate::settings::{MergeConfig, Settings};
use crate::signal::{AlertSignal, SignalChannel};
use crate::types::*;
use crate::vision::{Catalog, NumericReader};
use crate::workflow::merge::{run_merge, MergeReport};
use crate::workflow::scan::{apply_scan, scan_slots, MetricOcr};
use crate::workflow::upgrade::{select_active, upgrade_slot};
use crate::workflow::ActionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Setup pass, then poll alerts until everything is done or stopped.
    Full,
    /// Setup scan only; no upgrades, no polling.
    Analyze,
}

/// Owns every window handle and drives all window-facing work from one thread.
pub struct Engine {
    platform: Box<dyn Platform>,
    catalog: Arc<Catalog>,
    reader: Option<Arc<NumericReader>>,
    signal: SignalChannel,
    settings: Settings,
    registry: Registry,
    token: PauseToken,
    windows: HashMap<WindowId, Box<dyn WindowHandle>>,
    commands: Option<mpsc::Receiver<Command>>,
    screen: (i32, i32),
    state: OrchestratorState,
}

impl Engine {
    pub fn new(platform: Box<dyn Platform>, catalog: Arc<Catalog>, settings: Settings, token: PauseToken) -> Self {
        let screen = platform.screen_size();
        Self {
            platform,
            catalog,
            reader: None,
            signal: SignalChannel::new(settings.signal_dir.clone()),
            settings,
            registry: Registry::new(),
            token,
            windows: HashMap::new(),
            commands: None,
            screen,
            state: OrchestratorState::Stopped,
        }
    }

    /// Enable on-screen metric reading during scans (needs `ocr.metric_region`).
    pub fn with_reader(mut self, reader: Arc<NumericReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_commands(mut self, rx: mpsc::Receiver<Command>) -> Self {
        self.commands = Some(rx);
        self
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Drain pending commands. Returns false once the engine should stop.
    fn process_commands(&mut self) -> bool {
        let Some(rx) = &self.commands else { return !self.token.is_stopped() };
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                Command::TogglePause => {
                    self.token.toggle();
                }
                Command::Stop => {
                    logger::info("stop requested");
                    self.token.request_stop();
                }
                Command::Quit => {
                    logger::info("shutting down");
                    self.token.request_stop();
                    return false;
                }
            }
        }
        !self.token.is_stopped()
    }

    /// Re-enumerate windows and keep one handle per tracked instance.
    pub fn refresh(&mut self) -> usize {
        let count = self.registry.discover(self.platform.as_ref(), &self.settings);
        let live = self.platform.get_instances(&self.settings.window_pattern);
        self.windows.retain(|id, _| live.iter().any(|w| w.window_id == *id));
        for info in &live {
            if !self.windows.contains_key(&info.window_id) {
                self.windows.insert(info.window_id, self.platform.create_window(info));
            }
        }
        count
    }

    /// Run `f` with a context bound to `inst`'s window.
    fn with_ctx<R>(
        &mut self,
        inst: &ManagedInstance,
        f: impl FnOnce(&mut ActionContext) -> ActionResult<R>,
    ) -> ActionResult<R> {
        let Some(window) = self.windows.get_mut(&inst.window_id) else {
            return Err(ActionError::WindowGone);
        };
        let mut ctx = ActionContext::new(
            window.as_mut(),
            &self.catalog,
            &self.token,
            RetryPolicy::from(self.settings.retry),
            self.settings.timings,
            self.screen,
            inst.name.clone(),
        )
        .watch_disconnect(self.registry.disconnect_handle(), inst.pid);
        f(&mut ctx)
    }

    fn minimize_all(&mut self) {
        for window in self.windows.values_mut() {
            window.minimize();
        }
        logger::info(&format!("minimized {} window(s)", self.windows.len()));
    }

    /// Record the outcome of one instance's turn. Only a stop request escapes.
    fn settle(&self, pid: u32, result: ActionResult) -> ActionResult {
        match result {
            Ok(()) => Ok(()),
            Err(ActionError::Stopped) => Err(ActionError::Stopped),
            Err(ActionError::Disconnected) => {
                if let Some(inst) = self.registry.get(pid) {
                    logger::warn_p(&inst.name, "disconnected, dropped from scheduling");
                }
                Ok(())
            }
            Err(ActionError::WindowGone) => {
                if let Some(inst) = self.registry.get(pid) {
                    logger::error_p(&inst.name, "window not found, giving up on this instance");
                }
                self.registry.set_state(pid, InstanceState::Error, Some("Window not found"));
                Ok(())
            }
            Err(e) => {
                if let Some(inst) = self.registry.get(pid) {
                    logger::error_p(&inst.name, &e.to_string());
                }
                self.registry.set_state(pid, InstanceState::Error, Some(&e.to_string()));
                Ok(())
            }
        }
    }

    /// Scan every instance once, level the slots already past the goal, pick the
    /// next active slot. Instances are handled strictly one after another.
    pub fn setup(&mut self, mode: RunMode) -> ActionResult {
        self.state = OrchestratorState::Setup;
        self.minimize_all();
        for pid in self.registry.pids() {
            if !self.process_commands() {
                return Err(ActionError::Stopped);
            }
            let result = self.setup_instance(pid, mode);
            self.settle(pid, result)?;
        }
        Ok(())
    }

    fn setup_instance(&mut self, pid: u32, mode: RunMode) -> ActionResult {
        let Some(inst) = self.registry.get(pid) else { return Ok(()) };
        if inst.state.is_terminal() {
            logger::info_p(&inst.name, &format!("skipping, instance is {}", inst.state.label()));
            return Ok(());
        }
        self.registry.set_state(pid, InstanceState::Analyzing, None);

        let signal = self.signal.clone();
        let reader = self.reader.clone();
        let region = self.settings.ocr.metric_region;
        let goal = self.settings.goal;
        let processed = inst.processed_slots();

        let report = self.with_ctx(&inst, |ctx| {
            bring_to_front(ctx)?;
            let ocr = match (reader.as_deref(), region) {
                (Some(reader), Some(region)) => Some(MetricOcr { reader, region }),
                _ => None,
            };
            scan_slots(ctx, &inst.name, &processed, &signal, ocr.as_ref())
        })?;
        let eligible = self
            .registry
            .with(pid, |i| apply_scan(i, &report, &goal))
            .unwrap_or_default();

        if mode == RunMode::Analyze {
            self.registry.set_state(pid, InstanceState::Idle, None);
            return self.with_ctx(&inst, send_to_back);
        }

        if !eligible.is_empty() {
            self.registry.set_state(pid, InstanceState::Upgrading, None);
            for slot in eligible {
                self.upgrade(&inst, slot, None)?;
            }
        }
        self.activate_next(&inst)?;
        self.with_ctx(&inst, send_to_back)
    }

    /// Level `slot` to the goal and mark it completed. A skipped upgrade leaves it pending.
    fn upgrade(&mut self, inst: &ManagedInstance, slot: usize, level: Option<u32>) -> ActionResult {
        let target = self.settings.goal.target_level;
        let current = match level {
            Some(l) => l,
            None => self.registry.get(inst.pid).map_or(0, |i| i.slots[slot].level),
        };
        let done = self.with_ctx(inst, |ctx| {
            ctx.step(&format!("upgrade slot {}", slot + 1), |c| upgrade_slot(c, slot, current, target))
        })?;
        if done.is_some() {
            self.registry.with(inst.pid, |i| {
                let rec = &mut i.slots[slot];
                rec.level = rec.level.max(current).max(target);
                rec.completed = true;
            });
        }
        Ok(())
    }

    /// Carry the first slot still below the goal, or finish the instance.
    fn activate_next(&mut self, inst: &ManagedInstance) -> ActionResult {
        let next = self.registry.get(inst.pid).and_then(|i| i.next_eligible_slot());
        let Some(slot) = next else {
            self.registry.set_active(inst.pid, None);
            self.registry.set_state(inst.pid, InstanceState::Complete, Some("All pets at goal"));
            return Ok(());
        };
        let selected = self.with_ctx(inst, |ctx| {
            ctx.step(&format!("select slot {}", slot + 1), |c| select_active(c, slot))
        })?;
        if selected.is_some() {
            self.registry.set_active(inst.pid, Some(slot));
        } else {
            logger::warn_p(&inst.name, &format!("slot {} could not be made active", slot + 1));
        }
        self.registry.set_state(inst.pid, InstanceState::Waiting, None);
        Ok(())
    }

    /// Check every waiting instance's alert once and service the hits.
    pub fn poll_once(&mut self) -> ActionResult {
        self.state = OrchestratorState::Polling;
        for pid in self.registry.pids() {
            if !self.process_commands() {
                return Err(ActionError::Stopped);
            }
            let Some(inst) = self.registry.get(pid) else { continue };
            if inst.state != InstanceState::Waiting {
                continue;
            }
            let Some(alert) = self.signal.poll_alert(&inst.name) else { continue };
            let result = self.service_alert(&inst, &alert);
            self.settle(pid, result)?;
        }
        Ok(())
    }

    fn service_alert(&mut self, inst: &ManagedInstance, alert: &AlertSignal) -> ActionResult {
        let Some(slot) = alert_slot(inst, alert) else {
            logger::warn_p(&inst.name, "alert does not match any tracked slot, ignoring");
            return Ok(());
        };
        logger::info_p(
            &inst.name,
            &format!("slot {} reached its goal at level {}", slot + 1, alert.level),
        );
        self.registry.with(inst.pid, |i| {
            let rec = &mut i.slots[slot];
            rec.level = alert.level;
            rec.observe_metric(alert.current_metric);
            if alert.pet_id.is_some() {
                rec.pet_id = alert.pet_id;
            }
        });
        self.registry.set_state(inst.pid, InstanceState::Upgrading, None);
        self.with_ctx(inst, bring_to_front)?;
        self.upgrade(inst, slot, Some(alert.level))?;
        self.activate_next(inst)?;
        self.with_ctx(inst, send_to_back)
    }

    /// Setup, then the polling loop, until every instance settles or a stop arrives.
    pub fn run(&mut self, mode: RunMode) {
        let stale = self.signal.clean_stale();
        if stale > 0 {
            logger::info(&format!("removed {} stale signal file(s)", stale));
        }
        if self.refresh() == 0 {
            logger::warn(&format!("no windows match '{}'", self.settings.window_pattern));
            self.state = OrchestratorState::Stopped;
            return;
        }

        if self.setup(mode).is_err() {
            logger::info("stopped during setup");
            self.state = OrchestratorState::Stopped;
            return;
        }
        if mode == RunMode::Analyze {
            logger::info(&format_analysis(&self.registry.snapshot(), &self.settings));
            self.state = OrchestratorState::Stopped;
            return;
        }

        logger::info(&format!(
            "setup complete, polling every {}s",
            self.settings.poll_interval_secs
        ));
        loop {
            if self.registry.all_settled() {
                logger::info("all instances complete");
                break;
            }
            if self.poll_once().is_err() {
                break;
            }
            if self.token.sleep(self.settings.poll_interval()).is_err() || !self.process_commands() {
                break;
            }
        }
        self.state = OrchestratorState::Stopped;
        logger::info("orchestrator stopped");
    }

    /// Merge/travel on the instance whose display name is `name`.
    pub fn merge(&mut self, name: &str, cfg: &MergeConfig) -> Result<MergeReport> {
        if self.refresh() == 0 {
            return Err(anyhow!("no windows match '{}'", self.settings.window_pattern));
        }
        let inst = self
            .registry
            .find_by_name(name)
            .ok_or_else(|| anyhow!("no instance named '{}'", name))?;
        let cfg = cfg.validated();
        let report = self.with_ctx(&inst, |ctx| {
            bring_to_front(ctx)?;
            run_merge(ctx, &cfg)
        });
        report.map_err(|e| anyhow!("merge on {} failed: {}", inst.name, e))
    }
}

/// Run a merge on its own thread; the main loop keeps its own engine.
pub fn spawn_merge(mut engine: Engine, name: String, cfg: MergeConfig) -> JoinHandle<Result<MergeReport>> {
    thread::spawn(move || engine.merge(&name, &cfg))
}

fn bring_to_front(ctx: &mut ActionContext) -> ActionResult {
    ctx.window.activate();
    ctx.wait_ms(ctx.timings.activate_ms)?;
    ctx.window.update();
    match ctx.window.region() {
        Some(r) if !r.is_empty() => Ok(()),
        _ => Err(ActionError::WindowGone),
    }
}

fn send_to_back(ctx: &mut ActionContext) -> ActionResult {
    ctx.window.minimize();
    ctx.wait_ms(ctx.timings.minimize_ms)
}

/// Slot an alert refers to: the one holding its pet id, else the active slot.
pub fn alert_slot(inst: &ManagedInstance, alert: &AlertSignal) -> Option<usize> {
    let by_id = alert.pet_id.and_then(|id| {
        inst.slots
            .iter()
            .position(|s| s.pet_id == Some(id))
            .filter(|&s| !inst.is_ignored(s))
    });
    by_id.or(inst.active_slot)
}

/// Per-instance scan report, one block per instance.
pub fn format_analysis(instances: &[ManagedInstance], settings: &Settings) -> String {
    let threshold = settings.goal.metric_threshold();
    let mut out = format!(
        "analysis (goal level {}, threshold {} exp)\n",
        settings.goal.target_level, threshold
    );
    for inst in instances {
        let _ = writeln!(out, "{} [{}] {}", inst.name, inst.state.label(), inst.status);
        for (idx, rec) in inst.slots.iter().enumerate() {
            let note = if rec.ignored {
                "ignored"
            } else if rec.completed {
                "done"
            } else if rec.level > 0 && settings.goal.is_ready(rec.current_metric) {
                "ready"
            } else if rec.level == 0 {
                "empty"
            } else {
                "growing"
            };
            let _ = writeln!(
                out,
                "  slot {}: {:<16} lv {:>3}  exp {:>12}  {}",
                idx + 1,
                rec.pet_name,
                rec.level,
                rec.current_metric,
                note
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ManagedInstance {
        let info = WindowInfo { window_id: 1, pid: 1, title: "Alice".into() };
        let mut inst = ManagedInstance::new(&info, "Alice".into(), vec![1]);
        inst.slots[1].pet_id = Some(77);
        inst.slots[4].pet_id = Some(42);
        inst.active_slot = Some(2);
        inst
    }

    fn alert(pet_id: Option<u64>) -> AlertSignal {
        AlertSignal {
            name: "Alice".into(),
            pet_id,
            pet_name: "Ember Fox".into(),
            level: 25,
            current_metric: 0,
            target_metric: 0,
            timestamp: String::new(),
        }
    }

    #[test]
    fn alert_prefers_pet_id_over_active_slot() {
        let inst = instance();
        assert_eq!(alert_slot(&inst, &alert(Some(42))), Some(4));
        assert_eq!(alert_slot(&inst, &alert(None)), Some(2));
        // ignored slots never receive an alert
        assert_eq!(alert_slot(&inst, &alert(Some(77))), Some(2));
    }

    #[test]
    fn analysis_lists_every_slot() {
        let mut inst = instance();
        inst.slots[0].level = 30;
        inst.slots[0].completed = true;
        let text = format_analysis(&[inst], &Settings::default());
        assert!(text.contains("Alice [idle]"));
        assert!(text.contains("slot 1:"));
        assert!(text.contains("slot 8:"));
        assert!(text.contains("ignored"));
        assert!(text.lines().nth(2).is_some_and(|l| l.ends_with("done")));
    }
}
