//! Window-relative action primitives. Every primitive is a pause checkpoint.

use std::thread;
use std::time::Duration;

use crate::error::{ActionError, ActionResult};
use crate::logger;
use crate::pause::{PauseToken, RetryPolicy, PAUSE_POLL};
use crate::platform::WindowHandle;
use crate::registry::DisconnectHandle;
use crate::settings::Timings;
use crate::types::{LocateResult, MouseButton};
use crate::vision::{self, Catalog, Element};

/// Mini grabs before a real drag; the client ignores a drag that starts cold.
const GRAB_NUDGES: i32 = 2;
const DRAG_STEPS: i32 = 5;

/// Everything a workflow needs, owned by the orchestrator and passed down explicitly.
pub struct ActionContext<'a> {
    pub window: &'a mut dyn WindowHandle,
    pub catalog: &'a Catalog,
    pub token: &'a PauseToken,
    pub retry: RetryPolicy,
    pub timings: Timings,
    /// Display size, for coordinate validation.
    pub screen: (i32, i32),
    /// Log prefix (instance display name).
    pub prefix: String,
    /// Watchdog view of this instance, keyed by pid.
    disconnect: Option<(DisconnectHandle, u32)>,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        window: &'a mut dyn WindowHandle,
        catalog: &'a Catalog,
        token: &'a PauseToken,
        retry: RetryPolicy,
        timings: Timings,
        screen: (i32, i32),
        prefix: impl Into<String>,
    ) -> Self {
        Self { window, catalog, token, retry, timings, screen, prefix: prefix.into(), disconnect: None }
    }

    /// Abort at the next checkpoint once the watchdog marks `pid` disconnected.
    pub fn watch_disconnect(mut self, handle: DisconnectHandle, pid: u32) -> Self {
        self.disconnect = Some((handle, pid));
        self
    }

    fn ensure_connected(&self) -> ActionResult {
        match &self.disconnect {
            Some((handle, pid)) if handle.is_disconnected(*pid) => Err(ActionError::Disconnected),
            _ => Ok(()),
        }
    }

    /// Block while paused; fails on stop or disconnect.
    pub fn checkpoint(&self) -> ActionResult {
        self.ensure_connected()?;
        self.token.checkpoint()?;
        self.ensure_connected()
    }

    /// Pause-aware sleep in slices, rechecking the watchdog between them.
    pub fn sleep(&self, duration: Duration) -> ActionResult {
        let mut remaining = duration;
        self.checkpoint()?;
        while !remaining.is_zero() {
            let step = remaining.min(PAUSE_POLL);
            self.token.sleep(step)?;
            remaining -= step;
            self.ensure_connected()?;
        }
        Ok(())
    }

    pub fn log(&self, msg: &str) {
        logger::info_p(&self.prefix, msg);
    }

    pub fn warn(&self, msg: &str) {
        logger::warn_p(&self.prefix, msg);
    }

    /// Pause-aware fixed sleep.
    pub fn wait_ms(&self, ms: u64) -> ActionResult {
        self.sleep(Duration::from_millis(ms))
    }

    /// Slot element for a 0-based index.
    pub fn slot(&self, index: usize) -> ActionResult<Element> {
        Element::slot(index).ok_or(ActionError::InvalidSlot(index))
    }

    /// Single capture and match; no retry.
    pub fn locate(&mut self, element: Element) -> Option<LocateResult> {
        let catalog = self.catalog;
        let template = catalog.get(element)?;
        vision::locate(template, &mut *self.window)
    }

    /// Window-relative point to validated screen point.
    fn to_screen(&mut self, x: i32, y: i32) -> ActionResult<(i32, i32)> {
        self.window.update();
        let region = match self.window.region() {
            Some(r) if !r.is_empty() => r,
            _ => {
                self.warn("window is gone or minimized");
                return Err(ActionError::WindowGone);
            }
        };
        let (ax, ay) = (region.l + x, region.t + y);
        if ax < 0 || ay < 0 || ax >= self.screen.0 || ay >= self.screen.1 {
            self.warn(&format!("point ({}, {}) is off screen, skipping", ax, ay));
            return Err(ActionError::OutOfBounds { x: ax, y: ay });
        }
        Ok((ax, ay))
    }

    pub fn click_at(&mut self, x: i32, y: i32, delay_ms: u64, button: MouseButton) -> ActionResult {
        self.checkpoint()?;
        let (ax, ay) = self.to_screen(x, y)?;
        self.window.click(ax, ay, button);
        self.wait_ms(delay_ms)
    }

    pub fn click(&mut self, at: LocateResult, delay_ms: u64) -> ActionResult {
        self.click_at(at.x, at.y, delay_ms, MouseButton::Left)
    }

    /// Press-and-drag from one window-relative point to another.
    ///
    /// Once pressed, the gesture runs to the final release; pause and stop
    /// take effect before the press or after the drop.
    pub fn drag_between(&mut self, from: (i32, i32), to: (i32, i32)) -> ActionResult {
        self.checkpoint()?;
        let (sx, sy) = self.to_screen(from.0, from.1)?;
        let (ex, ey) = self.to_screen(to.0, to.1)?;
        let step = Duration::from_millis(self.timings.drag_step_ms);

        self.window.mouse_up(MouseButton::Left);
        for i in 0..GRAB_NUDGES {
            self.window.mouse_move(sx + i, sy);
            self.window.mouse_down(MouseButton::Left);
            self.window.mouse_move(sx + i + 1, sy);
            self.window.mouse_up(MouseButton::Left);
            thread::sleep(step);
        }

        self.window.mouse_move(sx + GRAB_NUDGES, sy);
        self.window.mouse_down(MouseButton::Left);
        thread::sleep(step);
        self.glide((sx + GRAB_NUDGES, sy), (ex, ey));
        self.window.mouse_up(MouseButton::Left);
        thread::sleep(step);
        // release alone does not always drop the item
        self.window.click(ex, ey, MouseButton::Left);
        self.wait_ms(self.timings.click_settle_ms)
    }

    /// Plain drag without grab nudges, used to move panels.
    pub fn move_panel(&mut self, from: (i32, i32), to: (i32, i32)) -> ActionResult {
        self.checkpoint()?;
        let (sx, sy) = self.to_screen(from.0, from.1)?;
        let (ex, ey) = self.to_screen(to.0, to.1)?;
        self.window.mouse_move(sx, sy);
        self.window.mouse_down(MouseButton::Left);
        thread::sleep(Duration::from_millis(self.timings.drag_step_ms));
        self.glide((sx, sy), (ex, ey));
        self.window.mouse_up(MouseButton::Left);
        self.wait_ms(self.timings.click_settle_ms)
    }

    fn glide(&mut self, from: (i32, i32), to: (i32, i32)) {
        for i in 1..=DRAG_STEPS {
            let x = from.0 + (to.0 - from.0) * i / DRAG_STEPS;
            let y = from.1 + (to.1 - from.1) * i / DRAG_STEPS;
            self.window.mouse_move(x, y);
        }
    }

    /// Poll until any of `elements` is located, in preference order.
    pub fn wait_for_any(&mut self, elements: &[Element]) -> ActionResult<(Element, LocateResult)> {
        let names: Vec<String> = elements.iter().map(|e| e.name()).collect();
        let label = names.join(" | ");
        let mut misses = 0u32;
        loop {
            self.checkpoint()?;
            if !self.window.is_alive() {
                self.warn(&format!("window closed while waiting for {}", label));
                return Err(ActionError::WindowGone);
            }
            for &element in elements {
                if let Some(hit) = self.locate(element) {
                    if misses > 0 {
                        self.log(&format!("found {} after {} retries", element, misses));
                    }
                    return Ok((element, hit));
                }
            }
            if misses == 0 {
                self.log(&format!("waiting for {}", label));
            }
            misses += 1;
            if self.retry.should_log(misses) {
                self.log(&format!("still waiting for {} ({} attempts)", label, misses));
            }
            if self.retry.exhausted(misses) {
                self.warn(&format!("giving up on {} after {} attempts", label, misses));
                return Err(ActionError::NotFound(elements[0]));
            }
            self.sleep(self.retry.delay())?;
        }
    }

    pub fn wait_for(&mut self, element: Element) -> ActionResult<LocateResult> {
        self.wait_for_any(&[element]).map(|(_, hit)| hit)
    }

    /// Wait until located, click it, then sleep `delay_ms`.
    pub fn wait_and_click(&mut self, element: Element, delay_ms: u64) -> ActionResult<LocateResult> {
        let hit = self.wait_for(element)?;
        self.click(hit, delay_ms)?;
        Ok(hit)
    }

    /// One locate attempt; clicks when present.
    pub fn click_if_present(&mut self, element: Element, delay_ms: u64) -> ActionResult<bool> {
        self.checkpoint()?;
        match self.locate(element) {
            Some(hit) => {
                self.click(hit, delay_ms)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Hover first so the client registers the target, then click.
    pub fn hover_click(&mut self, at: LocateResult, delay_ms: u64) -> ActionResult {
        self.checkpoint()?;
        let (ax, ay) = self.to_screen(at.x, at.y)?;
        self.window.mouse_move(ax, ay);
        self.wait_ms(self.timings.hover_settle_ms)?;
        self.click_at(at.x, at.y, delay_ms, MouseButton::Left)
    }

    /// Run one workflow step; failures that need not end the workflow are
    /// logged and the step is reported as skipped.
    pub fn step<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> ActionResult<T>,
    ) -> ActionResult<Option<T>> {
        match f(self) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.warn(&format!("{} skipped: {}", name, e));
                Ok(None)
            }
        }
    }
}
