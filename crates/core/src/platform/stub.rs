//! In-memory screen: windows are canvases of sprites, input is recorded, and
//! click hooks let a scenario react the way the client would.

use std::sync::{Arc, Mutex, MutexGuard};

use image::{imageops, Rgb, RgbImage};

use crate::types::*;
use crate::logger;
use super::{title_matches, Platform, WindowHandle};

/// Image drawn at a window-relative position.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub tag: String,
    pub image: RgbImage,
    pub x: i32,
    pub y: i32,
    pub visible: bool,
}

impl Sprite {
    pub fn new(tag: impl Into<String>, image: RgbImage, x: i32, y: i32) -> Self {
        Self { tag: tag.into(), image, x, y, visible: true }
    }
}

pub struct StubWindowState {
    pub info: WindowInfo,
    /// Client area in screen coordinates.
    pub bounds: Region,
    pub minimized: bool,
    pub alive: bool,
    pub background: Rgb<u8>,
    pub sprites: Vec<Sprite>,
}

impl StubWindowState {
    pub fn render(&self) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(self.bounds.w as u32, self.bounds.h as u32, self.background);
        for s in self.sprites.iter().filter(|s| s.visible) {
            imageops::replace(&mut canvas, &s.image, s.x as i64, s.y as i64);
        }
        canvas
    }

    pub fn set_visible(&mut self, tag: &str, visible: bool) {
        for s in self.sprites.iter_mut().filter(|s| s.tag == tag) {
            s.visible = visible;
        }
    }

    pub fn is_visible(&self, tag: &str) -> bool {
        self.sprites.iter().any(|s| s.tag == tag && s.visible)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Move { x: i32, y: i32 },
    Down { button: MouseButton, x: i32, y: i32 },
    Up { button: MouseButton, x: i32, y: i32 },
    Activate(WindowId),
    Minimize(WindowId),
}

/// Press and release at the same screen point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Click {
    pub x: i32,
    pub y: i32,
    pub button: MouseButton,
}

/// Press at one point, release at another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drag {
    pub from: (i32, i32),
    pub to: (i32, i32),
}

type ClickAction = Box<dyn FnMut(&mut StubWindowState) + Send>;

struct Hook {
    window: WindowId,
    /// Window-relative hit area.
    area: CaptureRect,
    button: MouseButton,
    action: ClickAction,
}

struct ScreenState {
    size: (i32, i32),
    windows: Vec<StubWindowState>,
    events: Vec<InputEvent>,
    cursor: (i32, i32),
    pressed: Option<(MouseButton, (i32, i32))>,
    foreground: Option<WindowId>,
    hooks: Vec<Hook>,
}

impl ScreenState {
    fn window_mut(&mut self, id: WindowId) -> Option<&mut StubWindowState> {
        self.windows.iter_mut().find(|w| w.info.window_id == id)
    }

    fn fire_hooks(&mut self, x: i32, y: i32, button: MouseButton) {
        let ScreenState { windows, hooks, .. } = self;
        for hook in hooks.iter_mut().filter(|h| h.button == button) {
            let Some(win) = windows.iter_mut().find(|w| w.info.window_id == hook.window) else { continue };
            if !win.alive || win.minimized {
                continue;
            }
            let (rx, ry) = (x - win.bounds.l, y - win.bounds.t);
            let a = hook.area;
            if rx >= a.l && rx < a.l + a.w && ry >= a.t && ry < a.t + a.h {
                (hook.action)(win);
            }
        }
    }
}

/// Shared simulated display. Clones refer to the same screen.
#[derive(Clone)]
pub struct StubScreen {
    inner: Arc<Mutex<ScreenState>>,
}

impl StubScreen {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScreenState {
                size: (width, height),
                windows: Vec::new(),
                events: Vec::new(),
                cursor: (0, 0),
                pressed: None,
                foreground: None,
                hooks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScreenState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_window(&self, info: WindowInfo, bounds: Region) {
        self.lock().windows.push(StubWindowState {
            info,
            bounds,
            minimized: false,
            alive: true,
            background: Rgb([32, 32, 32]),
            sprites: Vec::new(),
        });
    }

    /// Run `f` against one window's state.
    pub fn with_window<R>(&self, id: WindowId, f: impl FnOnce(&mut StubWindowState) -> R) -> Option<R> {
        self.lock().window_mut(id).map(f)
    }

    pub fn add_sprite(&self, id: WindowId, sprite: Sprite) {
        self.with_window(id, |w| w.sprites.push(sprite));
    }

    /// Run `action` whenever a `button` click lands inside `area` of window `id`.
    /// The screen is locked while it runs, so the action must not call back into it.
    pub fn on_click(
        &self,
        id: WindowId,
        area: CaptureRect,
        button: MouseButton,
        action: impl FnMut(&mut StubWindowState) + Send + 'static,
    ) {
        self.lock().hooks.push(Hook { window: id, area, button, action: Box::new(action) });
    }

    /// Simulate the client process exiting.
    pub fn close_window(&self, id: WindowId) {
        self.with_window(id, |w| w.alive = false);
    }

    pub fn foreground(&self) -> Option<WindowId> {
        self.lock().foreground
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.lock().events.clone()
    }

    pub fn clicks(&self) -> Vec<Click> {
        self.gestures().0
    }

    pub fn drags(&self) -> Vec<Drag> {
        self.gestures().1
    }

    fn gestures(&self) -> (Vec<Click>, Vec<Drag>) {
        let (mut clicks, mut drags) = (Vec::new(), Vec::new());
        let mut down: Option<(MouseButton, i32, i32)> = None;
        for ev in self.lock().events.iter() {
            match *ev {
                InputEvent::Down { button, x, y } => down = Some((button, x, y)),
                InputEvent::Up { button, x, y } => {
                    if let Some((b, dx, dy)) = down.take() {
                        if b != button {
                            continue;
                        }
                        if (dx, dy) == (x, y) {
                            clicks.push(Click { x, y, button });
                        } else {
                            drags.push(Drag { from: (dx, dy), to: (x, y) });
                        }
                    }
                }
                _ => {}
            }
        }
        (clicks, drags)
    }
}

pub struct StubPlatform {
    screen: StubScreen,
}

impl StubPlatform {
    pub fn new(screen: StubScreen) -> Self {
        Self { screen }
    }

    /// One blank client window, for dry runs without a real display.
    pub fn demo() -> Self {
        let screen = StubScreen::new(1920, 1080);
        screen.add_window(
            WindowInfo { window_id: 30001, pid: 3001, title: "Godswar Origin".into() },
            Region::new(100, 100, 800, 600),
        );
        Self { screen }
    }

    pub fn screen(&self) -> &StubScreen {
        &self.screen
    }
}

impl Platform for StubPlatform {
    fn get_instances(&self, pattern: &str) -> Vec<WindowInfo> {
        self.screen
            .lock()
            .windows
            .iter()
            .filter(|w| w.alive && title_matches(pattern, &w.info.title))
            .map(|w| w.info.clone())
            .collect()
    }

    fn create_window(&self, info: &WindowInfo) -> Box<dyn WindowHandle> {
        logger::debug(&format!("stub: create_window({}, {:?})", info.window_id, info.title));
        Box::new(StubWindow {
            window_id: info.window_id,
            pid: info.pid,
            title: info.title.clone(),
            screen: self.screen.clone(),
        })
    }

    fn screen_size(&self) -> (i32, i32) {
        self.screen.lock().size
    }
}

struct StubWindow {
    window_id: WindowId,
    pid: u32,
    title: String,
    screen: StubScreen,
}

impl WindowHandle for StubWindow {
    fn id(&self) -> WindowId { self.window_id }
    fn pid(&self) -> u32 { self.pid }
    fn title(&self) -> &str { &self.title }

    fn region(&self) -> Option<Region> {
        self.screen
            .with_window(self.window_id, |w| match (w.alive, w.minimized) {
                (false, _) => None,
                // Windows parks minimized windows far off-screen with no client area
                (true, true) => Some(Region::new(-32000, -32000, 0, 0)),
                (true, false) => Some(w.bounds),
            })
            .flatten()
    }

    fn update(&mut self) {}

    fn is_alive(&self) -> bool {
        self.screen.with_window(self.window_id, |w| w.alive).unwrap_or(false)
    }

    fn activate(&mut self) {
        let mut s = self.screen.lock();
        if let Some(w) = s.window_mut(self.window_id) {
            if !w.alive {
                return;
            }
            w.minimized = false;
        }
        s.foreground = Some(self.window_id);
        s.events.push(InputEvent::Activate(self.window_id));
    }

    fn minimize(&mut self) {
        let mut s = self.screen.lock();
        if let Some(w) = s.window_mut(self.window_id) {
            w.minimized = true;
        }
        if s.foreground == Some(self.window_id) {
            s.foreground = None;
        }
        s.events.push(InputEvent::Minimize(self.window_id));
    }

    fn capture(&mut self, rect: Option<CaptureRect>) -> Option<Capture> {
        let full = self
            .screen
            .with_window(self.window_id, |w| (w.alive && !w.minimized).then(|| w.render()))
            .flatten()?;
        let img = match rect {
            None => full,
            Some(r) => {
                let l = r.l.clamp(0, full.width() as i32) as u32;
                let t = r.t.clamp(0, full.height() as i32) as u32;
                let w = (r.w.max(0) as u32).min(full.width() - l);
                let h = (r.h.max(0) as u32).min(full.height() - t);
                imageops::crop_imm(&full, l, t, w, h).to_image()
            }
        };
        Some(Capture::from_rgb(&img))
    }

    fn mouse_move(&mut self, x: i32, y: i32) {
        let mut s = self.screen.lock();
        s.cursor = (x, y);
        s.events.push(InputEvent::Move { x, y });
    }

    fn mouse_down(&mut self, button: MouseButton) {
        let mut s = self.screen.lock();
        let (x, y) = s.cursor;
        s.pressed = Some((button, (x, y)));
        s.events.push(InputEvent::Down { button, x, y });
    }

    fn mouse_up(&mut self, button: MouseButton) {
        let mut s = self.screen.lock();
        let (x, y) = s.cursor;
        s.events.push(InputEvent::Up { button, x, y });
        if s.pressed.take() == Some((button, (x, y))) {
            s.fire_hooks(x, y, button);
        }
    }
}
