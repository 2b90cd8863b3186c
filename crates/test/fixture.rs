//! Simulated game clients for end-to-end scenarios.
//!
//! Every element is drawn as a unique 8x8 noise sprite on a fixed grid, so the
//! real locator finds it. Click hooks play the client's part: selecting a slot,
//! writing the progress dump, levelling up, carrying. The selected pet's
//! experience is rendered below the grid in a small bitmap font.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use petfactory_core::orchestrator::Engine;
use petfactory_core::pause::PauseToken;
use petfactory_core::platform::stub::{Sprite, StubPlatform, StubScreen, StubWindowState};
use petfactory_core::settings::{RetrySettings, Settings, Timings};
use petfactory_core::signal::{ALERT_SUFFIX, SCAN_SUFFIX};
use petfactory_core::types::{CaptureRect, MouseButton, Region, WindowId, WindowInfo, SLOT_COUNT};
use petfactory_core::vision::{Catalog, Element, ElementTemplate, GlyphRecognizer};

pub const SPRITE: i32 = 8;
pub const GRID: i32 = 12;
pub const WINDOW_W: i32 = 160;
pub const WINDOW_H: i32 = 64;
/// Where the detail view shows the selected pet's experience, window-relative.
pub const METRIC_REGION: CaptureRect = CaptureRect { l: 0, t: 46, w: 100, h: 16 };
const METRIC_TAG: &str = "METRIC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimPet {
    pub id: u64,
    pub name: String,
    pub level: u32,
    pub exp: u64,
}

impl SimPet {
    pub fn new(id: u64, name: &str, level: u32, exp: u64) -> Self {
        Self { id, name: name.into(), level, exp }
    }
}

/// What one simulated client has seen and done.
#[derive(Debug, Default)]
pub struct ClientSim {
    pub name: String,
    pub pets: [Option<SimPet>; SLOT_COUNT],
    pub selected: Option<usize>,
    pub carried: Option<usize>,
    pub level_ups: [u32; SLOT_COUNT],
    /// Pets still waiting in the bag.
    pub bag: u32,
    /// Slots whose save writes no dump row.
    pub unsaved: Vec<usize>,
    /// Experience the detail view shows instead of the real value.
    pub shown_exp: [Option<u64>; SLOT_COUNT],
}

type Clients = Arc<Mutex<HashMap<WindowId, ClientSim>>>;

pub struct World {
    pub screen: StubScreen,
    pub catalog: Arc<Catalog>,
    pub signal_dir: TempDir,
    templates: HashMap<Element, RgbImage>,
    clients: Clients,
}

/// Top-left corner of an element's sprite, window-relative.
pub fn sprite_origin(element: Element) -> (i32, i32) {
    match element {
        Element::Slot(i) => (i as i32 * GRID, 0),
        named => {
            let k = Element::NAMED.iter().position(|e| *e == named).unwrap_or(0) as i32;
            ((k % 12) * GRID, (1 + k / 12) * GRID)
        }
    }
}

/// Window-relative point the engine clicks for `element`.
pub fn click_point(element: Element) -> (i32, i32) {
    let (x, y) = sprite_origin(element);
    let (dx, dy) = element.default_offset();
    (x + SPRITE / 2 + dx, y + SPRITE / 2 + dy)
}

fn noise(rng: &mut StdRng) -> RgbImage {
    RgbImage::from_fn(SPRITE as u32, SPRITE as u32, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

const FONT: [[&str; 5]; 10] = [
    ["###", "#.#", "#.#", "#.#", "###"],
    [".#.", "##.", ".#.", ".#.", "###"],
    ["###", "..#", "###", "#..", "###"],
    ["###", "..#", ".##", "..#", "###"],
    ["#.#", "#.#", "###", "..#", "..#"],
    ["###", "#..", "###", "..#", "###"],
    ["###", "#..", "###", "#.#", "###"],
    ["###", "..#", ".#.", ".#.", ".#."],
    ["###", "#.#", "###", "#.#", "###"],
    ["###", "#.#", "###", "..#", "###"],
];

/// 6x10 glyph for digit `d`, each font cell doubled.
fn glyph(d: usize) -> GrayImage {
    GrayImage::from_fn(6, 10, |x, y| {
        let on = FONT[d][(y / 2) as usize].as_bytes()[(x / 2) as usize] == b'#';
        Luma([if on { 255 } else { 0 }])
    })
}

/// Recognizer that knows the font `render_number` draws with.
pub fn digit_font() -> GlyphRecognizer {
    GlyphRecognizer::new(
        (0..10u32)
            .filter_map(|d| char::from_digit(d, 10).map(|c| (c, glyph(d as usize))))
            .collect(),
    )
}

/// Light digits on a dark strip, 16 px tall.
pub fn render_number(value: u64) -> RgbImage {
    let text = value.to_string();
    let mut img = RgbImage::from_pixel(4 + 9 * text.len() as u32, 16, Rgb([10, 10, 10]));
    for (i, d) in text.bytes().enumerate() {
        let x0 = 2 + 9 * i as u32;
        for (x, y, p) in glyph(usize::from(d - b'0')).enumerate_pixels() {
            if p[0] > 0 {
                img.put_pixel(x0 + x, 3 + y, Rgb([230, 230, 230]));
            }
        }
    }
    img
}

fn show_metric(win: &mut StubWindowState, value: u64) {
    if let Some(sprite) = win.sprites.iter_mut().find(|s| s.tag == METRIC_TAG) {
        sprite.image = render_number(value);
        sprite.visible = true;
    }
}

fn at(p: (i32, i32)) -> CaptureRect {
    CaptureRect { l: p.0, t: p.1, w: 1, h: 1 }
}

impl World {
    pub fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let templates: HashMap<Element, RgbImage> =
            Element::all().into_iter().map(|e| (e, noise(&mut rng))).collect();
        let catalog = Catalog::from_templates(
            templates.iter().map(|(e, img)| ElementTemplate::new(*e, img.clone())),
        );
        Self {
            screen: StubScreen::new(1920, 1080),
            catalog: Arc::new(catalog),
            signal_dir: tempfile::tempdir().expect("tempdir"),
            templates,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WindowId, ClientSim>> {
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a client window titled `name` whose slots hold `pets`.
    pub fn add_client(&self, id: WindowId, name: &str, pets: Vec<SimPet>) -> WindowInfo {
        let info = WindowInfo { window_id: id, pid: id as u32 + 1000, title: name.into() };
        let offset = (id as i32 % 4) * 200;
        self.screen.add_window(info.clone(), Region::new(100 + offset, 100 + offset, WINDOW_W, WINDOW_H));
        for element in Element::all() {
            let (x, y) = sprite_origin(element);
            self.screen.add_sprite(id, Sprite::new(element.name(), self.templates[&element].clone(), x, y));
        }
        let mut metric = Sprite::new(METRIC_TAG, RgbImage::new(1, 1), METRIC_REGION.l, METRIC_REGION.t);
        metric.visible = false;
        self.screen.add_sprite(id, metric);

        let mut sim = ClientSim { name: name.into(), ..Default::default() };
        for (slot, pet) in pets.into_iter().enumerate().take(SLOT_COUNT) {
            sim.pets[slot] = Some(pet);
        }
        self.lock().insert(id, sim);
        self.install_hooks(id);
        info
    }

    fn hook(&self, id: WindowId, element: Element, button: MouseButton, f: impl Fn(&mut ClientSim) + Send + 'static) {
        let clients = Arc::clone(&self.clients);
        self.screen.on_click(id, at(click_point(element)), button, move |_| {
            let mut all = clients.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(sim) = all.get_mut(&id) {
                f(sim);
            }
        });
    }

    fn install_hooks(&self, id: WindowId) {
        for slot in 0..SLOT_COUNT {
            let clients = Arc::clone(&self.clients);
            self.screen.on_click(id, at(click_point(Element::Slot(slot as u8))), MouseButton::Left, move |win| {
                let mut all = clients.lock().unwrap_or_else(|e| e.into_inner());
                let Some(sim) = all.get_mut(&id) else { return };
                sim.selected = Some(slot);
                if let Some(pet) = &sim.pets[slot] {
                    show_metric(win, sim.shown_exp[slot].unwrap_or(pet.exp));
                }
            });
        }
        self.hook(id, Element::Carry, MouseButton::Left, |sim| sim.carried = sim.selected);
        self.hook(id, Element::Upgrade, MouseButton::Left, |sim| {
            let Some(slot) = sim.selected else { return };
            sim.level_ups[slot] += 1;
            if let Some(pet) = sim.pets[slot].as_mut() {
                pet.level += 1;
            }
        });

        let dir = self.signal_dir.path().to_path_buf();
        self.hook(id, Element::Save, MouseButton::Left, move |sim| {
            let Some(slot) = sim.selected.filter(|s| !sim.unsaved.contains(s)) else { return };
            let Some(pet) = sim.pets[slot].clone() else { return };
            let path = dir.join(format!("{}{}", sim.name, SCAN_SUFFIX));
            let row = format!(
                "[{}] Pet: (ID: {}) | Level: {} | Current EXP: {} | Next Level EXP: {} | Date: 2026-10-19 12:00:00\n",
                pet.name,
                pet.id,
                pet.level,
                pet.exp,
                pet.exp + 1_000
            );
            if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&path) {
                let _ = f.write_all(row.as_bytes());
            }
        });

        let clients = Arc::clone(&self.clients);
        let pet_tag = Element::PetInBag.name();
        self.screen.on_click(id, at(click_point(Element::PetInBag)), MouseButton::Right, move |win| {
            let mut all = clients.lock().unwrap_or_else(|e| e.into_inner());
            let Some(sim) = all.get_mut(&id) else { return };
            sim.bag = sim.bag.saturating_sub(1);
            if sim.bag == 0 {
                win.set_visible(&pet_tag, false);
            }
        });
    }

    pub fn set_visible(&self, id: WindowId, element: Element, visible: bool) {
        self.screen.with_window(id, |w| w.set_visible(&element.name(), visible));
    }

    /// Fill the bag; the item sprite hides once it is empty.
    pub fn fill_bag(&self, id: WindowId, pets: u32) {
        if let Some(sim) = self.lock().get_mut(&id) {
            sim.bag = pets;
        }
        self.set_visible(id, Element::PetInBag, pets > 0);
    }

    pub fn client<R>(&self, id: WindowId, f: impl FnOnce(&ClientSim) -> R) -> R {
        let all = self.lock();
        f(all.get(&id).expect("unknown client"))
    }

    pub fn client_mut<R>(&self, id: WindowId, f: impl FnOnce(&mut ClientSim) -> R) -> R {
        let mut all = self.lock();
        f(all.get_mut(&id).expect("unknown client"))
    }

    /// Absolute screen point of `element` inside window `id`.
    pub fn screen_point(&self, id: WindowId, element: Element) -> (i32, i32) {
        let bounds = self.screen.with_window(id, |w| w.bounds).expect("unknown window");
        let (x, y) = click_point(element);
        (bounds.l + x, bounds.t + y)
    }

    pub fn alert_path(&self, name: &str) -> PathBuf {
        self.signal_dir.path().join(format!("{}{}", name, ALERT_SUFFIX))
    }

    pub fn write_alert(&self, name: &str, pet_id: u64, level: u32, exp: u64) {
        let text = format!(
            "Name: {}\nDatabase ID: {}\nPet Name: Ember Fox\nPet Level: {}\nPET EXP ACTUAL: {}\nTarget EXP: {}\nTimestamp: 2026-10-19 12:00:00\n",
            name, pet_id, level, exp, exp
        );
        std::fs::write(self.alert_path(name), text).expect("write alert");
    }

    /// Settings tuned for the simulated screen: no waits, bounded retries.
    pub fn settings(&self) -> Settings {
        let mut s = Settings::default();
        s.window_pattern = ".".into();
        s.signal_dir = self.signal_dir.path().to_path_buf();
        s.timings = Timings::instant();
        s.retry = RetrySettings { backoff_ms: 0, max_attempts: Some(3), log_every: 0 };
        s.poll_interval_secs = 0;
        s.goal.target_metric = Some(5_000_000);
        s
    }

    pub fn engine(&self, settings: Settings) -> Engine {
        self.engine_with_token(settings, PauseToken::new())
    }

    pub fn engine_with_token(&self, settings: Settings, token: PauseToken) -> Engine {
        let platform = StubPlatform::new(self.screen.clone());
        Engine::new(Box::new(platform), Arc::clone(&self.catalog), settings, token)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Eight pets, all below the goal.
pub fn growing_pets(base_id: u64, level: u32) -> Vec<SimPet> {
    (0..SLOT_COUNT as u64)
        .map(|i| SimPet::new(base_id + i, &format!("Pet {}", i + 1), level, 1_000 * (i + 1)))
        .collect()
}

pub const SHORT_WAIT: Duration = Duration::from_millis(20);
