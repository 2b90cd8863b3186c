use image::RgbImage;

/// Window identifier (HWND on Windows, synthetic id on the stub platform)
pub type WindowId = u64;

/// Number of companion slots every instance exposes.
pub const SLOT_COUNT: usize = 8;

/// Screen-coordinate bounding box of a window's client area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub l: i32,
    pub t: i32,
    pub r: i32,
    pub b: i32,
    pub w: i32,
    pub h: i32,
    pub cx: i32,
    pub cy: i32,
}

impl Region {
    pub fn new(l: i32, t: i32, w: i32, h: i32) -> Self {
        Self {
            l, t, r: l + w, b: t + h,
            w, h, cx: l + w / 2, cy: t + h / 2,
        }
    }

    /// Minimized, torn down, or off-screen windows report no usable area.
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// Sub-region for partial capture (relative to window origin)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CaptureRect {
    pub l: i32,
    pub t: i32,
    pub w: i32,
    pub h: i32,
}

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

impl Capture {
    /// Build a BGRA capture from an RGB image.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for px in img.pixels() {
            data.extend_from_slice(&[px[2], px[1], px[0], 255]);
        }
        Self { data, width, height, bytes_per_row: width * 4 }
    }

    /// Convert to an RGB image, dropping alpha and row padding.
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let idx = (y * self.bytes_per_row + x * 4) as usize;
            match self.data.get(idx..idx + 3) {
                Some(bgr) => image::Rgb([bgr[2], bgr[1], bgr[0]]),
                None => image::Rgb([0, 0, 0]),
            }
        })
    }
}

/// Mouse button for synthetic clicks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// A live target window as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub window_id: WindowId,
    pub pid: u32,
    pub title: String,
}

/// Lifecycle of a managed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Idle,
    Analyzing,
    Upgrading,
    Waiting,
    Disconnected,
    Complete,
    Error,
}

impl InstanceState {
    /// Disconnected and Error are terminal until the operator intervenes.
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Disconnected | InstanceState::Error | InstanceState::Complete)
    }

    pub fn label(self) -> &'static str {
        match self {
            InstanceState::Idle => "idle",
            InstanceState::Analyzing => "analyzing",
            InstanceState::Upgrading => "upgrading",
            InstanceState::Waiting => "waiting",
            InstanceState::Disconnected => "disconnected",
            InstanceState::Complete => "complete",
            InstanceState::Error => "error",
        }
    }
}

/// Per-slot progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotRecord {
    pub pet_id: Option<u64>,
    pub pet_name: String,
    pub level: u32,
    pub current_metric: u64,
    pub next_level_metric: u64,
    pub completed: bool,
    pub ignored: bool,
}

impl SlotRecord {
    /// Ignored slots count as completed for every selection decision.
    pub fn is_done(&self) -> bool {
        self.completed || self.ignored
    }

    /// Raise the metric without ever moving it backwards.
    pub fn observe_metric(&mut self, metric: u64) {
        self.current_metric = self.current_metric.max(metric);
    }
}

/// One client instance bound to a specific window
#[derive(Debug, Clone)]
pub struct ManagedInstance {
    pub window_id: WindowId,
    pub pid: u32,
    pub name: String,
    pub state: InstanceState,
    pub slots: [SlotRecord; SLOT_COUNT],
    pub active_slot: Option<usize>,
    pub ignored_slots: Vec<usize>,
    pub status: String,
}

impl ManagedInstance {
    pub fn new(info: &WindowInfo, name: String, ignored_slots: Vec<usize>) -> Self {
        let mut slots: [SlotRecord; SLOT_COUNT] = Default::default();
        for &idx in &ignored_slots {
            if let Some(slot) = slots.get_mut(idx) {
                slot.ignored = true;
            }
        }
        Self {
            window_id: info.window_id,
            pid: info.pid,
            name,
            state: InstanceState::Idle,
            slots,
            active_slot: None,
            ignored_slots,
            status: String::new(),
        }
    }

    pub fn is_ignored(&self, slot: usize) -> bool {
        self.ignored_slots.contains(&slot)
    }

    /// Slot indices that take part in processing, in ascending order.
    pub fn processed_slots(&self) -> Vec<usize> {
        (0..SLOT_COUNT).filter(|i| !self.is_ignored(*i)).collect()
    }

    /// First slot that is neither completed nor ignored.
    pub fn next_eligible_slot(&self) -> Option<usize> {
        (0..SLOT_COUNT).find(|&i| !self.is_ignored(i) && !self.slots[i].is_done())
    }

    pub fn all_done(&self) -> bool {
        self.next_eligible_slot().is_none()
    }
}

/// Best template match inside a window capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocateResult {
    /// Window-relative x of the click target
    pub x: i32,
    /// Window-relative y of the click target
    pub y: i32,
    pub confidence: f32,
}

/// Command from the operator surface to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    Stop,
    Quit,
}

/// Coarse run state of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Setup,
    Polling,
    Stopped,
}
