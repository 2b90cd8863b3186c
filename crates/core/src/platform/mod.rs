pub mod stub;
pub mod hotkey;

#[cfg(target_os = "windows")]
pub mod win32;

use regex::RegexBuilder;

use crate::types::*;
use crate::logger;

/// Handle to a specific OS window, providing automation ops.
///
/// Mouse coordinates are absolute screen coordinates; callers translate from
/// window-relative positions through `region()`.
pub trait WindowHandle: Send {
    fn id(&self) -> WindowId;
    fn pid(&self) -> u32;
    fn title(&self) -> &str;
    /// Client area in screen coordinates, or None once the window is gone.
    fn region(&self) -> Option<Region>;
    fn update(&mut self);
    fn is_alive(&self) -> bool;
    /// Restore if minimized and bring to the foreground.
    fn activate(&mut self);
    fn minimize(&mut self);
    fn capture(&mut self, rect: Option<CaptureRect>) -> Option<Capture>;
    fn mouse_move(&mut self, x: i32, y: i32);
    fn mouse_down(&mut self, button: MouseButton);
    fn mouse_up(&mut self, button: MouseButton);

    fn click(&mut self, x: i32, y: i32, button: MouseButton) {
        self.mouse_move(x, y);
        self.mouse_down(button);
        self.mouse_up(button);
    }
}

/// Platform-level operations (window enumeration, factory).
pub trait Platform: Send {
    fn get_instances(&self, pattern: &str) -> Vec<WindowInfo>;
    fn create_window(&self, info: &WindowInfo) -> Box<dyn WindowHandle>;
    /// Primary display size in pixels.
    fn screen_size(&self) -> (i32, i32);
}

/// Case-insensitive title match; an invalid pattern falls back to substring search.
pub fn title_matches(pattern: &str, title: &str) -> bool {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(title),
        Err(_) => title.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Box<dyn Platform> {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform::demo());
    }
    #[cfg(target_os = "windows")]
    {
        logger::register_prefix("win32", logger::COLOR_GRAY);
        return Box::new(win32::Win32Platform::new());
    }
    #[cfg(not(target_os = "windows"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        logger::warn("no native platform for this OS, using the simulated screen");
        return Box::new(stub::StubPlatform::demo());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_matching_is_case_insensitive() {
        assert!(title_matches("godswar origin", "Godswar Origin - Alice"));
        assert!(title_matches("^Godswar", "Godswar Origin"));
        assert!(!title_matches("^Origin", "Godswar Origin"));
        // unbalanced bracket is not a valid regex
        assert!(title_matches("[Alice", "x [alice] y"));
    }
}
