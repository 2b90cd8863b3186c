use std::ffi::c_void;
use std::mem;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, ClientToScreen, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
    GetDC, GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, HGDIOBJ, SRCCOPY,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEINPUT, MOUSE_EVENT_FLAGS,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetSystemMetrics, GetWindowTextW, GetWindowThreadProcessId,
    IsIconic, IsWindow, IsWindowVisible, SetCursorPos, SetForegroundWindow, ShowWindow,
    SM_CXSCREEN, SM_CYSCREEN, SW_MINIMIZE, SW_RESTORE,
};

use crate::types::*;
use crate::logger;
use super::{title_matches, Platform, WindowHandle};

fn hwnd(id: WindowId) -> HWND {
    HWND(id as usize as *mut c_void)
}

fn window_title(h: HWND) -> String {
    let mut buf = [0u16; 512];
    let len = unsafe { GetWindowTextW(h, &mut buf) };
    String::from_utf16_lossy(&buf[..len.max(0) as usize])
}

fn window_pid(h: HWND) -> u32 {
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(h, Some(&mut pid)) };
    pid
}

unsafe extern "system" fn collect_visible(h: HWND, lparam: LPARAM) -> BOOL {
    let out = &mut *(lparam.0 as *mut Vec<HWND>);
    if IsWindowVisible(h).as_bool() {
        out.push(h);
    }
    BOOL(1)
}

pub struct Win32Platform;

impl Win32Platform {
    pub fn new() -> Self {
        Win32Platform
    }
}

impl Platform for Win32Platform {
    fn get_instances(&self, pattern: &str) -> Vec<WindowInfo> {
        let mut handles: Vec<HWND> = Vec::new();
        let ok = unsafe {
            EnumWindows(Some(collect_visible), LPARAM(&mut handles as *mut Vec<HWND> as isize))
        };
        if let Err(e) = ok {
            logger::error_p("win32", &format!("EnumWindows failed: {}", e));
            return Vec::new();
        }
        handles
            .into_iter()
            .filter_map(|h| {
                let title = window_title(h);
                title_matches(pattern, &title).then(|| WindowInfo {
                    window_id: h.0 as usize as WindowId,
                    pid: window_pid(h),
                    title,
                })
            })
            .collect()
    }

    fn create_window(&self, info: &WindowInfo) -> Box<dyn WindowHandle> {
        let mut win = Win32Window {
            window_id: info.window_id,
            pid: info.pid,
            title: info.title.clone(),
            region: None,
        };
        win.update();
        Box::new(win)
    }

    fn screen_size(&self) -> (i32, i32) {
        unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
    }
}

struct Win32Window {
    window_id: WindowId,
    pid: u32,
    title: String,
    region: Option<Region>,
}

impl Win32Window {
    fn send_mouse(&self, flags: MOUSE_EVENT_FLAGS) {
        let input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT { dx: 0, dy: 0, mouseData: 0, dwFlags: flags, time: 0, dwExtraInfo: 0 },
            },
        };
        let sent = unsafe { SendInput(&[input], mem::size_of::<INPUT>() as i32) };
        if sent != 1 {
            logger::warn_p("win32", "SendInput was blocked");
        }
    }

    /// BGRA pixels of the client area, optionally cropped.
    fn grab(&self, rect: Option<CaptureRect>) -> Option<Capture> {
        let h = hwnd(self.window_id);
        let region = self.region?;
        let (l, t, w, hgt) = match rect {
            Some(r) => (r.l, r.t, r.w.min(region.w - r.l), r.h.min(region.h - r.t)),
            None => (0, 0, region.w, region.h),
        };
        if w <= 0 || hgt <= 0 {
            return None;
        }

        unsafe {
            let src = GetDC(h);
            if src.is_invalid() {
                return None;
            }
            let mem_dc = CreateCompatibleDC(src);
            let bitmap = CreateCompatibleBitmap(src, w, hgt);
            let previous = SelectObject(mem_dc, HGDIOBJ(bitmap.0));
            let copied = BitBlt(mem_dc, 0, 0, w, hgt, src, l, t, SRCCOPY).is_ok();

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: w,
                    // negative height: top-down rows
                    biHeight: -hgt,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut data = vec![0u8; (w * hgt * 4) as usize];
            let lines = if copied {
                GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    hgt as u32,
                    Some(data.as_mut_ptr() as *mut c_void),
                    &mut info,
                    DIB_RGB_COLORS,
                )
            } else {
                0
            };

            SelectObject(mem_dc, previous);
            let _ = DeleteObject(HGDIOBJ(bitmap.0));
            let _ = DeleteDC(mem_dc);
            ReleaseDC(h, src);

            if lines == 0 {
                return None;
            }
            Some(Capture { data, width: w as u32, height: hgt as u32, bytes_per_row: (w * 4) as u32 })
        }
    }
}

impl WindowHandle for Win32Window {
    fn id(&self) -> WindowId { self.window_id }
    fn pid(&self) -> u32 { self.pid }
    fn title(&self) -> &str { &self.title }
    fn region(&self) -> Option<Region> { self.region }

    fn update(&mut self) {
        let h = hwnd(self.window_id);
        if !self.is_alive() {
            self.region = None;
            return;
        }
        if unsafe { IsIconic(h) }.as_bool() {
            self.region = Some(Region::new(-32000, -32000, 0, 0));
            return;
        }
        let mut rect = RECT::default();
        let mut origin = POINT { x: 0, y: 0 };
        let ok = unsafe { GetClientRect(h, &mut rect).is_ok() && ClientToScreen(h, &mut origin).as_bool() };
        self.region = ok.then(|| Region::new(origin.x, origin.y, rect.right - rect.left, rect.bottom - rect.top));
    }

    fn is_alive(&self) -> bool {
        unsafe { IsWindow(hwnd(self.window_id)) }.as_bool()
    }

    fn activate(&mut self) {
        let h = hwnd(self.window_id);
        unsafe {
            if IsIconic(h).as_bool() {
                let _ = ShowWindow(h, SW_RESTORE);
            }
            if !SetForegroundWindow(h).as_bool() {
                logger::warn_p("win32", &format!("could not foreground {}", self.title));
            }
        }
        self.update();
    }

    fn minimize(&mut self) {
        unsafe {
            let _ = ShowWindow(hwnd(self.window_id), SW_MINIMIZE);
        }
        self.update();
    }

    fn capture(&mut self, rect: Option<CaptureRect>) -> Option<Capture> {
        self.update();
        self.grab(rect)
    }

    fn mouse_move(&mut self, x: i32, y: i32) {
        if let Err(e) = unsafe { SetCursorPos(x, y) } {
            logger::warn_p("win32", &format!("SetCursorPos({}, {}) failed: {}", x, y, e));
        }
    }

    fn mouse_down(&mut self, button: MouseButton) {
        self.send_mouse(match button {
            MouseButton::Left => MOUSEEVENTF_LEFTDOWN,
            MouseButton::Right => MOUSEEVENTF_RIGHTDOWN,
        });
    }

    fn mouse_up(&mut self, button: MouseButton) {
        self.send_mouse(match button {
            MouseButton::Left => MOUSEEVENTF_LEFTUP,
            MouseButton::Right => MOUSEEVENTF_RIGHTUP,
        });
    }
}
