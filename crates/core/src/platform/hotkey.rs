use crate::pause::PauseToken;

/// Start a background thread listening for the global hotkeys (Windows):
/// Ctrl+Shift+K toggles pause, Ctrl+Shift+Q requests a stop.
#[cfg(target_os = "windows")]
pub fn start_hotkey_listener(token: PauseToken) {
    use std::ffi::c_void;

    type HWND = *mut c_void;
    type BOOL = i32;
    type UINT = u32;
    type WPARAM = usize;
    type LPARAM = isize;
    type DWORD = u32;
    type LONG = i32;

    #[repr(C)]
    struct POINT {
        x: LONG,
        y: LONG,
    }

    #[repr(C)]
    struct MSG {
        hwnd: HWND,
        message: UINT,
        w_param: WPARAM,
        l_param: LPARAM,
        time: DWORD,
        pt: POINT,
    }

    const MOD_CONTROL: u32 = 0x0002;
    const MOD_SHIFT: u32 = 0x0004;
    const MOD_NOREPEAT: u32 = 0x4000;
    const VK_K: u32 = 0x4B;
    const VK_Q: u32 = 0x51;
    const WM_HOTKEY: u32 = 0x0312;
    const PAUSE_ID: i32 = 1;
    const QUIT_ID: i32 = 2;

    extern "system" {
        fn RegisterHotKey(hwnd: HWND, id: i32, fs_modifiers: UINT, vk: UINT) -> BOOL;
        fn GetMessageW(
            msg: *mut MSG,
            hwnd: HWND,
            msg_filter_min: UINT,
            msg_filter_max: UINT,
        ) -> BOOL;
    }

    std::thread::spawn(move || {
        unsafe {
            // hotkeys are bound to the registering thread's message queue
            for (id, vk, label) in [(PAUSE_ID, VK_K, "Ctrl+Shift+K"), (QUIT_ID, VK_Q, "Ctrl+Shift+Q")] {
                let ok = RegisterHotKey(std::ptr::null_mut(), id, MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT, vk);
                if ok == 0 {
                    crate::logger::error(&format!(
                        "failed to register global hotkey {}, another application may have claimed it",
                        label
                    ));
                } else {
                    crate::logger::info(&format!("global hotkey {} registered", label));
                }
            }

            let mut msg: MSG = std::mem::zeroed();
            // GetMessageW blocks until a message arrives; returns 0 on WM_QUIT
            while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {
                if msg.message != WM_HOTKEY {
                    continue;
                }
                match msg.w_param as i32 {
                    PAUSE_ID => {
                        token.toggle();
                    }
                    QUIT_ID => {
                        crate::logger::info("stop requested from hotkey");
                        token.request_stop();
                    }
                    _ => {}
                }
            }
        }
    });
}

#[cfg(not(target_os = "windows"))]
pub fn start_hotkey_listener(_token: PauseToken) {
    crate::logger::debug("global hotkeys not supported on this platform");
}
