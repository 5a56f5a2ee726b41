//! C ABI for linking handover-core as a static library from a mobile app
//! shell or other C/C++ hosts. The host feeds events in and polls effects
//! out as JSON; Rust callbacks never cross the boundary.

use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::time::Instant;

use crate::core::{CoreOptions, Effect, HandoverCore};

/// Core plus the effect backlog a polling host has not collected yet.
struct FfiCore {
    core: HandoverCore,
    effects: Vec<Effect>,
}

fn opt_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let cstr = unsafe { CStr::from_ptr(ptr) };
    cstr.to_str().ok().map(str::to_owned)
}

/// Create a new core instance. `preset_file`, `eligibility_json` and
/// `default_message` may each be null to use the built-in defaults.
/// Returns an opaque handle, or null if `eligibility_json` is not valid
/// JSON.
#[no_mangle]
pub extern "C" fn handover_core_create(
    preset_file: *const c_char,
    eligibility_json: *const c_char,
    default_message: *const c_char,
) -> *mut c_void {
    let mut options = CoreOptions::default();
    if let Some(path) = opt_str(preset_file) {
        options.preset_file = path.into();
    }
    if let Some(raw) = opt_str(eligibility_json) {
        match serde_json::from_str(&raw) {
            Ok(value) => options.eligibility = Some(value),
            Err(_) => return std::ptr::null_mut(),
        }
    }
    if let Some(text) = opt_str(default_message) {
        options.default_message = text;
    }
    let ffi = FfiCore {
        core: HandoverCore::new(options),
        effects: Vec::new(),
    };
    Box::into_raw(Box::new(ffi)) as *mut c_void
}

/// Destroy a core instance. No-op if `h` is null.
#[no_mangle]
pub extern "C" fn handover_core_destroy(h: *mut c_void) {
    if h.is_null() {
        return;
    }
    let _ = unsafe { Box::from_raw(h as *mut FfiCore) };
}

fn with_core(h: *mut c_void, f: impl FnOnce(&mut FfiCore)) -> c_int {
    if h.is_null() {
        return -1;
    }
    let ffi = unsafe { &mut *(h as *mut FfiCore) };
    f(ffi);
    0
}

/// Start the session. Queues a Register effect for the host.
#[no_mangle]
pub extern "C" fn handover_core_start(h: *mut c_void) -> c_int {
    with_core(h, |ffi| {
        let effects = ffi.core.start();
        ffi.effects.extend(effects);
    })
}

/// Terminate the session. Queues an Unregister effect for the host.
#[no_mangle]
pub extern "C" fn handover_core_shutdown(h: *mut c_void) -> c_int {
    with_core(h, |ffi| {
        let effects = ffi.core.shutdown();
        ffi.effects.extend(effects);
    })
}

/// Availability-changed signal: nonzero `available` means the handover
/// service can be used.
#[no_mangle]
pub extern "C" fn handover_core_on_availability_changed(h: *mut c_void, available: c_int) -> c_int {
    with_core(h, |ffi| {
        let effects = ffi.core.on_availability_changed(available != 0);
        ffi.effects.extend(effects);
    })
}

/// Feed a raw envelope payload (UTF-8 JSON, NUL-terminated). Returns 0 on
/// success, -1 on null/invalid input. Undecodable envelopes are ignored by
/// the router and still return 0.
#[no_mangle]
pub extern "C" fn handover_core_on_data_event(h: *mut c_void, raw: *const c_char) -> c_int {
    let Some(raw) = opt_str(raw) else {
        return -1;
    };
    with_core(h, |ffi| {
        let effects = ffi.core.on_data_event(&raw);
        ffi.effects.extend(effects);
    })
}

/// Set the operator's pending message text.
#[no_mangle]
pub extern "C" fn handover_core_set_input_text(h: *mut c_void, text: *const c_char) -> c_int {
    let Some(text) = opt_str(text) else {
        return -1;
    };
    with_core(h, |ffi| ffi.core.set_input_text(text))
}

/// Whether the handover service is currently available (1) or not (0).
/// Returns -1 if `h` is null.
#[no_mangle]
pub extern "C" fn handover_core_is_available(h: *mut c_void) -> c_int {
    if h.is_null() {
        return -1;
    }
    let ffi = unsafe { &*(h as *const FfiCore) };
    ffi.core.is_available() as c_int
}

/// Drain pending effects (including any feedback that has come due) as a
/// JSON array written into `out_buf`. Returns bytes written, 0 when there
/// is nothing pending, or -1 when `h`/`out_buf` is null or the buffer is
/// too small (effects are kept for the next poll in that case).
#[no_mangle]
pub extern "C" fn handover_core_poll(h: *mut c_void, out_buf: *mut u8, out_buf_len: usize) -> c_int {
    if h.is_null() || out_buf.is_null() {
        return -1;
    }
    let ffi = unsafe { &mut *(h as *mut FfiCore) };
    let due = ffi.core.poll_feedback(Instant::now());
    ffi.effects.extend(due);
    if ffi.effects.is_empty() {
        return 0;
    }
    let json = match serde_json::to_vec(&ffi.effects) {
        Ok(json) => json,
        Err(_) => return -1,
    };
    if json.len() > out_buf_len {
        return -1;
    }
    unsafe {
        out_buf.copy_from_nonoverlapping(json.as_ptr(), json.len());
    }
    ffi.effects.clear();
    json.len() as c_int
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn poll_json(h: *mut c_void) -> serde_json::Value {
        let mut buf = vec![0u8; 64 * 1024];
        let n = handover_core_poll(h, buf.as_mut_ptr(), buf.len());
        assert!(n >= 0);
        if n == 0 {
            return serde_json::json!([]);
        }
        serde_json::from_slice(&buf[..n as usize]).unwrap()
    }

    #[test]
    fn create_null_args_uses_defaults() {
        let h = handover_core_create(std::ptr::null(), std::ptr::null(), std::ptr::null());
        assert!(!h.is_null());
        handover_core_destroy(h);
    }

    #[test]
    fn create_rejects_bad_eligibility_json() {
        let bad = CString::new("not json").unwrap();
        let h = handover_core_create(std::ptr::null(), bad.as_ptr(), std::ptr::null());
        assert!(h.is_null());
    }

    #[test]
    fn null_handle_is_an_error() {
        assert_eq!(handover_core_start(std::ptr::null_mut()), -1);
        assert_eq!(handover_core_is_available(std::ptr::null_mut()), -1);
        let mut buf = [0u8; 16];
        assert_eq!(
            handover_core_poll(std::ptr::null_mut(), buf.as_mut_ptr(), buf.len()),
            -1
        );
        handover_core_destroy(std::ptr::null_mut());
    }

    #[test]
    fn lifecycle_effects_are_polled() {
        let h = handover_core_create(std::ptr::null(), std::ptr::null(), std::ptr::null());
        assert_eq!(handover_core_start(h), 0);
        let effects = poll_json(h);
        assert_eq!(effects, serde_json::json!(["Register"]));
        // Drained; the next poll is empty.
        assert_eq!(poll_json(h), serde_json::json!([]));
        handover_core_destroy(h);
    }

    #[test]
    fn data_event_produces_send_effect() {
        let h = handover_core_create(std::ptr::null(), std::ptr::null(), std::ptr::null());
        handover_core_start(h);
        handover_core_on_availability_changed(h, 1);
        poll_json(h);

        let input = CString::new("hello").unwrap();
        assert_eq!(handover_core_set_input_text(h, input.as_ptr()), 0);
        let raw = CString::new("{\"msgType\":\"CONTINUITY_REQUEST\",\"nodeId\":\"P2\"}").unwrap();
        assert_eq!(handover_core_on_data_event(h, raw.as_ptr()), 0);

        let effects = poll_json(h);
        let send = &effects[0]["Send"];
        assert_eq!(send["msgType"], "CONTINUITY_MSG");
        assert_eq!(send["nodeId"], "P2");
        assert_eq!(send["dataContent"], "hello");
        handover_core_destroy(h);
    }

    #[test]
    fn undersized_buffer_keeps_effects() {
        let h = handover_core_create(std::ptr::null(), std::ptr::null(), std::ptr::null());
        handover_core_start(h);
        let mut tiny = [0u8; 2];
        assert_eq!(handover_core_poll(h, tiny.as_mut_ptr(), tiny.len()), -1);
        // Still pending after the failed poll.
        let effects = poll_json(h);
        assert_eq!(effects, serde_json::json!(["Register"]));
        handover_core_destroy(h);
    }
}
