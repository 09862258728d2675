//! Adapter over the `tdjson` shared library.

use std::ffi::{CStr, CString, c_char, c_double, c_void};
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{NativeClient, NativeError};

const NATIVE_TARGET: &str = "tdlink::native";

#[link(name = "tdjson")]
unsafe extern "C" {
    fn td_json_client_create() -> *mut c_void;
    fn td_json_client_send(client: *mut c_void, request: *const c_char);
    fn td_json_client_receive(client: *mut c_void, timeout: c_double) -> *const c_char;
    fn td_json_client_execute(client: *mut c_void, request: *const c_char) -> *const c_char;
    fn td_json_client_destroy(client: *mut c_void);
}

/// Owned handle to a native client instance.
///
/// The library returns borrowed strings that stay valid only until the next
/// `receive` (or `execute`) call, so each is copied out while a lock is held.
#[derive(Debug)]
pub struct TdJsonClient {
    handle: NonNull<c_void>,
    receive_lock: Mutex<()>,
    execute_lock: Mutex<()>,
}

// SAFETY: the library permits `send` from any thread. `receive` and
// `execute` results are guarded by the mutexes above.
unsafe impl Send for TdJsonClient {}
// SAFETY: see the `Send` impl.
unsafe impl Sync for TdJsonClient {}

impl TdJsonClient {
    /// Creates a fresh native client instance.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::Transport`] when the library returns a null
    /// handle.
    pub fn new() -> Result<Self, NativeError> {
        // SAFETY: no preconditions; ownership of the handle passes to us.
        let raw = unsafe { td_json_client_create() };
        let handle = NonNull::new(raw).ok_or_else(|| NativeError::Transport {
            message: String::from("td_json_client_create returned null"),
        })?;
        debug!(target: NATIVE_TARGET, "native client created");
        Ok(Self {
            handle,
            receive_lock: Mutex::new(()),
            execute_lock: Mutex::new(()),
        })
    }
}

impl NativeClient for TdJsonClient {
    fn send(&self, request: &str) -> Result<(), NativeError> {
        let text = to_c_string(request)?;
        // SAFETY: the handle is live for `self`'s lifetime and `text` is a
        // valid NUL-terminated string the library copies before returning.
        unsafe { td_json_client_send(self.handle.as_ptr(), text.as_ptr()) };
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<String>, NativeError> {
        let _guard = self
            .receive_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // SAFETY: the handle is live and receive calls are serialised.
        let raw = unsafe { td_json_client_receive(self.handle.as_ptr(), timeout.as_secs_f64()) };
        // SAFETY: the returned pointer is valid until the next receive, which
        // the guard prevents.
        unsafe { copy_result(raw) }
    }

    fn execute(&self, request: &str) -> Result<Option<String>, NativeError> {
        let text = to_c_string(request)?;
        let _guard = self
            .execute_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // SAFETY: the handle is live and `text` is NUL-terminated.
        let raw = unsafe { td_json_client_execute(self.handle.as_ptr(), text.as_ptr()) };
        // SAFETY: the returned pointer is valid until the next execute, which
        // the guard prevents.
        unsafe { copy_result(raw) }
    }
}

impl Drop for TdJsonClient {
    fn drop(&mut self) {
        // SAFETY: the handle was created by `td_json_client_create` and is
        // destroyed exactly once.
        unsafe { td_json_client_destroy(self.handle.as_ptr()) };
        debug!(target: NATIVE_TARGET, "native client destroyed");
    }
}

fn to_c_string(request: &str) -> Result<CString, NativeError> {
    CString::new(request).map_err(|error| NativeError::InteriorNul {
        position: error.nul_position(),
    })
}

/// Copies a library-owned string.
///
/// # Safety
///
/// `raw` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
unsafe fn copy_result(raw: *const c_char) -> Result<Option<String>, NativeError> {
    if raw.is_null() {
        return Ok(None);
    }
    // SAFETY: guaranteed by the caller.
    let text = unsafe { CStr::from_ptr(raw) };
    text.to_str()
        .map(|value| Some(value.to_owned()))
        .map_err(|_| NativeError::InvalidUtf8)
}
