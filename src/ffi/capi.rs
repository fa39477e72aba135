//! `extern "C"` surface.
//!
//! Every function returns an `i32` result code (0 on success, negative
//! `ResultCode` on failure) unless noted otherwise, checks its pointers for
//! null and never lets a panic unwind into the caller.

use super::types::{MetadataRaw, ReadDataRaw, WriteDataRaw};
use super::{Session, Token};
use crate::config::MemConfig;
use crate::error::ResultCode;
use crate::logging::{init_with_level, LogLevel};
use crate::mem::{ReadData, WriteData};
use crate::types::Address;
use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::{ptr, slice};
use tracing::error;

type CallResult = Result<(), ResultCode>;

fn guard<F: FnOnce() -> CallResult>(f: F) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ResultCode::Ok.as_raw(),
        Ok(Err(code)) => code.as_raw(),
        Err(_) => {
            error!("panic caught at the C boundary");
            ResultCode::Panic.as_raw()
        }
    }
}

unsafe fn session_ref<'a>(session: *const Session) -> Result<&'a Session, ResultCode> {
    session.as_ref().ok_or(ResultCode::NullPointer)
}

unsafe fn out_ref<'a, T>(out: *mut T) -> Result<&'a mut T, ResultCode> {
    out.as_mut().ok_or(ResultCode::NullPointer)
}

unsafe fn str_arg<'a>(s: *const c_char) -> Result<&'a str, ResultCode> {
    if s.is_null() {
        return Err(ResultCode::NullPointer);
    }
    CStr::from_ptr(s)
        .to_str()
        .map_err(|_| ResultCode::InvalidArgs)
}

/// Install the default tracing subscriber. `level`: 0 error .. 4 trace.
#[no_mangle]
pub extern "C" fn memgate_log_init(level: i32) {
    let _ = panic::catch_unwind(|| init_with_level(LogLevel::from_raw(level)));
}

/// Static description of a result code. Never null.
#[no_mangle]
pub extern "C" fn memgate_result_str(code: i32) -> *const c_char {
    let s: &'static CStr = match code {
        0 => c"ok",
        -1 => c"not found",
        -2 => c"conflicting registration",
        -3 => c"backend initialization failed",
        -4 => c"out of range",
        -5 => c"partial read",
        -6 => c"partial write",
        -7 => c"use after release",
        -8 => c"allocation failure",
        -9 => c"invalid token",
        -10 => c"translation failed",
        -11 => c"read-only",
        -12 => c"invalid arguments",
        -13 => c"timeout",
        -14 => c"i/o error",
        -15 => c"configuration error",
        -16 => c"null pointer",
        -17 => c"panic",
        -18 => c"batch incomplete",
        -19 => c"unsupported",
        _ => c"unknown result code",
    };
    s.as_ptr()
}

/// Open a session over the built-in backends with default configuration.
///
/// Returns null only if the session could not be created.
#[no_mangle]
pub extern "C" fn memgate_session_new() -> *mut Session {
    panic::catch_unwind(|| match Session::with_builtin(MemConfig::default()) {
        Ok(session) => Box::into_raw(Box::new(session)),
        Err(e) => {
            error!(error = %e, "failed to open session");
            ptr::null_mut()
        }
    })
    .unwrap_or(ptr::null_mut())
}

/// Open a session configured from a JSON document. Returns null on a
/// malformed configuration.
///
/// # Safety
/// `config_json` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn memgate_session_new_with_config(config_json: *const c_char) -> *mut Session {
    let result = panic::catch_unwind(|| {
        let json = str_arg(config_json).ok()?;
        match MemConfig::from_json_str(json).and_then(Session::with_builtin) {
            Ok(session) => Some(Box::into_raw(Box::new(session))),
            Err(e) => {
                error!(error = %e, "rejecting session configuration");
                None
            }
        }
    });
    result.ok().flatten().unwrap_or(ptr::null_mut())
}

/// Close a session, releasing every connector and view still held by it.
///
/// # Safety
/// `session` must be null or a pointer returned by `memgate_session_new*`
/// that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn memgate_session_free(session: *mut Session) {
    if session.is_null() {
        return;
    }
    let boxed = Box::from_raw(session);
    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(boxed)));
}

/// Callback receiving one connector name per call.
pub type ConnectorNameCallback = extern "C" fn(name: *const c_char, user: *mut c_void);

/// Call `callback` once per registered connector, in sorted order. Returns
/// the number of connectors, or a negative result code.
///
/// # Safety
/// `session` must be a live session pointer.
#[no_mangle]
pub unsafe extern "C" fn memgate_available_connectors(
    session: *const Session,
    callback: Option<ConnectorNameCallback>,
    user: *mut c_void,
) -> i32 {
    let mut count = 0i32;
    let rc = guard(|| {
        let session = session_ref(session)?;
        let callback = callback.ok_or(ResultCode::NullPointer)?;
        for name in session.available_connectors() {
            let name = std::ffi::CString::new(name).map_err(|_| ResultCode::InvalidArgs)?;
            callback(name.as_ptr(), user);
            count += 1;
        }
        Ok(())
    });
    if rc == 0 {
        count
    } else {
        rc
    }
}

/// Create a connector and store its token in `out`.
///
/// # Safety
/// `session` must be a live session; `name` and `args` valid C strings
/// (`args` may be null for no arguments); `out` writable.
#[no_mangle]
pub unsafe extern "C" fn memgate_connector_create(
    session: *const Session,
    name: *const c_char,
    args: *const c_char,
    out: *mut Token,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        let out = out_ref(out)?;
        let name = str_arg(name)?;
        let args = if args.is_null() { "" } else { str_arg(args)? };
        *out = session.create_connector(name, args)?;
        Ok(())
    })
}

/// # Safety
/// `session` must be a live session and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn memgate_connector_clone(
    session: *const Session,
    connector: Token,
    out: *mut Token,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        let out = out_ref(out)?;
        *out = session.clone_connector(connector)?;
        Ok(())
    })
}

/// Release a connector token. Releasing twice reports `UseAfterRelease`.
///
/// # Safety
/// `session` must be a live session.
#[no_mangle]
pub unsafe extern "C" fn memgate_connector_release(session: *const Session, connector: Token) -> i32 {
    guard(|| {
        session_ref(session)?.release_connector(connector)?;
        Ok(())
    })
}

/// # Safety
/// `session` must be a live session and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn memgate_connector_phys_view(
    session: *const Session,
    connector: Token,
    out: *mut Token,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        let out = out_ref(out)?;
        *out = session.phys_view(connector)?;
        Ok(())
    })
}

/// Pause the target's CPUs. `Unsupported` for backends without CPU
/// control.
///
/// # Safety
/// `session` must be a live session.
#[no_mangle]
pub unsafe extern "C" fn memgate_connector_pause(session: *const Session, connector: Token) -> i32 {
    guard(|| {
        session_ref(session)?.pause_connector(connector)?;
        Ok(())
    })
}

/// # Safety
/// `session` must be a live session.
#[no_mangle]
pub unsafe extern "C" fn memgate_connector_resume(session: *const Session, connector: Token) -> i32 {
    guard(|| {
        session_ref(session)?.resume_connector(connector)?;
        Ok(())
    })
}

/// # Safety
/// `session` must be a live session and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn memgate_view_clone(session: *const Session, view: Token, out: *mut Token) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        let out = out_ref(out)?;
        *out = session.clone_view(view)?;
        Ok(())
    })
}

/// # Safety
/// `session` must be a live session.
#[no_mangle]
pub unsafe extern "C" fn memgate_view_release(session: *const Session, view: Token) -> i32 {
    guard(|| {
        session_ref(session)?.release_view(view)?;
        Ok(())
    })
}

/// Fill `buf[..len]` from `address`.
///
/// # Safety
/// `session` must be a live session; `buf` valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn memgate_read_raw_into(
    session: *const Session,
    view: Token,
    address: u64,
    buf: *mut u8,
    len: usize,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        let data = ReadDataRaw { address, buf, len }.as_read_data()?;
        session.read_raw_into(view, Address::new(address), data.buf)?;
        Ok(())
    })
}

/// Scatter read. Per-entry codes go to `status` (may be null, else `len`
/// elements). Returns `BatchIncomplete` when any entry failed.
///
/// # Safety
/// `session` must be a live session; `data` must point to `len` entries
/// whose buffers are valid and do not overlap; `status` null or writable
/// for `len` elements.
#[no_mangle]
pub unsafe extern "C" fn memgate_read_raw_list(
    session: *const Session,
    view: Token,
    data: *const ReadDataRaw,
    len: usize,
    status: *mut i32,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        session.check_batch(len)?;
        let raw = raw_entries(data, len)?;
        let mut codes = batch_vec(len)?;
        codes.resize(len, ResultCode::Ok);

        let mut owners = batch_vec(len)?;
        let mut entries: Vec<ReadData<'_>> = batch_vec(len)?;
        for (idx, entry) in raw.iter().enumerate() {
            match entry.as_read_data() {
                Ok(d) => {
                    owners.push(idx);
                    entries.push(d);
                }
                Err(code) => codes[idx] = code,
            }
        }

        let batch = session.read_raw_list(view, &mut entries)?;
        for (idx, code) in owners.into_iter().zip(batch.codes()) {
            codes[idx] = code;
        }
        finish_batch(&codes, status)
    })
}

/// Store `len` bytes from `buf` at `address`.
///
/// # Safety
/// `session` must be a live session; `buf` valid for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn memgate_write_raw(
    session: *const Session,
    view: Token,
    address: u64,
    buf: *const u8,
    len: usize,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        let data = WriteDataRaw { address, buf, len }.as_write_data()?;
        session.write_raw(view, Address::new(address), data.buf)?;
        Ok(())
    })
}

/// Gather write, entries applied in order. Status handling as for
/// `memgate_read_raw_list`.
///
/// # Safety
/// `session` must be a live session; `data` must point to `len` entries
/// with valid buffers; `status` null or writable for `len` elements.
#[no_mangle]
pub unsafe extern "C" fn memgate_write_raw_list(
    session: *const Session,
    view: Token,
    data: *const WriteDataRaw,
    len: usize,
    status: *mut i32,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        session.check_batch(len)?;
        let raw = raw_entries(data, len)?;
        let mut codes = batch_vec(len)?;
        codes.resize(len, ResultCode::Ok);

        let mut owners = batch_vec(len)?;
        let mut entries: Vec<WriteData<'_>> = batch_vec(len)?;
        for (idx, entry) in raw.iter().enumerate() {
            match entry.as_write_data() {
                Ok(d) => {
                    owners.push(idx);
                    entries.push(d);
                }
                Err(code) => codes[idx] = code,
            }
        }

        let batch = session.write_raw_list(view, &entries)?;
        for (idx, code) in owners.into_iter().zip(batch.codes()) {
            codes[idx] = code;
        }
        finish_batch(&codes, status)
    })
}

/// # Safety
/// `session` must be a live session and `out` writable.
#[no_mangle]
pub unsafe extern "C" fn memgate_view_metadata(
    session: *const Session,
    view: Token,
    out: *mut MetadataRaw,
) -> i32 {
    guard(|| {
        let session = session_ref(session)?;
        let out = out_ref(out)?;
        *out = session.metadata(view)?.into();
        Ok(())
    })
}

fn batch_vec<T>(len: usize) -> Result<Vec<T>, ResultCode> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ResultCode::AllocationFailure)?;
    Ok(v)
}

unsafe fn raw_entries<'a, T>(data: *const T, len: usize) -> Result<&'a [T], ResultCode> {
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(ResultCode::NullPointer);
    }
    Ok(slice::from_raw_parts(data, len))
}

unsafe fn finish_batch(codes: &[ResultCode], status: *mut i32) -> CallResult {
    if !status.is_null() {
        let out = slice::from_raw_parts_mut(status, codes.len());
        for (slot, code) in out.iter_mut().zip(codes) {
            *slot = code.as_raw();
        }
    }
    if codes.iter().all(|c| c.is_ok()) {
        Ok(())
    } else {
        Err(ResultCode::BatchIncomplete)
    }
}
