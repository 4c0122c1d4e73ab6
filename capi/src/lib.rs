//! C ABI surface for `v0-demangle`.
//!
//! This crate realizes the two external entry points as genuine
//! `extern "C"` functions, matching the reference C implementation
//! (`rust_demangle_with_callback` / `rust_demangle`) byte-for-byte. It is
//! the "output sink abstraction" that the core crate deliberately treats as
//! an out-of-scope external collaborator: the core crate has no knowledge
//! of this crate, only the reverse.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::fmt;

/// Reserved bit requesting verbose output (disambiguator hashes next to
/// crate names, and `: <type>` annotations on constants).
pub const RUST_DEMANGLE_FLAG_VERBOSE: u32 = 0x08;

/// C-compatible callback: `(opaque, data, len)`, invoked once per
/// non-overlapping byte span of the demangled text.
pub type RustDemanglerCallback =
    unsafe extern "C" fn(opaque: *mut c_void, data: *const c_char, len: usize);

/// Adapts a [`RustDemanglerCallback`] into [`fmt::Write`], so the core
/// crate's `Display` impl can drive it directly without knowing anything
/// about C calling conventions.
struct CallbackSink {
    opaque: *mut c_void,
    callback: RustDemanglerCallback,
}

impl fmt::Write for CallbackSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !s.is_empty() {
            // SAFETY: `s` is a valid UTF-8 `&str`, which is always valid
            // ASCII-superset byte data; the callback contract only requires
            // a `(data, len)` span, not NUL-termination.
            unsafe {
                (self.callback)(self.opaque, s.as_ptr().cast(), s.len());
            }
        }
        Ok(())
    }
}

/// Demangles `mangled` (a NUL-terminated string), invoking `callback` with
/// `callback_opaque` zero or more times with spans of the demangled text.
///
/// Returns nonzero on success, `0` if `mangled` is not a well-formed `v0`
/// symbol (not valid UTF-8, missing the `_R` prefix, containing a byte
/// outside `[_0-9A-Za-z]`, or any other grammar violation).
///
/// # Safety
///
/// `mangled` must be a valid pointer to a NUL-terminated C string. `callback`
/// must be safe to call with `callback_opaque` and a `(data, len)` span
/// whose lifetime does not outlive the call.
#[no_mangle]
pub unsafe extern "C" fn rust_demangle_with_callback(
    mangled: *const c_char,
    flags: u32,
    callback_opaque: *mut c_void,
    callback: RustDemanglerCallback,
) -> c_int {
    let mangled = match CStr::from_ptr(mangled).to_str() {
        Ok(s) => s,
        Err(_) => return 0,
    };

    let demangled = match v0_demangle::try_demangle_exact(mangled) {
        Ok(d) => d,
        Err(_) => return 0,
    };

    let mut sink = CallbackSink {
        opaque: callback_opaque,
        callback,
    };

    let result = if flags & RUST_DEMANGLE_FLAG_VERBOSE != 0 {
        fmt::Write::write_fmt(&mut sink, format_args!("{}", demangled))
    } else {
        fmt::Write::write_fmt(&mut sink, format_args!("{:#}", demangled))
    };

    match result {
        Ok(()) => 1,
        Err(_) => 0,
    }
}

/// Demangles `mangled` (a NUL-terminated string) and returns a freshly
/// allocated, NUL-terminated string on success, or a null pointer on any
/// failure. The returned pointer must be released with
/// [`rust_demangle_str_free`].
///
/// # Safety
///
/// `mangled` must be a valid pointer to a NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn rust_demangle(mangled: *const c_char, flags: u32) -> *mut c_char {
    let mangled = match CStr::from_ptr(mangled).to_str() {
        Ok(s) => s,
        Err(_) => return core::ptr::null_mut(),
    };

    let demangled = match v0_demangle::try_demangle_exact(mangled) {
        Ok(d) => d,
        Err(_) => return core::ptr::null_mut(),
    };

    let rendered = if flags & RUST_DEMANGLE_FLAG_VERBOSE != 0 {
        format!("{}", demangled)
    } else {
        format!("{:#}", demangled)
    };

    match CString::new(rendered) {
        Ok(cstring) => cstring.into_raw(),
        // The demangled text can never legitimately contain an embedded
        // NUL, since the input alphabet excludes it; this is defensive.
        Err(_) => core::ptr::null_mut(),
    }
}

/// Releases a string previously returned by [`rust_demangle`].
///
/// # Safety
///
/// `s` must either be null, or a pointer previously returned by
/// [`rust_demangle`] and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn rust_demangle_str_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    extern "C" fn collect(opaque: *mut c_void, data: *const c_char, len: usize) {
        unsafe {
            let buf = &*(opaque as *const RefCell<String>);
            let bytes = std::slice::from_raw_parts(data.cast::<u8>(), len);
            buf.borrow_mut().push_str(std::str::from_utf8(bytes).unwrap());
        }
    }

    #[test]
    fn callback_roundtrip() {
        let mangled = CString::new("_RNvC6_123foo3bar").unwrap();
        let out = RefCell::new(String::new());
        let ok = unsafe {
            rust_demangle_with_callback(
                mangled.as_ptr(),
                0,
                &out as *const _ as *mut c_void,
                collect,
            )
        };
        assert_eq!(ok, 1);
        assert_eq!(out.into_inner(), "123foo::bar");
    }

    #[test]
    fn callback_rejects_non_v0() {
        let mangled = CString::new("_ZN3foo3barE").unwrap();
        let out = RefCell::new(String::new());
        let ok = unsafe {
            rust_demangle_with_callback(
                mangled.as_ptr(),
                0,
                &out as *const _ as *mut c_void,
                collect,
            )
        };
        assert_eq!(ok, 0);
    }

    #[test]
    fn owning_roundtrip() {
        let mangled = CString::new("_RNvC6_123foo3bar").unwrap();
        unsafe {
            let ptr = rust_demangle(mangled.as_ptr(), 0);
            assert!(!ptr.is_null());
            let s = CStr::from_ptr(ptr).to_str().unwrap();
            assert_eq!(s, "123foo::bar");
            rust_demangle_str_free(ptr);
        }
    }

    #[test]
    fn owning_rejects_non_v0() {
        let mangled = CString::new("not a symbol").unwrap();
        unsafe {
            let ptr = rust_demangle(mangled.as_ptr(), 0);
            assert!(ptr.is_null());
        }
    }
}
