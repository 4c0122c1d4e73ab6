//! Bindings to the vendored C reference demangler, compiled alongside this
//! crate and exposed for differential fuzzing against the Rust
//! implementation.

use std::ffi::{c_char, c_int, c_void, CStr, CString};

extern "C" {
    fn rust_demangle_with_callback(
        mangled: *const c_char,
        callback_opaque: *mut c_void,
        callback: extern "C" fn(*mut c_void, *const c_char, usize),
    ) -> c_int;

    fn rust_demangle(mangled: *const c_char) -> *mut c_char;

    fn free(ptr: *mut c_void);
}

extern "C" fn collect(opaque: *mut c_void, data: *const c_char, len: usize) {
    unsafe {
        let out = &mut *(opaque as *mut String);
        let bytes = std::slice::from_raw_parts(data.cast::<u8>(), len);
        out.push_str(&String::from_utf8_lossy(bytes));
    }
}

/// Demangles `mangled` with the vendored C implementation, collecting its
/// callback-driven output into an owned `String`.
///
/// Returns `None` if the C implementation rejects `mangled` as not a
/// well-formed symbol, or if it contains an embedded NUL byte.
pub fn demangle(mangled: &str) -> Option<String> {
    let mangled = CString::new(mangled).ok()?;
    let mut out = String::new();
    let ok = unsafe {
        rust_demangle_with_callback(
            mangled.as_ptr(),
            &mut out as *mut String as *mut c_void,
            collect,
        )
    };
    if ok != 0 {
        Some(out)
    } else {
        None
    }
}

/// Demangles `mangled` with the vendored C implementation's owning
/// `rust_demangle` entry point, exercising its `malloc`/`realloc`-based
/// growable buffer path rather than the callback path.
pub fn demangle_owned(mangled: &str) -> Option<String> {
    let mangled = CString::new(mangled).ok()?;
    unsafe {
        let ptr = rust_demangle(mangled.as_ptr());
        if ptr.is_null() {
            return None;
        }
        let s = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        free(ptr as *mut c_void);
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agrees_with_known_good_symbol() {
        assert_eq!(
            demangle("_RNvC6_123foo3bar").as_deref(),
            Some("123foo::bar")
        );
        assert_eq!(
            demangle_owned("_RNvC6_123foo3bar").as_deref(),
            Some("123foo::bar")
        );
    }

    #[test]
    fn rejects_non_v0() {
        assert_eq!(demangle("_ZN3foo3barE"), None);
        assert_eq!(demangle_owned("_ZN3foo3barE"), None);
    }
}
