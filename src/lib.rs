//! Demangler for the Rust compiler's "v0" symbol-mangling scheme.
//!
//! Mangled symbols look like `_RNvNtCs1234_5alloc5alloc8box_free`; this
//! crate turns them back into something like `alloc::alloc::box_free`.
//! Legacy (pre-v0) mangling is intentionally not supported: this crate is
//! only ever fed symbols produced by a `v0`-mangling compiler.
//!
//! ```
//! use v0_demangle::demangle;
//!
//! assert_eq!(format!("{:#}", demangle("_RNvC6_123foo3bar")), "123foo::bar");
//! assert_eq!(demangle("not a symbol").to_string(), "not a symbol");
//! ```
//!
//! The default, non-alternate `Display`/`to_string()` rendering additionally
//! prints each crate root's disambiguator hash, e.g. `123foo[0]::bar`; use
//! the alternate `{:#}` form (as above) to suppress it.

#![no_std]
#![deny(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[cfg(all(test, not(feature = "std")))]
extern crate std;

use core::fmt;

mod v0;

pub use crate::v0::ParseError;

/// Representation of a demangled symbol name.
pub struct Demangle<'a> {
    style: Option<v0::Demangle<'a>>,
    original: &'a str,
    suffix: &'a str,
}

/// De-mangles a Rust "v0" symbol into a more readable version.
///
/// This function will take a **mangled** symbol and return a value. When
/// printed, the de-mangled version will be written. If the symbol does not
/// look like a mangled v0 symbol, the original value is echoed back
/// verbatim instead (this crate is often fed arbitrary backtrace symbols,
/// not all of which originated from a Rust v0-mangling compiler).
///
/// Any suffix appended by the linker or LTO tooling after the mangled
/// portion proper (such as a ThinLTO `.llvm.<hash>` tag, or a `.exit.i.i`
/// inlining annotation) is preserved and re-emitted verbatim.
///
/// # Examples
///
/// ```
/// use v0_demangle::demangle;
///
/// assert_eq!(format!("{:#}", demangle("_RNvC6_123foo3bar")), "123foo::bar");
/// assert_eq!(demangle("foo").to_string(), "foo");
/// ```
pub fn demangle(mut s: &str) -> Demangle {
    // During ThinLTO LLVM may import and rename internal symbols, so strip
    // out `.llvm.<hash>` suffixes generated by this process, as well as the
    // `@@<whatever>` suffix that can be added on top of that.
    if let Some(i) = s.find(".llvm.") {
        s = &s[..i];
    } else if let Some(i) = s.find("@@") {
        s = &s[..i];
    }

    match try_demangle(s) {
        Ok(d) => d,
        Err(_) => Demangle {
            style: None,
            original: s,
            suffix: "",
        },
    }
}

/// The same as `demangle`, except return an `Err` if the symbol does not
/// look like a `v0` mangled symbol, instead of printing the raw symbol.
///
/// On success, any bytes of `s` that trail the matched `v0` grammar (i.e.
/// are not drawn from `[_0-9A-Za-z]`, or are leftover after a well-formed
/// top-level path and optional instantiating-crate path) are retained as an
/// un-mangled suffix and re-emitted verbatim when the result is displayed.
pub fn try_demangle(s: &str) -> Result<Demangle, ParseError> {
    let (v0, rest) = v0::demangle(s)?;
    Ok(Demangle {
        style: Some(v0),
        original: s,
        suffix: rest,
    })
}

/// Like [`try_demangle`], but requires the *entire* input (after the `_R`
/// prefix) to be a well-formed `v0` symbol with no leftover bytes of any
/// kind, not even a non-alphabet suffix such as a ThinLTO tag.
///
/// This is the strict contract of §6/§7: it is what the C ABI entry points
/// in the companion `*-capi` crate are built on, and matches the reference
/// C implementation's `rust_demangle_with_callback` byte-for-byte.
pub fn try_demangle_exact(s: &str) -> Result<Demangle, ParseError> {
    let v0 = v0::demangle_strict(s)?;
    Ok(Demangle {
        style: Some(v0),
        original: s,
        suffix: "",
    })
}

impl<'a> Demangle<'a> {
    /// Returns the underlying string that was demangled.
    pub fn as_str(&self) -> &'a str {
        self.original
    }
}

impl<'a> fmt::Display for Demangle<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.style {
            Some(v0) => {
                fmt::Display::fmt(v0, f)?;
            }
            None => f.write_str(self.original)?,
        }
        f.write_str(self.suffix)
    }
}

impl<'a> fmt::Debug for Demangle<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::prelude::v1::*;

    #[test]
    fn demangle_non_symbol_passes_through() {
        assert_eq!(demangle("test").to_string(), "test");
        assert_eq!(demangle("_ZN3foo3barE").to_string(), "_ZN3foo3barE");
    }

    #[test]
    fn demangle_simple() {
        assert_eq!(
            format!("{:#}", demangle("_RNvC6_123foo3bar")),
            "123foo::bar"
        );
    }

    #[test]
    fn try_demangle_rejects_non_v0() {
        assert!(try_demangle("_ZN3foo3barE").is_err());
        assert!(try_demangle("test").is_err());
    }

    #[test]
    fn thinlto_suffix_is_preserved() {
        assert_eq!(format!("{:#}", demangle("_RC3foo.llvm.9D1C9369")), "foo");
        assert_eq!(
            format!("{:#}", demangle("_RC3foo.llvm.9D1C9369@@16")),
            "foo"
        );
    }

    #[test]
    fn extra_dotted_suffix_is_preserved() {
        assert_eq!(
            format!(
                "{:#}",
                demangle(
                    "_RNvNtNtNtNtCs92dm3009vxr_4rand4rngs7adapter9reseeding4fork\
                     23FORK_HANDLER_REGISTERED.0.0"
                )
            ),
            "rand::rngs::adapter::reseeding::fork::FORK_HANDLER_REGISTERED.0.0"
        );
    }
}
