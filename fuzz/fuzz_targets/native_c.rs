#![no_main]

use libfuzzer_sys::fuzz_target;

fn asciify(x: &str) -> String {
    let mut result = String::with_capacity(x.len() * 4);
    for ch in x.chars() {
        if ch.is_ascii() {
            result.push(ch);
        } else {
            result.push_str(&format!("\\u{{{:x}}}", ch as u32));
        }
    }
    result
}

fn fuzz(data: &str) {
    let rust = v0_demangle::try_demangle_exact(data);
    // The vendored C implementation never sets its `verbose` flag, so it
    // only ever agrees with the alternate (hash-suppressing) Rust rendering.
    let rust_rendered = rust.as_ref().ok().map(|d| asciify(&format!("{:#}", d)));

    let c_rendered = v0_demangle_native_c::demangle(data).as_deref().map(asciify);
    assert_eq!(rust_rendered, c_rendered, "callback path disagrees for {:?}", data);

    let c_owned = v0_demangle_native_c::demangle_owned(data)
        .as_deref()
        .map(asciify);
    assert_eq!(c_rendered, c_owned, "C callback and owning paths disagree for {:?}", data);
}

fuzz_target!(|data: &str| {
    fuzz(data);
});
