fn main() {
    cc::Build::new()
        .file("src/demangle.c")
        .include("include")
        .compile("v0_demangle_native_c_impl");
    println!("cargo::rerun-if-changed=src/demangle.c");
    println!("cargo::rerun-if-changed=include/demangle.h");
}
