use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    // The linker script is only needed when actually linking for the
    // Cortex-M4 target (feature "cortex-m4"); host builds/tests run the
    // portable kernel core against arch::host and never link memory.x.
    if env::var_os("CARGO_FEATURE_CORTEX_M4").is_none() {
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::copy("memory.x", out_dir.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}
