use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (unit tests, simulation) link normally
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    // Put the STM32F303VC memory map where cortex-m-rt's link.x looks for it
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    fs::copy("memory.x", out_dir.join("memory.x")).expect("memory.x is present at the crate root");
    println!("cargo:rustc-link-search={}", out_dir.display());
}
