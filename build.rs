//! Build script to track include_str! dependencies.
//! This ensures cargo rebuilds when template files change.

fn main() {
    // Template written by `trackdash init`
    println!("cargo:rerun-if-changed=resources/config.toml");
}
