// Build script for flutter_rust_bridge code generation
//
// Dart bindings are generated out of band with the codegen CLI:
//   flutter_rust_bridge_codegen generate
//
// Running codegen from build.rs breaks plain cargo builds, so this script
// only tells cargo when the FFI surface changed.

fn main() {
    println!("cargo:rerun-if-changed=src/api.rs");
    println!("cargo:rerun-if-changed=src/api");
}
