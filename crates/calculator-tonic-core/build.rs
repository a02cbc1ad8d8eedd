/// Builds the gRPC client and server code for the `calculator.proto` definition
/// using `tonic-prost-build`.
///
/// This code generation step processes the Protocol Buffer definitions located
/// in the `proto` directory and emits Rust modules with gRPC bindings into the
/// crate's `OUT_DIR`.
///
/// # Files and Paths
///
/// - Proto file: `proto/calculator.proto`
/// - Includes: `proto/`
/// - Descriptor set: `$OUT_DIR/calculator_descriptor.bin`, consumed by the
///   server's reflection service.
///
/// # Panics
///
/// This function will `panic!` if code generation fails.
///
/// # Output
///
/// Generated code will be accessible in Rust via:
///
/// ```rust
/// pub mod proto {
///     tonic::include_proto!("calculator");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    println!("cargo:rerun-if-changed=proto/calculator.proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("calculator_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/calculator.proto"], &["proto"])
        .unwrap();
}
