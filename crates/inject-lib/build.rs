//! Build script for the CRI client
//!
//! With the `proto-gen` feature enabled, the `runtime.v1` client is generated
//! from `proto/runtime/v1/api.proto`. Otherwise the hand-maintained message
//! subset in `src/proto/mod.rs` is used and nothing is generated.

use std::path::PathBuf;
use std::process::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/runtime/v1/api.proto");

    if std::env::var_os("CARGO_FEATURE_PROTO_GEN").is_none() {
        return Ok(());
    }

    let protoc_available =
        std::env::var("PROTOC").is_ok() || Command::new("protoc").arg("--version").output().is_ok();

    if !protoc_available {
        println!("cargo:warning=protoc not found, cannot generate the CRI client");
        println!("cargo:warning=Install protoc or set PROTOC, or build without `proto-gen`");
        return Err("protoc is required for the proto-gen feature".into());
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(false) // only the runtime client is needed
        .build_client(true)
        .out_dir(&out_dir)
        .compile(&["proto/runtime/v1/api.proto"], &["proto"])?;

    Ok(())
}
