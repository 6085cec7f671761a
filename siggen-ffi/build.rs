// Publishes the C header to $OUT_DIR.
//
// With `cbindgen` on PATH the header is regenerated from src/lib.rs and the
// checked-in copy refreshed; otherwise include/siggen.h is copied as is.
//
//   - <repo>/siggen-ffi/include/siggen.h   (checked-in)
//   - $OUT_DIR/siggen.h

use std::{env, fs, io, path::PathBuf, process::Command};

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/siggen.h");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").map_err(io::Error::other)?);
    let out_dir = PathBuf::from(env::var("OUT_DIR").map_err(io::Error::other)?);
    let header_repo = crate_dir.join("include").join("siggen.h");
    let header_out = out_dir.join("siggen.h");

    let generated = Command::new("cbindgen")
        .args(["--crate", "siggen-ffi", "--lang", "C", "--output"])
        .arg(&header_out)
        .current_dir(&crate_dir)
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if generated {
        let _ = fs::copy(&header_out, &header_repo);
        return Ok(());
    }
    fs::copy(&header_repo, &header_out).map(|_| ())
}
