//! Archive and descriptor fixtures.

use std::io::{Cursor, Write};
use std::path::Path;

use pour_core::checksum::Sha256Digest;
use pour_core::descriptor::vars::MapSource;
use pour_core::descriptor::{Descriptor, LoadContext};
use pour_core::platform::Platform;
use zip::write::SimpleFileOptions;

pub const ARCHIVE_NAME: &str = "gpup_linux_amd64.zip";

/// A zip holding a `gpup` shell script that prints usage and exits with `exit_code`.
pub fn gpup_zip(exit_code: i32) -> Vec<u8> {
    let script = format!(
        "#!/bin/sh\necho \"Usage: gpup [OPTIONS] FILES...\"\nexit {}\n",
        exit_code
    );
    let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().unix_permissions(0o755);
    w.start_file("gpup", opts).unwrap();
    w.write_all(script.as_bytes()).unwrap();
    let docs = SimpleFileOptions::default().unix_permissions(0o644);
    w.start_file("README.md", docs).unwrap();
    w.write_all(b"# gpup\n").unwrap();
    w.finish().unwrap().into_inner()
}

pub const GPUP_DESCRIPTOR: &str = r#"
name = "gpup"
desc = "Upload files to your Google Photos using the Photos Library API"
homepage = "https://github.com/int128/gpup"
version = '{{ env "VERSION" }}'
url = '{{ env "BASE_URL" }}gpup_{{ platform }}.zip'
sha256 = '{{ env "GPUP_SHA256" }}'

[[install]]
source = "gpup"
kind = "executable"

[[install]]
source = "README.md"
kind = "share"

[test]
command = ["gpup", "--help"]
"#;

/// Resolve the gpup descriptor against `base_url` with the given expected digest.
pub fn gpup_descriptor(base_url: &str, sha256: &Sha256Digest) -> Descriptor {
    let vars = MapSource::new()
        .with("VERSION", "1.2.3")
        .with("BASE_URL", base_url)
        .with("GPUP_SHA256", sha256.to_hex());
    let ctx = LoadContext::new(&vars).with_platform(Platform::new("linux", "amd64"));
    Descriptor::from_toml_str(GPUP_DESCRIPTOR, &ctx).expect("descriptor resolves")
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

/// Files below `dir`, recursively, as paths relative to it.
pub fn list_files(dir: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for e in entries.flatten() {
            let p = e.path();
            if p.is_dir() {
                walk(root, &p, out);
            } else {
                out.push(p.strip_prefix(root).unwrap().display().to_string());
            }
        }
    }
    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}
