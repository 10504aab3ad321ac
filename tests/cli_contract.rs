use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

const SYSTEM_FONT_DIR: &str = "/usr/share/fonts/truetype/dejavu";

fn write_manifest(path: &Path, yaml: &str) {
    fs::write(path, yaml).expect("manifest should write");
}

fn run_typewire(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_typewire"))
        .current_dir(cwd)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("typewire command should run")
}

fn system_fonts() -> Option<(PathBuf, PathBuf, PathBuf)> {
    let dir = Path::new(SYSTEM_FONT_DIR);
    let fonts = (
        dir.join("DejaVuSans.ttf"),
        dir.join("DejaVuSans-Bold.ttf"),
        dir.join("DejaVuSans-Oblique.ttf"),
    );
    (fonts.0.is_file() && fonts.1.is_file() && fonts.2.is_file()).then_some(fonts)
}

#[test]
fn version_includes_package_version() {
    let dir = tempdir().unwrap();
    let output = run_typewire(dir.path(), &["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "{stdout}");
}

#[test]
fn check_fails_on_missing_fonts() {
    let dir = tempdir().unwrap();
    write_manifest(
        &dir.path().join("session.yaml"),
        "fonts: { regular: nope.ttf, bold: nope.ttf, italic: nope.ttf }\noutput: { mode: stream, url: rtmp://live.example.com/app }\n",
    );

    let output = run_typewire(dir.path(), &["check", "session.yaml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("regular font file"), "{stderr}");
}

#[test]
fn json_errors_use_the_envelope() {
    let dir = tempdir().unwrap();
    write_manifest(&dir.path().join("broken.yaml"), "fonts: [\n");

    let output = run_typewire(dir.path(), &["--json", "check", "broken.yaml"]);
    assert_eq!(output.status.code(), Some(1));
    let envelope: Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be a JSON envelope");
    assert_eq!(envelope["ok"], false);
    assert_eq!(envelope["error"]["code"], "CONFIG_INVALID");
    assert!(envelope["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("broken.yaml"));
}

#[test]
fn preview_flag_conflicts_with_url() {
    let dir = tempdir().unwrap();
    let output = run_typewire(
        dir.path(),
        &["run", "session.yaml", "--preview", "--url", "rtmp://x/y"],
    );
    assert!(!output.status.success());
}

#[test]
fn check_and_still_with_system_fonts() {
    let Some((regular, bold, italic)) = system_fonts() else {
        eprintln!("skipping: no DejaVu fonts under {SYSTEM_FONT_DIR}");
        return;
    };
    let dir = tempdir().unwrap();
    write_manifest(
        &dir.path().join("session.yaml"),
        &format!(
            "canvas: {{ width: 320, height: 180 }}\nmargins: {{ top: 10, bottom: 10, side: 10 }}\nfonts: {{ regular: '{}', bold: '{}', italic: '{}', size: 16 }}\noutput: {{ mode: stream, url: out.flv }}\n",
            regular.display(),
            bold.display(),
            italic.display()
        ),
    );
    fs::write(dir.path().join("block.txt"), "# Hello\nThis is *typewire* speaking.").unwrap();

    let output = run_typewire(dir.path(), &["--json", "check", "session.yaml"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["ok"], true);
    assert_eq!(summary["mode"], "stream");

    let output = run_typewire(
        dir.path(),
        &["still", "session.yaml", "block.txt", "-o", "frame.png"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let png = fs::read(dir.path().join("frame.png")).unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
}
