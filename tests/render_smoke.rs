use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::tempdir;
use tminus::color_name::Rgb;
use tminus::config::load_and_validate_config;
use tminus::encoding::FfmpegMode;
use tminus::naming::output_file_name;
use tminus::painter::TextPainter;
use tminus::render::render_countdown;

const FONT_CANDIDATES: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
];

fn system_font() -> Option<PathBuf> {
    FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|path| path.is_file())
        .map(Path::to_path_buf)
}

fn command_available(name: &str, version_arg: &str) -> bool {
    Command::new(name)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn write_tone(path: &Path, seconds: u32) {
    let status = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
        ])
        .arg(format!("sine=frequency=880:duration={seconds}"))
        .arg(path)
        .status()
        .expect("ffmpeg should run");
    assert!(status.success(), "tone generation should succeed");
}

#[test]
fn card_is_centered_on_background() {
    let Some(font) = system_font() else {
        eprintln!("skipping: no system font found");
        return;
    };
    let mut painter = TextPainter::from_path(&font, 32.0).expect("font should load");
    let frame = painter
        .render_card(96, 64, Rgb(0, 255, 0), "42", Rgb(255, 255, 255))
        .expect("card should render");

    assert_eq!(frame.len(), 96 * 64 * 4);
    assert_eq!(&frame[0..4], &[0, 255, 0, 255], "corner keeps background");

    let bright = frame
        .chunks_exact(4)
        .filter(|pixel| pixel[0] > 200 && pixel[2] > 200)
        .count();
    assert!(bright > 0, "text pixels should be drawn");

    let middle_row = &frame[32 * 96 * 4..33 * 96 * 4];
    assert!(
        middle_row.chunks_exact(4).any(|pixel| pixel[0] > 200),
        "text should cross the middle row"
    );
}

#[test]
fn renders_short_countdown_to_mp4() {
    if !command_available("ffmpeg", "-version") {
        eprintln!("skipping: ffmpeg not available");
        return;
    }
    let Some(font) = system_font() else {
        eprintln!("skipping: no system font found");
        return;
    };

    let dir = tempdir().expect("tempdir should create");
    write_tone(&dir.path().join("ticks.wav"), 1);
    write_tone(&dir.path().join("alert.wav"), 1);
    write_tone(&dir.path().join("end.wav"), 3);
    fs::write(
        dir.path().join("countdown.yaml"),
        format!(
            r#"
resolution: {{ width: 128, height: 72 }}
duration: 4
part_duration: 1
alert_interval: 2
end_hold: 1
font: {{ path: "{}", size: 40 }}
background: [0, 0, 0]
sounds:
  ticks: ticks.wav
  alert: alert.wav
  end: end.wav
"#,
            font.display()
        ),
    )
    .expect("config should write");

    let config = load_and_validate_config(&dir.path().join("countdown.yaml"))
        .expect("config should load");
    let report = render_countdown(&config, dir.path(), FfmpegMode::System)
        .expect("render should succeed");

    assert_eq!(report.frames, 5);
    assert_eq!(report.cards, 5);
    assert!(report.output_path.is_file());
    assert!(report
        .output_path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("video_128x72_")
            && name.ends_with("_black_countdown_0-00-04.mp4")));
    let size = fs::metadata(&report.output_path)
        .expect("output should exist")
        .len();
    assert!(size > 0);
}

/// Puts a fake `ffmpeg` first on PATH for one `tminus render` run. The fake
/// copies stdin into its last argument, then exits with `exit_code`.
#[cfg(unix)]
fn render_with_fake_ffmpeg(dir: &Path, exit_code: i32) -> std::process::Output {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.join("bin");
    fs::create_dir_all(&bin).expect("bin dir should create");
    let script = bin.join("ffmpeg");
    fs::write(
        &script,
        format!("#!/bin/sh\nfor last; do :; done\ncat > \"$last\"\nexit {exit_code}\n"),
    )
    .expect("script should write");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
        .expect("script should be executable");

    let path = std::env::var_os("PATH").unwrap_or_default();
    let mut search = vec![bin];
    search.extend(std::env::split_paths(&path));
    Command::new(env!("CARGO_BIN_EXE_tminus"))
        .current_dir(dir)
        .env("RUST_LOG", "off")
        .env("PATH", std::env::join_paths(search).expect("PATH should join"))
        .args(["render", "countdown.yaml", "--ffmpeg", "system", "--json"])
        .output()
        .expect("tminus should run")
}

#[cfg(unix)]
fn write_tiny_countdown(dir: &Path, font: &Path) -> PathBuf {
    for name in ["ticks.wav", "alert.wav", "end.wav"] {
        fs::write(dir.join(name), b"placeholder").expect("sound should write");
    }
    let config_path = dir.join("countdown.yaml");
    fs::write(
        &config_path,
        format!(
            r#"
resolution: {{ width: 16, height: 8 }}
duration: 2
alert_interval: 1
end_hold: 1
font: {{ path: "{}", size: 6 }}
sounds:
  ticks: ticks.wav
  alert: alert.wav
  end: end.wav
"#,
            font.display()
        ),
    )
    .expect("config should write");
    let config = load_and_validate_config(&config_path).expect("config should load");
    dir.join(output_file_name(&config).expect("name should build"))
}

#[cfg(unix)]
#[test]
fn successful_render_moves_frames_into_the_named_output() {
    let Some(font) = system_font() else {
        eprintln!("skipping: no system font found");
        return;
    };
    let dir = tempdir().expect("tempdir should create");
    let output = write_tiny_countdown(dir.path(), &font);

    let run = render_with_fake_ffmpeg(dir.path(), 0);
    assert!(run.status.success(), "{}", String::from_utf8_lossy(&run.stderr));

    let written = fs::metadata(&output).expect("output should exist").len();
    assert_eq!(written, 16 * 8 * 4 * 3, "three one-second frames of RGBA");
    let leftovers = fs::read_dir(dir.path())
        .expect("dir should list")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".partial-"))
        .count();
    assert_eq!(leftovers, 0);
}

#[cfg(unix)]
#[test]
fn failed_render_keeps_the_previous_video() {
    let Some(font) = system_font() else {
        eprintln!("skipping: no system font found");
        return;
    };
    let dir = tempdir().expect("tempdir should create");
    let output = write_tiny_countdown(dir.path(), &font);
    fs::write(&output, b"previous render").expect("previous output should write");

    let run = render_with_fake_ffmpeg(dir.path(), 1);
    assert_eq!(run.status.code(), Some(1));
    let envelope: serde_json::Value =
        serde_json::from_slice(&run.stderr).expect("stderr should be json");
    assert_eq!(envelope["error"]["code"], "RENDER_FAILED");

    assert_eq!(
        fs::read(&output).expect("previous output should remain"),
        b"previous render"
    );
    let names = fs::read_dir(dir.path())
        .expect("dir should list")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".mp4"))
        .collect::<Vec<_>>();
    assert_eq!(names.len(), 1, "{names:?}");
}
