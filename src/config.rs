use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::color_name::{rgb_for_name, Rgb};
use crate::error_codes::{CodedError, ASSET_MISSING, INVALID_CONFIG, UNKNOWN_PRESET};
use crate::label::{LabelRule, LabelStyle};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CountdownConfig {
    pub resolution: Resolution,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Seconds counted down before the end card.
    pub duration: u64,
    /// Main-phase chunk length; the tick sound restarts at every part.
    #[serde(default)]
    pub part_duration: Option<u64>,
    /// Final seconds during which the text blinks and alert sounds play.
    pub alert_interval: u64,
    #[serde(default = "default_end_hold")]
    pub end_hold: u64,
    pub font: FontConfig,
    #[serde(default = "default_background")]
    pub background: ColorValue,
    #[serde(default = "default_text_color")]
    pub text_color: ColorValue,
    #[serde(default = "default_alert_color")]
    pub alert_color: ColorValue,
    #[serde(default)]
    pub label: LabelConfig,
    #[serde(default)]
    pub file_suffix: FileSuffix,
    pub sounds: Sounds,
    #[serde(default)]
    pub encoding: EncodingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FontConfig {
    pub path: PathBuf,
    pub size: f32,
}

/// Either `[r, g, b]` or a CSS3 color name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ColorValue {
    Rgb(Rgb),
    Named(String),
}

impl ColorValue {
    pub fn resolve(&self, field: &str) -> Result<Rgb> {
        match self {
            Self::Rgb(rgb) => Ok(*rgb),
            Self::Named(name) => rgb_for_name(name).ok_or_else(|| {
                anyhow!(CodedError::usage(
                    INVALID_CONFIG,
                    format!("{field}: unknown color name '{name}'"),
                )
                .with_details(json!({ "field": field, "provided": name })))
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Rgb,
    pub text: Rgb,
    pub alert: Rgb,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LabelConfig {
    #[serde(default = "default_modulus")]
    pub modulus: u32,
    #[serde(default = "default_label_style")]
    pub style: LabelStyle,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            modulus: default_modulus(),
            style: default_label_style(),
        }
    }
}

/// Trailing component of the output file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSuffix {
    /// Total duration as `H-MM-SS`.
    #[default]
    Duration,
    /// The first label shown on screen.
    FirstLabel,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Sounds {
    #[serde(default)]
    pub ticks: Option<PathBuf>,
    pub alert: PathBuf,
    pub end: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Webm,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn default_video_codec(self) -> &'static str {
        match self {
            Self::Mp4 => "libx264",
            Self::Webm => "libvpx-vp9",
        }
    }

    pub fn default_audio_codec(self) -> &'static str {
        match self {
            Self::Mp4 => "aac",
            Self::Webm => "libvorbis",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EncodingConfig {
    #[serde(default)]
    pub container: Container,
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    /// Thread-count hint passed through to the encoder.
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub video_bitrate: Option<String>,
    /// Appended verbatim before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl EncodingConfig {
    pub fn video_codec(&self) -> &str {
        self.video_codec
            .as_deref()
            .unwrap_or_else(|| self.container.default_video_codec())
    }

    pub fn audio_codec(&self) -> &str {
        self.audio_codec
            .as_deref()
            .unwrap_or_else(|| self.container.default_audio_codec())
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            container: Container::Mp4,
            video_codec: None,
            audio_codec: None,
            pix_fmt: default_pix_fmt(),
            threads: None,
            video_bitrate: None,
            extra_args: Vec::new(),
        }
    }
}

/// Longest side a frame may have; 8K UHD is 7680.
pub const MAX_FRAME_SIDE: u32 = 16_384;
pub const MAX_FPS: u32 = 240;
/// One week.
pub const MAX_DURATION_SECONDS: u64 = 7 * 24 * 60 * 60;
pub const MAX_END_HOLD_SECONDS: u64 = 60 * 60;

fn default_fps() -> u32 {
    1
}

fn default_end_hold() -> u64 {
    3
}

fn default_modulus() -> u32 {
    100
}

fn default_label_style() -> LabelStyle {
    LabelStyle::WrapToModulus
}

fn default_background() -> ColorValue {
    ColorValue::Rgb(Rgb(0, 0, 0))
}

fn default_text_color() -> ColorValue {
    ColorValue::Named("white".to_owned())
}

fn default_alert_color() -> ColorValue {
    ColorValue::Named("red".to_owned())
}

fn default_pix_fmt() -> String {
    "yuv420p".to_owned()
}

impl CountdownConfig {
    pub fn validate(&self) -> Result<()> {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(invalid(
                "resolution",
                format!(
                    "resolution must be positive, got {}x{}",
                    self.resolution.width, self.resolution.height
                ),
            ));
        }
        if self.resolution.width > MAX_FRAME_SIDE || self.resolution.height > MAX_FRAME_SIDE {
            return Err(invalid(
                "resolution",
                format!(
                    "resolution sides must be at most {MAX_FRAME_SIDE}, got {}x{}",
                    self.resolution.width, self.resolution.height
                ),
            ));
        }
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(invalid(
                "fps",
                format!("fps must be in 1..={MAX_FPS}, got {}", self.fps),
            ));
        }
        if self.duration == 0 || self.duration > MAX_DURATION_SECONDS {
            return Err(invalid(
                "duration",
                format!(
                    "duration must be in 1..={MAX_DURATION_SECONDS} seconds, got {}",
                    self.duration
                ),
            ));
        }
        if self.part_duration == Some(0) {
            return Err(invalid("part_duration", "part_duration must be > 0"));
        }
        if self.alert_interval > self.duration {
            return Err(invalid(
                "alert_interval",
                format!(
                    "alert_interval ({}) cannot exceed duration ({})",
                    self.alert_interval, self.duration
                ),
            ));
        }
        if self.end_hold == 0 || self.end_hold > MAX_END_HOLD_SECONDS {
            return Err(invalid(
                "end_hold",
                format!(
                    "end_hold must be in 1..={MAX_END_HOLD_SECONDS} seconds, got {}",
                    self.end_hold
                ),
            ));
        }
        if !(self.font.size.is_finite() && self.font.size > 0.0) {
            return Err(invalid("font.size", "font size must be a positive number"));
        }
        if self.encoding.pix_fmt.trim().is_empty() {
            return Err(invalid("encoding.pix_fmt", "pix_fmt cannot be empty"));
        }
        if self.encoding.threads == Some(0) {
            return Err(invalid("encoding.threads", "threads must be > 0 when set"));
        }
        self.label_rule()?;
        self.palette()?;
        Ok(())
    }

    pub fn label_rule(&self) -> Result<LabelRule> {
        LabelRule::new(self.label.modulus, self.label.style)
    }

    pub fn palette(&self) -> Result<Palette> {
        Ok(Palette {
            background: self.background.resolve("background")?,
            text: self.text_color.resolve("text_color")?,
            alert: self.alert_color.resolve("alert_color")?,
        })
    }

    pub fn part_duration(&self) -> u64 {
        self.part_duration.unwrap_or(self.duration).max(1)
    }

    /// Countdown plus the end card.
    pub fn total_seconds(&self) -> u64 {
        self.duration.saturating_add(self.end_hold)
    }

    /// Checks that every input file the render reads is present.
    pub fn verify_assets(&self) -> Result<()> {
        ensure_file("font.path", &self.font.path)?;
        if let Some(ticks) = &self.sounds.ticks {
            ensure_file("sounds.ticks", ticks)?;
        }
        ensure_file("sounds.alert", &self.sounds.alert)?;
        ensure_file("sounds.end", &self.sounds.end)?;
        Ok(())
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        resolve_in_place(&mut self.font.path, base_dir);
        if let Some(ticks) = self.sounds.ticks.as_mut() {
            resolve_in_place(ticks, base_dir);
        }
        resolve_in_place(&mut self.sounds.alert, base_dir);
        resolve_in_place(&mut self.sounds.end, base_dir);
    }
}

fn invalid(field: &str, message: impl Into<String>) -> anyhow::Error {
    anyhow!(CodedError::usage(INVALID_CONFIG, message).with_details(json!({ "field": field })))
}

fn resolve_in_place(path: &mut PathBuf, base_dir: &Path) {
    if path.is_relative() {
        *path = base_dir.join(&*path);
    }
}

fn ensure_file(field: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!(CodedError::clip(
            ASSET_MISSING,
            format!("{field} does not exist: {}", path.display()),
        )
        .with_details(json!({ "field": field, "path": path.display().to_string() }))));
    }
    if !path.is_file() {
        return Err(anyhow!(CodedError::clip(
            ASSET_MISSING,
            format!("{field} is not a file: {}", path.display()),
        )
        .with_details(json!({ "field": field, "path": path.display().to_string() }))));
    }
    Ok(())
}

pub fn load_and_validate_config(path: &Path) -> Result<CountdownConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut config: CountdownConfig = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(CodedError::usage(
            INVALID_CONFIG,
            format!(
                "failed to parse yaml in {} at {}: {}",
                path.display(),
                location,
                error
            ),
        ))
    })?;

    let base_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    config.resolve_paths(&base_dir);
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// The two stock countdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// 4K, black background, counts in hundreds with a tick track.
    Hundred,
    /// 8K, green background, seconds-of-minute labels, no ticks.
    Uhd8k,
}

impl Preset {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hundred" | "100" => Ok(Self::Hundred),
            "8k" | "uhd8k" => Ok(Self::Uhd8k),
            _ => Err(anyhow!(CodedError::usage(
                UNKNOWN_PRESET,
                format!("unknown preset '{value}'"),
            )
            .with_details(json!({
                "provided": value,
                "allowed": ["hundred", "8k"]
            })))),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Hundred => "hundred",
            Self::Uhd8k => "8k",
        }
    }

    pub fn config(self) -> CountdownConfig {
        match self {
            Self::Hundred => CountdownConfig {
                resolution: Resolution {
                    width: 3840,
                    height: 2160,
                },
                fps: 1,
                duration: 10,
                part_duration: Some(10),
                alert_interval: 5,
                end_hold: 3,
                font: FontConfig {
                    path: PathBuf::from("./fonts/RubikMonoOne-Regular.ttf"),
                    size: 2200.0,
                },
                background: ColorValue::Rgb(Rgb(0, 0, 0)),
                text_color: default_text_color(),
                alert_color: default_alert_color(),
                label: LabelConfig {
                    modulus: 100,
                    style: LabelStyle::WrapToModulus,
                },
                file_suffix: FileSuffix::Duration,
                sounds: Sounds {
                    ticks: Some(PathBuf::from("./ticks.wav")),
                    alert: PathBuf::from("./alert_sound_1s.wav"),
                    end: PathBuf::from("./end_sound_3s.wav"),
                },
                encoding: EncodingConfig::default(),
            },
            Self::Uhd8k => CountdownConfig {
                resolution: Resolution {
                    width: 7680,
                    height: 4320,
                },
                fps: 1,
                duration: 10,
                part_duration: None,
                alert_interval: 5,
                end_hold: 3,
                font: FontConfig {
                    path: PathBuf::from("./fonts/SplineSansMono-SemiBold.ttf"),
                    size: 4000.0,
                },
                background: ColorValue::Rgb(Rgb(0, 255, 0)),
                text_color: default_text_color(),
                alert_color: default_alert_color(),
                label: LabelConfig {
                    modulus: 60,
                    style: LabelStyle::Plain,
                },
                file_suffix: FileSuffix::FirstLabel,
                sounds: Sounds {
                    ticks: None,
                    alert: PathBuf::from("./alert_sound_1s.wav"),
                    end: PathBuf::from("./end_sound_3s.wav"),
                },
                encoding: EncodingConfig::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{
        load_and_validate_config, ColorValue, Container, FileSuffix, Preset, MAX_DURATION_SECONDS,
        MAX_END_HOLD_SECONDS, MAX_FPS,
    };
    use crate::color_name::Rgb;
    use crate::error_codes::{find_coded_error, CodedErrorKind};
    use crate::label::LabelStyle;

    const MINIMAL: &str = r#"
resolution: { width: 64, height: 36 }
duration: 12
alert_interval: 4
font: { path: fonts/Mono.ttf, size: 20 }
background: [0, 255, 0]
sounds:
  alert: alert.wav
  end: end.wav
"#;

    #[test]
    fn minimal_config_takes_defaults_and_resolves_paths() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("countdown.yaml");
        fs::write(&path, MINIMAL).expect("config should write");

        let config = load_and_validate_config(&path).expect("config should load");
        assert_eq!(config.fps, 1);
        assert_eq!(config.end_hold, 3);
        assert_eq!(config.part_duration(), 12);
        assert_eq!(config.total_seconds(), 15);
        assert_eq!(config.label.modulus, 100);
        assert_eq!(config.label.style, LabelStyle::WrapToModulus);
        assert_eq!(config.file_suffix, FileSuffix::Duration);
        assert_eq!(config.encoding.container, Container::Mp4);
        assert_eq!(config.encoding.video_codec(), "libx264");
        assert_eq!(config.font.path, dir.path().join("fonts/Mono.ttf"));
        assert_eq!(config.sounds.alert, dir.path().join("alert.wav"));

        let palette = config.palette().expect("palette should resolve");
        assert_eq!(palette.background, Rgb(0, 255, 0));
        assert_eq!(palette.text, Rgb(255, 255, 255));
        assert_eq!(palette.alert, Rgb(255, 0, 0));
    }

    #[test]
    fn alert_longer_than_duration_is_a_usage_error() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("countdown.yaml");
        fs::write(&path, MINIMAL.replace("alert_interval: 4", "alert_interval: 13"))
            .expect("config should write");

        let error = load_and_validate_config(&path).expect_err("config should be rejected");
        let coded = find_coded_error(&error).expect("coded error");
        assert_eq!(coded.kind, CodedErrorKind::Usage);
        assert!(coded.message.contains("alert_interval"));
    }

    #[test]
    fn oversized_values_are_usage_errors() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("countdown.yaml");
        let cases = [
            ("duration: 12", "duration: 18446744073709551615", "duration"),
            ("alert_interval: 4", "alert_interval: 4\nend_hold: 18446744073709551615", "end_hold"),
            ("alert_interval: 4", "alert_interval: 4\nfps: 4294967295", "fps"),
            ("width: 64", "width: 600000000", "resolution"),
        ];
        for (from, to, field) in cases {
            fs::write(&path, MINIMAL.replace(from, to)).expect("config should write");
            let error = load_and_validate_config(&path).expect_err("config should be rejected");
            let coded = find_coded_error(&error).expect("coded error");
            assert_eq!(coded.code, "INVALID_CONFIG", "{field}");
            assert_eq!(coded.kind, CodedErrorKind::Usage, "{field}");
            assert_eq!(
                coded.details.as_ref().and_then(|details| details["field"].as_str()),
                Some(field)
            );
        }
    }

    #[test]
    fn largest_allowed_values_do_not_overflow() {
        let mut config = Preset::Hundred.config();
        config.duration = MAX_DURATION_SECONDS;
        config.end_hold = MAX_END_HOLD_SECONDS;
        config.fps = MAX_FPS;
        config.validate().expect("limits are inclusive");
        assert_eq!(
            config.total_seconds(),
            MAX_DURATION_SECONDS + MAX_END_HOLD_SECONDS
        );
    }

    #[test]
    fn unknown_field_reports_location() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("countdown.yaml");
        fs::write(&path, format!("{MINIMAL}colour: red\n")).expect("config should write");

        let error = load_and_validate_config(&path).expect_err("unknown field must fail");
        assert!(format!("{error:#}").contains("line"));
    }

    #[test]
    fn unknown_color_name_is_rejected() {
        let mut config = Preset::Hundred.config();
        config.text_color = ColorValue::Named("blurple".to_owned());
        let error = config.validate().expect_err("unknown color must fail");
        assert!(error.to_string().contains("blurple"));
    }

    #[test]
    fn missing_assets_are_clip_construction_errors() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("countdown.yaml");
        fs::write(&path, MINIMAL).expect("config should write");
        let config = load_and_validate_config(&path).expect("config should load");

        let error = config.verify_assets().expect_err("font is missing");
        let coded = find_coded_error(&error).expect("coded error");
        assert_eq!(coded.kind, CodedErrorKind::ClipConstruction);
        assert_eq!(coded.code, "ASSET_MISSING");
    }

    #[test]
    fn presets_validate_and_parse_keywords() {
        for keyword in ["hundred", "8k"] {
            let preset = Preset::from_keyword(keyword).expect("preset keyword");
            assert_eq!(preset.keyword(), keyword);
            preset.config().validate().expect("preset should validate");
        }
        assert!(Preset::from_keyword("4k").is_err());
    }

    #[test]
    fn webm_container_switches_default_codecs() {
        let mut config = Preset::Uhd8k.config();
        config.encoding.container = Container::Webm;
        assert_eq!(config.encoding.video_codec(), "libvpx-vp9");
        assert_eq!(config.encoding.audio_codec(), "libvorbis");
    }
}
