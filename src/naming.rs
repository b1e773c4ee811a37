use std::path::Path;

use anyhow::Result;

use crate::color_name::color_name;
use crate::config::{CountdownConfig, FileSuffix};

pub fn font_name(font_path: &Path) -> String {
    font_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `H:MM:SS`, prefixed with `N day(s), ` past 24 hours.
pub fn format_clock(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let rest = total_seconds % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        _ => format!("{days} days, {clock}"),
    }
}

pub fn output_file_name(config: &CountdownConfig) -> Result<String> {
    let palette = config.palette()?;
    let suffix = match config.file_suffix {
        FileSuffix::Duration => format_clock(config.duration),
        FileSuffix::FirstLabel => config.label_rule()?.label(config.duration),
    };
    Ok(format!(
        "video_{}x{}_{}_{}_countdown_{}.{}",
        config.resolution.width,
        config.resolution.height,
        font_name(&config.font.path),
        color_name(palette.background),
        suffix.replace(':', "-"),
        config.encoding.container.extension()
    ))
}
