use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::audio::AudioGraph;
use crate::config::CountdownConfig;
use crate::encoding::{EncodeJob, FfmpegMode, FfmpegPipe};
use crate::naming::output_file_name;
use crate::painter::TextPainter;
use crate::timeline::{Card, CountdownPlan};

#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub output_path: PathBuf,
    pub frames: u64,
    pub seconds: u64,
    pub cards: usize,
}

/// Renders the whole countdown to `output_dir`, named after the config.
///
/// Card failures and encoder failures are both returned; the caller picks
/// the exit policy. A failed render leaves whatever was at the output path
/// untouched.
pub fn render_countdown(
    config: &CountdownConfig,
    output_dir: &Path,
    mode: FfmpegMode,
) -> Result<RenderReport> {
    config.validate()?;
    config.verify_assets()?;

    let plan = CountdownPlan::build(config)?;
    let output_path = output_dir.join(output_file_name(config)?);
    let mut painter = TextPainter::from_path(&config.font.path, config.font.size)?;

    // Everything that can fail per card fails here, before ffmpeg touches disk.
    let labels = plan
        .cards()
        .map(|card| card.label.as_str())
        .collect::<BTreeSet<_>>();
    for label in labels {
        painter.ensure_supported_codepoints(label)?;
    }
    let first_card = plan.cards().next().ok_or_else(|| anyhow!("countdown plan has no cards"))?;
    let mut pending = Some(build_card(&mut painter, config, &plan, first_card)?);

    info!(
        output = %output_path.display(),
        seconds = plan.total_seconds(),
        width = config.resolution.width,
        height = config.resolution.height,
        "rendering countdown"
    );

    // Dropping the pipe on an early return kills ffmpeg and removes its
    // partial file.
    let ffmpeg = FfmpegPipe::spawn_with_mode(
        EncodeJob {
            resolution: config.resolution,
            fps: config.fps,
            audio: AudioGraph::from_plan(&plan),
            encoding: config.encoding.clone(),
            output_path: output_path.clone(),
        },
        mode,
    )?;

    let fps = u64::from(config.fps);
    let mut frames = 0_u64;
    let mut cards = 0_usize;
    for segment in &plan.segments {
        debug!(phase = ?segment.phase, start = segment.start, "rendering segment");
        for card in &segment.cards {
            let rgba = match pending.take() {
                Some(rgba) => rgba,
                None => build_card(&mut painter, config, &plan, card)?,
            };

            for _ in 0..card.hold.saturating_mul(fps) {
                if let Err(error) = ffmpeg.write_frame(rgba.clone()) {
                    // The worker's own error says why the channel closed.
                    return Err(ffmpeg.abort().unwrap_or(error));
                }
                frames += 1;
            }
            cards += 1;
        }
        info!(
            phase = ?segment.phase,
            done = segment.start + segment.duration,
            total = plan.total_seconds(),
            "segment rendered"
        );
    }

    ffmpeg
        .finish()
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    Ok(RenderReport {
        output_path,
        frames,
        seconds: plan.total_seconds(),
        cards,
    })
}

fn build_card(
    painter: &mut TextPainter,
    config: &CountdownConfig,
    plan: &CountdownPlan,
    card: &Card,
) -> Result<Vec<u8>> {
    painter
        .render_card(
            config.resolution.width,
            config.resolution.height,
            plan.background,
            &card.label,
            card.color,
        )
        .with_context(|| format!("failed to build card '{}' at {}s", card.label, card.start))
}
