//! ffmpeg audio inputs and mix graph for a countdown plan.
//!
//! Input 0 is always the raw video on stdin, so cue `i` reads input `i + 1`.

use std::fmt::Write as _;

use crate::timeline::{AudioCue, CountdownPlan, SoundKind};

pub const SAMPLE_RATE: u32 = 44_100;
pub const AUDIO_OUTPUT_LABEL: &str = "[aout]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioGraph {
    pub input_args: Vec<String>,
    pub filter_complex: String,
}

impl AudioGraph {
    pub fn from_plan(plan: &CountdownPlan) -> Self {
        let cues = plan.cues().collect::<Vec<_>>();
        Self::from_cues(&cues, plan.total_seconds())
    }

    pub fn from_cues(cues: &[&AudioCue], total_seconds: u64) -> Self {
        let mut input_args = Vec::with_capacity(cues.len() * 4);
        let mut filter_complex = String::new();

        for (index, cue) in cues.iter().enumerate() {
            // Tick tracks are short loops stretched over a whole part.
            if cue.sound == SoundKind::Ticks {
                input_args.push("-stream_loop".to_owned());
                input_args.push("-1".to_owned());
            }
            input_args.push("-i".to_owned());
            input_args.push(cue.path.to_string_lossy().into_owned());

            let delay_ms = cue.start.saturating_mul(1000);
            let _ = write!(
                filter_complex,
                "[{input}:a]atrim=duration={duration},asetpts=PTS-STARTPTS,\
                 aresample={SAMPLE_RATE},aformat=channel_layouts=stereo,\
                 adelay={delay_ms}|{delay_ms}[c{index}];",
                input = index + 1,
                duration = cue.duration,
            );
        }

        if cues.is_empty() {
            let _ = write!(
                filter_complex,
                "anullsrc=r={SAMPLE_RATE}:cl=stereo,atrim=duration={total_seconds}{AUDIO_OUTPUT_LABEL}"
            );
        } else {
            for index in 0..cues.len() {
                let _ = write!(filter_complex, "[c{index}]");
            }
            let _ = write!(
                filter_complex,
                "amix=inputs={}:duration=longest:dropout_transition=0:normalize=0,\
                 apad,atrim=duration={total_seconds}{AUDIO_OUTPUT_LABEL}",
                cues.len()
            );
        }

        Self {
            input_args,
            filter_complex,
        }
    }
}
