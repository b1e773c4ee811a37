use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;

use crate::color_name::Rgb;
use crate::config::CountdownConfig;

/// Label drawn on the end card regardless of the label convention.
pub const END_LABEL: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Main,
    Alert,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Ticks,
    Alert,
    End,
}

/// One full-frame text card, in whole seconds on the output timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub start: u64,
    pub hold: u64,
    pub label: String,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioCue {
    pub sound: SoundKind,
    pub path: PathBuf,
    pub start: u64,
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub phase: Phase,
    pub start: u64,
    pub duration: u64,
    pub cards: Vec<Card>,
    pub cues: Vec<AudioCue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountdownPlan {
    pub background: Rgb,
    pub segments: Vec<Segment>,
}

impl CountdownPlan {
    pub fn build(config: &CountdownConfig) -> Result<Self> {
        config.validate()?;
        let rule = config.label_rule()?;
        let palette = config.palette()?;

        let main_seconds = config.duration - config.alert_interval;
        let part_duration = config.part_duration();
        let mut segments = Vec::new();

        let mut part_start = 0;
        while part_start < main_seconds {
            let part_len = part_duration.min(main_seconds - part_start);
            let cards = (part_start..part_start + part_len)
                .map(|t| Card {
                    start: t,
                    hold: 1,
                    label: rule.label(config.duration - t),
                    color: palette.text,
                })
                .collect();
            let cues = config
                .sounds
                .ticks
                .iter()
                .map(|path| AudioCue {
                    sound: SoundKind::Ticks,
                    path: path.clone(),
                    start: part_start,
                    duration: part_len,
                })
                .collect();
            segments.push(Segment {
                phase: Phase::Main,
                start: part_start,
                duration: part_len,
                cards,
                cues,
            });
            part_start += part_len;
        }

        if config.alert_interval > 0 {
            let cards = (0..config.alert_interval)
                .map(|t| Card {
                    start: main_seconds + t,
                    hold: 1,
                    label: rule.label(config.alert_interval - t),
                    color: if t % 2 == 0 {
                        palette.text
                    } else {
                        palette.alert
                    },
                })
                .collect();
            let cues = (0..config.alert_interval)
                .map(|t| AudioCue {
                    sound: SoundKind::Alert,
                    path: config.sounds.alert.clone(),
                    start: main_seconds + t,
                    duration: 1,
                })
                .collect();
            segments.push(Segment {
                phase: Phase::Alert,
                start: main_seconds,
                duration: config.alert_interval,
                cards,
                cues,
            });
        }

        segments.push(Segment {
            phase: Phase::End,
            start: config.duration,
            duration: config.end_hold,
            cards: vec![Card {
                start: config.duration,
                hold: config.end_hold,
                label: END_LABEL.to_owned(),
                color: palette.alert,
            }],
            cues: vec![AudioCue {
                sound: SoundKind::End,
                path: config.sounds.end.clone(),
                start: config.duration,
                duration: config.end_hold,
            }],
        });

        Ok(Self {
            background: palette.background,
            segments,
        })
    }

    pub fn total_seconds(&self) -> u64 {
        self.segments
            .last()
            .map_or(0, |segment| segment.start + segment.duration)
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.segments.iter().flat_map(|segment| segment.cards.iter())
    }

    pub fn cues(&self) -> impl Iterator<Item = &AudioCue> {
        self.segments.iter().flat_map(|segment| segment.cues.iter())
    }

    /// Label visible during each second of the output.
    pub fn labels(&self) -> Vec<&str> {
        self.cards()
            .flat_map(|card| (0..card.hold).map(move |_| card.label.as_str()))
            .collect()
    }
}
