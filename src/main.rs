use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use tminus::color_name::{color_name, exact_name, Rgb};
use tminus::config::{load_and_validate_config, CountdownConfig, Preset};
use tminus::encoding::FfmpegMode;
use tminus::error_codes::{find_coded_error, CodedError, INVALID_CONFIG};
use tminus::naming::output_file_name;
use tminus::render::render_countdown;
use tminus::timeline::{CountdownPlan, Segment};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TMINUS_GIT_HASH"),
    ")"
);

#[derive(Debug, Parser)]
#[command(name = "tminus")]
#[command(about = "Countdown-timer video renderer")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Print results and errors as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct ConfigSource {
    /// YAML countdown config.
    config: Option<PathBuf>,
    /// Built-in countdown: `hundred` or `8k`.
    #[arg(long, conflicts_with = "config")]
    preset: Option<String>,
}

impl ConfigSource {
    fn load(&self) -> Result<CountdownConfig> {
        match (&self.config, &self.preset) {
            (Some(path), _) => load_and_validate_config(path),
            (None, Some(keyword)) => {
                let config = Preset::from_keyword(keyword)?.config();
                config.validate()?;
                Ok(config)
            }
            (None, None) => Err(anyhow!(CodedError::usage(
                INVALID_CONFIG,
                "pass a config file or --preset",
            ))),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render the countdown video.
    Render {
        #[command(flatten)]
        source: ConfigSource,
        #[arg(short = 'o', long = "output-dir", default_value = ".")]
        output_dir: PathBuf,
        #[arg(long = "ffmpeg", value_enum, default_value_t = FfmpegMode::Auto)]
        ffmpeg: FfmpegMode,
    },
    /// Validate a config and its input files.
    Check {
        #[command(flatten)]
        source: ConfigSource,
    },
    /// Print the label shown during each second.
    Plan {
        #[command(flatten)]
        source: ConfigSource,
    },
    /// Name an RGB color (nearest CSS3 name).
    ColorName { r: u8, g: u8, b: u8 },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let json_output = cli.json;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error, json_output),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Render {
            source,
            output_dir,
            ffmpeg,
        } => {
            let config = source.load()?;
            let report = render_countdown(&config, &output_dir, ffmpeg)?;
            if cli.json {
                print_json(&json!({ "ok": true, "report": report }))?;
            } else {
                println!(
                    "Wrote {} ({} frames, {}s)",
                    report.output_path.display(),
                    report.frames,
                    report.seconds
                );
            }
            Ok(())
        }
        Commands::Check { source } => run_check(&source, cli.json),
        Commands::Plan { source } => run_plan(&source, cli.json),
        Commands::ColorName { r, g, b } => {
            let rgb = Rgb(r, g, b);
            let name = color_name(rgb);
            if cli.json {
                print_json(&json!({
                    "ok": true,
                    "rgb": [r, g, b],
                    "hex": rgb.to_string(),
                    "name": name,
                    "exact": exact_name(rgb).is_some(),
                }))?;
            } else {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn run_check(source: &ConfigSource, json_output: bool) -> Result<()> {
    let config = source.load()?;
    config.verify_assets()?;
    let output_name = output_file_name(&config)?;

    if json_output {
        print_json(&json!({
            "ok": true,
            "output": output_name,
            "resolution": config.resolution,
            "fps": config.fps,
            "seconds": config.total_seconds(),
        }))?;
    } else {
        println!(
            "OK: {}x{}, {} fps, {}s countdown + {}s end card",
            config.resolution.width,
            config.resolution.height,
            config.fps,
            config.duration,
            config.end_hold
        );
        println!("Output: {output_name}");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlanView<'a> {
    ok: bool,
    seconds: u64,
    labels: Vec<&'a str>,
    segments: &'a [Segment],
}

fn run_plan(source: &ConfigSource, json_output: bool) -> Result<()> {
    let config = source.load()?;
    let plan = CountdownPlan::build(&config)?;

    if json_output {
        return print_json(&PlanView {
            ok: true,
            seconds: plan.total_seconds(),
            labels: plan.labels(),
            segments: &plan.segments,
        });
    }

    for segment in &plan.segments {
        for card in &segment.cards {
            for offset in 0..card.hold {
                println!(
                    "{:>6}  {:<5}  {:>4}  {}",
                    card.start + offset,
                    format!("{:?}", segment.phase).to_ascii_lowercase(),
                    card.label,
                    card.color
                );
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_error(error: &anyhow::Error, json_output: bool) -> ExitCode {
    let coded = find_coded_error(error);
    if json_output {
        let envelope = match coded {
            Some(coded) => serde_json::to_value(coded.envelope()),
            None => Ok(json!({
                "ok": false,
                "error": { "code": "INTERNAL", "message": format!("{error:#}") }
            })),
        };
        match envelope.and_then(|value| serde_json::to_string_pretty(&value)) {
            Ok(text) => eprintln!("{text}"),
            Err(_) => eprintln!("error: {error:#}"),
        }
    } else {
        eprintln!("error: {error:#}");
    }

    let code = coded.map_or(1, CodedError::exit_code);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
