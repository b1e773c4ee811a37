use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::audio::{AudioGraph, AUDIO_OUTPUT_LABEL};
use crate::config::{EncodingConfig, Resolution};
use crate::error_codes::{CodedError, ENCODER_UNAVAILABLE, RENDER_FAILED};

/// Everything ffmpeg needs besides the frames themselves.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub resolution: Resolution,
    pub fps: u32,
    pub audio: AudioGraph,
    pub encoding: EncodingConfig,
    pub output_path: PathBuf,
}

/// Streams frames into ffmpeg, which writes to a hidden partial file next to
/// the output. `finish` moves it into place once ffmpeg succeeds. A pipe that
/// fails or is dropped unfinished kills ffmpeg and removes the partial file,
/// so an earlier video at the output path is never clobbered.
pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
    aborted: Arc<AtomicBool>,
    partial_path: PathBuf,
    output_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FfmpegMode {
    Auto,
    System,
    Sidecar,
}

trait VideoEncoderBackend: Send {
    fn mode_label(&self) -> &'static str;
    fn run(self: Box<Self>, feed: FrameFeed) -> Result<()>;
}

/// Frames from the render loop plus the flag `FfmpegPipe::abort` raises.
struct FrameFeed {
    receiver: mpsc::Receiver<Vec<u8>>,
    aborted: Arc<AtomicBool>,
}

struct SystemFfmpegBackend {
    job: EncodeJob,
    program: PathBuf,
}

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend {
    job: EncodeJob,
}

impl FfmpegPipe {
    pub fn spawn(job: EncodeJob) -> Result<Self> {
        Self::spawn_with_mode(job, FfmpegMode::Auto)
    }

    pub fn spawn_with_mode(mut job: EncodeJob, mode: FfmpegMode) -> Result<Self> {
        let output_path = std::mem::replace(&mut job.output_path, PathBuf::new());
        job.output_path = partial_path(&output_path);
        let backend = select_backend(mode, job)?;
        Self::spawn_backend(backend, output_path)
    }

    fn spawn_backend(backend: Box<dyn VideoEncoderBackend>, output_path: PathBuf) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let aborted = Arc::new(AtomicBool::new(false));
        let feed = FrameFeed {
            receiver,
            aborted: Arc::clone(&aborted),
        };
        let worker_name = format!("tminus-ffmpeg-encoder-{}", backend.mode_label());

        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || backend.run(feed))
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            aborted,
            partial_path: partial_path(&output_path),
            output_path,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn write_frame(&self, rgba_frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        // A closed channel means the worker bailed; its error surfaces in finish().
        sender
            .send(rgba_frame)
            .map_err(|_| render_error("ffmpeg stopped accepting frames"))
    }

    /// Closes stdin, waits for ffmpeg and moves the finished file into place.
    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());

        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        let result = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(render_error("ffmpeg worker thread panicked")),
        };
        if let Err(error) = result {
            self.remove_partial();
            return Err(error);
        }

        fs::rename(&self.partial_path, &self.output_path).map_err(|error| {
            self.remove_partial();
            anyhow!(CodedError::render(
                RENDER_FAILED,
                format!(
                    "failed to move {} to {}: {error}",
                    self.partial_path.display(),
                    self.output_path.display()
                ),
            ))
        })
    }

    /// Kills ffmpeg and removes the partial file. Returns the worker's own
    /// error when it had already failed.
    pub fn abort(mut self) -> Option<anyhow::Error> {
        self.stop()
    }

    fn stop(&mut self) -> Option<anyhow::Error> {
        let handle = self.worker.take()?;
        self.aborted.store(true, Ordering::SeqCst);
        drop(self.sender.take());

        let worker_error = match handle.join() {
            Ok(result) => result.err(),
            Err(_) => Some(render_error("ffmpeg worker thread panicked")),
        };
        self.remove_partial();
        worker_error
    }

    fn remove_partial(&self) {
        match fs::remove_file(&self.partial_path) {
            Ok(()) => debug!(path = %self.partial_path.display(), "removed partial output"),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!(
                path = %self.partial_path.display(),
                %error,
                "failed to remove partial output"
            ),
        }
    }
}

impl Drop for FfmpegPipe {
    fn drop(&mut self) {
        if self.worker.is_some() {
            warn!(output = %self.output_path.display(), "encoder dropped before finish; aborting");
            let _ = self.stop();
        }
    }
}

/// Hidden sibling of `output_path` that keeps its extension, so ffmpeg still
/// picks the container from it.
pub fn partial_path(output_path: &Path) -> PathBuf {
    let file_name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_path.with_file_name(format!(".partial-{file_name}"))
}

fn select_backend(mode: FfmpegMode, job: EncodeJob) -> Result<Box<dyn VideoEncoderBackend>> {
    match mode {
        FfmpegMode::Auto | FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend {
            job,
            program: PathBuf::from("ffmpeg"),
        })),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend { job }))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                let _ = job;
                Err(anyhow!(CodedError::usage(
                    ENCODER_UNAVAILABLE,
                    "ffmpeg sidecar mode requested but tminus was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`.",
                )))
            }
        }
    }
}

impl VideoEncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn run(self: Box<Self>, feed: FrameFeed) -> Result<()> {
        run_ffmpeg_process(&self.program, feed, &self.job, self.mode_label())
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl VideoEncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn run(self: Box<Self>, feed: FrameFeed) -> Result<()> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            info!("downloading ffmpeg sidecar binary");
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        run_ffmpeg_process(&path, feed, &self.job, self.mode_label())
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    feed: FrameFeed,
    job: &EncodeJob,
    mode_label: &str,
) -> Result<()> {
    let path_str = job.output_path.to_string_lossy();
    if path_str.chars().any(|c| c.is_control()) {
        return Err(anyhow!(CodedError::render(
            RENDER_FAILED,
            "output path contains invalid control characters",
        )));
    }

    let args = ffmpeg_args(job);
    debug!(mode = mode_label, args = %args.join(" "), "spawning ffmpeg");
    let mut command = Command::new(ffmpeg_path);
    command
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            anyhow!(CodedError::render(
                ENCODER_UNAVAILABLE,
                format!(
                    "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                    ffmpeg_path.display()
                ),
            ))
        } else {
            anyhow!(CodedError::render(
                RENDER_FAILED,
                format!(
                    "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}): {error}",
                    ffmpeg_path.display()
                ),
            )
            .with_details(json!({ "args": args })))
        }
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    // Drain stderr concurrently so a chatty encoder cannot block on a full pipe.
    let stderr_reader = thread::spawn(move || read_stderr_tail(&mut stderr_pipe));

    let FrameFeed { receiver, aborted } = feed;
    let mut write_error = None;
    while let Ok(frame) = receiver.recv() {
        if let Err(error) = stdin.write_all(&frame) {
            write_error = Some(error);
            break;
        }
    }
    if write_error.is_none() {
        if let Err(error) = stdin.flush() {
            write_error = Some(error);
        }
    }
    drop(stdin);
    drop(receiver);

    if aborted.load(Ordering::SeqCst) {
        // Kill fails harmlessly when ffmpeg already exited.
        let _ = child.kill();
        let _ = child.wait();
        let _ = stderr_reader.join();
        return Err(render_error("encoding aborted"));
    }

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = stderr_reader
        .join()
        .map_err(|_| anyhow!("ffmpeg stderr reader panicked"))??;
    if !status.success() {
        return Err(anyhow!(CodedError::render(
            RENDER_FAILED,
            format!("ffmpeg failed with status {status} (mode={mode_label}): {stderr_tail}"),
        )
        .with_details(json!({ "args": args, "stderr_tail": stderr_tail }))));
    }
    if let Some(error) = write_error {
        return Err(anyhow!(CodedError::render(
            RENDER_FAILED,
            format!("failed to write frames to ffmpeg stdin: {error}"),
        )));
    }

    info!(output = %job.output_path.display(), mode = mode_label, "ffmpeg finished");
    Ok(())
}

pub fn ffmpeg_args(job: &EncodeJob) -> Vec<String> {
    let size = format!("{}x{}", job.resolution.width, job.resolution.height);
    let fps = job.fps.to_string();

    let mut args = ffmpeg_rawvideo_input_args(&size, &fps);
    args.extend(job.audio.input_args.iter().cloned());
    args.push("-filter_complex".to_owned());
    args.push(job.audio.filter_complex.clone());
    args.extend([
        "-map".to_owned(),
        "0:v".to_owned(),
        "-map".to_owned(),
        AUDIO_OUTPUT_LABEL.to_owned(),
    ]);
    args.extend(ffmpeg_codec_args(&job.encoding, &fps));
    args.extend(ffmpeg_container_output_args(&job.output_path));
    args.extend(job.encoding.extra_args.iter().cloned());

    args.push(job.output_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, fps: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        fps.to_owned(),
        "-i".to_owned(),
        "-".to_owned(),
    ]
}

pub fn ffmpeg_codec_args(encoding: &EncodingConfig, fps: &str) -> Vec<String> {
    let mut args = vec![
        "-c:v".to_owned(),
        encoding.video_codec().to_owned(),
        "-pix_fmt".to_owned(),
        encoding.pix_fmt.clone(),
        "-r".to_owned(),
        fps.to_owned(),
    ];
    if let Some(bitrate) = &encoding.video_bitrate {
        args.push("-b:v".to_owned());
        args.push(bitrate.clone());
    }
    args.push("-c:a".to_owned());
    args.push(encoding.audio_codec().to_owned());
    if let Some(threads) = encoding.threads {
        args.push("-threads".to_owned());
        args.push(threads.to_string());
    }
    args
}

pub fn ffmpeg_container_output_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(ext.as_str(), "mov" | "mp4" | "m4v") {
        vec!["-movflags".to_owned(), "+faststart".to_owned()]
    } else {
        Vec::new()
    }
}

fn render_error(message: &str) -> anyhow::Error {
    anyhow!(CodedError::render(RENDER_FAILED, message))
}

fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}
