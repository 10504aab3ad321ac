use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::{StreamError, StreamResult};
use crate::render::{Frame, PixelFormat};
use crate::schema::{SessionConfig, StreamTarget};

/// `ffmpeg` value that selects the managed sidecar binary.
pub const SIDECAR_BINARY: &str = "sidecar";

const STDERR_TAIL_CHARS: usize = 500;
const STDERR_TAIL_BYTES: usize = STDERR_TAIL_CHARS * 4;

/// An encoder subprocess fed raw frames over stdin.
///
/// Writes block, so a slow encoder stalls the render loop instead of
/// dropping frames.
#[derive(Debug)]
pub struct EncoderPipe {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_tail: StderrTail,
    stderr_reader: Option<JoinHandle<()>>,
    binary: PathBuf,
    width: u32,
    height: u32,
    format: PixelFormat,
    scratch: Vec<u8>,
    frames_written: u64,
    finished: bool,
}

impl EncoderPipe {
    pub fn spawn(config: &SessionConfig, target: &StreamTarget) -> StreamResult<Self> {
        let binary = resolve_encoder_binary(&target.ffmpeg)?;
        let args = ffmpeg_args(config, target);
        tracing::info!(
            binary = %binary.display(),
            url = %target.url,
            codec = %target.codec,
            "spawning encoder"
        );
        tracing::debug!(args = %args.join(" "), "encoder arguments");
        Self::launch(binary, args, config)
    }

    fn launch(binary: PathBuf, args: Vec<String>, config: &SessionConfig) -> StreamResult<Self> {
        let mut command = Command::new(&binary);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        // Own process group: a terminal Ctrl+C must reach only typewire, and the
        // encoder stops when its stdin closes.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                StreamError::pipeline_io(format!(
                    "encoder executable not found (resolved_path={}). Install ffmpeg or set output.ffmpeg.",
                    binary.display()
                ))
            } else {
                StreamError::pipeline_io(format!(
                    "failed to spawn encoder (resolved_path={}, args='{}'): {error}",
                    binary.display(),
                    args.join(" ")
                ))
            }
        })?;

        let stdin = child.stdin.take();
        if stdin.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(StreamError::pipeline_io("failed to capture encoder stdin"));
        }

        let stderr_tail = StderrTail::default();
        let stderr_reader = match child.stderr.take() {
            Some(pipe) => match stderr_tail.drain(pipe) {
                Ok(handle) => Some(handle),
                Err(error) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(error);
                }
            },
            None => None,
        };

        Ok(Self {
            child,
            stdin,
            stderr_tail,
            stderr_reader,
            binary,
            width: config.canvas.width,
            height: config.canvas.height,
            format: config.pixel_format,
            scratch: Vec::with_capacity(config.pixel_format.frame_len(
                config.canvas.width,
                config.canvas.height,
            )),
            frames_written: 0,
            finished: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Last characters the encoder wrote to stderr so far.
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.text()
    }

    /// Packs and writes one frame. A frame of the wrong size is rejected
    /// before any byte is written.
    pub fn write_frame(&mut self, frame: &Frame) -> StreamResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(StreamError::configuration(format!(
                "frame is {}x{} but the encoder was declared {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        frame.pack_into(self.format, &mut self.scratch);
        let expected = self.format.frame_len(self.width, self.height);
        if self.scratch.len() != expected {
            return Err(StreamError::configuration(format!(
                "frame size mismatch: expected {expected} bytes, got {}",
                self.scratch.len()
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(StreamError::pipeline_io("encoder input is already closed"));
        };
        if let Err(error) = stdin.write_all(&self.scratch) {
            let frame_index = self.frames_written;
            let detail = self.reap();
            return Err(StreamError::pipeline_io(format!(
                "encoder refused frame {frame_index}: {error} ({detail})"
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Flushes and closes stdin, then waits for the encoder to exit. Runs at
    /// most once; later calls return `Ok`.
    pub fn finish(&mut self) -> StreamResult<()> {
        if self.finished {
            return Ok(());
        }

        let flushed = match self.stdin.as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        };
        drop(self.stdin.take());
        self.finished = true;

        let status = self.child.wait().map_err(|error| {
            StreamError::pipeline_io(format!("failed waiting for encoder process: {error}"))
        })?;
        self.join_stderr_reader();
        let stderr_tail = self.stderr_tail.text();
        tracing::info!(
            %status,
            frames = self.frames_written,
            "encoder exited"
        );

        if !status.success() {
            return Err(StreamError::pipeline_io(format!(
                "encoder failed with status {status} (resolved_path={}, stderr_tail='{}')",
                self.binary.display(),
                stderr_tail
            )));
        }
        flushed.map_err(|error| {
            StreamError::pipeline_io(format!("failed to flush encoder stdin: {error}"))
        })
    }

    fn reap(&mut self) -> String {
        drop(self.stdin.take());
        self.finished = true;
        let status = match self.child.wait() {
            Ok(status) => status.to_string(),
            Err(error) => format!("wait failed: {error}"),
        };
        self.join_stderr_reader();
        let stderr_tail = self.stderr_tail.text();
        format!("status {status}, stderr_tail='{stderr_tail}'")
    }

    fn join_stderr_reader(&mut self) {
        if let Some(handle) = self.stderr_reader.take() {
            if handle.join().is_err() {
                tracing::warn!("encoder stderr reader panicked");
            }
        }
    }
}

impl Drop for EncoderPipe {
    fn drop(&mut self) {
        if let Err(error) = self.finish() {
            tracing::warn!(%error, "encoder shutdown failed during drop");
        }
    }
}

pub fn resolve_encoder_binary(configured: &str) -> StreamResult<PathBuf> {
    if configured != SIDECAR_BINARY {
        return Ok(PathBuf::from(configured));
    }

    #[cfg(feature = "sidecar_ffmpeg")]
    {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            tracing::info!("downloading ffmpeg sidecar binary");
            ffmpeg_sidecar::download::auto_download().map_err(|error| {
                StreamError::pipeline_io(format!(
                    "failed to auto-download ffmpeg sidecar binary: {error}"
                ))
            })?;
        }
        Ok(path)
    }
    #[cfg(not(feature = "sidecar_ffmpeg"))]
    {
        Err(StreamError::configuration(
            "output.ffmpeg is 'sidecar' but typewire was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`.",
        ))
    }
}

pub fn ffmpeg_args(config: &SessionConfig, target: &StreamTarget) -> Vec<String> {
    let mut args = ffmpeg_rawvideo_input_args(config);
    args.extend(ffmpeg_stream_output_args(target));
    args
}

pub fn ffmpeg_rawvideo_input_args(config: &SessionConfig) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        config.pixel_format.ffmpeg_name().to_owned(),
        "-s".to_owned(),
        format!("{}x{}", config.canvas.width, config.canvas.height),
        "-r".to_owned(),
        config.fps.to_string(),
        "-i".to_owned(),
        "-".to_owned(),
    ]
}

pub fn ffmpeg_stream_output_args(target: &StreamTarget) -> Vec<String> {
    vec![
        "-c:v".to_owned(),
        target.codec.clone(),
        "-b:v".to_owned(),
        target.bitrate.clone(),
        "-preset".to_owned(),
        target.preset.clone(),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
        "-f".to_owned(),
        target.container.clone(),
        target.url.trim().to_owned(),
    ]
}

/// Bounded buffer of the encoder's most recent stderr output.
///
/// A reader thread drains the pipe for the encoder's whole life so a chatty
/// encoder never blocks on a full stderr pipe while we block on its stdin.
#[derive(Debug, Clone, Default)]
struct StderrTail(Arc<Mutex<VecDeque<u8>>>);

impl StderrTail {
    fn drain(&self, mut pipe: ChildStderr) -> StreamResult<JoinHandle<()>> {
        let tail = self.clone();
        thread::Builder::new()
            .name("encoder-stderr".to_owned())
            .spawn(move || {
                let mut chunk = [0_u8; 4096];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(read) => tail.push(&chunk[..read]),
                        Err(error) if error.kind() == ErrorKind::Interrupted => {}
                        Err(error) => {
                            tracing::debug!(%error, "stopped reading encoder stderr");
                            break;
                        }
                    }
                }
            })
            .map_err(|error| {
                StreamError::pipeline_io(format!("failed to start encoder stderr reader: {error}"))
            })
    }

    fn push(&self, bytes: &[u8]) {
        let mut buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend(bytes);
        let excess = buf.len().saturating_sub(STDERR_TAIL_BYTES);
        buf.drain(..excess);
    }

    fn text(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let bytes = buf.iter().copied().collect::<Vec<u8>>();
        last_n_chars(&String::from_utf8_lossy(&bytes), STDERR_TAIL_CHARS)
    }
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    s.chars()
        .skip(count.saturating_sub(max_chars))
        .collect::<String>()
        .trim()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        let mut config = SessionConfig::headless(640, 360);
        config.fps = 10;
        config
    }

    #[test]
    fn args_declare_the_raw_frame_contract() {
        let config = config();
        let target = StreamTarget::new("rtmp://live.example.com/app/key");
        let args = ffmpeg_args(&config, &target);
        let line = args.join(" ");
        assert_eq!(
            line,
            "-hide_banner -loglevel error -y -f rawvideo -pix_fmt bgr24 -s 640x360 -r 10 -i - \
             -c:v libx264 -b:v 3000k -preset ultrafast -pix_fmt yuv420p -f flv rtmp://live.example.com/app/key"
        );
    }

    #[test]
    fn input_pixel_format_follows_config() {
        let mut config = config();
        config.pixel_format = PixelFormat::Rgba;
        let args = ffmpeg_rawvideo_input_args(&config);
        let idx = args.iter().position(|arg| arg == "-pix_fmt").unwrap();
        assert_eq!(args[idx + 1], "rgba");
    }

    #[test]
    fn missing_binary_is_a_pipeline_error_naming_it() {
        let mut target = StreamTarget::new("/tmp/out.flv");
        target.ffmpeg = "/nonexistent/typewire-ffmpeg".to_owned();
        let error = EncoderPipe::spawn(&config(), &target).unwrap_err();
        assert!(matches!(error, StreamError::PipelineIo(_)));
        assert!(error.to_string().contains("/nonexistent/typewire-ffmpeg"));
    }

    #[cfg(not(feature = "sidecar_ffmpeg"))]
    #[test]
    fn sidecar_without_feature_is_a_configuration_error() {
        let error = resolve_encoder_binary(SIDECAR_BINARY).unwrap_err();
        assert!(matches!(error, StreamError::Configuration(_)));
    }

    #[cfg(unix)]
    #[test]
    fn wrong_frame_size_is_rejected_and_finish_runs_once() {
        let mut target = StreamTarget::new("/tmp/out.flv");
        target.ffmpeg = "cat".to_owned();
        let config = config();
        let mut pipe = EncoderPipe::spawn(&config, &target).unwrap();

        let wrong = Frame::new(320, 180, [0, 0, 0]);
        let error = pipe.write_frame(&wrong).unwrap_err();
        assert!(matches!(error, StreamError::Configuration(_)));
        assert_eq!(pipe.frames_written(), 0);

        let _ = pipe.finish();
        pipe.finish().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn encoder_flooding_stderr_keeps_accepting_frames() {
        use std::sync::mpsc;
        use std::time::Duration;

        let config = config();
        let script = "head -c 200000 /dev/zero | tr '\\0' x >&2; cat >/dev/null";
        let mut pipe = EncoderPipe::launch(
            PathBuf::from("sh"),
            vec!["-c".to_owned(), script.to_owned()],
            &config,
        )
        .unwrap();

        let frame = Frame::new(config.canvas.width, config.canvas.height, [0, 0, 0]);
        let (done_tx, done_rx) = mpsc::channel();
        let writer = thread::spawn(move || {
            for _ in 0..5 {
                pipe.write_frame(&frame).unwrap();
            }
            pipe.finish().unwrap();
            done_tx.send(pipe.stderr_tail()).unwrap();
        });

        let tail = done_rx
            .recv_timeout(Duration::from_secs(20))
            .expect("encoder writes stalled behind a full stderr pipe");
        writer.join().unwrap();
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS);
        assert!(tail.chars().all(|c| c == 'x'));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn encoder_runs_in_its_own_process_group() {
        fn process_group(stat_path: &str) -> String {
            let stat = std::fs::read_to_string(stat_path).unwrap();
            let after_name = &stat[stat.rfind(')').unwrap() + 1..];
            after_name.split_whitespace().nth(2).unwrap().to_owned()
        }

        let mut pipe = EncoderPipe::launch(
            PathBuf::from("sh"),
            vec!["-c".to_owned(), "cat >/dev/null".to_owned()],
            &config(),
        )
        .unwrap();
        let child_group = process_group(&format!("/proc/{}/stat", pipe.child.id()));
        let own_group = process_group("/proc/self/stat");
        assert_ne!(child_group, own_group);
        assert_eq!(child_group, pipe.child.id().to_string());
        pipe.finish().unwrap();
    }

    #[test]
    fn stderr_tail_keeps_the_last_chars() {
        assert_eq!(last_n_chars("abcdef", 3), "def");
        assert_eq!(last_n_chars("  ab  ", 10), "ab");
    }
}
