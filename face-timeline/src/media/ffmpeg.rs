//! ffmpeg-backed video decoder.
//!
//! `ffprobe` supplies the stream geometry and frame rate, then `ffmpeg` decodes
//! the first video stream to raw RGB24 on stdout, one fixed-size frame after
//! another.

use std::ffi::OsString;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::decoder::{DecodeError, Frame, StreamInfo, VideoDecoder, VideoStream};

/// Decoder that shells out to ffmpeg/ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegDecoder {
    /// Binaries from `FFMPEG_PATH` / `FFPROBE_PATH`, or from `PATH`.
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        }
    }

    pub fn with_paths(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn probe(&self, path: &Path) -> Result<StreamInfo, DecodeError> {
        let probe_err = |reason: String| DecodeError::Probe {
            path: path.display().to_string(),
            reason,
        };

        let output = command(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DecodeError::Spawn {
                program: self.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(probe_err(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        parse_probe_output(&output.stdout).map_err(probe_err)
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> crate::Result<Box<dyn VideoStream>> {
        let info = self.probe(path)?;
        if info.width == 0 || info.height == 0 {
            return Err(DecodeError::Probe {
                path: path.display().to_string(),
                reason: "video stream has no dimensions".to_string(),
            }
            .into());
        }

        let mut child = command(&self.ffmpeg_path)
            .args(decode_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DecodeError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| DecodeError::Spawn {
            program: self.ffmpeg_path.clone(),
            source: std::io::Error::other("stdout not captured"),
        })?;

        info!(
            path = %path.display(),
            fps = info.fps,
            frames = ?info.frame_count,
            duration_secs = ?info.duration_secs(),
            width = info.width,
            height = info.height,
            "Opened video"
        );

        Ok(Box::new(FfmpegStream {
            frame_len: info.width as usize * info.height as usize * 3,
            info,
            child,
            stdout: BufReader::new(stdout),
            index: 0,
            finished: false,
        }))
    }
}

/// Arguments for decoding `path` to raw RGB24 on stdout.
///
/// Autorotation stays off: frames must keep the coded geometry reported by
/// ffprobe, otherwise rotated footage arrives transposed.
fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        [
            "-map", "0:v:0", "-vsync", "0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args
}

fn command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.env("LC_ALL", "C");
    cmd
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

fn parse_probe_output(stdout: &[u8]) -> Result<StreamInfo, String> {
    let probe: ProbeOutput = serde_json::from_slice(stdout).map_err(|e| e.to_string())?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    Ok(StreamInfo {
        fps,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
    })
}

/// Parse an ffprobe rational such as `30000/1001` or a plain number.
/// Returns `None` for zero, negative or malformed rates.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

struct FfmpegStream {
    info: StreamInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    frame_len: usize,
    index: u64,
    finished: bool,
}

impl FfmpegStream {
    /// Fill `buf` as far as the pipe allows; returns the bytes read.
    fn read_frame_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn finish(&mut self) {
        self.finished = true;
        match self.child.wait() {
            Ok(status) if !status.success() => {
                warn!(frames = self.index, %status, "ffmpeg exited with an error");
            }
            Ok(_) => debug!(frames = self.index, "ffmpeg finished"),
            Err(e) => warn!(error = %e, "Failed to wait for ffmpeg"),
        }
    }
}

impl VideoStream for FfmpegStream {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Option<Result<Frame, DecodeError>> {
        if self.finished {
            return None;
        }

        let frame_index = self.index;
        let mut buf = vec![0u8; self.frame_len];
        let received = match self.read_frame_bytes(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                self.finish();
                return Some(Err(DecodeError::Corrupt {
                    frame_index,
                    reason: e.to_string(),
                }));
            }
        };

        if received == 0 {
            self.finish();
            return None;
        }
        self.index += 1;

        if received < self.frame_len {
            self.finish();
            return Some(Err(DecodeError::Truncated {
                frame_index,
                expected: self.frame_len,
                received,
            }));
        }

        Some(
            Frame::from_raw(self.info.width, self.info.height, buf).ok_or(
                DecodeError::Corrupt {
                    frame_index,
                    reason: "buffer does not match frame size".to_string(),
                },
            ),
        )
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("0/1"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_decode_args_keep_coded_geometry() {
        let args = decode_args(Path::new("/videos/phone clip.mp4"));
        let pos = |flag: &str| args.iter().position(|a| a == flag);

        let noautorotate = pos("-noautorotate").unwrap();
        let input = pos("-i").unwrap();
        assert!(noautorotate < input, "input option must precede -i");
        assert_eq!(args[input + 1], OsString::from("/videos/phone clip.mp4"));
        assert_eq!(args.last().unwrap(), "-");
        assert!(pos("rgb24").is_some());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"width": 640, "height": 360, "r_frame_rate": "30/1",
                 "avg_frame_rate": "0/0", "nb_frames": "900"}
            ]
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.fps, 30.0);
        assert_eq!(info.frame_count, Some(900));
        assert_eq!((info.width, info.height), (640, 360));
    }

    #[test]
    fn test_parse_probe_output_without_streams() {
        assert!(parse_probe_output(br#"{"streams": []}"#).is_err());
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let decoder = FfmpegDecoder::with_paths(
            "/nonexistent/ffmpeg-binary",
            "/nonexistent/ffprobe-binary",
        );
        let err = match decoder.open(Path::new("video.mp4")) {
            Err(e) => e,
            Ok(_) => panic!("open should fail without ffprobe"),
        };
        assert!(matches!(
            err,
            crate::Error::Decode(DecodeError::Spawn { .. })
        ));
    }
}
