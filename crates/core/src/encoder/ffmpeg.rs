//! FFmpeg-based encoder implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use super::config::EncoderConfig;
use super::error::EncoderError;
use super::traits::Encoder;
use super::types::{EncodedTrack, MediaInfo, SlideFrame};
use crate::job::ExportSettings;

/// FFmpeg-based encoder implementation.
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    /// Creates a new FFmpeg encoder with the given configuration.
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Creates an encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    /// Crossfade offsets for the xfade chain.
    ///
    /// Transition `k` (between slide k and k+1) starts at
    /// `offset_k = d_1 + ... + d_k - fade`, overlapping the fade tail
    /// appended to each input. Chained output length is the last offset
    /// plus the last input's length, which works out to exactly `sum(d)`.
    fn xfade_offsets(durations: &[f64], fade: f64) -> Vec<f64> {
        let mut offsets = Vec::with_capacity(durations.len().saturating_sub(1));
        let mut running = 0.0;
        for d in durations.iter().take(durations.len().saturating_sub(1)) {
            running += d;
            offsets.push(running - fade);
        }
        offsets
    }

    /// Builds ffmpeg arguments for slideshow assembly.
    ///
    /// One `-loop 1` input per frame plus an xfade filter chain; ffmpeg
    /// streams the inputs, so memory stays proportional to slide count,
    /// not to output frame count.
    fn build_slideshow_args(
        &self,
        frames: &[SlideFrame],
        settings: &ExportSettings,
        output: &Path,
    ) -> Vec<String> {
        let fps = settings.frame_rate.as_u32();
        let (width, height) = settings.resolution.dimensions();
        let fade = self.config.crossfade_secs;
        let n = frames.len();

        let mut args = vec!["-y".to_string()];

        // Inputs: every frame runs its display duration plus the fade tail
        // the next transition overlaps into.
        for frame in frames {
            let input_secs = frame.display_secs + if n > 1 { fade } else { 0.0 };
            args.extend([
                "-loop".to_string(),
                "1".to_string(),
                "-t".to_string(),
                format!("{:.3}", input_secs),
                "-framerate".to_string(),
                fps.to_string(),
                "-i".to_string(),
                frame.image_path.to_string_lossy().to_string(),
            ]);
        }

        // Filter graph: normalize every input, then chain crossfades.
        let mut filter = String::new();
        for i in 0..n {
            filter.push_str(&format!(
                "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}[v{i}];",
                i = i,
                w = width,
                h = height,
                fps = fps,
            ));
        }

        let final_label = if n == 1 {
            "[v0]".to_string()
        } else {
            let durations: Vec<f64> = frames.iter().map(|f| f.display_secs).collect();
            let offsets = Self::xfade_offsets(&durations, fade);
            let mut prev = "[v0]".to_string();
            for (i, offset) in offsets.iter().enumerate() {
                let next_input = format!("[v{}]", i + 1);
                let out_label = format!("[x{}]", i + 1);
                filter.push_str(&format!(
                    "{prev}{next}xfade=transition=fade:duration={fade:.3}:offset={offset:.3}{out};",
                    prev = prev,
                    next = next_input,
                    fade = fade,
                    offset = offset,
                    out = out_label,
                ));
                prev = out_label;
            }
            prev
        };

        // Strip the trailing semicolon.
        let filter = filter.trim_end_matches(';').to_string();

        args.extend([
            "-filter_complex".to_string(),
            filter,
            "-map".to_string(),
            final_label,
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            settings.quality.encoder_preset().to_string(),
            "-b:v".to_string(),
            format!("{}k", settings.quality.video_bitrate_kbps()),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-r".to_string(),
            fps.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);

        self.push_common_args(&mut args, output);
        args
    }

    /// Builds ffmpeg arguments for byte-exact audio concatenation.
    fn build_concat_args(&self, list_path: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
        ];
        self.push_common_args(&mut args, output);
        args
    }

    /// Builds ffmpeg arguments for muxing. Video is stream-copied; audio
    /// is re-encoded to the preset's target bitrate.
    fn build_mux_args(
        &self,
        video: &Path,
        audio: &Path,
        settings: &ExportSettings,
        output: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            format!("{}k", settings.quality.audio_bitrate_kbps()),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ];
        self.push_common_args(&mut args, output);
        args
    }

    fn push_common_args(&self, args: &mut Vec<String>, output: &Path) {
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output.to_string_lossy().to_string());
    }

    /// Runs ffmpeg with the given args under the configured timeout and
    /// verifies the output, returning a probed track.
    async fn run_ffmpeg(&self, args: &[String], output: &Path) -> Result<EncodedTrack, EncoderError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EncoderError::Io(e)
                }
            })?;

        let stderr = child.stderr.take().ok_or_else(|| {
            EncoderError::Io(std::io::Error::other("failed to capture ffmpeg stderr"))
        })?;
        let mut reader = BufReader::new(stderr).lines();

        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);

        let result = timeout(timeout_duration, async {
            let mut error_output = String::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if line.contains("Error") || line.contains("error") {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }

                if let Some(ref re) = time_regex {
                    if let Some(caps) = re.captures(&line) {
                        if let Some(ms_str) = caps.get(1) {
                            if let Ok(us) = ms_str.as_str().parse::<f64>() {
                                tracing::trace!(
                                    out_time_secs = us / 1_000_000.0,
                                    "ffmpeg progress"
                                );
                            }
                        }
                    }
                }
            }

            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(EncoderError::encode_failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
            }
            Ok(Err(e)) => return Err(EncoderError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                return Err(EncoderError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        }

        let info = self.probe(output).await?;
        Ok(EncodedTrack {
            path: output.to_path_buf(),
            size_bytes: info.size_bytes,
            duration_secs: info.duration_secs,
        })
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, EncoderError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| EncoderError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");
        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
            format: format_name.to_string(),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            video_width: video_stream.and_then(|s| s.width),
            video_height: video_stream.and_then(|s| s.height),
        })
    }

    /// Writes a concat demuxer list file. Single quotes in paths are
    /// escaped per the concat demuxer's quoting rules.
    async fn write_concat_list(
        parts: &[PathBuf],
        list_path: &Path,
    ) -> Result<(), EncoderError> {
        let mut body = String::new();
        for part in parts {
            let escaped = part.to_string_lossy().replace('\'', "'\\''");
            body.push_str(&format!("file '{}'\n", escaped));
        }
        tokio::fs::write(list_path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        if !path.exists() {
            return Err(EncoderError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncoderError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    EncoderError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EncoderError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn build_slideshow(
        &self,
        frames: &[SlideFrame],
        settings: &ExportSettings,
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError> {
        if frames.is_empty() {
            return Err(EncoderError::EmptyInput {
                reason: "no slide frames".to_string(),
            });
        }
        for frame in frames {
            if !frame.image_path.exists() {
                return Err(EncoderError::InputNotFound {
                    path: frame.image_path.clone(),
                });
            }
        }

        let args = self.build_slideshow_args(frames, settings, output);
        self.run_ffmpeg(&args, output).await
    }

    async fn concat_audio(
        &self,
        parts: &[PathBuf],
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError> {
        if parts.is_empty() {
            return Err(EncoderError::EmptyInput {
                reason: "no audio parts".to_string(),
            });
        }
        for part in parts {
            if !part.exists() {
                return Err(EncoderError::InputNotFound { path: part.clone() });
            }
        }

        let list_path = output.with_extension("concat.txt");
        Self::write_concat_list(parts, &list_path).await?;

        let args = self.build_concat_args(&list_path, output);
        let result = self.run_ffmpeg(&args, output).await;
        let _ = tokio::fs::remove_file(&list_path).await;
        result
    }

    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        settings: &ExportSettings,
        output: &Path,
    ) -> Result<EncodedTrack, EncoderError> {
        for input in [video, audio] {
            if !input.exists() {
                return Err(EncoderError::InputNotFound {
                    path: input.to_path_buf(),
                });
            }
        }

        let args = self.build_mux_args(video, audio, settings, output);
        self.run_ffmpeg(&args, output).await
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        for (binary, not_found) in [
            (
                &self.config.ffmpeg_path,
                EncoderError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                },
            ),
            (
                &self.config.ffprobe_path,
                EncoderError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                },
            ),
        ] {
            if let Err(e) = Command::new(binary).arg("-version").output().await {
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Err(not_found);
                }
                return Err(EncoderError::Io(e));
            }
        }

        Ok(())
    }
}
