//! Audio file loading.
//!
//! WAV goes through `hound`; FLAC through `symphonia`. Samples come back as
//! non-interleaved f32 channels in roughly [-1, 1].

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decoded audio: per-channel sample buffers plus the sample rate.
#[derive(Debug, Clone)]
pub struct LoadedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl LoadedAudio {
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Mix down to mono, or select a single channel when requested.
    pub fn mono(&self, channel: Option<usize>) -> Result<Vec<f32>> {
        match channel {
            Some(idx) => {
                let ch = self.channels.get(idx).ok_or_else(|| {
                    anyhow!(
                        "requested channel {idx} but file has {} channels",
                        self.num_channels()
                    )
                })?;
                Ok(ch.clone())
            }
            None => {
                if self.channels.len() == 1 {
                    return Ok(self.channels[0].clone());
                }
                let n = self.num_samples();
                let scale = 1.0 / self.channels.len() as f32;
                let mut out = vec![0.0f32; n];
                for ch in &self.channels {
                    for (acc, &s) in out.iter_mut().zip(ch.iter()) {
                        *acc += s * scale;
                    }
                }
                Ok(out)
            }
        }
    }

    /// First two channels, for stereo-only analyses. `None` for mono input.
    pub fn stereo_pair(&self) -> Option<(&[f32], &[f32])> {
        if self.channels.len() < 2 {
            return None;
        }
        Some((&self.channels[0], &self.channels[1]))
    }
}

/// Load an audio file, dispatching on extension (`.wav` / `.flac`).
pub fn load_audio(path: &Path) -> Result<LoadedAudio> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "wav" => load_wav(path),
        "flac" => load_flac(path),
        other => bail!("unsupported audio format '.{other}' for {}", path.display()),
    }
}

/// Load as mono f32 PCM (mean mixdown, or one channel when selected).
pub fn load_audio_mono(path: &Path, channel: Option<usize>) -> Result<(Vec<f32>, u32)> {
    let audio = load_audio(path)?;
    let samples = audio.mono(channel)?;
    Ok((samples, audio.sample_rate))
}

fn load_wav(path: &Path) -> Result<LoadedAudio> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let n_channels = spec.channels as usize;
    if n_channels == 0 {
        bail!("WAV file {} reports zero channels", path.display());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("failed to read samples from {}", path.display()))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("failed to read samples from {}", path.display()))?
        }
    };

    debug!(
        "Loaded WAV {}: {} Hz, {} channels, {} frames",
        path.display(),
        spec.sample_rate,
        n_channels,
        interleaved.len() / n_channels
    );
    Ok(deinterleave(&interleaved, n_channels, spec.sample_rate))
}

fn load_flac(path: &Path) -> Result<LoadedAudio> {
    let file = File::open(path)
        .with_context(|| format!("failed to open FLAC file {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("flac");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("failed to probe FLAC format for {}", path.display()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .default_track()
        .ok_or_else(|| anyhow!("no default track in {}", path.display()))?;
    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("no sample rate in {}", path.display()))?;
    let n_channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("no channel info in {}", path.display()))?
        .count();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .with_context(|| format!("failed to create FLAC decoder for {}", path.display()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(anyhow!("error reading FLAC packet: {e}")),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                if sample_buf.is_none() {
                    let spec = *audio_buf.spec();
                    let duration = audio_buf.capacity() as u64;
                    sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
                }
                if let Some(buf) = &mut sample_buf {
                    buf.copy_interleaved_ref(audio_buf);
                    interleaved.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("FLAC decode error (continuing): {e}");
            }
            Err(e) => return Err(anyhow!("FLAC decode failed: {e}")),
        }
    }

    debug!(
        "Loaded FLAC {}: {} Hz, {} channels, {} frames",
        path.display(),
        sample_rate,
        n_channels,
        interleaved.len() / n_channels.max(1)
    );
    Ok(deinterleave(&interleaved, n_channels, sample_rate))
}

fn deinterleave(interleaved: &[f32], n_channels: usize, sample_rate: u32) -> LoadedAudio {
    let frames = interleaved.len() / n_channels;
    let mut channels = vec![Vec::with_capacity(frames); n_channels];
    for frame in interleaved.chunks_exact(n_channels) {
        for (ch, &s) in channels.iter_mut().zip(frame.iter()) {
            ch.push(s);
        }
    }
    LoadedAudio {
        channels,
        sample_rate,
    }
}

/// Write non-interleaved channels to a 16-bit WAV file.
pub fn write_wav(path: &Path, channels: &[Vec<f32>], sample_rate: u32) -> Result<()> {
    let n_channels = channels.len();
    if n_channels == 0 {
        bail!("cannot write WAV with zero channels");
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let spec = hound::WavSpec {
        channels: n_channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create WAV file {}", path.display()))?;
    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    for i in 0..frames {
        for ch in channels {
            let v = (ch[i].clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(v)?;
        }
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize WAV file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, channels: &[Vec<f32>]) {
        write_wav(path, channels, 16000).unwrap();
    }

    #[test]
    fn test_wav_round_trip_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples: Vec<f32> = (0..160).map(|i| (i as f32 / 160.0) - 0.5).collect();
        write_test_wav(&path, &[samples.clone()]);

        let audio = load_audio(&path).unwrap();
        assert_eq!(audio.num_channels(), 1);
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.num_samples(), 160);
        for (a, b) in audio.channels[0].iter().zip(samples.iter()) {
            assert!((a - b).abs() < 1.0 / 32000.0);
        }
    }

    #[test]
    fn test_wav_stereo_mixdown_and_channel_select() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let left = vec![0.5f32; 100];
        let right = vec![-0.5f32; 100];
        write_test_wav(&path, &[left, right]);

        let audio = load_audio(&path).unwrap();
        assert_eq!(audio.num_channels(), 2);

        let mono = audio.mono(None).unwrap();
        assert!(mono.iter().all(|&s| s.abs() < 1e-3));

        let ch0 = audio.mono(Some(0)).unwrap();
        assert!((ch0[0] - 0.5).abs() < 1e-3);

        assert!(audio.mono(Some(5)).is_err());
        assert!(audio.stereo_pair().is_some());
    }

    #[test]
    fn test_mono_has_no_stereo_pair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.wav");
        write_test_wav(&path, &[vec![0.0f32; 10]]);
        let audio = load_audio(&path).unwrap();
        assert!(audio.stereo_pair().is_none());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(load_audio(Path::new("x.mp3")).is_err());
    }
}
