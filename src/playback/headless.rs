use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{AudioBackend, AudioEvent, AudioEventSender, AudioPlayer};
use crate::error::PlaybackError;

/// Bitrate assumed for compressed payloads whose length cannot be read from a header.
pub const DEFAULT_ASSUMED_BITRATE_KBPS: u32 = 128;

/// Media duration of a WAV payload, `None` for anything hound cannot parse.
pub fn wav_duration_ms(audio: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(audio)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 * 1000.0 / spec.sample_rate as f64)
}

/// Render `duration_ms` of 16-bit mono silence as a WAV file.
pub fn silent_wav(duration_ms: u32, sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        let samples = sample_rate as u64 * duration_ms as u64 / 1000;
        for _ in 0..samples {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Audio backend that plays against the tokio clock instead of a device.
///
/// Positions advance with wall-clock time scaled by the playback rate, and
/// `Ended` fires when the media runs out. WAV payloads expose their duration
/// immediately; other payloads only get an estimated length from
/// `assumed_bitrate_kbps`, used to schedule the end, and report no duration.
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    assumed_bitrate_kbps: u32,
    require_gesture: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            assumed_bitrate_kbps: DEFAULT_ASSUMED_BITRATE_KBPS,
            require_gesture: false,
        }
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses to start, as a browser does before any user gesture.
    pub fn requiring_gesture() -> Self {
        Self {
            require_gesture: true,
            ..Self::default()
        }
    }

    pub fn with_assumed_bitrate(mut self, kbps: u32) -> Self {
        self.assumed_bitrate_kbps = kbps.max(1);
        self
    }
}

impl AudioBackend for HeadlessBackend {
    fn load(
        &self,
        audio: Bytes,
        playback_rate: f32,
        events: AudioEventSender,
    ) -> Result<Box<dyn AudioPlayer>, PlaybackError> {
        let header_duration = wav_duration_ms(&audio);
        let media_ms = header_duration.unwrap_or_else(|| {
            audio.len() as f64 * 8.0 / self.assumed_bitrate_kbps as f64
        });
        if media_ms <= 0.0 {
            return Err(PlaybackError::Decode("audio contains no samples".to_string()));
        }

        Ok(Box::new(HeadlessPlayer {
            audio: Some(audio),
            header_duration,
            media_ms,
            rate: playback_rate.max(f32::EPSILON) as f64,
            events,
            require_gesture: self.require_gesture,
            played_ms: 0.0,
            resumed_at: None,
            end_task: None,
        }))
    }
}

struct HeadlessPlayer {
    audio: Option<Bytes>,
    header_duration: Option<f64>,
    media_ms: f64,
    rate: f64,
    events: AudioEventSender,
    require_gesture: bool,
    /// Media time played before the current run.
    played_ms: f64,
    resumed_at: Option<Instant>,
    end_task: Option<JoinHandle<()>>,
}

impl HeadlessPlayer {
    fn media_position(&self) -> f64 {
        let running = self
            .resumed_at
            .map(|at| at.elapsed().as_secs_f64() * 1000.0 * self.rate)
            .unwrap_or(0.0);
        (self.played_ms + running).min(self.media_ms)
    }

    fn cancel_end(&mut self) {
        if let Some(task) = self.end_task.take() {
            task.abort();
        }
    }
}

impl AudioPlayer for HeadlessPlayer {
    fn play(&mut self) -> Result<(), PlaybackError> {
        if self.require_gesture {
            return Err(PlaybackError::GestureRequired);
        }
        if self.audio.is_none() {
            return Err(PlaybackError::Failed("audio was released".to_string()));
        }
        if self.resumed_at.is_some() {
            return Ok(());
        }

        if let Some(duration_ms) = self.header_duration {
            let _ = self.events.send(AudioEvent::LoadedMetadata { duration_ms });
        }
        let _ = self.events.send(AudioEvent::Playing);
        self.resumed_at = Some(Instant::now());

        let remaining_ms = (self.media_ms - self.played_ms).max(0.0) / self.rate;
        let events = self.events.clone();
        self.end_task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(remaining_ms / 1000.0)).await;
            let _ = events.send(AudioEvent::Ended);
        }));
        Ok(())
    }

    fn pause(&mut self) {
        if self.resumed_at.is_none() {
            return;
        }
        self.played_ms = self.media_position();
        self.resumed_at = None;
        self.cancel_end();
        let _ = self.events.send(AudioEvent::Paused);
    }

    fn position_ms(&self) -> Option<f64> {
        Some(self.media_position())
    }

    fn duration_ms(&self) -> Option<f64> {
        self.header_duration
    }

    fn release(&mut self) {
        self.cancel_end();
        self.resumed_at = None;
        self.audio = None;
    }
}

impl Drop for HeadlessPlayer {
    fn drop(&mut self) {
        self.cancel_end();
    }
}
