use super::backend::{AudioBackend, BackendKind, LoadRequest, ReadinessSender};
use super::backend_stream::{decode_file, resolve_local_path};
use anyhow::{Result, anyhow};
use log::warn;
use rodio::{ChannelCount, OutputStream, OutputStreamBuilder, Sink, Source, buffer::SamplesBuffer};
use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

/// Fully decoded PCM for one file, shared between the decode worker and
/// the control thread so seeks and boost changes can rebuild cheaply.
#[derive(Clone)]
struct DecodedAudio {
    samples: Arc<Vec<f32>>,
    sample_rate: rodio::SampleRate,
    channels: ChannelCount,
    rate_n: u32,
    channels_n: u16,
}

impl DecodedAudio {
    fn total_duration(&self) -> Duration {
        let denominator = self.rate_n as u64 * self.channels_n.max(1) as u64;
        if denominator == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / denominator as f64)
    }
}

/// Whole-file decode backend with gain boost applied when the segment is
/// scheduled. Only ever fed local files; chapter tracks schedule just their
/// sample range, so the sink draining doubles as the segment-end signal.
pub struct DspBackend {
    _stream: Option<OutputStream>,
    sink: Option<Arc<Sink>>,
    engine_started: bool,
    decoded: Arc<Mutex<Option<DecodedAudio>>>,
    loaded: Arc<AtomicBool>,
    /// (absolute position of the scheduled slice start, sink position mark
    /// taken right after the append)
    pos_mark: Arc<Mutex<(Duration, Duration)>>,
    segment_start: Duration,
    segment_end: Option<Duration>,
    gain: f32,
}

impl DspBackend {
    pub fn new() -> Self {
        let (stream, sink, engine_started) =
            match OutputStreamBuilder::open_default_stream() {
                Ok(stream) => {
                    let sink = Arc::new(Sink::connect_new(stream.mixer()));
                    (Some(stream), Some(sink), true)
                }
                Err(e) => {
                    warn!("dsp backend: output engine failed to start: {e}");
                    (None, None, false)
                }
            };

        DspBackend {
            _stream: stream,
            sink,
            engine_started,
            decoded: Arc::new(Mutex::new(None)),
            loaded: Arc::new(AtomicBool::new(false)),
            pos_mark: Arc::new(Mutex::new((Duration::ZERO, Duration::ZERO))),
            segment_start: Duration::ZERO,
            segment_end: None,
            gain: 1.0,
        }
    }

    fn current_audio(&self) -> Option<DecodedAudio> {
        self.decoded.lock().ok().and_then(|slot| slot.clone())
    }

    /// Clear the sink and schedule `[from, segment_end)` of the decoded
    /// file, leaving the sink paused state intact.
    fn rebuild_at(&self, from: Duration) -> Result<()> {
        let Some(audio) = self.current_audio() else {
            return Err(anyhow!("segment rebuild before decode completed"));
        };
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let was_paused = sink.is_paused();
        sink.clear();
        let target = clamp_to_segment(from, self.segment_start, self.segment_end, &audio);
        schedule_segment(sink, &audio, target, self.segment_end, self.gain, &self.pos_mark);
        if !was_paused {
            sink.play();
        }
        Ok(())
    }
}

impl AudioBackend for DspBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::BufferedDsp
    }

    fn load(&mut self, request: LoadRequest, readiness: ReadinessSender) -> Result<()> {
        let path = resolve_local_path(&request.locator)?;

        if let Some(sink) = &self.sink {
            sink.clear();
        }
        self.loaded.store(false, Ordering::Relaxed);
        if let Ok(mut slot) = self.decoded.lock() {
            *slot = None;
        }
        self.segment_start = request.range.map(|r| r.start).unwrap_or(Duration::ZERO);
        self.segment_end = request.range.and_then(|r| r.end);

        let decoded_slot = Arc::clone(&self.decoded);
        let loaded = Arc::clone(&self.loaded);
        let pos_mark = Arc::clone(&self.pos_mark);
        let sink = self.sink.clone();
        let gain = self.gain;
        let start_at = request.start_at.max(self.segment_start);
        let segment_end = self.segment_end;

        thread::spawn(move || match decode_fully(&path) {
            Ok(audio) => {
                if let Some(sink) = &sink {
                    schedule_segment(sink, &audio, start_at, segment_end, gain, &pos_mark);
                }
                if let Ok(mut slot) = decoded_slot.lock() {
                    *slot = Some(audio);
                }
                loaded.store(true, Ordering::Relaxed);
                readiness.ready();
            }
            Err(e) => readiness.failed(e.to_string()),
        });

        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if !self.engine_started {
            return Err(anyhow!("output engine never started"));
        }
        if let Some(sink) = &self.sink {
            sink.play();
        }
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.clear();
        }
        self.loaded.store(false, Ordering::Relaxed);
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.rebuild_at(position)
    }

    fn position(&self) -> Duration {
        let (base, mark) = self
            .pos_mark
            .lock()
            .map(|guard| *guard)
            .unwrap_or((Duration::ZERO, Duration::ZERO));
        match &self.sink {
            Some(sink) => base + sink.get_pos().saturating_sub(mark),
            None => base,
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.current_audio().map(|audio| audio.total_duration())
    }

    fn is_paused(&self) -> bool {
        self.sink.as_ref().map(|s| s.is_paused()).unwrap_or(true)
    }

    fn segment_ended(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
            && self.sink.as_ref().map(|s| s.empty()).unwrap_or(false)
    }

    fn set_volume(&mut self, volume: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn set_speed(&mut self, speed: f32) {
        if let Some(sink) = &self.sink {
            sink.set_speed(speed);
        }
    }

    fn supports_boost(&self) -> bool {
        true
    }

    fn set_boost(&mut self, gain: f32) {
        if (gain - self.gain).abs() < f32::EPSILON {
            return;
        }
        self.gain = gain;
        if self.current_audio().is_some() {
            let resume = self.position();
            if let Err(e) = self.rebuild_at(resume) {
                warn!("dsp backend: boost rebuild failed: {e}");
            }
        }
    }
}

fn decode_fully(path: &Path) -> Result<DecodedAudio> {
    let source = decode_file(path)?;
    let channels = source.channels();
    let sample_rate = source.sample_rate();
    let rate_n = u32::from(sample_rate);
    let channels_n = u16::from(channels);
    let samples: Vec<f32> = source.collect();

    Ok(DecodedAudio {
        samples: Arc::new(samples),
        sample_rate,
        channels,
        rate_n,
        channels_n,
    })
}

/// Interleaved-sample index for a time offset. The multiply is done wide
/// and clamped to the buffer before narrowing, then aligned to a frame.
fn sample_offset(t: Duration, sample_rate: u32, channels: u16, len: usize) -> usize {
    let channels = channels.max(1);
    let frames = (t.as_millis() as u128).saturating_mul(sample_rate as u128) / 1000;
    let samples = frames.saturating_mul(channels as u128);
    let clamped = samples.min(len as u128) as usize;
    clamped - clamped % channels as usize
}

fn clamp_to_segment(
    t: Duration,
    start: Duration,
    end: Option<Duration>,
    audio: &DecodedAudio,
) -> Duration {
    let file_end = audio.total_duration();
    let upper = end.unwrap_or(file_end).min(file_end).max(start);
    t.clamp(start, upper)
}

fn schedule_segment(
    sink: &Sink,
    audio: &DecodedAudio,
    from: Duration,
    to: Option<Duration>,
    gain: f32,
    pos_mark: &Mutex<(Duration, Duration)>,
) {
    let len = audio.samples.len();
    let start = sample_offset(from, audio.rate_n, audio.channels_n, len);
    let end = to
        .map(|t| sample_offset(t, audio.rate_n, audio.channels_n, len))
        .unwrap_or(len)
        .max(start);

    let data: Vec<f32> = audio.samples[start..end].iter().map(|s| s * gain).collect();
    sink.append(SamplesBuffer::new(audio.channels, audio.sample_rate, data));

    if let Ok(mut mark) = pos_mark.lock() {
        *mark = (from, sink.get_pos());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_offset_aligns_to_frames() {
        // 44.1kHz stereo: 1s = 88_200 interleaved samples
        let len = 500_000;
        assert_eq!(sample_offset(Duration::from_secs(1), 44_100, 2, len), 88_200);

        let odd = sample_offset(Duration::from_millis(333), 44_100, 2, len);
        assert_eq!(odd % 2, 0);
    }

    #[test]
    fn sample_offset_clamps_to_buffer() {
        let len = 1_000;
        assert_eq!(sample_offset(Duration::from_secs(3600), 192_000, 8, len), 1_000 - 1_000 % 8);

        // Absurd inputs must not overflow or exceed the buffer
        let huge = sample_offset(Duration::from_secs(u64::MAX / 2), u32::MAX, u16::MAX, len);
        assert!(huge <= len);
    }

    #[test]
    fn zero_channels_does_not_divide_by_zero() {
        assert_eq!(sample_offset(Duration::from_secs(1), 44_100, 0, 100), 100);
    }
}
