use super::backend::{AudioBackend, BackendKind, LoadRequest, ReadinessSender};
use crate::domain::Locator;
use anyhow::{Result, anyhow};
use log::debug;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::{
    fs::File,
    io::{BufReader, Cursor, Read},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

/// Decode-on-demand backend. Local content is ready as soon as the decoder
/// opens; remote content buffers on a worker thread first, so readiness is
/// genuinely asynchronous there.
pub struct StreamBackend {
    _stream: OutputStream,
    sink: Arc<Sink>,
    duration: Arc<Mutex<Option<Duration>>>,
    loaded: Arc<AtomicBool>,
}

impl StreamBackend {
    pub fn new() -> Result<Self> {
        let stream = OutputStreamBuilder::open_default_stream()?;
        let sink = Arc::new(Sink::connect_new(stream.mixer()));
        Ok(StreamBackend {
            _stream: stream,
            sink,
            duration: Arc::new(Mutex::new(None)),
            loaded: Arc::new(AtomicBool::new(false)),
        })
    }

    fn set_duration(slot: &Mutex<Option<Duration>>, value: Option<Duration>) {
        if let Ok(mut duration) = slot.lock() {
            *duration = value;
        }
    }
}

impl AudioBackend for StreamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Streaming
    }

    fn load(&mut self, request: LoadRequest, readiness: ReadinessSender) -> Result<()> {
        self.sink.clear();
        self.loaded.store(false, Ordering::Relaxed);
        Self::set_duration(&self.duration, None);

        match &request.locator {
            Locator::RemoteUrl(url) => {
                let url = url.clone();
                let sink = Arc::clone(&self.sink);
                let duration = Arc::clone(&self.duration);
                let loaded = Arc::clone(&self.loaded);
                let start_at = request.start_at;

                thread::spawn(move || match fetch_remote(&url) {
                    Ok(source) => {
                        Self::set_duration(&duration, source.total_duration());
                        sink.append(source);
                        if start_at > Duration::ZERO {
                            let _ = sink.try_seek(start_at);
                        }
                        loaded.store(true, Ordering::Relaxed);
                        readiness.ready();
                    }
                    Err(e) => readiness.failed(e.to_string()),
                });
            }
            locator => {
                let path = resolve_local_path(locator)?;
                let source = decode_file(&path)?;
                Self::set_duration(&self.duration, source.total_duration());
                self.sink.append(source);
                if request.start_at > Duration::ZERO {
                    let _ = self.sink.try_seek(request.start_at);
                }
                self.loaded.store(true, Ordering::Relaxed);
                readiness.ready();
            }
        }

        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.sink.clear();
        self.loaded.store(false, Ordering::Relaxed);
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        self.sink
            .try_seek(position)
            .map_err(|e| anyhow!("seek failed: {e}"))
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration.lock().ok().and_then(|d| *d)
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn segment_ended(&self) -> bool {
        self.loaded.load(Ordering::Relaxed) && self.sink.empty()
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn set_speed(&mut self, speed: f32) {
        self.sink.set_speed(speed);
    }

    fn supports_boost(&self) -> bool {
        false
    }

    fn set_boost(&mut self, _gain: f32) {}
}

/// Library references resolve against the user's audio directory.
pub(crate) fn resolve_local_path(locator: &Locator) -> Result<PathBuf> {
    match locator {
        Locator::LocalFile(path) => Ok(path.clone()),
        Locator::LibraryRef(reference) => {
            let base = dirs::audio_dir()
                .ok_or_else(|| anyhow!("no audio directory for library reference"))?;
            Ok(base.join(reference))
        }
        Locator::RemoteUrl(url) => Err(anyhow!("not a local locator: {url}")),
    }
}

pub(crate) fn decode_file(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();

    let mut builder = Decoder::builder()
        .with_data(BufReader::new(file))
        .with_byte_len(len)
        .with_seekable(true);

    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        builder = builder.with_hint(extension_hint(ext));
    }

    Ok(builder.build()?)
}

fn fetch_remote(url: &str) -> Result<Decoder<Cursor<Vec<u8>>>> {
    debug!("buffering remote stream: {url}");
    let response = ureq::get(url).call()?;
    let mut bytes = Vec::new();
    response.into_reader().read_to_end(&mut bytes)?;
    let len = bytes.len() as u64;

    let mut builder = Decoder::builder()
        .with_data(Cursor::new(bytes))
        .with_byte_len(len)
        .with_seekable(true);

    if let Some(ext) = url_extension(url) {
        builder = builder.with_hint(extension_hint(&ext));
    }

    Ok(builder.build()?)
}

fn extension_hint(ext: &str) -> &str {
    match ext {
        "adif" | "adts" => "aac",
        "m4a" | "m4b" | "m4p" | "m4r" | "mp4" => "audio/mp4",
        "bit" | "mpga" => "mp3",
        "oga" | "ogm" | "ogv" | "ogx" | "spx" => "audio/ogg",
        "wave" => "wav",
        _ => ext,
    }
}

fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
