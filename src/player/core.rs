use super::{BackendFactory, PlaybackMetrics, PlayerCommand, PlayerEngine, PlayerEvent};
use crate::REFRESH_RATE;
use crate::config::PlaybackConfig;
use crate::domain::{ArtworkResolver, ChannelKind};
use crate::session::SessionStore;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Runs one engine on its own control thread. The engine (and with it the
/// audio output, which cannot leave the thread that created it) is built
/// inside the thread; everything else talks through channels and metrics.
pub struct EngineCore;

impl EngineCore {
    pub fn spawn(
        channel: ChannelKind,
        factory: Box<dyn BackendFactory>,
        store: Option<SessionStore>,
        artwork_resolver: Option<Box<dyn ArtworkResolver>>,
        settings: PlaybackConfig,
        events: Sender<PlayerEvent>,
        metrics: Arc<PlaybackMetrics>,
        commands: Receiver<PlayerCommand>,
    ) -> JoinHandle<()> {
        thread::Builder::new()
            .name(format!("playback-{channel}"))
            .spawn(move || {
                let mut engine = PlayerEngine::new(
                    channel,
                    factory,
                    store,
                    artwork_resolver,
                    &settings,
                    events,
                    metrics,
                );

                loop {
                    loop {
                        match commands.try_recv() {
                            Ok(command) => engine.handle_command(command),
                            Err(TryRecvError::Empty) => break,
                            // Handle dropped; the channel is done for
                            Err(TryRecvError::Disconnected) => return,
                        }
                    }

                    engine.poll();
                    thread::sleep(REFRESH_RATE);
                }
            })
            .expect("Failed to spawn playback thread")
    }
}
