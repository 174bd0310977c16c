//! The player task (C8, §4.7): one per provider. Owns the loader, the
//! active stream-id, the current track reference, and the position
//! snapshot; reacts to the sink's state callback and to externally
//! signaled seeks.

use crate::clock::SyncedClock;
use crate::error::Result;
use crate::position::Position;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use streamcore_loader::{LoaderEvent, LoaderTask, MetadataSource};
use streamcore_queue::TrackRef;
use streamcore_sink::buffer::StreamBuffer;
use streamcore_sink::scheduler::{Sink, SinkEvent};
use streamcore_telemetry::{TelemetrySink, TrackMetricsEvent};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info};

const STREAM_BUFFER_CAPACITY: usize = 256 * 1024;
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

/// Mutable state shared between the sink-event watcher and the public
/// handle; kept small and behind one lock since updates are infrequent
/// relative to the audio data path (which never touches this struct).
struct PlayerState {
    position: Position,
    current: Option<TrackRef>,
    repeat_one: bool,
    started_at_ms: u64,
    heartbeat: Option<JoinHandle<()>>,
}

/// One provider's player. Cloning shares the same background watcher
/// task and telemetry sink.
#[derive(Clone)]
pub struct PlayerTask {
    sink: Sink,
    source: Arc<dyn MetadataSource>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<SyncedClock>,
    stream_counter: Arc<AtomicU32>,
    state: Arc<Mutex<PlayerState>>,
    client: reqwest::Client,
}

impl PlayerTask {
    pub fn new(sink: Sink, source: Arc<dyn MetadataSource>, telemetry: Arc<dyn TelemetrySink>, clock: Arc<SyncedClock>) -> Self {
        let player = PlayerTask {
            sink,
            source,
            telemetry,
            clock,
            stream_counter: Arc::new(AtomicU32::new(1)),
            state: Arc::new(Mutex::new(PlayerState {
                position: Position::at(0),
                current: None,
                repeat_one: false,
                started_at_ms: 0,
                heartbeat: None,
            })),
            client: reqwest::Client::new(),
        };
        player.spawn_sink_event_watcher();
        player
    }

    fn spawn_sink_event_watcher(&self) {
        let mut events = self.sink.subscribe();
        let state = self.state.clone();
        let telemetry = self.telemetry.clone();
        let clock = self.clock.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            loop {
                if events.changed().await.is_err() {
                    return;
                }
                let event = *events.borrow();
                let mut guard = state.lock().await;
                match event {
                    SinkEvent::Playback { stream_id } => {
                        guard.position.resume();
                        guard.started_at_ms = clock.now_ms().max(0) as u64;
                        if let Some(track) = guard.current.clone() {
                            let event = TrackMetricsEvent::started(track.provider.clone(), track.queue_item_id, track.uri.clone(), clock.now_ms().max(0) as u64);
                            telemetry.emit(event);
                        }
                        if let Some(old) = guard.heartbeat.take() {
                            old.abort();
                        }
                        guard.heartbeat = Some(spawn_heartbeat(state.clone(), telemetry.clone(), clock.clone(), sink.clone()));
                        debug!(stream_id, "sink playback started");
                    }
                    SinkEvent::Paused { stream_id } => {
                        guard.position.freeze();
                        debug!(stream_id, position_ms = guard.position.value_ms, "sink paused");
                    }
                    SinkEvent::Stopped { stream_id } => {
                        if let Some(old) = guard.heartbeat.take() {
                            old.abort();
                        }
                        let played_for_s = (clock.now_ms().max(0) as u64).saturating_sub(guard.started_at_ms) as f64 / 1000.0;
                        if let Some(track) = guard.current.clone() {
                            let event = TrackMetricsEvent::ended(track.provider.clone(), track.queue_item_id, played_for_s, clock.now_ms().max(0) as u64);
                            telemetry.emit(event);
                        }
                        guard.position.playing = false;
                        debug!(stream_id, played_for_s, "sink stopped");
                    }
                }
            }
        });
    }

    /// Advances to a new track (§4.7 "On track advance, it obtains a
    /// fresh stream_id from the sink"). Loading runs on a detached task
    /// that feeds chunks to the sink as they arrive from the loader.
    pub async fn advance_to(&self, track: TrackRef, repeat_one: bool) -> Result<()> {
        let stream_id = self.stream_counter.fetch_add(1, Ordering::SeqCst);

        {
            let mut guard = self.state.lock().await;
            if let Some(old) = guard.heartbeat.take() {
                old.abort();
            }
            guard.current = Some(track.clone());
            guard.repeat_one = repeat_one;
            guard.position = Position::at(0);
        }

        self.sink.new_stream(StreamBuffer::new(stream_id, 0, STREAM_BUFFER_CAPACITY));

        let (task, mut rx) = LoaderTask::new(self.client.clone(), self.source.clone());
        let sink = self.sink.clone();
        let track_uri = track.uri.clone();
        tokio::spawn(async move {
            let run = tokio::spawn(async move { task.run(&track_uri).await });
            while let Some(event) = rx.recv().await {
                match event {
                    LoaderEvent::Header(bytes) => {
                        sink.feed_data(stream_id, bytes, false).await;
                    }
                    LoaderEvent::Data(bytes) => {
                        sink.feed_data(stream_id, bytes.to_vec(), false).await;
                    }
                    LoaderEvent::Eof => {
                        sink.soft_stop_feed();
                        break;
                    }
                    LoaderEvent::Failed(message) => {
                        info!(error = message, "loader failed, stopping stream");
                        sink.stop_feed();
                        break;
                    }
                }
            }
            let _ = run.await;
        });

        Ok(())
    }

    /// Handles an externally signaled seek (§4.7 "On an externally
    /// signaled seek... resets position.value := N, position.timestamp := now").
    pub async fn seek(&self, target_ms: u64) {
        let mut guard = self.state.lock().await;
        guard.position.seek_to(target_ms);
    }

    pub async fn position(&self) -> Position {
        self.state.lock().await.position
    }

    pub fn subscribe_sink_events(&self) -> watch::Receiver<SinkEvent> {
        self.sink.subscribe()
    }

    /// Forwards a peer-initiated volume change to the sink (§4.5
    /// `ForwardVolume`), linear scale 0..=100.
    pub fn set_volume(&self, linear: u8) {
        self.sink.set_volume_linear(linear);
    }

    /// Pauses playback by soft-stopping the active feed, letting the
    /// decoder chip drain rather than cutting it abruptly (§4.5
    /// `SetPlaying(false)`).
    pub fn pause(&self) {
        self.sink.soft_stop_feed();
    }

    /// Stops playback outright (§4.5 `StopPlayback`).
    pub fn stop(&self) {
        self.sink.stop_feed();
    }
}

/// Periodic position telemetry while a stream is in `Playback` (§4.7
/// "start heartbeat (10s period)"); aborted on `Paused`/`Stopped` and
/// whenever a new track starts.
fn spawn_heartbeat(state: Arc<Mutex<PlayerState>>, telemetry: Arc<dyn TelemetrySink>, clock: Arc<SyncedClock>, _sink: Sink) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(HEARTBEAT_PERIOD).await;
            let guard = state.lock().await;
            if let Some(track) = guard.current.clone() {
                let position_ms = guard.position.live_value_ms();
                let event = TrackMetricsEvent::position(track.provider.clone(), track.queue_item_id, position_ms, clock.now_ms().max(0) as u64);
                telemetry.emit(event);
            }
        }
    })
}
