// Headless video player using ffmpeg-next
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::{debug, info, warn};

use super::control::ControlAction;
use super::layout::OsdLayout;
use super::{OverlayId, Playback};
use crate::error::PlaybackError;
use crate::sync::{PlayerEvent, ScreenRect};

extern crate ffmpeg_next as ffmpeg;

/// Overlay slots available at once, as in mpv's overlay-add
pub const MAX_OVERLAYS: usize = 64;

/// Decoded video frame, RGBA at native resolution
#[derive(Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Player construction options
#[derive(Debug, Clone, Copy)]
pub struct PlayerOptions {
    /// Size of the virtual on-screen display the video is fitted into
    pub osd_width: u32,
    pub osd_height: u32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            osd_width: 1280,
            osd_height: 720,
        }
    }
}

/// Overlay currently composited over the video
#[derive(Clone)]
struct PlacedOverlay {
    rect: ScreenRect,
    image: RgbaImage,
}

/// Fixed-size table of live overlays, bounded by the OSD
struct OverlayTable {
    bounds: (u32, u32),
    slots: BTreeMap<OverlayId, PlacedOverlay>,
}

impl OverlayTable {
    fn new(osd_width: u32, osd_height: u32) -> Self {
        Self {
            bounds: (osd_width, osd_height),
            slots: BTreeMap::new(),
        }
    }

    fn add(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<OverlayId, PlaybackError> {
        let (osd_w, osd_h) = (self.bounds.0 as i64, self.bounds.1 as i64);
        let inside = rect.x >= 0
            && rect.y >= 0
            && rect.x as i64 + rect.width as i64 <= osd_w
            && rect.y as i64 + rect.height as i64 <= osd_h;

        if !rect.has_area() || !inside {
            return Err(PlaybackError::OverlayRejected(format!(
                "{}x{}+{}+{} outside {}x{} display",
                rect.width, rect.height, rect.x, rect.y, osd_w, osd_h
            )));
        }
        if image.dimensions() != (rect.width as u32, rect.height as u32) {
            return Err(PlaybackError::OverlayRejected(format!(
                "image is {}x{}, rect is {}x{}",
                image.width(),
                image.height(),
                rect.width,
                rect.height
            )));
        }

        // Lowest free slot
        let id = (0..MAX_OVERLAYS as OverlayId)
            .find(|id| !self.slots.contains_key(id))
            .ok_or(PlaybackError::OverlayTableFull(MAX_OVERLAYS))?;

        self.slots.insert(
            id,
            PlacedOverlay {
                rect,
                image: image.clone(),
            },
        );
        Ok(id)
    }

    fn remove(&mut self, id: OverlayId) -> Result<(), PlaybackError> {
        self.slots
            .remove(&id)
            .map(|_| ())
            .ok_or(PlaybackError::UnknownOverlay(id))
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Player state shared with the decoder thread
struct PlayerState {
    playing: bool,
    current_time: f64,
    duration: f64,
    latest_frame: Option<VideoFrame>,
    overlays: OverlayTable,
}

/// Command sent to the decoder thread
#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayerCommand {
    Play,
    Pause,
    Seek(f64),
    Stop,
}

/// Cloneable handle for steering playback from another thread
#[derive(Clone)]
pub struct PlayerControl {
    state: Arc<Mutex<PlayerState>>,
    commands: Sender<PlayerCommand>,
}

impl PlayerControl {
    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: PlayerCommand) {
        // Fails only once the decoder thread has exited
        let _ = self.commands.send(command);
    }

    pub fn resume(&self) {
        self.lock().playing = true;
        self.send(PlayerCommand::Play);
    }

    /// Flip between playing and paused, returning whether it now plays
    pub fn toggle_pause(&self) -> bool {
        let mut state = self.lock();
        state.playing = !state.playing;
        self.send(if state.playing {
            PlayerCommand::Play
        } else {
            PlayerCommand::Pause
        });
        state.playing
    }

    /// Seek to an absolute time in seconds
    pub fn seek_to(&self, seconds: f64) {
        let duration = self.duration();
        let target = if duration > 0.0 {
            seconds.clamp(0.0, duration)
        } else {
            seconds.max(0.0)
        };
        self.send(PlayerCommand::Seek(target));
    }

    /// Seek relative to the current position
    pub fn seek_by(&self, delta: f64) {
        let current = self.lock().current_time;
        self.seek_to(current + delta);
    }

    /// Ask the decoder thread to exit; the event stream closes after it
    pub fn stop(&self) {
        self.send(PlayerCommand::Stop);
    }

    /// Get total duration in seconds (0 when unknown, e.g. live streams)
    pub fn duration(&self) -> f64 {
        self.lock().duration
    }

    /// Carry out a keyboard action. Returns false once playback should end.
    pub fn apply(&self, action: ControlAction) -> bool {
        match action {
            ControlAction::TogglePause => {
                let playing = self.toggle_pause();
                info!(playing, "pause toggled");
            }
            ControlAction::SeekBy(delta) => self.seek_by(delta),
            ControlAction::SeekTo(target) => self.seek_to(target),
            ControlAction::Quit => {
                self.stop();
                return false;
            }
        }
        true
    }
}

/// Headless player with a background decoding thread.
///
/// Property changes and position updates are published as `PlayerEvent`s on
/// a channel; the processing context reads them from `events()`.
pub struct VideoPlayer {
    source: String,
    control: PlayerControl,
    generation: Arc<AtomicU64>,
    event_receiver: crossbeam_channel::Receiver<PlayerEvent>,
    decoder_thread: Option<JoinHandle<()>>,
    layout: OsdLayout,
}

impl VideoPlayer {
    /// Open a file path or URL. Playback starts paused; call `play()`.
    pub fn open(source: &str, options: PlayerOptions) -> Result<Self, PlaybackError> {
        ffmpeg::init()?;

        // Probe once for metadata; the decoder thread reopens the input
        let format_ctx = ffmpeg::format::input(Path::new(source))?;
        let stream = format_ctx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| PlaybackError::NoVideoStream(source.to_string()))?;

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context_decoder.decoder().video()?;

        let layout = OsdLayout::fit(
            decoder.width(),
            decoder.height(),
            options.osd_width,
            options.osd_height,
        );

        let duration = if format_ctx.duration() > 0 {
            format_ctx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        debug!(
            source,
            width = layout.video_width,
            height = layout.video_height,
            duration,
            "opened source"
        );

        let state = Arc::new(Mutex::new(PlayerState {
            playing: false,
            current_time: 0.0,
            duration,
            latest_frame: None,
            overlays: OverlayTable::new(options.osd_width, options.osd_height),
        }));
        let generation = Arc::new(AtomicU64::new(0));

        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        let (command_sender, command_receiver) = mpsc::channel();

        // Geometry is known up front; announce it before the first position
        for event in layout.geometry_events() {
            let _ = event_sender.send(event);
        }

        let thread_ctx = DecoderContext {
            source: source.to_string(),
            state: Arc::clone(&state),
            generation: Arc::clone(&generation),
            events: event_sender,
            commands: command_receiver,
        };
        let decoder_thread = thread::spawn(move || decoder_thread_main(thread_ctx));

        Ok(Self {
            source: source.to_string(),
            control: PlayerControl {
                state,
                commands: command_sender,
            },
            generation,
            event_receiver,
            decoder_thread: Some(decoder_thread),
            layout,
        })
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.control.lock()
    }

    /// Start playback
    pub fn play(&mut self) {
        self.control.resume();
    }

    /// Handle for pausing and seeking while the session owns the player
    pub fn control(&self) -> PlayerControl {
        self.control.clone()
    }

    pub fn duration(&self) -> f64 {
        self.control.duration()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Event stream for the processing context
    pub fn events(&self) -> crossbeam_channel::Receiver<PlayerEvent> {
        self.event_receiver.clone()
    }

    /// Compose what the display would show: the latest frame fitted into
    /// the OSD with its margins, overlays on top.
    pub fn render_osd(&self) -> Option<RgbaImage> {
        let state = self.lock();
        let frame = state.latest_frame.as_ref()?;
        let frame = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())?;

        let mut canvas =
            RgbaImage::from_pixel(self.layout.osd_width, self.layout.osd_height, Rgba([0, 0, 0, 255]));
        let (content_w, content_h) = self.layout.content_size();
        if content_w > 0 && content_h > 0 {
            let content = imageops::resize(&frame, content_w, content_h, FilterType::Triangle);
            imageops::overlay(
                &mut canvas,
                &content,
                i64::from(self.layout.margin_left),
                i64::from(self.layout.margin_top),
            );
        }

        for overlay in state.overlays.slots.values() {
            imageops::overlay(
                &mut canvas,
                &overlay.image,
                i64::from(overlay.rect.x),
                i64::from(overlay.rect.y),
            );
        }

        Some(canvas)
    }

    /// Stop the player and clean up
    pub fn stop(&mut self) {
        self.control.stop();
        if let Some(handle) = self.decoder_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Playback for VideoPlayer {
    fn capture_frame(&mut self) -> Result<RgbaImage, PlaybackError> {
        let state = self.lock();
        let frame = state.latest_frame.as_ref().ok_or(PlaybackError::NoFrame)?;
        RgbaImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or(PlaybackError::NoFrame)
    }

    fn create_overlay(&mut self, rect: ScreenRect, image: &RgbaImage) -> Result<OverlayId, PlaybackError> {
        if self.decoder_thread.is_none() {
            return Err(PlaybackError::Disconnected);
        }
        self.lock().overlays.add(rect, image)
    }

    fn remove_overlay(&mut self, id: OverlayId) -> Result<(), PlaybackError> {
        self.lock().overlays.remove(id)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the decoder thread owns
struct DecoderContext {
    source: String,
    state: Arc<Mutex<PlayerState>>,
    generation: Arc<AtomicU64>,
    events: crossbeam_channel::Sender<PlayerEvent>,
    commands: Receiver<PlayerCommand>,
}

impl DecoderContext {
    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlayerEvent) {
        // Receiver lives in the player; a send only fails during teardown
        let _ = self.events.send(event);
    }

    /// Record a finished seek and return whether playback should continue.
    ///
    /// The stale frame is dropped and the generation bumped under one lock,
    /// so a capture sees either the old frame with the old generation or no
    /// frame with the new one.
    fn note_seek(&self, target_time: f64) -> bool {
        let playing = {
            let mut s = self.lock();
            s.latest_frame = None;
            s.current_time = target_time;
            self.generation.fetch_add(1, Ordering::SeqCst);
            s.playing
        };
        self.emit(PlayerEvent::Seeked);
        playing
    }
}

/// Main decoder thread function
fn decoder_thread_main(ctx: DecoderContext) {
    let mut format_ctx = match ffmpeg::format::input(Path::new(&ctx.source)) {
        Ok(input) => input,
        Err(e) => {
            warn!(source = %ctx.source, error = %e, "decoder could not reopen source");
            ctx.emit(PlayerEvent::EndOfFile);
            return;
        }
    };

    let Some(stream) = format_ctx.streams().best(ffmpeg::media::Type::Video) else {
        ctx.emit(PlayerEvent::EndOfFile);
        return;
    };

    let video_stream_index = stream.index();
    let time_base = stream.time_base();
    let time_base_f64 = f64::from(time_base.numerator()) / f64::from(time_base.denominator());

    let Ok(context_decoder) = ffmpeg::codec::context::Context::from_parameters(stream.parameters()) else {
        ctx.emit(PlayerEvent::EndOfFile);
        return;
    };

    let Ok(mut decoder) = context_decoder.decoder().video() else {
        ctx.emit(PlayerEvent::EndOfFile);
        return;
    };

    let width = decoder.width();
    let height = decoder.height();

    // Native size: detections must be in video pixel space
    let Ok(mut scaler) = ffmpeg::software::scaling::Context::get(
        decoder.format(),
        width,
        height,
        ffmpeg::format::Pixel::RGBA,
        width,
        height,
        ffmpeg::software::scaling::Flags::BILINEAR,
    ) else {
        ctx.emit(PlayerEvent::EndOfFile);
        return;
    };

    let mut playing = false;
    // Wall-clock anchor for pacing: (instant, timestamp shown at that instant)
    let mut clock: Option<(Instant, f64)> = None;

    let mut decoded_frame = ffmpeg::frame::Video::empty();
    let mut scaled_frame = ffmpeg::frame::Video::empty();

    loop {
        // Check for commands (non-blocking)
        while let Ok(cmd) = ctx.commands.try_recv() {
            match cmd {
                PlayerCommand::Play => playing = true,
                PlayerCommand::Pause => {
                    playing = false;
                    clock = None;
                }
                PlayerCommand::Stop => {
                    ctx.generation.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                PlayerCommand::Seek(target_time) => {
                    let timestamp = (target_time * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
                    let _ = format_ctx.seek(timestamp, ..timestamp);
                    decoder.flush();
                    clock = None;
                    playing = ctx.note_seek(target_time);
                    debug!(target_time, "seeked");
                }
            }
        }

        if !playing {
            thread::sleep(Duration::from_millis(16));
            continue;
        }

        // Decode next frame
        let mut got_frame = false;
        for (stream, packet) in format_ctx.packets() {
            if stream.index() != video_stream_index {
                continue;
            }

            if decoder.send_packet(&packet).is_err() {
                continue;
            }

            while decoder.receive_frame(&mut decoded_frame).is_ok() {
                if scaler.run(&decoded_frame, &mut scaled_frame).is_ok() {
                    // Extract frame data
                    let data = scaled_frame.data(0);
                    let stride = scaled_frame.stride(0);

                    let mut rgba_data = Vec::with_capacity((width * height * 4) as usize);
                    for y in 0..height as usize {
                        let row_start = y * stride;
                        let row_end = row_start + (width * 4) as usize;
                        rgba_data.extend_from_slice(&data[row_start..row_end]);
                    }

                    let pts = decoded_frame.pts().unwrap_or(0);
                    let timestamp = pts as f64 * time_base_f64;

                    // Hold the frame until its presentation time
                    match clock {
                        Some((anchor, anchor_ts)) => {
                            let due = anchor + Duration::from_secs_f64((timestamp - anchor_ts).max(0.0));
                            let now = Instant::now();
                            if due > now {
                                thread::sleep(due - now);
                            }
                        }
                        None => clock = Some((Instant::now(), timestamp)),
                    }

                    {
                        let mut s = ctx.lock();
                        s.current_time = timestamp;
                        s.latest_frame = Some(VideoFrame {
                            data: rgba_data,
                            width,
                            height,
                        });
                    }

                    ctx.emit(PlayerEvent::PositionChanged {
                        position: Some(timestamp),
                    });

                    got_frame = true;
                    break;
                }
            }

            if got_frame {
                break;
            }
        }

        // If we didn't get a frame, we are at the end
        if !got_frame {
            {
                ctx.lock().playing = false;
            }
            playing = false;
            clock = None;
            ctx.emit(PlayerEvent::EndOfFile);
        }
    }
}
