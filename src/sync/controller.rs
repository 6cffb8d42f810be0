// Per-tick orchestration: sweep, capture, detect, place overlays
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::detect::{DetectMode, Detector};
use crate::error::CensorError;
use crate::playback::Playback;

use super::events::PlayerEvent;
use super::geometry::GeometryStore;
use super::ledger::{OverlayLedger, SweepReport, DEFAULT_TTL};
use super::policy::LabelPolicy;
use super::transform;

/// Consecutive failing ticks before the controller reports degraded mode
pub const DEFAULT_DEGRADED_AFTER: u32 = 5;

/// Tunables for the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub overlay_ttl: Duration,
    pub detect_mode: DetectMode,
    /// Detections scoring below this are ignored; unscored ones always pass
    pub min_confidence: Option<f32>,
    pub degraded_after: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            overlay_ttl: DEFAULT_TTL,
            detect_mode: DetectMode::Fast,
            min_confidence: None,
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Processing,
}

/// Whether the playback engine has been answering our requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Degraded { consecutive_failures: u32 },
}

/// How a tick ended
#[derive(Debug)]
pub enum TickOutcome {
    /// Position absent or not positive
    Ignored,
    Completed,
    /// Playback seeked or stopped mid-tick; placements were skipped
    Discarded,
    Aborted(CensorError),
}

/// What one tick did
#[derive(Debug)]
pub struct TickReport {
    pub position: Option<f64>,
    pub outcome: TickOutcome,
    pub swept: SweepReport,
    pub labels: Vec<String>,
    pub allocated: usize,
    pub overlay_failures: usize,
}

impl TickReport {
    fn new(position: Option<f64>, outcome: TickOutcome) -> Self {
        Self {
            position,
            outcome,
            swept: SweepReport::default(),
            labels: Vec::new(),
            allocated: 0,
            overlay_failures: 0,
        }
    }

    /// Whether the playback engine failed any request during this tick
    pub fn had_playback_failure(&self) -> bool {
        self.overlay_failures > 0
            || self.swept.failures > 0
            || matches!(&self.outcome, TickOutcome::Aborted(e) if e.is_playback_failure())
    }
}

/// State owned by one playback session.
///
/// Every mutation happens from the processing context; nothing here is
/// shared across threads.
pub struct SessionContext {
    pub geometry: GeometryStore,
    pub ledger: OverlayLedger,
    pub policy: LabelPolicy,
    consecutive_failures: u32,
    ever_degraded: bool,
}

impl SessionContext {
    pub fn new(policy: LabelPolicy) -> Self {
        Self {
            geometry: GeometryStore::new(),
            ledger: OverlayLedger::new(),
            policy,
            consecutive_failures: 0,
            ever_degraded: false,
        }
    }
}

/// Reacts to playback-position changes by censoring the current frame.
///
/// `tick` takes `&mut self`, so a second tick cannot start while one is
/// `Processing`; queued positions wait in the session loop instead.
pub struct SyncController<P, D> {
    player: P,
    detector: D,
    ctx: SessionContext,
    settings: ControllerSettings,
    state: ControllerState,
}

impl<P: Playback, D: Detector> SyncController<P, D> {
    pub fn new(player: P, detector: D, policy: LabelPolicy, settings: ControllerSettings) -> Self {
        Self {
            player,
            detector,
            ctx: SessionContext::new(policy),
            settings,
            state: ControllerState::Idle,
        }
    }

    /// Route one player event. Position changes run a tick.
    pub fn handle_event(&mut self, event: PlayerEvent, now: Instant) -> Option<TickReport> {
        match event {
            PlayerEvent::GeometryUpdated { field, value } => {
                self.ctx.geometry.apply(field, value);
                None
            }
            PlayerEvent::PositionChanged { position } => Some(self.tick(position, now)),
            PlayerEvent::Seeked => {
                debug!("playback seeked");
                None
            }
            PlayerEvent::EndOfFile => {
                debug!("end of file");
                None
            }
        }
    }

    /// Process one playback-position update.
    ///
    /// Failures are contained here: the tick is abandoned and the next one
    /// starts from a clean state.
    pub fn tick(&mut self, position: Option<f64>, now: Instant) -> TickReport {
        let Some(pos) = position.filter(|p| *p > 0.0) else {
            return TickReport::new(position, TickOutcome::Ignored);
        };
        debug_assert_eq!(self.state, ControllerState::Idle);

        self.state = ControllerState::Processing;
        let mut report = TickReport::new(position, TickOutcome::Completed);
        let result = self.process(pos, now, &mut report);
        report.outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    CensorError::IncompleteGeometry { .. } => {
                        debug!(position = pos, error = %e, "tick skipped")
                    }
                    CensorError::InvalidGeometry { .. } => {
                        error!(position = pos, error = %e, "transform invoked on invalid geometry")
                    }
                    _ => warn!(position = pos, error = %e, "tick aborted"),
                }
                TickOutcome::Aborted(e)
            }
        };
        self.state = ControllerState::Idle;

        self.record_health(&report);
        report
    }

    fn process(&mut self, position: f64, now: Instant, report: &mut TickReport) -> Result<TickOutcome, CensorError> {
        report.swept = self.ctx.ledger.sweep(&mut self.player, now);
        if report.swept.failures > 0 {
            warn!(
                position,
                failures = report.swept.failures,
                "expired overlays were not removed cleanly"
            );
        }

        let geometry = self.ctx.geometry.snapshot()?;
        let generation = self.player.generation();

        let frame = match self.player.capture_frame() {
            Ok(frame) => frame,
            // A seek drops the old frame; nothing to censor until the next one
            Err(_) if self.player.generation() != generation => {
                debug!(position, "playback moved before capture, discarding tick");
                return Ok(TickOutcome::Discarded);
            }
            Err(e) => return Err(CensorError::FrameCaptureFailure(e)),
        };
        let detections = self.detector.detect(&frame, self.settings.detect_mode)?;

        report.labels = detections.iter().map(|d| d.label.clone()).collect();
        info!("{:.2}s {:?}", position, report.labels);

        if self.player.generation() != generation {
            debug!(position, "playback moved during tick, discarding placements");
            return Ok(TickOutcome::Discarded);
        }

        for detection in detections {
            if !self.ctx.policy.admits(&detection.label) {
                continue;
            }
            if let (Some(min), Some(confidence)) = (self.settings.min_confidence, detection.confidence) {
                if confidence < min {
                    debug!(label = %detection.label, confidence, "below confidence floor");
                    continue;
                }
            }

            let Some(bbox) = detection
                .bbox
                .clamp_to(geometry.video_width, geometry.video_height)
            else {
                debug!(label = %detection.label, bbox = ?detection.bbox, "box outside frame, rejected");
                continue;
            };

            let rect = transform::map(&bbox, &geometry)?;
            if !rect.has_area() {
                continue;
            }

            match self
                .ctx
                .ledger
                .allocate(&mut self.player, rect, self.settings.overlay_ttl, now)
            {
                Ok(_) => report.allocated += 1,
                Err(e) => {
                    warn!(position, label = %detection.label, error = %e, "overlay not placed");
                    report.overlay_failures += 1;
                }
            }
        }

        Ok(TickOutcome::Completed)
    }

    fn record_health(&mut self, report: &TickReport) {
        let was_degraded = self.is_degraded();

        if report.had_playback_failure() {
            self.ctx.consecutive_failures += 1;
        } else if matches!(report.outcome, TickOutcome::Completed | TickOutcome::Discarded) {
            self.ctx.consecutive_failures = 0;
        }

        let degraded = self.is_degraded();
        if degraded && !was_degraded {
            self.ctx.ever_degraded = true;
            warn!(
                failures = self.ctx.consecutive_failures,
                "player keeps failing requests, censoring is degraded"
            );
        } else if was_degraded && !degraded {
            info!("player recovered, censoring resumed");
        }
    }

    fn is_degraded(&self) -> bool {
        self.ctx.consecutive_failures >= self.settings.degraded_after.max(1)
    }

    pub fn health(&self) -> Health {
        if self.is_degraded() {
            Health::Degraded {
                consecutive_failures: self.ctx.consecutive_failures,
            }
        } else {
            Health::Healthy
        }
    }

    /// Whether degraded mode was entered at any point this session
    pub fn was_degraded(&self) -> bool {
        self.ctx.ever_degraded
    }

    /// End of session: remove every overlay still on screen
    pub fn finish(&mut self) -> SweepReport {
        let report = self.ctx.ledger.flush(&mut self.player);
        debug!(removed = report.removed, "flushed overlays");
        report
    }

    #[cfg(test)]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    #[cfg(test)]
    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    #[cfg(test)]
    pub fn detector(&self) -> &D {
        &self.detector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{capture_logs, detection, FakePlayer, ScriptedDetector};
    use crate::sync::GeometryField;

    const LABEL: &str = "EXPOSED_BREAST_F";

    fn controller(detector: ScriptedDetector) -> SyncController<FakePlayer, ScriptedDetector> {
        let mut c = SyncController::new(
            FakePlayer::new(),
            detector,
            LabelPolicy::default(),
            ControllerSettings::default(),
        );
        set_geometry(&mut c, [0.0, 0.0, 800.0, 450.0, 1920.0, 1080.0]);
        c
    }

    fn set_geometry(c: &mut SyncController<FakePlayer, ScriptedDetector>, values: [f64; 6]) {
        for (field, value) in GeometryField::ALL.into_iter().zip(values) {
            c.handle_event(
                PlayerEvent::GeometryUpdated {
                    field,
                    value: Some(value),
                },
                Instant::now(),
            );
        }
    }

    fn secs(base: Instant, s: f64) -> Instant {
        base + Duration::from_secs_f64(s)
    }

    #[test]
    fn non_positive_or_missing_position_is_ignored() {
        let mut c = controller(ScriptedDetector::new());
        for position in [None, Some(0.0), Some(-1.5)] {
            let report = c.tick(position, Instant::now());
            assert!(matches!(report.outcome, TickOutcome::Ignored));
        }
        assert_eq!(c.player().captures, 0);
        assert_eq!(c.detector().calls, 0);
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[test]
    fn admitted_detection_becomes_overlay() {
        let detector = ScriptedDetector::new().then_ok(vec![
            detection(LABEL, 960.0, 540.0, 1920.0, 1080.0),
            detection("FACE_F", 0.0, 0.0, 100.0, 100.0),
        ]);
        let mut c = controller(detector);

        let report = c.tick(Some(1.0), Instant::now());
        assert!(matches!(report.outcome, TickOutcome::Completed));
        assert_eq!(report.labels, vec![LABEL.to_string(), "FACE_F".to_string()]);
        assert_eq!(report.allocated, 1);
        assert_eq!(
            c.player().created,
            vec![transform::ScreenRect::new(400, 225, 400, 225)]
        );
        assert_eq!(c.context().ledger.len(), 1);
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[test]
    fn incomplete_geometry_aborts_before_capture() {
        let detector = ScriptedDetector::new().then_ok(vec![detection(LABEL, 0.0, 0.0, 10.0, 10.0)]);
        let mut c = controller(detector);
        c.handle_event(
            PlayerEvent::GeometryUpdated {
                field: GeometryField::VideoWidth,
                value: None,
            },
            Instant::now(),
        );

        let report = c.tick(Some(3.0), Instant::now());
        assert!(matches!(
            report.outcome,
            TickOutcome::Aborted(CensorError::IncompleteGeometry { .. })
        ));
        assert_eq!(c.player().captures, 0);
        assert_eq!(c.detector().calls, 0);
        assert!(c.player().created.is_empty());
        assert_eq!(c.health(), Health::Healthy);

        // geometry arrives, next tick proceeds
        c.handle_event(
            PlayerEvent::GeometryUpdated {
                field: GeometryField::VideoWidth,
                value: Some(1920.0),
            },
            Instant::now(),
        );
        let report = c.tick(Some(3.1), Instant::now());
        assert_eq!(report.allocated, 1);
    }

    #[test]
    fn overlays_expire_after_ttl() {
        let detector = ScriptedDetector::new()
            .then_ok(vec![detection(LABEL, 0.0, 0.0, 960.0, 540.0)])
            .then_ok(vec![detection(LABEL, 0.0, 0.0, 960.0, 540.0)])
            .then_ok(vec![detection(LABEL, 0.0, 0.0, 960.0, 540.0)]);
        let mut c = controller(detector);
        let base = Instant::now();

        let first = c.tick(Some(10.0), secs(base, 0.0));
        let second = c.tick(Some(11.9), secs(base, 1.9));
        assert_eq!((first.allocated, second.allocated), (1, 1));
        assert_eq!(second.swept.removed, 0);
        assert_eq!(c.context().ledger.len(), 2);

        // the t=0 overlay expired at t=2, the t=1.9 one lives until t=3.9
        let third = c.tick(Some(12.1), secs(base, 2.1));
        assert_eq!(third.swept.removed, 1);
        assert_eq!(c.player().removed, vec![0]);
        assert_eq!(third.allocated, 1);
        assert_eq!(c.context().ledger.len(), 2);

        let fourth = c.tick(Some(14.0), secs(base, 4.0));
        assert_eq!(fourth.swept.removed, 1);
        assert_eq!(c.player().removed, vec![0, 1]);
    }

    #[test]
    fn detection_failure_skips_only_that_tick() {
        let detector = ScriptedDetector::new()
            .then_err()
            .then_ok(vec![detection(LABEL, 0.0, 0.0, 100.0, 100.0)]);
        let mut c = controller(detector);

        let failed = c.tick(Some(1.0), Instant::now());
        assert!(matches!(
            failed.outcome,
            TickOutcome::Aborted(CensorError::DetectionFailure(_))
        ));
        assert_eq!(failed.allocated, 0);
        assert!(c.player().created.is_empty());
        assert_eq!(c.state(), ControllerState::Idle);

        let next = c.tick(Some(1.1), Instant::now());
        assert!(matches!(next.outcome, TickOutcome::Completed));
        assert_eq!(next.allocated, 1);
        assert_eq!(c.health(), Health::Healthy);
    }

    #[test]
    fn out_of_frame_boxes_are_clamped_or_rejected() {
        let detector = ScriptedDetector::new().then_ok(vec![
            detection(LABEL, 1800.0, 1000.0, 2400.0, 1400.0),
            detection(LABEL, 2000.0, 0.0, 2100.0, 100.0),
            detection(LABEL, 500.0, 500.0, 400.0, 600.0),
        ]);
        let mut c = controller(detector);

        let report = c.tick(Some(1.0), Instant::now());
        assert_eq!(report.allocated, 1);
        // clamped to (1800, 1000)-(1920, 1080)
        assert_eq!(c.player().created, vec![transform::ScreenRect::new(750, 416, 50, 33)]);
    }

    #[test]
    fn confidence_floor_filters_low_scores() {
        let mut low = detection(LABEL, 0.0, 0.0, 100.0, 100.0);
        low.confidence = Some(0.2);
        let mut unscored = detection(LABEL, 0.0, 0.0, 100.0, 100.0);
        unscored.confidence = None;
        let detector = ScriptedDetector::new().then_ok(vec![low, unscored]);

        let mut c = SyncController::new(
            FakePlayer::new(),
            detector,
            LabelPolicy::default(),
            ControllerSettings {
                min_confidence: Some(0.5),
                ..ControllerSettings::default()
            },
        );
        set_geometry(&mut c, [0.0, 0.0, 800.0, 450.0, 1920.0, 1080.0]);

        assert_eq!(c.tick(Some(1.0), Instant::now()).allocated, 1);
    }

    #[test]
    fn empty_policy_places_nothing() {
        let detector = ScriptedDetector::new().then_ok(vec![detection(LABEL, 0.0, 0.0, 100.0, 100.0)]);
        let mut c = SyncController::new(
            FakePlayer::new(),
            detector,
            LabelPolicy::new(Vec::<String>::new()),
            ControllerSettings::default(),
        );
        set_geometry(&mut c, [0.0, 0.0, 800.0, 450.0, 1920.0, 1080.0]);

        let report = c.tick(Some(1.0), Instant::now());
        assert!(matches!(report.outcome, TickOutcome::Completed));
        assert_eq!(report.allocated, 0);
    }

    #[test]
    fn seek_during_tick_discards_placements() {
        let detector = ScriptedDetector::new().then_ok(vec![detection(LABEL, 0.0, 0.0, 100.0, 100.0)]);
        let mut c = controller(detector);
        c.player_mut().seek_during_capture = true;

        let report = c.tick(Some(5.0), Instant::now());
        assert!(matches!(report.outcome, TickOutcome::Discarded));
        assert!(c.player().created.is_empty());
    }

    #[test]
    fn seek_before_capture_discards_without_counting_failure() {
        let detector = ScriptedDetector::new().then_ok(vec![detection(LABEL, 0.0, 0.0, 100.0, 100.0)]);
        let mut c = SyncController::new(
            FakePlayer::new(),
            detector,
            LabelPolicy::default(),
            ControllerSettings {
                degraded_after: 1,
                ..ControllerSettings::default()
            },
        );
        set_geometry(&mut c, [0.0, 0.0, 800.0, 450.0, 1920.0, 1080.0]);
        // the seek clears the old frame before the tick can grab it
        c.player_mut().seek_during_capture = true;
        c.player_mut().fail_captures = true;

        let report = c.tick(Some(5.0), Instant::now());
        assert!(matches!(report.outcome, TickOutcome::Discarded));
        assert!(!report.had_playback_failure());
        assert_eq!(c.detector().calls, 0);
        assert_eq!(c.health(), Health::Healthy);
    }

    #[test]
    fn failed_expiry_is_logged_with_tick_position() {
        let detector = ScriptedDetector::new().then_ok(vec![detection(LABEL, 0.0, 0.0, 100.0, 100.0)]);
        let mut c = controller(detector);
        let base = Instant::now();
        c.tick(Some(1.0), base);
        c.player_mut().fail_removes = true;

        let mut report = None;
        let logs = capture_logs(|| report = Some(c.tick(Some(3.5), secs(base, 2.5))));

        let report = report.unwrap();
        assert_eq!(report.swept.failures, 1);
        assert!(report.had_playback_failure());
        let line = logs
            .lines()
            .find(|line| line.contains("expired overlays were not removed cleanly"))
            .expect("sweep failure logged");
        assert!(line.contains("WARN"), "{line}");
        assert!(line.contains("position=3.5"), "{line}");
        assert!(line.contains("failures=1"), "{line}");
    }

    #[test]
    fn repeated_player_failures_degrade_then_recover() {
        let mut c = controller(ScriptedDetector::new());
        c.player_mut().fail_captures = true;

        for i in 1..DEFAULT_DEGRADED_AFTER {
            let report = c.tick(Some(i as f64), Instant::now());
            assert!(matches!(
                report.outcome,
                TickOutcome::Aborted(CensorError::FrameCaptureFailure(_))
            ));
            assert_eq!(c.health(), Health::Healthy);
        }
        c.tick(Some(10.0), Instant::now());
        assert_eq!(
            c.health(),
            Health::Degraded {
                consecutive_failures: DEFAULT_DEGRADED_AFTER
            }
        );

        c.player_mut().fail_captures = false;
        c.tick(Some(11.0), Instant::now());
        assert_eq!(c.health(), Health::Healthy);
        assert!(c.was_degraded());
    }

    #[test]
    fn overlay_failures_count_toward_degraded_mode() {
        let detector = (0..3).fold(ScriptedDetector::new(), |d, _| {
            d.then_ok(vec![detection(LABEL, 0.0, 0.0, 100.0, 100.0)])
        });
        let mut c = SyncController::new(
            FakePlayer::new(),
            detector,
            LabelPolicy::default(),
            ControllerSettings {
                degraded_after: 3,
                ..ControllerSettings::default()
            },
        );
        set_geometry(&mut c, [0.0, 0.0, 800.0, 450.0, 1920.0, 1080.0]);
        c.player_mut().fail_creates = true;

        for i in 0..3 {
            let report = c.tick(Some(1.0 + i as f64), Instant::now());
            assert!(matches!(report.outcome, TickOutcome::Completed));
            assert_eq!(report.overlay_failures, 1);
        }
        assert!(matches!(c.health(), Health::Degraded { .. }));
    }

    #[test]
    fn finish_flushes_live_overlays() {
        let detector = ScriptedDetector::new().then_ok(vec![
            detection(LABEL, 0.0, 0.0, 100.0, 100.0),
            detection(LABEL, 200.0, 200.0, 300.0, 300.0),
        ]);
        let mut c = controller(detector);
        c.tick(Some(1.0), Instant::now());
        assert_eq!(c.player().live.len(), 2);

        assert_eq!(c.finish().removed, 2);
        assert!(c.player().live.is_empty());
        assert!(c.context().ledger.is_empty());
    }
}
