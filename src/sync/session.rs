// Event loop driving one playback session
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::detect::Detector;
use crate::playback::Playback;

use super::controller::{SyncController, TickOutcome, TickReport};
use super::events::PlayerEvent;

/// Totals for a finished session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    /// Ticks handed to the controller
    pub ticks: usize,
    /// Position updates superseded by a newer one before they ran
    pub coalesced: usize,
    /// Ticks that ended in an abort
    pub failed_ticks: usize,
    pub overlays_created: u64,
    pub overlays_removed: u64,
    /// The player was unreliable at some point
    pub degraded: bool,
}

/// Drive `controller` from player events until end of file or until the
/// player goes away, then flush remaining overlays.
///
/// Position updates that queue up while a tick runs are collapsed to the
/// newest one. `on_tick` sees every tick that was processed.
pub fn run_session<P, D, F>(
    controller: &mut SyncController<P, D>,
    events: &Receiver<PlayerEvent>,
    mut on_tick: F,
) -> SessionSummary
where
    P: Playback,
    D: Detector,
    F: FnMut(&P, &TickReport),
{
    let mut summary = SessionSummary::default();

    while let Ok(first) = events.recv() {
        let mut latest: Option<Option<f64>> = None;
        let mut finished = false;

        for event in std::iter::once(first).chain(events.try_iter()) {
            match event {
                PlayerEvent::PositionChanged { position } => {
                    if latest.replace(position).is_some() {
                        summary.coalesced += 1;
                    }
                }
                PlayerEvent::Seeked => {
                    // positions from before the seek are stale
                    if latest.take().is_some() {
                        summary.coalesced += 1;
                    }
                    controller.handle_event(PlayerEvent::Seeked, Instant::now());
                }
                PlayerEvent::EndOfFile => finished = true,
                geometry => {
                    controller.handle_event(geometry, Instant::now());
                }
            }
        }

        if finished {
            break;
        }

        if let Some(position) = latest {
            let report = controller.tick(position, Instant::now());
            match report.outcome {
                TickOutcome::Ignored => {}
                TickOutcome::Aborted(_) => {
                    summary.ticks += 1;
                    summary.failed_ticks += 1;
                }
                TickOutcome::Completed | TickOutcome::Discarded => summary.ticks += 1,
            }
            on_tick(controller.player(), &report);
        }
    }

    let flushed = controller.finish();
    debug!(removed = flushed.removed, "session flushed");

    let ledger = &controller.context().ledger;
    summary.overlays_created = ledger.created();
    summary.overlays_removed = ledger.removed();
    summary.degraded = controller.was_degraded();

    info!(
        ticks = summary.ticks,
        coalesced = summary.coalesced,
        failed = summary.failed_ticks,
        overlays = summary.overlays_created,
        "session finished"
    );
    summary
}
