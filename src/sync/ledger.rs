// Overlay lifecycle: allocation, expiry sweep, final flush
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::OverlayImageCache;
use crate::error::{CensorError, CensorResult};
use crate::playback::{OverlayId, Playback};

use super::transform::ScreenRect;

/// Default overlay time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(2);

/// A live overlay and when it should disappear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayHandle {
    pub id: OverlayId,
    pub expires_at: Instant,
}

/// Outcome of a sweep or flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Handles dropped from tracking
    pub removed: usize,
    /// Of those, how many the player failed to remove
    pub failures: usize,
}

/// Tracks every overlay this session created until it is removed.
///
/// Each handle leaves the ledger exactly once. If the player fails to
/// remove an overlay the handle is still dropped; retrying could remove an
/// id the player has since reissued.
#[derive(Default)]
pub struct OverlayLedger {
    active: Vec<OverlayHandle>,
    images: OverlayImageCache,
    created: u64,
    removed: u64,
}

impl OverlayLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an opaque overlay at `rect` that expires `ttl` after `now`
    pub fn allocate<P: Playback + ?Sized>(
        &mut self,
        player: &mut P,
        rect: ScreenRect,
        ttl: Duration,
        now: Instant,
    ) -> CensorResult<OverlayHandle> {
        let image = self
            .images
            .get_or_render(rect.width.max(0) as u32, rect.height.max(0) as u32);

        let id = player
            .create_overlay(rect, &image)
            .map_err(CensorError::OverlayCollaboratorFailure)?;

        let handle = OverlayHandle {
            id,
            expires_at: now + ttl,
        };
        self.active.push(handle);
        self.created += 1;

        debug!(id, ?rect, "overlay created");
        Ok(handle)
    }

    /// Remove every overlay whose expiry is at or before `now`
    pub fn sweep<P: Playback + ?Sized>(&mut self, player: &mut P, now: Instant) -> SweepReport {
        // Partition first, then release; never remove while traversing
        let (expired, retained): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|handle| handle.expires_at <= now);
        self.active = retained;

        self.release(player, expired)
    }

    /// Remove everything, used when the session ends
    pub fn flush<P: Playback + ?Sized>(&mut self, player: &mut P) -> SweepReport {
        let all = std::mem::take(&mut self.active);
        self.release(player, all)
    }

    fn release<P: Playback + ?Sized>(
        &mut self,
        player: &mut P,
        handles: Vec<OverlayHandle>,
    ) -> SweepReport {
        let mut report = SweepReport::default();

        for handle in handles {
            if let Err(e) = player.remove_overlay(handle.id) {
                debug!(id = handle.id, error = %e, "overlay removal failed");
                report.failures += 1;
            }
            report.removed += 1;
            self.removed += 1;
        }

        report
    }

    /// Handles currently tracked
    #[cfg(test)]
    pub fn active(&self) -> &[OverlayHandle] {
        &self.active
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Overlays created over the ledger's lifetime
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Overlays removed over the ledger's lifetime
    pub fn removed(&self) -> u64 {
        self.removed
    }
}
