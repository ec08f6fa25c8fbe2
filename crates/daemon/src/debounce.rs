//! Per-target debounce state driven by an explicit clock.
//!
//! The scheduler is pure: callers pass `now` in and drive the single timer
//! from [`Debouncer::next_deadline`]. At most one pending entry exists per
//! target, so a target never has two scheduled firings.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use provsync_core::config::TriggerPolicy;
use provsync_core::ReloadTarget;

/// Debounce state for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReload<T> {
    pub deadline: Instant,
    /// Payload to fire at the deadline. Under the immediate policy this is
    /// `None` until an event arrives after the burst's first (already fired) one.
    pub latest: Option<T>,
}

#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    policy: TriggerPolicy,
    pending: BTreeMap<ReloadTarget, PendingReload<T>>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration, policy: TriggerPolicy) -> Self {
        Self {
            window,
            policy,
            pending: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a qualifying event for `target`, keeping it as the latest payload.
    ///
    /// Trailing: every event pushes the deadline to `now + window`.
    /// Immediate: the first event of a burst is returned to fire right away and
    /// fixes the deadline; later events only replace the payload, which fires
    /// once more when that deadline passes.
    pub fn offer(&mut self, target: ReloadTarget, payload: T, now: Instant) -> Option<T> {
        let deadline = now + self.window;

        if let Some(pending) = self.pending.get_mut(&target) {
            if self.policy == TriggerPolicy::Trailing {
                pending.deadline = deadline;
            }
            pending.latest = Some(payload);
            return None;
        }

        match self.policy {
            TriggerPolicy::Trailing => {
                self.pending.insert(target, PendingReload { deadline, latest: Some(payload) });
                None
            }
            TriggerPolicy::Immediate => {
                self.pending.insert(target, PendingReload { deadline, latest: None });
                Some(payload)
            }
        }
    }

    /// Earliest deadline across all targets.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove every entry whose window has elapsed and return the payloads to fire.
    pub fn take_due(&mut self, now: Instant) -> Vec<(ReloadTarget, T)> {
        let due: Vec<ReloadTarget> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(t, _)| *t)
            .collect();

        due.into_iter()
            .filter_map(|target| {
                let pending = self.pending.remove(&target)?;
                pending.latest.map(|payload| (target, payload))
            })
            .collect()
    }

    pub fn is_pending(&self, target: ReloadTarget) -> bool {
        self.pending.contains_key(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(2);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn trailing_burst_collapses_to_latest_payload() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, TriggerPolicy::Trailing);

        assert_eq!(d.offer(ReloadTarget::Dashboards, 1, t0), None);
        assert_eq!(d.offer(ReloadTarget::Dashboards, 2, t0 + ms(300)), None);
        assert_eq!(d.offer(ReloadTarget::Dashboards, 3, t0 + ms(600)), None);

        assert_eq!(d.next_deadline(), Some(t0 + ms(2_600)));
        assert!(d.take_due(t0 + ms(2_599)).is_empty());
        assert_eq!(d.take_due(t0 + ms(2_600)), vec![(ReloadTarget::Dashboards, 3)]);
        assert!(!d.is_pending(ReloadTarget::Dashboards));
        assert_eq!(d.next_deadline(), None);
    }

    #[test]
    fn targets_debounce_independently() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, TriggerPolicy::Trailing);

        d.offer(ReloadTarget::Datasources, "ds", t0);
        for i in 0..5 {
            d.offer(ReloadTarget::Dashboards, "db", t0 + ms(500 * i));
        }

        // Dashboard churn does not delay the datasource firing.
        assert_eq!(d.next_deadline(), Some(t0 + WINDOW));
        assert_eq!(d.take_due(t0 + WINDOW), vec![(ReloadTarget::Datasources, "ds")]);
        assert!(d.is_pending(ReloadTarget::Dashboards));
        assert_eq!(d.take_due(t0 + ms(4_000)), vec![(ReloadTarget::Dashboards, "db")]);
    }

    #[test]
    fn immediate_keeps_first_deadline_and_fires_latest_follow_up() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, TriggerPolicy::Immediate);

        assert_eq!(d.offer(ReloadTarget::Dashboards, 1, t0), Some(1));
        assert_eq!(d.offer(ReloadTarget::Dashboards, 2, t0 + ms(1_500)), None);
        assert_eq!(d.offer(ReloadTarget::Dashboards, 3, t0 + ms(1_900)), None);

        // Later events do not move the deadline set by the first one.
        assert_eq!(d.next_deadline(), Some(t0 + WINDOW));
        assert!(d.take_due(t0 + ms(1_999)).is_empty());
        assert_eq!(d.take_due(t0 + WINDOW), vec![(ReloadTarget::Dashboards, 3)]);
        assert!(!d.is_pending(ReloadTarget::Dashboards));

        // Next burst fires again.
        assert_eq!(d.offer(ReloadTarget::Dashboards, 4, t0 + ms(6_000)), Some(4));
    }

    #[test]
    fn immediate_single_event_has_no_follow_up() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, TriggerPolicy::Immediate);

        assert_eq!(d.offer(ReloadTarget::Datasources, "a", t0), Some("a"));
        assert!(d.take_due(t0 + ms(10_000)).is_empty());
        assert!(!d.is_pending(ReloadTarget::Datasources));
    }

    #[test]
    fn spaced_events_each_fire() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW, TriggerPolicy::Trailing);
        let mut fired = Vec::new();

        for i in 0..4u64 {
            let at = t0 + ms(3_000 * i);
            fired.extend(d.take_due(at));
            d.offer(ReloadTarget::Datasources, i, at);
        }
        fired.extend(d.take_due(t0 + ms(20_000)));

        assert_eq!(fired.len(), 4);
        assert_eq!(fired.last(), Some(&(ReloadTarget::Datasources, 3)));
    }
}
