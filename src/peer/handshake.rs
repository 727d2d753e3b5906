//! Handshake state and the identity-probe initiator.
//!
//! # States
//! ```text
//! Unidentified → Pending → Established
//!
//! Unidentified: slot has no handshake activity
//! Pending:      our identity is being probed, or one side is still missing
//! Established:  remote identity mapped and our identity acknowledged
//! ```
//!
//! # Initiator
//! On `New`, the slot's dispatch loop starts an initiator that sends
//! `ID:<self>` once per probe interval until the slot signals `Accepted`
//! or `Closed`, or the probe policy runs out.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::HandshakeConfig;

/// Handshake progress of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Unidentified,
    Pending,
    Established,
}

impl HandshakeState {
    pub fn is_established(&self) -> bool {
        matches!(self, HandshakeState::Established)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Unidentified => write!(f, "unidentified"),
            HandshakeState::Pending => write!(f, "pending"),
            HandshakeState::Established => write!(f, "established"),
        }
    }
}

/// What the dispatch loop tells a running initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSignal {
    Open,
    Accepted,
    Closed,
}

/// How an initiator finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The remote acknowledged our identity.
    Accepted,
    /// The slot closed or the node is shutting down.
    Cancelled,
    /// Timeout or probe limit reached without an acknowledgment.
    Exhausted { probes: u32 },
}

/// Probe timing and limits.
#[derive(Debug, Clone)]
pub struct ProbePolicy {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub max_probes: Option<u32>,
}

impl ProbePolicy {
    fn exhausted(&self, started: Instant, probes: u32) -> bool {
        self.timeout.is_some_and(|t| started.elapsed() >= t)
            || self.max_probes.is_some_and(|max| probes >= max)
    }
}

impl From<&HandshakeConfig> for ProbePolicy {
    fn from(config: &HandshakeConfig) -> Self {
        Self {
            interval: config.probe_interval(),
            timeout: config.timeout(),
            max_probes: config.max_probes,
        }
    }
}

/// Probe until acknowledged, cancelled or exhausted.
///
/// `send_probe` writes one identity frame and returns false once the slot
/// can no longer be written to. The first probe goes out one interval after
/// the call.
pub async fn run_initiator<F, Fut>(
    policy: ProbePolicy,
    mut signal: watch::Receiver<SlotSignal>,
    mut send_probe: F,
) -> ProbeOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(started + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut probes = 0u32;

    loop {
        let ticked = tokio::select! {
            _ = ticker.tick() => true,
            changed = signal.changed() => {
                if changed.is_err() {
                    return ProbeOutcome::Cancelled;
                }
                false
            }
        };

        let current = *signal.borrow_and_update();
        match current {
            SlotSignal::Accepted => return ProbeOutcome::Accepted,
            SlotSignal::Closed => return ProbeOutcome::Cancelled,
            SlotSignal::Open => {}
        }

        if !ticked {
            continue;
        }

        if policy.exhausted(started, probes) {
            return ProbeOutcome::Exhausted { probes };
        }

        if !send_probe().await {
            return ProbeOutcome::Cancelled;
        }
        probes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(interval_ms: u64) -> ProbePolicy {
        ProbePolicy {
            interval: Duration::from_millis(interval_ms),
            timeout: None,
            max_probes: None,
        }
    }

    fn counting_probe(count: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<bool> {
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(true)
        }
    }

    #[tokio::test]
    async fn stops_when_accepted() {
        let (tx, rx) = watch::channel(SlotSignal::Open);
        let count = Arc::new(AtomicU32::new(0));
        let task = tokio::spawn(run_initiator(policy(10), rx, counting_probe(count.clone())));

        while count.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(SlotSignal::Accepted).unwrap();

        assert_eq!(task.await.unwrap(), ProbeOutcome::Accepted);
    }

    #[tokio::test]
    async fn cancelled_when_sender_dropped() {
        let (tx, rx) = watch::channel(SlotSignal::Open);
        let task = tokio::spawn(run_initiator(policy(1_000), rx, || std::future::ready(true)));
        drop(tx);
        assert_eq!(task.await.unwrap(), ProbeOutcome::Cancelled);
    }

    #[tokio::test]
    async fn cancelled_on_closed_signal() {
        let (tx, rx) = watch::channel(SlotSignal::Open);
        let task = tokio::spawn(run_initiator(policy(1_000), rx, || std::future::ready(true)));
        tx.send(SlotSignal::Closed).unwrap();
        assert_eq!(task.await.unwrap(), ProbeOutcome::Cancelled);
    }

    #[tokio::test]
    async fn probe_limit_exhausts() {
        let (_tx, rx) = watch::channel(SlotSignal::Open);
        let count = Arc::new(AtomicU32::new(0));
        let mut limited = policy(5);
        limited.max_probes = Some(3);

        let outcome = run_initiator(limited, rx, counting_probe(count.clone())).await;
        assert_eq!(outcome, ProbeOutcome::Exhausted { probes: 3 });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_exhausts() {
        let (_tx, rx) = watch::channel(SlotSignal::Open);
        let mut limited = policy(5);
        limited.timeout = Some(Duration::from_millis(30));

        let outcome = run_initiator(limited, rx, || std::future::ready(true)).await;
        assert!(matches!(outcome, ProbeOutcome::Exhausted { .. }));
    }

    #[tokio::test]
    async fn failed_write_cancels() {
        let (_tx, rx) = watch::channel(SlotSignal::Open);
        let outcome = run_initiator(policy(5), rx, || std::future::ready(false)).await;
        assert_eq!(outcome, ProbeOutcome::Cancelled);
    }

    #[test]
    fn state_display() {
        assert_eq!(HandshakeState::default().to_string(), "unidentified");
        assert!(HandshakeState::Established.is_established());
    }
}
