//! Keep-alive heartbeat.
//!
//! One challenge is outstanding at a time. When the interval elapses and the
//! previous challenge is still unanswered, the session is considered dead.

use log::debug;
use std::time::Duration;

/// The challenge currently awaiting a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub challenge: u64,
    pub issued_ms: u64,
    pub waiting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessPoll {
    /// Nothing to do this time.
    Idle,
    /// Send this challenge to the client.
    Challenge(u64),
    /// The previous challenge went unanswered for a whole interval.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    interval_ms: u64,
    trusted: bool,
    ticket: Option<Ticket>,
    last_sent_ms: Option<u64>,
    ping_ms: u64,
}

impl LivenessMonitor {
    pub fn new(interval: Duration, trusted: bool) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            trusted,
            ticket: None,
            last_sent_ms: None,
            ping_ms: 0,
        }
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    pub fn is_waiting(&self) -> bool {
        self.ticket.map_or(false, |ticket| ticket.waiting)
    }

    /// Smoothed round-trip estimate.
    pub fn ping_ms(&self) -> u64 {
        self.ping_ms
    }

    /// Called every tick with the current wall-clock time in milliseconds.
    pub fn poll(&mut self, now_ms: u64) -> LivenessPoll {
        let due = match self.last_sent_ms {
            None => true,
            Some(sent) => now_ms.saturating_sub(sent) >= self.interval_ms,
        };
        if !due {
            return LivenessPoll::Idle;
        }

        if self.is_waiting() && !self.trusted {
            return LivenessPoll::TimedOut;
        }

        self.last_sent_ms = Some(now_ms);
        self.ticket = Some(Ticket {
            challenge: now_ms,
            issued_ms: now_ms,
            waiting: true,
        });
        LivenessPoll::Challenge(now_ms)
    }

    /// Handles a challenge echo. Returns the round-trip sample when it matched.
    pub fn respond(&mut self, challenge: u64, now_ms: u64) -> Option<u64> {
        let ticket = self.ticket.as_mut()?;
        if !ticket.waiting || ticket.challenge != challenge {
            debug!(
                "Ignoring keep-alive response {} (expected {})",
                challenge, ticket.challenge
            );
            return None;
        }

        ticket.waiting = false;
        let sample = now_ms.saturating_sub(ticket.issued_ms);
        self.ping_ms = (self.ping_ms * 3 + sample) / 4;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(15);

    #[test]
    fn test_first_poll_issues_challenge() {
        let mut monitor = LivenessMonitor::new(INTERVAL, false);
        assert_eq!(monitor.poll(1_000), LivenessPoll::Challenge(1_000));
        assert!(monitor.is_waiting());
        assert_eq!(monitor.poll(1_050), LivenessPoll::Idle);
    }

    #[test]
    fn test_round_trip_updates_ping() {
        let mut monitor = LivenessMonitor::new(INTERVAL, false);
        let LivenessPoll::Challenge(challenge) = monitor.poll(0) else {
            panic!("Expected a challenge");
        };

        assert_eq!(monitor.respond(challenge, 80), Some(80));
        assert!(!monitor.is_waiting());
        assert_eq!(monitor.ping_ms(), 20);

        // Answered in time, so the next interval issues a fresh challenge.
        assert_eq!(monitor.poll(15_000), LivenessPoll::Challenge(15_000));
        assert_eq!(monitor.respond(15_000, 15_040), Some(40));
        assert_eq!(monitor.ping_ms(), (20 * 3 + 40) / 4);
    }

    #[test]
    fn test_unanswered_challenge_times_out() {
        let mut monitor = LivenessMonitor::new(INTERVAL, false);
        assert_eq!(monitor.poll(0), LivenessPoll::Challenge(0));

        assert_eq!(monitor.poll(14_999), LivenessPoll::Idle);
        assert_eq!(monitor.poll(15_000), LivenessPoll::TimedOut);
        assert!(monitor.ticket().map_or(false, |t| t.waiting));
    }

    #[test]
    fn test_mismatched_response_is_ignored() {
        let mut monitor = LivenessMonitor::new(INTERVAL, false);
        monitor.poll(500);

        assert_eq!(monitor.respond(499, 600), None);
        assert!(monitor.is_waiting());
        assert_eq!(monitor.ping_ms(), 0);

        // A duplicate of an answered challenge does not count either.
        assert_eq!(monitor.respond(500, 600), Some(100));
        assert_eq!(monitor.respond(500, 700), None);
    }

    #[test]
    fn test_response_without_challenge() {
        let mut monitor = LivenessMonitor::new(INTERVAL, false);
        assert_eq!(monitor.respond(42, 100), None);
    }

    #[test]
    fn test_trusted_session_never_times_out() {
        let mut monitor = LivenessMonitor::new(INTERVAL, true);
        monitor.poll(0);
        assert_eq!(monitor.poll(15_000), LivenessPoll::Challenge(15_000));
        assert_eq!(monitor.poll(30_000), LivenessPoll::Challenge(30_000));
    }
}
