//! Simulated link endpoints.
//!
//! Each endpoint owns the sending half of one `crossbeam-channel` and the
//! receiving half of the other. A datagram is stamped with its delivery time
//! when it is sent; the receiver buffers it until [`LinkEndpoint::poll`] is
//! called with a time at or after that stamp.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Network conditions applied to every datagram sent over a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    /// One-way base latency in milliseconds.
    pub latency_ms: u32,
    /// Maximum deviation from the base latency, in either direction (ms).
    pub jitter_ms: u32,
    /// Probability in `[0, 1]` that an unreliable datagram is lost.
    pub packet_loss: f32,
}

impl LinkConfig {
    /// Zero latency, no jitter, no loss.
    pub const IDEAL: Self = Self {
        latency_ms: 0,
        jitter_ms: 0,
        packet_loss: 0.0,
    };
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            latency_ms: 80,
            jitter_ms: 10,
            packet_loss: 0.05,
        }
    }
}

/// Delivery class of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    /// Never dropped, delivered in send order relative to other reliable datagrams.
    Reliable,
    /// Subject to loss and reordering.
    Unreliable,
}

// ---------------------------------------------------------------------------
// Errors & stats
// ---------------------------------------------------------------------------

/// Errors returned by [`LinkEndpoint`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LinkError {
    /// The peer endpoint has been dropped.
    #[error("link peer disconnected")]
    Disconnected,
}

/// Per-endpoint traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Datagrams handed to [`LinkEndpoint::send`].
    pub sent: u64,
    /// Sent datagrams discarded by simulated loss.
    pub dropped: u64,
    /// Datagrams returned from [`LinkEndpoint::poll`].
    pub delivered: u64,
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

struct Datagram {
    deliver_at_ms: u64,
    sequence: u64,
    payload: Vec<u8>,
}

/// One side of a simulated link.
pub struct LinkEndpoint {
    config: LinkConfig,
    tx: Sender<Datagram>,
    rx: Receiver<Datagram>,
    rng: Xoshiro256StarStar,
    /// Received datagrams not yet due.
    in_flight: Vec<Datagram>,
    next_sequence: u64,
    /// Delivery stamp of the last reliable datagram sent; later ones never undercut it.
    last_reliable_at_ms: u64,
    /// Set once a send or poll finds the peer gone.
    disconnected: bool,
    stats: LinkStats,
}

/// Creates two connected endpoints sharing `config`.
///
/// Both directions draw loss and jitter from their own generator derived
/// from `seed`, so a run is reproducible.
pub fn link_pair(config: LinkConfig, seed: u64) -> (LinkEndpoint, LinkEndpoint) {
    let (a_tx, b_rx) = crossbeam_channel::unbounded();
    let (b_tx, a_rx) = crossbeam_channel::unbounded();
    (
        LinkEndpoint::new(config, a_tx, a_rx, seed),
        LinkEndpoint::new(config, b_tx, b_rx, seed.wrapping_add(0x9E37_79B9_7F4A_7C15)),
    )
}

impl LinkEndpoint {
    fn new(config: LinkConfig, tx: Sender<Datagram>, rx: Receiver<Datagram>, seed: u64) -> Self {
        Self {
            config,
            tx,
            rx,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            in_flight: Vec::new(),
            next_sequence: 0,
            last_reliable_at_ms: 0,
            disconnected: false,
            stats: LinkStats::default(),
        }
    }

    /// Send `payload` at link time `now_ms`.
    ///
    /// A datagram lost to simulated packet loss still counts as sent and
    /// returns `Ok`. Fails only when the peer endpoint is gone.
    pub fn send(
        &mut self,
        now_ms: u64,
        payload: Vec<u8>,
        reliability: Reliability,
    ) -> Result<(), LinkError> {
        self.stats.sent += 1;

        if reliability == Reliability::Unreliable
            && self.config.packet_loss > 0.0
            && self.rng.r#gen::<f32>() < self.config.packet_loss
        {
            self.stats.dropped += 1;
            tracing::trace!(now_ms, bytes = payload.len(), "datagram lost");
            return Ok(());
        }

        let mut deliver_at_ms = now_ms + self.sample_delay_ms();
        if reliability == Reliability::Reliable {
            deliver_at_ms = deliver_at_ms.max(self.last_reliable_at_ms);
            self.last_reliable_at_ms = deliver_at_ms;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let sent = self.tx.send(Datagram {
            deliver_at_ms,
            sequence,
            payload,
        });
        if sent.is_err() {
            self.disconnected = true;
            return Err(LinkError::Disconnected);
        }
        Ok(())
    }

    /// Returns every datagram due at `now_ms`, ordered by delivery time.
    pub fn poll(&mut self, now_ms: u64) -> Vec<Vec<u8>> {
        loop {
            match self.rx.try_recv() {
                Ok(datagram) => self.in_flight.push(datagram),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }

        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|d| d.deliver_at_ms <= now_ms);
        self.in_flight = pending;

        due.sort_by_key(|d| (d.deliver_at_ms, d.sequence));
        self.stats.delivered += due.len() as u64;
        due.into_iter().map(|d| d.payload).collect()
    }

    /// `false` once a send or poll has found the peer endpoint gone.
    pub fn is_connected(&self) -> bool {
        !self.disconnected
    }

    /// Datagrams received but not yet due.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len() + self.rx.len()
    }

    /// Traffic counters for this endpoint.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    fn sample_delay_ms(&mut self) -> u64 {
        let base = i64::from(self.config.latency_ms);
        let jitter = i64::from(self.config.jitter_ms);
        let offset = if jitter > 0 {
            self.rng.gen_range(-jitter..=jitter)
        } else {
            0
        };
        (base + offset).max(0) as u64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_latency(latency_ms: u32) -> LinkConfig {
        LinkConfig {
            latency_ms,
            jitter_ms: 0,
            packet_loss: 0.0,
        }
    }

    #[test]
    fn test_ideal_link_delivers_immediately_in_order() {
        let (mut a, mut b) = link_pair(LinkConfig::IDEAL, 1);
        for i in 0..5u8 {
            a.send(10, vec![i], Reliability::Unreliable).unwrap();
        }
        let received = b.poll(10);
        assert_eq!(received, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn test_latency_holds_datagram_until_due() {
        let (mut a, mut b) = link_pair(fixed_latency(50), 1);
        a.send(100, vec![7], Reliability::Unreliable).unwrap();

        assert!(b.poll(149).is_empty());
        assert_eq!(b.in_flight(), 1);
        assert_eq!(b.poll(150), vec![vec![7]]);
        assert_eq!(b.in_flight(), 0);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = LinkConfig {
            latency_ms: 50,
            jitter_ms: 10,
            packet_loss: 0.0,
        };
        let (mut a, mut b) = link_pair(config, 9);
        for i in 0..200u32 {
            a.send(0, i.to_le_bytes().to_vec(), Reliability::Unreliable)
                .unwrap();
        }
        assert!(b.poll(39).is_empty());
        assert_eq!(b.poll(60).len(), 200);
    }

    #[test]
    fn test_full_loss_spares_reliable_datagrams() {
        let config = LinkConfig {
            latency_ms: 0,
            jitter_ms: 0,
            packet_loss: 1.0,
        };
        let (mut a, mut b) = link_pair(config, 3);
        a.send(0, vec![1], Reliability::Unreliable).unwrap();
        a.send(0, vec![2], Reliability::Reliable).unwrap();
        a.send(0, vec![3], Reliability::Unreliable).unwrap();

        assert_eq!(b.poll(0), vec![vec![2]]);
        let stats = a.stats();
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.dropped, 2);
        assert_eq!(b.stats().delivered, 1);
    }

    #[test]
    fn test_partial_loss_rate_is_plausible() {
        let config = LinkConfig {
            latency_ms: 0,
            jitter_ms: 0,
            packet_loss: 0.5,
        };
        let (mut a, mut b) = link_pair(config, 42);
        for _ in 0..1000 {
            a.send(0, vec![0], Reliability::Unreliable).unwrap();
        }
        let delivered = b.poll(0).len();
        assert!(
            (350..=650).contains(&delivered),
            "expected roughly half delivered, got {delivered}"
        );
    }

    #[test]
    fn test_reliable_order_survives_jitter() {
        let config = LinkConfig {
            latency_ms: 20,
            jitter_ms: 20,
            packet_loss: 0.3,
        };
        let (mut a, mut b) = link_pair(config, 5);
        for i in 0..50u8 {
            a.send(u64::from(i), vec![i], Reliability::Reliable).unwrap();
        }
        let received: Vec<u8> = b.poll(1_000).into_iter().map(|p| p[0]).collect();
        assert_eq!(received, (0..50).collect::<Vec<u8>>());
    }

    #[test]
    fn test_same_seed_same_losses() {
        let run = |seed| {
            let (mut a, mut b) = link_pair(LinkConfig::default(), seed);
            for i in 0..100u32 {
                a.send(u64::from(i), i.to_le_bytes().to_vec(), Reliability::Unreliable)
                    .unwrap();
            }
            b.poll(10_000)
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_both_directions_work() {
        let (mut a, mut b) = link_pair(fixed_latency(5), 1);
        a.send(0, b"ping".to_vec(), Reliability::Unreliable).unwrap();
        b.send(0, b"pong".to_vec(), Reliability::Unreliable).unwrap();
        assert_eq!(b.poll(5), vec![b"ping".to_vec()]);
        assert_eq!(a.poll(5), vec![b"pong".to_vec()]);
    }

    #[test]
    fn test_send_after_peer_dropped_fails() {
        let (mut a, b) = link_pair(LinkConfig::IDEAL, 1);
        assert!(a.is_connected());
        drop(b);
        assert_eq!(
            a.send(0, vec![1], Reliability::Reliable),
            Err(LinkError::Disconnected)
        );
        assert!(!a.is_connected());
    }

    #[test]
    fn test_poll_notices_dropped_peer() {
        let (mut a, mut b) = link_pair(LinkConfig::IDEAL, 1);
        b.send(0, vec![7], Reliability::Reliable).unwrap();
        drop(b);

        // Already-sent datagrams are still delivered.
        assert_eq!(a.poll(0), vec![vec![7]]);
        assert!(!a.is_connected());
        assert!(a.poll(10).is_empty());
    }
}
