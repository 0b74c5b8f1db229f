//! Per-peer time and latency bookkeeping.
//!
//! A [`NetController`] exists on both ends of a connection. On the client it
//! owns the ping schedule and the clock-offset handshake; on the authority it
//! answers those requests and stores what the client reported. Outgoing
//! messages are queued and collected with [`NetController::drain_outbox`].

use std::sync::Arc;

use bevy_ecs::prelude::*;
use netcube_config::NetworkConfig;

use crate::clock::{ClockSync, LocalClock, TimeSource};
use crate::diagnostics::{DiagnosticsSink, NetEvent};
use crate::messages::NetMessage;
use crate::ping::{PeerPing, PingOutcome, PingTracker, PredictionWindow};

/// Which side of the connection this peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetMode {
    /// No network; prediction time is always zero.
    Standalone,
    /// Remote peer predicting against an authority.
    Client,
    /// Holds the authoritative simulation.
    Authority,
}

/// Clock, ping, and prediction window state for one peer.
#[derive(Resource)]
pub struct NetController {
    mode: NetMode,
    clock: LocalClock,
    sync: ClockSync,
    ping: PingTracker,
    peer_ping: PeerPing,
    window: PredictionWindow,
    desired_prediction_ping_ms: f32,
    outbox: Vec<NetMessage>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl NetController {
    /// Controller for `mode`, configured from the network section.
    pub fn new(mode: NetMode, config: &NetworkConfig, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            mode,
            clock: LocalClock::default(),
            sync: ClockSync::default(),
            ping: PingTracker::from_config(config),
            peer_ping: PeerPing::default(),
            window: PredictionWindow::from_config(config),
            desired_prediction_ping_ms: config.desired_prediction_ping_ms,
            outbox: Vec::new(),
            diagnostics,
        }
    }

    /// Client: propose the desired prediction window to the authority.
    ///
    /// The authority grants `clamp(desired, 0, server_max)`. Both peers share
    /// the bound, so the client applies the same clamp locally.
    pub fn begin_play(&mut self) {
        if self.mode == NetMode::Client {
            self.window.negotiate(self.desired_prediction_ping_ms);
            self.outbox.push(NetMessage::NegotiatePredictionPing {
                desired_ms: self.desired_prediction_ping_ms,
            });
        }
    }

    /// Advance local time; a client bounces a ping when the interval elapsed.
    pub fn tick(&mut self, delta_seconds: f32) {
        self.clock.advance(delta_seconds);

        if self.mode == NetMode::Client
            && let Some(timestamp) = self.ping.poll_bounce(self.clock.elapsed_secs())
        {
            self.outbox.push(NetMessage::BouncePing { timestamp });
        }
    }

    /// Client: invalidate the current timestamp and ask the authority for its time.
    pub fn request_new_timestamp(&mut self) {
        if self.mode != NetMode::Client {
            return;
        }
        self.sync.begin_request(self.clock.local_time_ms());
        self.outbox.push(NetMessage::RequestTimeStamp);
    }

    /// Handle a controller-level message. Returns `false` for pawn messages.
    pub fn handle(&mut self, message: &NetMessage) -> bool {
        if message.is_pawn_message() {
            return false;
        }

        match (self.mode, message) {
            (NetMode::Authority, NetMessage::BouncePing { timestamp }) => {
                self.outbox.push(NetMessage::ReturnPing {
                    timestamp: *timestamp,
                });
            }
            (NetMode::Authority, NetMessage::UpdatePing { exact_ping_ms }) => {
                self.peer_ping.update(*exact_ping_ms);
            }
            (NetMode::Authority, NetMessage::NegotiatePredictionPing { desired_ms }) => {
                let granted_ms = self.window.negotiate(*desired_ms);
                self.diagnostics.record(NetEvent::PredictionWindowNegotiated {
                    requested_ms: *desired_ms,
                    granted_ms,
                });
            }
            (NetMode::Authority, NetMessage::RequestTimeStamp) => {
                self.outbox.push(NetMessage::ServerSentTimeStamp {
                    server_time_ms: self.clock.local_time_ms(),
                });
            }

            (NetMode::Client, NetMessage::ReturnPing { timestamp }) => {
                self.on_return_ping(*timestamp);
            }
            (NetMode::Client, NetMessage::ServerSentTimeStamp { server_time_ms }) => {
                let local_now = self.clock.local_time_ms();
                match self.sync.complete(*server_time_ms, local_now) {
                    Some(sample) => self.diagnostics.record(NetEvent::ClockSynced {
                        rtt_ms: sample.rtt_ms,
                        offset_ms: sample.offset_ms,
                    }),
                    None => self.diagnostics.record(NetEvent::StaleTimestampResponse {
                        server_time_ms: *server_time_ms,
                    }),
                }
            }

            (mode, other) => {
                tracing::debug!(?mode, ?other, "message not meant for this peer, ignoring");
            }
        }
        true
    }

    fn on_return_ping(&mut self, timestamp: f32) {
        let now = self.clock.elapsed_secs() as f32;
        match self.ping.on_return_ping(now, timestamp) {
            PingOutcome::Discarded { rtt_secs } => {
                self.diagnostics.record(NetEvent::PingDiscarded { rtt_secs });
            }
            PingOutcome::Unchanged { .. } => {}
            PingOutcome::Changed { exact_ping_ms, .. } => {
                self.diagnostics
                    .record(NetEvent::PingUpdated { exact_ping_ms });
                self.outbox.push(NetMessage::UpdatePing { exact_ping_ms });
                self.request_new_timestamp();
            }
        }
    }

    /// Take every queued outgoing message.
    pub fn drain_outbox(&mut self) -> Vec<NetMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Exact ping: measured on a client, reported by the peer on the authority.
    pub fn exact_ping_ms(&self) -> f32 {
        match self.mode {
            NetMode::Authority => self.peer_ping.exact_ping_ms,
            NetMode::Client | NetMode::Standalone => self.ping.exact_ping_ms(),
        }
    }

    /// How far ahead to predict, in seconds.
    pub fn prediction_time_secs(&self) -> f32 {
        self.window
            .prediction_time_secs(self.exact_ping_ms(), self.mode == NetMode::Standalone)
    }

    /// Clock-offset handshake state.
    pub fn clock_sync(&self) -> &ClockSync {
        &self.sync
    }

    /// Reported ping of the remote peer (authority side).
    pub fn peer_ping(&self) -> &PeerPing {
        &self.peer_ping
    }

    /// Negotiated prediction window.
    pub fn prediction_window(&self) -> &PredictionWindow {
        &self.window
    }
}

impl TimeSource for NetController {
    fn local_time_ms(&self) -> i32 {
        self.clock.local_time_ms()
    }

    fn network_time_ms(&self) -> i32 {
        self.sync.network_time_ms(self.clock.local_time_ms())
    }
}
