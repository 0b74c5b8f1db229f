//! Client-side prediction and server reconciliation for a networked cube:
//! move history, clock-offset sync, ping measurement, smoothing, wire
//! messages, and `bevy_ecs` integration.

pub mod channel;
pub mod clock;
pub mod controller;
pub mod diagnostics;
pub mod ecs;
pub mod history;
pub mod messages;
pub mod pawn;
pub mod physics;
pub mod ping;
pub mod prediction;
pub mod reconciliation;
pub mod smoothing;
pub mod state;

pub use channel::{ChannelError, LinkChannel, ReplicatedChannel};
pub use clock::{ClockSample, ClockSync, LocalClock, TimeSource};
pub use controller::{NetController, NetMode};
pub use diagnostics::{DiagnosticsSink, NetCounters, NetEvent, RecordingSink, TracingSink};
pub use ecs::{FrameDelta, collect_outbound, dispatch_message, simulation_schedule};
pub use history::{HistoryError, MoveHistory, MoveRingBuffer};
pub use messages::{MessageError, NetMessage, PROTOCOL_VERSION, decode_message, encode_message};
pub use pawn::{NetPawn, PawnRole};
pub use physics::{KinematicBody, PhysicsBody};
pub use ping::{
    ExponentialPing, MovingAveragePing, PeerPing, PingEstimator, PingOutcome, PingTracker,
    PredictionWindow,
};
pub use prediction::PredictionEngine;
pub use reconciliation::{CorrectionOutcome, ReconcileTarget, ReconciliationEngine};
pub use smoothing::Smoother;
pub use state::{DifferenceThresholds, InputState, Move, MoveIntent, PhysicsState};
