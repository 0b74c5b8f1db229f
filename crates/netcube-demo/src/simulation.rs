//! Headless authority + client run over a simulated link.

use std::sync::Arc;

use bevy_ecs::prelude::*;
use netcube_config::Config;
use netcube_multiplayer::{
    FrameDelta, InputState, LinkChannel, NetController, NetCounters, NetMode, NetPawn, PawnRole,
    PhysicsState, ReplicatedChannel, TracingSink, collect_outbound, dispatch_message,
    simulation_schedule,
};
use netcube_net::{LinkConfig, LinkStats, link_pair};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{info, warn};

/// Input is released for the final stretch so both sides come to rest.
const IDLE_TAIL_SECS: f32 = 3.0;

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Simulated ticks.
    pub ticks: u64,
    /// Client-side diagnostics.
    pub client: NetCounters,
    /// Authority-side diagnostics.
    pub authority: NetCounters,
    /// Distance between the client's and the authority's cube at the end.
    pub final_position_error: f32,
    /// Client link traffic.
    pub client_link: LinkStats,
    /// Authority link traffic.
    pub authority_link: LinkStats,
    /// Client's committed clock offset (ms).
    pub clock_offset_ms: i32,
    /// Client's exact ping estimate (ms).
    pub exact_ping_ms: f32,
}

impl SimulationReport {
    /// Log the report at info level.
    pub fn log(&self) {
        info!(
            ticks = self.ticks,
            corrections = self.client.corrections_confirmed + self.client.reconciliations,
            confirmed = self.client.corrections_confirmed,
            reconciliations = self.client.reconciliations,
            replayed_moves = self.client.replayed_moves,
            dropped = self.client.corrections_dropped,
            smoothing = self.client.smoothing_started,
            "prediction"
        );
        info!(
            exact_ping_ms = self.exact_ping_ms,
            clock_offset_ms = self.clock_offset_ms,
            clock_syncs = self.client.clock_syncs,
            windows_negotiated = self.authority.windows_negotiated,
            "timing"
        );
        info!(
            client_sent = self.client_link.sent,
            client_lost = self.client_link.dropped,
            authority_sent = self.authority_link.sent,
            authority_lost = self.authority_link.dropped,
            "link"
        );
        info!(
            final_position_error = self.final_position_error,
            "simulation finished"
        );
    }
}

/// One side of the connection.
struct Peer {
    world: World,
    schedule: Schedule,
    channel: LinkChannel,
    pawn: Entity,
    sink: Arc<TracingSink>,
}

impl Peer {
    fn new(mode: NetMode, role: PawnRole, config: &Config, channel: LinkChannel, dt: f32) -> Self {
        let sink = Arc::new(TracingSink::new());
        let mut world = World::new();
        world.insert_resource(FrameDelta(dt));
        world.insert_resource(NetController::new(mode, &config.network, sink.clone()));
        let pawn = world
            .spawn(NetPawn::new(role, config, PhysicsState::default(), sink.clone()))
            .id();
        Self {
            world,
            schedule: simulation_schedule(),
            channel,
            pawn,
            sink,
        }
    }

    fn receive(&mut self, now_ms: u64) {
        self.channel.set_time(now_ms);
        while let Some(message) = self.channel.receive() {
            dispatch_message(&mut self.world, message);
        }
    }

    fn step(&mut self) {
        self.schedule.run(&mut self.world);
        for message in collect_outbound(&mut self.world) {
            if let Err(err) = self.channel.send(&message) {
                warn!(%err, "send failed");
            }
        }
    }

    fn state(&self) -> PhysicsState {
        self.world
            .get::<NetPawn>(self.pawn)
            .map(|pawn| *pawn.current_state())
            .unwrap_or_default()
    }

    fn set_input(&mut self, input: InputState) {
        if let Some(mut pawn) = self.world.get_mut::<NetPawn>(self.pawn) {
            pawn.set_input(input);
        }
    }

    fn controller(&self) -> Option<&NetController> {
        self.world.get_resource::<NetController>()
    }
}

fn random_input(rng: &mut Xoshiro256StarStar) -> InputState {
    InputState {
        forward: rng.gen_bool(0.5),
        backward: rng.gen_bool(0.5),
        left: rng.gen_bool(0.5),
        right: rng.gen_bool(0.5),
    }
}

/// Run the configured simulation to completion.
pub fn run(config: &Config) -> SimulationReport {
    let sim = &config.simulation;
    let tick_rate = sim.tick_rate_hz.max(1);
    let dt = 1.0 / tick_rate as f32;
    let ticks = (sim.duration_secs.max(0.0) * tick_rate as f32).round() as u64;
    let idle_ticks = (IDLE_TAIL_SECS * tick_rate as f32) as u64;
    let active_ticks = ticks.saturating_sub(idle_ticks);
    let change_every = u64::from(sim.input_change_interval_ticks.max(1));

    let link = LinkConfig {
        latency_ms: sim.latency_ms,
        jitter_ms: sim.jitter_ms,
        packet_loss: sim.packet_loss,
    };
    let (client_end, authority_end) = link_pair(link, sim.seed);
    let mut client = Peer::new(
        NetMode::Client,
        PawnRole::AUTONOMOUS,
        config,
        LinkChannel::new(client_end),
        dt,
    );
    let mut authority = Peer::new(
        NetMode::Authority,
        PawnRole::AUTHORITY,
        config,
        LinkChannel::new(authority_end),
        dt,
    );
    let mut rng = Xoshiro256StarStar::seed_from_u64(sim.seed);

    info!(
        ticks,
        latency_ms = link.latency_ms,
        jitter_ms = link.jitter_ms,
        packet_loss = link.packet_loss,
        "starting simulation"
    );

    if let Some(mut controller) = client.world.get_resource_mut::<NetController>() {
        controller.begin_play();
    }

    for tick in 0..ticks {
        let now_ms = (tick as f64 * f64::from(dt) * 1000.0) as u64;

        client.receive(now_ms);
        authority.receive(now_ms);

        if tick == active_ticks {
            client.set_input(InputState::default());
        } else if tick < active_ticks && tick % change_every == 0 {
            client.set_input(random_input(&mut rng));
        }

        client.step();
        authority.step();
    }

    let client_state = client.state();
    let authority_state = authority.state();

    SimulationReport {
        ticks,
        client: client.sink.counters(),
        authority: authority.sink.counters(),
        final_position_error: client_state.position.distance(authority_state.position),
        client_link: client.channel.endpoint().stats(),
        authority_link: authority.channel.endpoint().stats(),
        clock_offset_ms: client
            .controller()
            .map_or(0, |controller| controller.clock_sync().offset_ms()),
        exact_ping_ms: client
            .controller()
            .map_or(0.0, NetController::exact_ping_ms),
    }
}
