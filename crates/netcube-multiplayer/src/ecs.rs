//! `bevy_ecs` glue: pawns as components, the controller as a resource.
//!
//! A peer is one [`World`] holding a [`NetController`] resource, a
//! [`FrameDelta`] resource, and any number of [`NetPawn`] entities. Each frame
//! the host sets `FrameDelta`, feeds inbound messages through
//! [`dispatch_message`], runs [`simulation_schedule`], and sends whatever
//! [`collect_outbound`] returns. Each world models one connection, so pawn
//! messages reach every pawn whose role accepts them.

use bevy_ecs::prelude::*;

use crate::controller::NetController;
use crate::messages::NetMessage;
use crate::pawn::NetPawn;

/// Seconds simulated by the next schedule run.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameDelta(pub f32);

/// Advance the controller clock and emit due ping bounces.
pub fn tick_controller(delta: Res<FrameDelta>, mut controller: ResMut<NetController>) {
    controller.tick(delta.0);
}

/// Tick every pawn against the controller's clocks.
pub fn tick_pawns(
    delta: Res<FrameDelta>,
    controller: Res<NetController>,
    mut pawns: Query<&mut NetPawn>,
) {
    for mut pawn in &mut pawns {
        pawn.tick(delta.0, &*controller);
    }
}

/// Controller first, so pawns stamp moves with this frame's time.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((tick_controller, tick_pawns).chain());
    schedule
}

/// Route one inbound message to the pawns or the controller.
pub fn dispatch_message(world: &mut World, message: NetMessage) {
    if !world.contains_resource::<NetController>() {
        tracing::warn!(?message, "no NetController in world, dropping message");
        return;
    }

    match message {
        NetMessage::SubmitInput(input) => {
            let mut pawns = world.query::<&mut NetPawn>();
            for mut pawn in pawns.iter_mut(world) {
                let role = pawn.role();
                if role.authority && !role.locally_controlled {
                    pawn.on_submit_input(input);
                }
            }
        }
        NetMessage::CorrectionUpdate(correction) => {
            world.resource_scope(|world, controller: Mut<NetController>| {
                let mut pawns = world.query::<&mut NetPawn>();
                for mut pawn in pawns.iter_mut(world) {
                    let role = pawn.role();
                    if !role.authority && role.locally_controlled {
                        pawn.on_server_move(&correction, &*controller);
                    }
                }
            });
        }
        other => {
            world.resource_mut::<NetController>().handle(&other);
        }
    }
}

/// Drain every outgoing message: controller traffic, pawn traffic, and
/// pending authoritative snapshots as corrections.
pub fn collect_outbound(world: &mut World) -> Vec<NetMessage> {
    let mut outbound = world
        .get_resource_mut::<NetController>()
        .map(|mut controller| controller.drain_outbox())
        .unwrap_or_default();

    let mut pawns = world.query::<&mut NetPawn>();
    for mut pawn in pawns.iter_mut(world) {
        outbound.extend(pawn.drain_outbox());
        if let Some(snapshot) = pawn.take_replication() {
            outbound.push(NetMessage::CorrectionUpdate(snapshot));
        }
    }
    outbound
}
