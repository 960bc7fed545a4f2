//! Routes queued intents to their handlers and runs the per-tick session
//! bookkeeping.
//!
//! Everything here runs on the simulation loop. Handlers report fatal
//! problems as a [`DisconnectReason`]; ownership and permission failures are
//! logged and the intent is dropped.

use crate::collision::{BoxWorld, CollisionOracle};
use crate::config::ServerConfig;
use crate::entity::{EntityId, Player, Vehicle};
use crate::error::DisconnectReason;
use crate::game::{board, leave, GameState};
use crate::liveness::LivenessPoll;
use crate::movement::{handle_move, MoveOutcome};
use crate::session::{Intent, Session};
use crate::session_manager::SessionManager;
use crate::utils::within_world_bounds;
use crate::vehicle::{check_vehicle_values, handle_vehicle_move};
use log::{debug, info, warn};
use shared::{BlockPos, ClientCommand, GameMode, Packet, PlayerAction, Vec3};
use std::collections::HashMap;

/// Drop-spam score added per dropped item.
const DROP_SPAM_INCREMENT: u32 = 20;
/// Largest accepted riding-jump charge.
const MAX_JUMP_CHARGE: i32 = 100;

/// Runs one simulation tick: drains every session's queue in id order, steps
/// the world, then runs the end-of-tick checks.
pub fn run_tick(
    sessions: &mut SessionManager,
    game: &mut GameState,
    config: &ServerConfig,
    now_ms: u64,
) {
    let tick = game.tick + 1;

    for session in sessions.iter_mut() {
        let Some(player) = game.players.get(&session.entity_id) else {
            continue;
        };
        let controlled = game.controlled_vehicle(session.entity_id);
        session.begin_tick(tick, now_ms, player, controlled);

        while let Some(intent) = session.next_intent() {
            dispatch(session, game, config, intent);
        }
    }

    game.step();

    for session in sessions.iter_mut() {
        if session.is_closing() {
            continue;
        }
        let Some(player) = game.players.get(&session.entity_id) else {
            continue;
        };
        if let Err(reason) = end_tick(session, player, game.tick, config, now_ms) {
            session.disconnect(reason);
        }
    }
}

fn end_tick(
    session: &mut Session,
    player: &Player,
    tick: u64,
    config: &ServerConfig,
    now_ms: u64,
) -> Result<(), DisconnectReason> {
    session.movement.check_floating(player, config)?;
    session.vehicle.check_floating(config)?;

    match session.liveness.poll(now_ms) {
        LivenessPoll::Challenge(challenge) => session.send(Packet::KeepAlive { challenge }),
        LivenessPoll::TimedOut => return Err(DisconnectReason::Timeout),
        LivenessPoll::Idle => {}
    }

    if let Some(packet) = session.teleport.poll_resend(tick, config.teleport_resend_ticks) {
        debug!("Resending unacknowledged correction to client {}", session.id);
        session.send(packet);
    }

    if let Some(idle) = config.idle_timeout {
        if now_ms.saturating_sub(session.last_action_ms) >= idle.as_millis() as u64 {
            return Err(DisconnectReason::Idling);
        }
    }

    session.drop_spam = session.drop_spam.saturating_sub(1);
    Ok(())
}

/// Handles one intent for `session`.
pub fn dispatch(session: &mut Session, game: &mut GameState, config: &ServerConfig, intent: Intent) {
    let GameState {
        players,
        vehicles,
        world,
        spawn,
        ..
    } = game;

    let Some(player) = players.get_mut(&session.entity_id) else {
        warn!(
            "Client {} has no player entity, dropping {:?}",
            session.id, intent
        );
        return;
    };

    let result = match intent {
        Intent::Move(intent) => {
            handle_move(session, player, &*world, config, intent).map(|outcome| {
                if outcome == MoveOutcome::Accepted {
                    enter_portal(session, player, world);
                }
            })
        }
        Intent::MoveVehicle(intent) => {
            match player.vehicle.and_then(|id| vehicles.get_mut(&id)) {
                Some(vehicle) => {
                    handle_vehicle_move(session, player, vehicle, &*world, config, intent)
                        .map(|_| ())
                }
                None => check_vehicle_values(&intent),
            }
        }
        Intent::AcceptTeleport(teleport_id) => {
            session.accept_teleport(player, teleport_id);
            Ok(())
        }
        Intent::KeepAliveResponse {
            challenge,
            received_ms,
        } => {
            if let Some(sample) = session.liveness.respond(challenge, received_ms) {
                debug!(
                    "Client {} round trip {}ms, ping {}ms",
                    session.id,
                    sample,
                    session.liveness.ping_ms()
                );
            }
            Ok(())
        }
        Intent::Action {
            sequence,
            action,
            pos,
            ..
        } => handle_action(session, player, world, *spawn, config, sequence, action, pos),
        Intent::Command {
            entity_id,
            command,
            data,
        } => handle_command(session, player, vehicles, &*world, entity_id, command, data),
        Intent::ChangeGameMode(mode) => {
            handle_game_mode(session, player, config, mode);
            Ok(())
        }
        Intent::CloseScreen(screen_id) => {
            if !session.close_screen(screen_id) {
                warn!(
                    "Client {} tried to close screen {} but has {:?} open",
                    session.id, screen_id, session.open_screen
                );
            }
            Ok(())
        }
        Intent::Interact(target) => {
            handle_interact(session, player, vehicles, config, target);
            Ok(())
        }
    };

    if let Err(reason) = result {
        warn!("Client {} sent invalid input: {}", session.id, reason);
        session.disconnect(reason);
    }
}

/// Sends a player standing in a portal to the portal's dimension.
fn enter_portal(session: &mut Session, player: &mut Player, world: &BoxWorld) {
    if player.is_passenger() {
        return;
    }
    let Some(portal) = world.portal_at(&player.bounding_box()).copied() else {
        return;
    };
    if portal.dimension != player.dimension {
        session.change_dimension(player, portal.dimension, portal.exit);
    }
}

/// Boards `target` if it is a vehicle within reach.
fn handle_interact(
    session: &mut Session,
    player: &mut Player,
    vehicles: &mut HashMap<EntityId, Vehicle>,
    config: &ServerConfig,
    target: EntityId,
) {
    if player.is_spectator() || player.sleeping {
        debug!("Player {} cannot interact right now", player.id);
        return;
    }
    let Some(vehicle) = vehicles.get_mut(&target) else {
        warn!(
            "Client {} tried to interact with unknown entity {}",
            session.id, target
        );
        return;
    };

    let reach = config.max_interaction_distance;
    if player.eye_position().distance_sqr(&vehicle.bounding_box().center()) > reach * reach {
        warn!(
            "Client {} tried to interact with entity {} out of reach",
            session.id, target
        );
        return;
    }

    session.mark_active();
    if board(player, vehicle) {
        info!("Player {} boarded {:?} {}", player.id, vehicle.kind, vehicle.id);
        session.start_riding(vehicle);
    }
}

fn handle_game_mode(session: &mut Session, player: &mut Player, config: &ServerConfig, mode: GameMode) {
    if player.permission_level < config.game_mode_permission_level {
        warn!(
            "Client {} lacks permission to change game mode (level {} < {})",
            session.id, player.permission_level, config.game_mode_permission_level
        );
        return;
    }
    session.mark_active();
    player.set_game_mode(mode);
    info!("Player {} set game mode to {:?}", player.id, mode);
}

/// Whether `player` may edit the block at `pos` right now.
fn may_edit_block(player: &Player, pos: BlockPos, spawn: Vec3, config: &ServerConfig) -> bool {
    if matches!(player.game_mode, GameMode::Adventure | GameMode::Spectator) {
        return false;
    }

    let reach = config.max_interaction_distance;
    if player.eye_position().distance_sqr(&pos.center()) > reach * reach {
        debug!("Player {} is too far from {:?}", player.id, pos);
        return false;
    }

    let spawn_block = BlockPos::containing(spawn);
    let from_spawn = (pos.x - spawn_block.x).abs().max((pos.z - spawn_block.z).abs());
    if config.spawn_protection_radius > 0
        && from_spawn <= config.spawn_protection_radius
        && player.permission_level < config.spawn_protection_bypass_level
    {
        debug!("Player {} tried to edit protected {:?}", player.id, pos);
        return false;
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn handle_action(
    session: &mut Session,
    player: &mut Player,
    world: &mut BoxWorld,
    spawn: Vec3,
    config: &ServerConfig,
    sequence: u32,
    action: PlayerAction,
    pos: BlockPos,
) -> Result<(), DisconnectReason> {
    match action {
        PlayerAction::SwapItemWithOffhand => {
            session.mark_active();
            debug!("Player {} swapped hands", player.id);
        }
        PlayerAction::ReleaseUseItem => {
            session.mark_active();
            debug!("Player {} released use item", player.id);
        }
        PlayerAction::DropItem | PlayerAction::DropAllItems => {
            if player.is_spectator() {
                return Ok(());
            }
            session.mark_active();
            session.drop_spam = session.drop_spam.saturating_add(DROP_SPAM_INCREMENT);
            if session.drop_spam > config.drop_spam_limit && !player.is_operator() {
                return Err(DisconnectReason::Spam);
            }
        }
        PlayerAction::StartDestroyBlock
        | PlayerAction::AbortDestroyBlock
        | PlayerAction::StopDestroyBlock => {
            if !within_world_bounds(pos.x as f64, pos.y as f64, pos.z as f64) {
                return Err(DisconnectReason::IllegalInput(
                    "block position out of bounds".to_string(),
                ));
            }
            session.mark_active();
            let allowed = may_edit_block(player, pos, spawn, config);

            match action {
                PlayerAction::StartDestroyBlock if allowed => {
                    if player.abilities.instabuild {
                        break_block(player, world, pos);
                    } else {
                        session.destroying = Some(pos);
                    }
                }
                PlayerAction::AbortDestroyBlock => {
                    if session.destroying == Some(pos) {
                        session.destroying = None;
                    }
                }
                PlayerAction::StopDestroyBlock => {
                    if allowed && session.destroying == Some(pos) {
                        break_block(player, world, pos);
                    }
                    session.destroying = None;
                }
                _ => {}
            }
            session.send(Packet::ActionAck { sequence });
        }
    }
    Ok(())
}

fn break_block(player: &Player, world: &mut BoxWorld, pos: BlockPos) {
    if world.remove_block(pos) {
        info!("Player {} broke block {:?}", player.id, pos);
    }
}

fn handle_command<W: CollisionOracle + ?Sized>(
    session: &mut Session,
    player: &mut Player,
    vehicles: &mut HashMap<EntityId, Vehicle>,
    world: &W,
    entity_id: u32,
    command: ClientCommand,
    data: i32,
) -> Result<(), DisconnectReason> {
    if entity_id != player.id {
        warn!(
            "Client {} sent a command for entity {} it does not control",
            session.id, entity_id
        );
        return Ok(());
    }
    session.mark_active();

    let steered = player
        .vehicle
        .and_then(|id| vehicles.get_mut(&id))
        .filter(|vehicle| vehicle.controlling_passenger() == Some(player.id));

    match command {
        ClientCommand::PressShiftKey => {
            player.sneaking = true;
            if let Some(vehicle) = leave(player, vehicles).and_then(|id| vehicles.get(&id)) {
                session.stop_riding(player, vehicle);
            }
        }
        ClientCommand::ReleaseShiftKey => player.sneaking = false,
        ClientCommand::StartSprinting => player.sprinting = true,
        ClientCommand::StopSprinting => player.sprinting = false,
        ClientCommand::StopSleeping => {
            if player.stop_sleeping() {
                let (pos, yaw, pitch) = (player.pos, player.yaw, player.pitch);
                session.correct(player, pos, yaw, pitch);
            }
        }
        ClientCommand::StartRidingJump => {
            if !(0..=MAX_JUMP_CHARGE).contains(&data) {
                return Err(DisconnectReason::IllegalInput(format!(
                    "riding jump charge {} out of range",
                    data
                )));
            }
            if let Some(vehicle) = steered {
                vehicle.start_jump(data as u8);
            }
        }
        ClientCommand::StopRidingJump => {
            if let Some(vehicle) = steered {
                vehicle.stop_jump();
            }
        }
        ClientCommand::OpenInventory => {
            if let Some(vehicle) = steered.filter(|vehicle| vehicle.has_inventory) {
                let screen_id = session.open_vehicle_screen(vehicle.id);
                debug!("Client {} opened screen {} for vehicle {}", session.id, screen_id, vehicle.id);
            }
        }
        ClientCommand::StartFallFlying => {
            let in_fluid = world.contains_fluid(&player.bounding_box());
            if !player.try_start_gliding(in_fluid) {
                debug!("Player {} cannot glide right now", player.id);
            }
        }
    }
    Ok(())
}
