use spacetimedb::{Identity, ReducerContext, Table, Timestamp};
use std::time::Duration;
use log;

// Inserts a schedule row, logging instead of failing the caller when the
// insert is rejected. A missing schedule row disables one background system
// but must never take the whole module down with it.
#[macro_export]
macro_rules! try_insert_schedule {
    ($table:expr, $row:expr, $system_name:expr) => {{
        match $table.try_insert($row) {
            Ok(_) => {
                log::debug!("{} schedule row inserted.", $system_name);
            }
            Err(e) => {
                log::error!("Failed to insert {} schedule row: {}", $system_name, e);
                log::error!("{} is disabled until restart or manual repair.", $system_name);
            }
        }
    }};
}

mod models;
mod utils;
mod items;
mod config;
mod messages;
mod permissions;
mod dropped_item;
mod death_barrel;
mod access_guard;
mod expiry;
mod chunk_fetch;

// --- World Geometry ---

pub const TILE_SIZE_PX: u32 = 48;
pub const WORLD_WIDTH_TILES: u32 = 500;
pub const WORLD_HEIGHT_TILES: u32 = 500;
pub const WORLD_WIDTH_PX: f32 = (WORLD_WIDTH_TILES * TILE_SIZE_PX) as f32;
pub const WORLD_HEIGHT_PX: f32 = (WORLD_HEIGHT_TILES * TILE_SIZE_PX) as f32;

const SPAWN_POSITION_X: f32 = WORLD_WIDTH_PX / 2.0;
const SPAWN_POSITION_Y: f32 = WORLD_HEIGHT_PX / 2.0;

const KILL_COMMAND_COOLDOWN_SECONDS: u64 = 60;

// --- Core Tables ---

#[spacetimedb::table(name = player, public)]
#[derive(Clone, Debug)]
pub struct Player {
    #[primary_key]
    pub identity: Identity,
    #[unique]
    pub username: String,
    pub position_x: f32,
    pub position_y: f32,
    pub is_online: bool,
    pub is_dead: bool,
    pub death_timestamp: Option<Timestamp>,
    pub last_update: Timestamp,
}

#[spacetimedb::table(name = private_message, public)]
#[derive(Clone, Debug)]
pub struct PrivateMessage {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub recipient_identity: Identity,
    pub sender_display_name: String,
    pub text: String,
    pub sent: Timestamp,
}

/// Rate limit on the self-kill command.
#[spacetimedb::table(name = player_kill_command_cooldown)]
#[derive(Clone, Debug)]
pub struct PlayerKillCommandCooldown {
    #[primary_key]
    pub identity: Identity,
    pub last_used: Timestamp,
}

// --- Lifecycle Reducers ---

#[spacetimedb::reducer(init)]
pub fn init_module(ctx: &ReducerContext) -> Result<(), String> {
    log::info!("Initializing death barrel server module...");

    crate::items::seed_items(ctx)?;
    crate::config::seed_barrel_config(ctx)?;
    crate::messages::seed_message_templates(ctx)?;
    crate::dropped_item::init_dropped_item_schedule(ctx)?;

    log::info!("Module initialization complete.");
    Ok(())
}

#[spacetimedb::reducer(client_connected)]
pub fn identity_connected(ctx: &ReducerContext) -> Result<(), String> {
    let players = ctx.db.player();
    if let Some(mut player) = players.identity().find(&ctx.sender) {
        player.is_online = true;
        player.last_update = ctx.timestamp;
        players.identity().update(player);
        log::info!("Player {:?} reconnected.", ctx.sender);
    } else {
        log::debug!("Unregistered client {:?} connected.", ctx.sender);
    }
    Ok(())
}

#[spacetimedb::reducer(client_disconnected)]
pub fn identity_disconnected(ctx: &ReducerContext) -> Result<(), String> {
    let players = ctx.db.player();
    if let Some(mut player) = players.identity().find(&ctx.sender) {
        player.is_online = false;
        player.last_update = ctx.timestamp;
        players.identity().update(player);
        log::info!("Player {:?} disconnected.", ctx.sender);
    }
    Ok(())
}

// --- Player Reducers ---

#[spacetimedb::reducer]
pub fn register_player(ctx: &ReducerContext, username: String) -> Result<(), String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err("Username cannot be empty.".to_string());
    }

    let players = ctx.db.player();
    if players.identity().find(&ctx.sender).is_some() {
        return Err("Player is already registered.".to_string());
    }
    if players.username().find(&trimmed.to_string()).is_some() {
        return Err(format!("Username '{}' is already taken.", trimmed));
    }

    players
        .try_insert(Player {
            identity: ctx.sender,
            username: trimmed.to_string(),
            position_x: SPAWN_POSITION_X,
            position_y: SPAWN_POSITION_Y,
            is_online: true,
            is_dead: false,
            death_timestamp: None,
            last_update: ctx.timestamp,
        })
        .map_err(|e| format!("Failed to register player: {}", e))?;

    crate::items::grant_starting_items(ctx, ctx.sender)?;
    log::info!("Registered player '{}' ({:?}).", trimmed, ctx.sender);
    Ok(())
}

#[spacetimedb::reducer]
pub fn update_player_position(ctx: &ReducerContext, pos_x: f32, pos_y: f32) -> Result<(), String> {
    let players = ctx.db.player();
    let mut player = players
        .identity()
        .find(&ctx.sender)
        .ok_or_else(|| "Player not found.".to_string())?;
    if player.is_dead {
        return Err("Cannot move while dead.".to_string());
    }

    let (clamped_x, clamped_y) = crate::utils::clamp_to_world(pos_x, pos_y);
    player.position_x = clamped_x;
    player.position_y = clamped_y;
    player.last_update = ctx.timestamp;
    players.identity().update(player);
    Ok(())
}

/// Self-kill command. Rate limited, marks the player dead and runs the full
/// death handling: inventory packed into death barrels where possible, with
/// ground scatter as fallback.
#[spacetimedb::reducer]
pub fn die(ctx: &ReducerContext) -> Result<(), String> {
    let players = ctx.db.player();
    let mut player = players
        .identity()
        .find(&ctx.sender)
        .ok_or_else(|| "Player not found.".to_string())?;
    if player.is_dead {
        return Err("Player is already dead.".to_string());
    }

    let cooldowns = ctx.db.player_kill_command_cooldown();
    if let Some(cooldown) = cooldowns.identity().find(&ctx.sender) {
        let ready_at = cooldown.last_used + Duration::from_secs(KILL_COMMAND_COOLDOWN_SECONDS);
        if ctx.timestamp < ready_at {
            return Err("Kill command is on cooldown.".to_string());
        }
        cooldowns.identity().update(PlayerKillCommandCooldown {
            identity: ctx.sender,
            last_used: ctx.timestamp,
        });
    } else {
        cooldowns
            .try_insert(PlayerKillCommandCooldown {
                identity: ctx.sender,
                last_used: ctx.timestamp,
            })
            .map_err(|e| format!("Failed to record kill cooldown: {}", e))?;
    }

    player.is_dead = true;
    player.death_timestamp = Some(ctx.timestamp);
    player.last_update = ctx.timestamp;
    let player_snapshot = player.clone();
    players.identity().update(player);

    crate::death_barrel::handle_player_death(ctx, &player_snapshot)?;
    Ok(())
}

#[spacetimedb::reducer]
pub fn respawn(ctx: &ReducerContext) -> Result<(), String> {
    let players = ctx.db.player();
    let mut player = players
        .identity()
        .find(&ctx.sender)
        .ok_or_else(|| "Player not found.".to_string())?;
    if !player.is_dead {
        return Err("Player is not dead.".to_string());
    }

    player.is_dead = false;
    player.death_timestamp = None;
    player.position_x = SPAWN_POSITION_X;
    player.position_y = SPAWN_POSITION_Y;
    player.last_update = ctx.timestamp;
    players.identity().update(player);

    log::info!("Player {:?} respawned.", ctx.sender);
    Ok(())
}
