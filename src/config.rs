//! Death-barrel configuration.
//!
//! A singleton row seeded with defaults on module init. Reducers read it once
//! and pass the values into the decision layer; nothing reads it lazily mid
//! operation, so a config change applies cleanly on the next event.

use spacetimedb::{ReducerContext, Table};
use log;

#[spacetimedb::table(name = barrel_config, public)]
#[derive(Clone, Debug)]
pub struct BarrelConfig {
    #[primary_key]
    pub id: u8,
    /// Remove a barrel when its inventory is closed while empty.
    pub remove_on_empty: bool,
    /// TTL in seconds for abandoned barrels; <= 0 disables expiry.
    pub remove_barrels_after_seconds: i64,
    /// Gate break/open behind ownership + bypass permission.
    pub protect_from_other_players: bool,
}

impl Default for BarrelConfig {
    fn default() -> Self {
        BarrelConfig {
            id: 0,
            remove_on_empty: true,
            remove_barrels_after_seconds: -1,
            protect_from_other_players: false,
        }
    }
}

impl BarrelConfig {
    pub fn expiry_enabled(&self) -> bool {
        self.remove_barrels_after_seconds > 0
    }
}

/// Seeds the config singleton if missing. Idempotent.
pub fn seed_barrel_config(ctx: &ReducerContext) -> Result<(), String> {
    let configs = ctx.db.barrel_config();
    if configs.iter().count() == 0 {
        log::info!("Seeding default barrel config.");
        configs
            .try_insert(BarrelConfig::default())
            .map_err(|e| format!("Failed to seed barrel config: {}", e))?;
    } else {
        log::debug!("Barrel config already seeded.");
    }
    Ok(())
}

/// Fetches the active config, falling back to defaults if the singleton is
/// somehow missing (logged, never fatal).
pub fn get_barrel_config(ctx: &ReducerContext) -> BarrelConfig {
    match ctx.db.barrel_config().id().find(0) {
        Some(config) => config,
        None => {
            log::warn!("[Config] Barrel config row missing, using defaults.");
            BarrelConfig::default()
        }
    }
}

/// Admin reducer to update the config singleton.
#[spacetimedb::reducer]
pub fn set_barrel_config(
    ctx: &ReducerContext,
    remove_on_empty: bool,
    remove_barrels_after_seconds: i64,
    protect_from_other_players: bool,
) -> Result<(), String> {
    let configs = ctx.db.barrel_config();
    let updated = BarrelConfig {
        id: 0,
        remove_on_empty,
        remove_barrels_after_seconds,
        protect_from_other_players,
    };
    if configs.id().find(0).is_some() {
        configs.id().update(updated);
    } else {
        configs
            .try_insert(updated)
            .map_err(|e| format!("Failed to insert barrel config: {}", e))?;
    }
    log::info!(
        "[Config] Updated: remove_on_empty={}, ttl={}s, protect={}",
        remove_on_empty, remove_barrels_after_seconds, protect_from_other_players
    );
    Ok(())
}
