//! Capability oracle for death-barrel behavior.
//!
//! Permissions are plain (player, string) rows so an operator or an admin
//! tool can grant and revoke them at runtime. The engine only ever asks a
//! boolean question: does this player hold this capability right now?

use spacetimedb::{Identity, ReducerContext, Table};
use log;

/// Whether dying produces death barrels at all.
pub const PERM_USE: &str = "deathbarrel.use";
/// Holders ignore ownership checks on break/open regardless of the
/// protection flag.
pub const PERM_BYPASS_PROTECTION: &str = "deathbarrel.accessprotected";

#[spacetimedb::table(name = player_permission, public)]
#[derive(Clone, Debug)]
pub struct PlayerPermission {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub player_id: Identity,
    pub permission: String,
}

pub fn has_permission(ctx: &ReducerContext, player_id: Identity, permission: &str) -> bool {
    ctx.db
        .player_permission()
        .player_id()
        .filter(player_id)
        .any(|row| row.permission == permission)
}

#[spacetimedb::reducer]
pub fn grant_permission(ctx: &ReducerContext, player_id: Identity, permission: String) -> Result<(), String> {
    if has_permission(ctx, player_id, &permission) {
        log::debug!("[Permissions] {:?} already holds '{}'.", player_id, permission);
        return Ok(());
    }
    ctx.db
        .player_permission()
        .try_insert(PlayerPermission {
            id: 0,
            player_id,
            permission: permission.clone(),
        })
        .map_err(|e| format!("Failed to grant permission '{}': {}", permission, e))?;
    log::info!("[Permissions] Granted '{}' to {:?}.", permission, player_id);
    Ok(())
}

#[spacetimedb::reducer]
pub fn revoke_permission(ctx: &ReducerContext, player_id: Identity, permission: String) -> Result<(), String> {
    let permissions = ctx.db.player_permission();
    let matching: Vec<u64> = permissions
        .player_id()
        .filter(player_id)
        .filter(|row| row.permission == permission)
        .map(|row| row.id)
        .collect();
    for id in &matching {
        permissions.id().delete(*id);
    }
    log::info!(
        "[Permissions] Revoked '{}' from {:?} ({} rows).",
        permission, player_id, matching.len()
    );
    Ok(())
}
