use crate::{TILE_SIZE_PX, WORLD_WIDTH_TILES, WORLD_HEIGHT_TILES, WORLD_WIDTH_PX, WORLD_HEIGHT_PX};

/// Tiles per chunk edge. Chunks are the unit of world streaming: clients load
/// and unload them as their viewport moves, and expiry scans run per chunk.
pub const CHUNK_SIZE_TILES: u32 = 16;
pub const WORLD_WIDTH_CHUNKS: u32 = WORLD_WIDTH_TILES.div_ceil(CHUNK_SIZE_TILES);
pub const WORLD_HEIGHT_CHUNKS: u32 = WORLD_HEIGHT_TILES.div_ceil(CHUNK_SIZE_TILES);

/// Clamps a world position into the playable area. Entity positions
/// (players, ground drops) must never land outside the world rectangle.
pub fn clamp_to_world(pos_x: f32, pos_y: f32) -> (f32, f32) {
    (
        pos_x.clamp(0.0, WORLD_WIDTH_PX - 1.0),
        pos_y.clamp(0.0, WORLD_HEIGHT_PX - 1.0),
    )
}

pub fn get_distance_squared(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x1 - x2;
    let dy = y1 - y2;
    dx * dx + dy * dy
}

/// Maps a world position to its 1D chunk index (row-major ordering).
/// Positions outside the world clamp to the border chunk.
pub fn calculate_chunk_index(pos_x: f32, pos_y: f32) -> u32 {
    let tile_x = (pos_x / TILE_SIZE_PX as f32).floor().max(0.0) as u32;
    let tile_y = (pos_y / TILE_SIZE_PX as f32).floor().max(0.0) as u32;

    let chunk_x = (tile_x / CHUNK_SIZE_TILES).min(WORLD_WIDTH_CHUNKS - 1);
    let chunk_y = (tile_y / CHUNK_SIZE_TILES).min(WORLD_HEIGHT_CHUNKS - 1);

    chunk_y * WORLD_WIDTH_CHUNKS + chunk_x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_is_row_major() {
        let chunk_px = (CHUNK_SIZE_TILES * TILE_SIZE_PX) as f32;
        assert_eq!(calculate_chunk_index(0.0, 0.0), 0);
        assert_eq!(calculate_chunk_index(chunk_px, 0.0), 1);
        assert_eq!(calculate_chunk_index(0.0, chunk_px), WORLD_WIDTH_CHUNKS);
    }

    #[test]
    fn world_clamp_pins_border_overshoot_inside() {
        // A scatter offset past the border must not produce negative or
        // out-of-world coordinates.
        assert_eq!(clamp_to_world(-42.5, 10.0), (0.0, 10.0));
        assert_eq!(clamp_to_world(10.0, -0.1), (10.0, 0.0));
        let (x, y) = clamp_to_world(WORLD_WIDTH_PX + 57.0, WORLD_HEIGHT_PX + 3.0);
        assert_eq!(x, WORLD_WIDTH_PX - 1.0);
        assert_eq!(y, WORLD_HEIGHT_PX - 1.0);
        assert_eq!(clamp_to_world(100.0, 200.0), (100.0, 200.0));
    }

    #[test]
    fn chunk_index_clamps_out_of_bounds_positions() {
        let far = 1e9_f32;
        assert_eq!(
            calculate_chunk_index(far, far),
            WORLD_HEIGHT_CHUNKS * WORLD_WIDTH_CHUNKS - 1
        );
        assert_eq!(calculate_chunk_index(-50.0, -50.0), 0);
    }
}
