//! Optional snapshot persistence, mirroring the aquarium's own
//! `open_db`/`init_schema`/save-load shape: one sqlite file, WAL mode,
//! a schema_version row, and one table per aggregate. Unlike the
//! aquarium's wide per-column fish/genome tables, each creature is stored
//! as a single rmp-serde blob — the blueprint, scalar genome, brain
//! weights and lifetime accumulators all travel together verbatim, which
//! is what a reload needs to resume training and morphology unchanged.

use crate::config::SimulationConfig;
use crate::creature::Creature;
use crate::error::PersistenceError;
use crate::particle::ParticleSystem;
use crate::telemetry::Telemetry;
use crate::world::World;
use rusqlite::{params, Connection};
use std::path::Path;

const SCHEMA_VERSION: i64 = 1;

pub fn open_db(path: &Path) -> Result<Connection, PersistenceError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection, PersistenceError> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);

        CREATE TABLE IF NOT EXISTS world (
            id INTEGER PRIMARY KEY DEFAULT 1,
            tick_count INTEGER NOT NULL DEFAULT 0,
            next_id INTEGER NOT NULL DEFAULT 0,
            config_json TEXT NOT NULL,
            telemetry_blob BLOB NOT NULL,
            particles_blob BLOB NOT NULL,
            saved_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS creatures (
            id INTEGER PRIMARY KEY,
            parent_id INTEGER,
            generation INTEGER NOT NULL,
            data BLOB NOT NULL
        );
        ",
    )?;
    conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (?1)", params![SCHEMA_VERSION])?;
    Ok(())
}

/// Overwrites the single snapshot row, matching the aquarium's
/// single-aquarium-row convention rather than a history of saves.
pub fn save_world(conn: &Connection, world: &World) -> Result<(), PersistenceError> {
    let version: i64 = conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        return Err(PersistenceError::SchemaVersion { found: version, expected: SCHEMA_VERSION });
    }

    let config_json = serde_json::to_string(&world.config)?;
    let telemetry_blob = rmp_serde::to_vec(&world.telemetry)?;
    let particles_blob = rmp_serde::to_vec(&world.particles)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO world (id, tick_count, next_id, config_json, telemetry_blob, particles_blob)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            tick_count = excluded.tick_count,
            next_id = excluded.next_id,
            config_json = excluded.config_json,
            telemetry_blob = excluded.telemetry_blob,
            particles_blob = excluded.particles_blob,
            saved_at = datetime('now')",
        params![world.tick_count as i64, world.next_id as i64, config_json, telemetry_blob, particles_blob],
    )?;

    tx.execute("DELETE FROM creatures", [])?;
    for creature in &world.creatures {
        let data = rmp_serde::to_vec(creature)?;
        tx.execute(
            "INSERT INTO creatures (id, parent_id, generation, data) VALUES (?1, ?2, ?3, ?4)",
            params![creature.id as i64, creature.parent_id.map(|p| p as i64), creature.generation, data],
        )?;
    }
    tx.commit()?;
    log::info!("saved world snapshot: tick={}, {} creatures", world.tick_count, world.creatures.len());
    Ok(())
}

/// Rebuilds a `World` from a snapshot. The RNG stream is not persisted and
/// is reseeded with `rng_seed`, so replay is deterministic from the save
/// point onward but will not reproduce the exact pre-save trajectory.
pub fn load_world(conn: &Connection, rng_seed: u64) -> Result<World, PersistenceError> {
    let (tick_count, next_id, config_json, telemetry_blob, particles_blob): (i64, i64, String, Vec<u8>, Vec<u8>) = conn
        .query_row(
            "SELECT tick_count, next_id, config_json, telemetry_blob, particles_blob FROM world WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .map_err(|_| PersistenceError::NotFound(1))?;

    let config: SimulationConfig = serde_json::from_str(&config_json)?;
    let telemetry: Telemetry = rmp_serde::from_slice(&telemetry_blob)?;
    let particles: ParticleSystem = rmp_serde::from_slice(&particles_blob)?;

    let mut stmt = conn.prepare("SELECT data FROM creatures")?;
    let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
    let mut creatures = Vec::new();
    for row in rows {
        let data = row?;
        let creature: Creature = rmp_serde::from_slice(&data)?;
        creatures.push(creature);
    }

    let mut world = World::with_seed(config, rng_seed);
    world.creatures = creatures;
    world.tick_count = tick_count as u64;
    world.next_id = next_id as u64;
    world.telemetry = telemetry;
    world.particles = particles;
    log::info!("loaded world snapshot: tick={}, {} creatures", world.tick_count, world.creatures.len());
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_world() {
        let cfg = SimulationConfig::default();
        let mut world = World::with_seed(cfg, 11);
        for _ in 0..5 {
            world.tick(1.0 / 60.0, &[]);
        }
        let conn = open_in_memory().unwrap();
        save_world(&conn, &world).unwrap();

        let reloaded = load_world(&conn, 12).unwrap();
        assert_eq!(reloaded.creatures.len(), world.creatures.len());
        assert_eq!(reloaded.tick_count, world.tick_count);
        assert_eq!(reloaded.next_id, world.next_id);
        assert_eq!(reloaded.particles.particles.len(), world.particles.particles.len());
    }

    #[test]
    fn loading_missing_snapshot_errors() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(load_world(&conn, 1), Err(PersistenceError::NotFound(1))));
    }
}
