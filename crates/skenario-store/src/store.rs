//! Storer — SQLite persistence for scenario results.
//!
//! Writes one `scenario_runs` row per execution plus the entities,
//! stocks, and movements the run produced. Supports both on-disk and
//! in-memory databases (the latter for tests and throwaway API runs).

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use sken_core::{AutoscalerConfig, ClusterConfig};
use skenario_model::ScenarioOutcome;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::schema;

/// SQLite-backed result writer.
pub struct Storer {
    conn: Connection,
}

impl Storer {
    /// Open (or create) a result database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(StoreError::Open)?;
        let storer = Self { conn };
        storer.ensure_schema()?;
        debug!(?path, "result store opened");
        Ok(storer)
    }

    /// Create an ephemeral in-memory result database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Open)?;
        let storer = Self { conn };
        storer.ensure_schema()?;
        debug!("in-memory result store opened");
        Ok(storer)
    }

    fn ensure_schema(&self) -> StoreResult<()> {
        for statement in [
            schema::CREATE_SCENARIO_RUNS,
            schema::CREATE_ENTITIES,
            schema::CREATE_STOCKS,
            schema::CREATE_MOVEMENTS,
        ] {
            self.conn.execute(statement, []).map_err(StoreError::Schema)?;
        }
        Ok(())
    }

    /// Persist one scenario run. Returns the `scenario_runs` row id.
    pub fn store(
        &mut self,
        outcome: &ScenarioOutcome,
        cluster: &ClusterConfig,
        autoscaler: &AutoscalerConfig,
        origin: &str,
    ) -> StoreResult<i64> {
        let tx = self.conn.transaction().map_err(StoreError::Transaction)?;

        tx.execute(
            "INSERT INTO scenario_runs (
                recorded, origin, traffic_pattern,
                cluster_launch_delay, cluster_terminate_delay, cluster_number_of_requests,
                autoscaler_tick_interval, autoscaler_stable_window, autoscaler_panic_window,
                autoscaler_scale_to_zero_grace_period, autoscaler_target_concurrency_default,
                autoscaler_target_concurrency_percentage, autoscaler_max_scale_up_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                Utc::now().to_rfc3339(),
                origin,
                outcome.traffic_pattern,
                cluster.launch_delay.as_nanos() as i64,
                cluster.terminate_delay.as_nanos() as i64,
                cluster.number_of_requests,
                autoscaler.tick_interval.as_nanos() as i64,
                autoscaler.stable_window.as_nanos() as i64,
                autoscaler.panic_window.as_nanos() as i64,
                autoscaler.scale_to_zero_grace_period.as_nanos() as i64,
                autoscaler.target_concurrency_default,
                autoscaler.target_concurrency_percentage,
                autoscaler.max_scale_up_rate,
            ],
        )
        .map_err(StoreError::Insert)?;
        let run_id = tx.last_insert_rowid();

        {
            let mut insert_entity = tx
                .prepare("INSERT INTO entities (name, kind) VALUES (?1, ?2)")
                .map_err(StoreError::Insert)?;
            for entity in &outcome.entities {
                insert_entity
                    .execute(params![entity.name, entity.kind])
                    .map_err(StoreError::Insert)?;
            }

            let mut insert_stock = tx
                .prepare("INSERT INTO stocks (name, kind_stocked) VALUES (?1, ?2)")
                .map_err(StoreError::Insert)?;
            for stock in &outcome.stocks {
                insert_stock
                    .execute(params![stock.name, stock.kind_stocked])
                    .map_err(StoreError::Insert)?;
            }

            let mut insert_movement = tx
                .prepare(
                    "INSERT INTO movements (
                        scenario_run_id, kind, occurs_at, from_stock, to_stock, entity, note
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(StoreError::Insert)?;
            for movement in outcome.completed.iter().chain(outcome.ignored.iter()) {
                insert_movement
                    .execute(params![
                        run_id,
                        movement.kind,
                        movement.occurs_at,
                        movement.from_stock,
                        movement.to_stock,
                        movement.entity,
                        movement.note,
                    ])
                    .map_err(StoreError::Insert)?;
            }
        }

        tx.commit().map_err(StoreError::Transaction)?;
        info!(
            run_id,
            movements = outcome.completed.len() + outcome.ignored.len(),
            "scenario run stored"
        );
        Ok(run_id)
    }

    /// Direct access for read-back queries (tests, ad-hoc inspection).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
