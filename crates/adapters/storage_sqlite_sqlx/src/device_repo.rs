//! `SQLite` implementation of [`DeviceRepository`].
//!
//! A device is stored as one `devices` row (vitals inlined) plus one
//! `circuits` row per circuit. Writes touch both tables in one transaction.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::TimeDelta;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, SqlitePool};

use relayhub_app::ports::DeviceRepository;
use relayhub_domain::circuit::{Circuit, CircuitState};
use relayhub_domain::device::{Device, DeviceConfig, DeviceVitals, Liveness};
use relayhub_domain::error::{NotFoundError, RelayHubError};
use relayhub_domain::id::{CircuitId, DeviceId};
use relayhub_domain::time::Timestamp;

use crate::error::{StorageError, decode_error};

type Query<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// A `devices` row, before its circuits are attached.
struct DeviceRow {
    id: DeviceId,
    name: String,
    keepalive_interval: TimeDelta,
    config_interval: TimeDelta,
    new_state_interval: TimeDelta,
    vitals: DeviceVitals,
}

impl DeviceRow {
    fn into_device(self, circuits: Vec<Circuit>) -> Result<Device, sqlx::Error> {
        Device::builder(self.id)
            .name(self.name)
            .circuits(circuits)
            .keepalive_interval(self.keepalive_interval)
            .config_interval(self.config_interval)
            .new_state_interval(self.new_state_interval)
            .vitals(self.vitals)
            .build()
            .map_err(decode_error)
    }
}

fn parse_timestamp(value: Option<String>) -> Result<Option<Timestamp>, sqlx::Error> {
    value
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.to_utc())
                .map_err(decode_error)
        })
        .transpose()
}

fn parse_liveness(value: &str) -> Result<Liveness, sqlx::Error> {
    value.parse().map_err(decode_error)
}

impl<'r> FromRow<'r, SqliteRow> for DeviceRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: i16 = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let keepalive_ms: i64 = row.try_get("keepalive_interval_ms")?;
        let config_ms: i64 = row.try_get("config_interval_ms")?;
        let new_state_ms: i64 = row.try_get("new_state_interval_ms")?;
        let actual_state: String = row.try_get("actual_state")?;
        let desired_state: String = row.try_get("desired_state")?;

        let vitals = DeviceVitals {
            actual_state: parse_liveness(&actual_state)?,
            desired_state: parse_liveness(&desired_state)?,
            last_command_receive_time: parse_timestamp(row.try_get("last_command_receive_time")?)?,
            last_keep_alive_send_time: parse_timestamp(row.try_get("last_keep_alive_send_time")?)?,
            last_config_send_time: parse_timestamp(row.try_get("last_config_send_time")?)?,
            last_new_state_send_time: parse_timestamp(row.try_get("last_new_state_send_time")?)?,
            actual_config: DeviceConfig::from_secs(
                row.try_get("actual_standby_timeout_secs")?,
                row.try_get("actual_heartbeat_interval_secs")?,
            ),
            desired_config: DeviceConfig::from_secs(
                row.try_get("desired_standby_timeout_secs")?,
                row.try_get("desired_heartbeat_interval_secs")?,
            ),
        };

        Ok(Self {
            id: DeviceId::new(id),
            name,
            keepalive_interval: TimeDelta::milliseconds(keepalive_ms),
            config_interval: TimeDelta::milliseconds(config_ms),
            new_state_interval: TimeDelta::milliseconds(new_state_ms),
            vitals,
        })
    }
}

/// A `circuits` row, tagged with its owning device.
struct CircuitRow {
    device_id: DeviceId,
    circuit: Circuit,
}

impl<'r> FromRow<'r, SqliteRow> for CircuitRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let device_id: i16 = row.try_get("device_id")?;
        let id: i16 = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let actual_state: bool = row.try_get("actual_state")?;
        let desired_state: bool = row.try_get("desired_state")?;

        Ok(Self {
            device_id: DeviceId::new(device_id),
            circuit: Circuit {
                id: CircuitId::new(id),
                name,
                actual_state: CircuitState::from(actual_state),
                desired_state: CircuitState::from(desired_state),
            },
        })
    }
}

// Column order shared by INSERT_DEVICE and UPDATE_DEVICE; id always binds last.
const INSERT_DEVICE: &str = "INSERT INTO devices (\
    name, keepalive_interval_ms, config_interval_ms, new_state_interval_ms, \
    actual_state, desired_state, \
    last_command_receive_time, last_keep_alive_send_time, last_config_send_time, last_new_state_send_time, \
    actual_standby_timeout_secs, actual_heartbeat_interval_secs, \
    desired_standby_timeout_secs, desired_heartbeat_interval_secs, \
    id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const UPDATE_DEVICE: &str = "UPDATE devices SET \
    name = ?, keepalive_interval_ms = ?, config_interval_ms = ?, new_state_interval_ms = ?, \
    actual_state = ?, desired_state = ?, \
    last_command_receive_time = ?, last_keep_alive_send_time = ?, last_config_send_time = ?, last_new_state_send_time = ?, \
    actual_standby_timeout_secs = ?, actual_heartbeat_interval_secs = ?, \
    desired_standby_timeout_secs = ?, desired_heartbeat_interval_secs = ? \
    WHERE id = ?";
const EXISTS_DEVICE: &str = "SELECT 1 FROM devices WHERE id = ?";
const SELECT_DEVICE_BY_ID: &str = "SELECT * FROM devices WHERE id = ?";
const SELECT_ALL_DEVICES: &str = "SELECT * FROM devices ORDER BY id";
const SELECT_DEVICE_IDS: &str = "SELECT id FROM devices ORDER BY id";
const SELECT_CIRCUITS: &str = "SELECT * FROM circuits WHERE device_id = ? ORDER BY position";
const SELECT_ALL_CIRCUITS: &str = "SELECT * FROM circuits ORDER BY device_id, position";
const DELETE_CIRCUITS: &str = "DELETE FROM circuits WHERE device_id = ?";
const INSERT_CIRCUIT: &str = "INSERT INTO circuits \
    (device_id, id, position, name, actual_state, desired_state) VALUES (?, ?, ?, ?, ?, ?)";

fn bind_device<'q>(query: Query<'q>, device: &Device) -> Query<'q> {
    let vitals = device.vitals();
    query
        .bind(device.name().to_string())
        .bind(device.keepalive_interval().num_milliseconds())
        .bind(device.config_interval().num_milliseconds())
        .bind(device.new_state_interval().num_milliseconds())
        .bind(vitals.actual_state.as_str())
        .bind(vitals.desired_state.as_str())
        .bind(vitals.last_command_receive_time.map(|ts| ts.to_rfc3339()))
        .bind(vitals.last_keep_alive_send_time.map(|ts| ts.to_rfc3339()))
        .bind(vitals.last_config_send_time.map(|ts| ts.to_rfc3339()))
        .bind(vitals.last_new_state_send_time.map(|ts| ts.to_rfc3339()))
        .bind(vitals.actual_config.standby_timeout_secs())
        .bind(vitals.actual_config.heartbeat_interval_secs())
        .bind(vitals.desired_config.standby_timeout_secs())
        .bind(vitals.desired_config.heartbeat_interval_secs())
        .bind(device.id().value())
}

async fn insert_circuits(
    conn: &mut sqlx::SqliteConnection,
    device: &Device,
) -> Result<(), sqlx::Error> {
    for (position, circuit) in (0_i64..).zip(device.circuits()) {
        sqlx::query(INSERT_CIRCUIT)
            .bind(device.id().value())
            .bind(circuit.id.value())
            .bind(position)
            .bind(circuit.name.clone())
            .bind(circuit.actual_state.is_on())
            .bind(circuit.desired_state.is_on())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// `SQLite`-backed device repository.
#[derive(Debug, Clone)]
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DeviceRepository for SqliteDeviceRepository {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let mut tx = pool.begin().await.map_err(StorageError::from)?;

            let existing: Option<(i64,)> = sqlx::query_as(EXISTS_DEVICE)
                .bind(device.id().value())
                .fetch_optional(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            if existing.is_some() {
                return Err(RelayHubError::DeviceExists(device.id()));
            }

            bind_device(sqlx::query(INSERT_DEVICE), &device)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            insert_circuits(&mut tx, &device)
                .await
                .map_err(StorageError::from)?;
            tx.commit().await.map_err(StorageError::from)?;

            Ok(device)
        }
    }

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, RelayHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let mut conn = pool.acquire().await.map_err(StorageError::from)?;

            let row: Option<DeviceRow> = sqlx::query_as(SELECT_DEVICE_BY_ID)
                .bind(id.value())
                .fetch_optional(&mut *conn)
                .await
                .map_err(StorageError::from)?;
            let Some(row) = row else {
                return Ok(None);
            };

            let circuits: Vec<CircuitRow> = sqlx::query_as(SELECT_CIRCUITS)
                .bind(id.value())
                .fetch_all(&mut *conn)
                .await
                .map_err(StorageError::from)?;

            let device = row
                .into_device(circuits.into_iter().map(|c| c.circuit).collect())
                .map_err(StorageError::from)?;
            Ok(Some(device))
        }
    }

    fn list_ids(&self) -> impl Future<Output = Result<Vec<DeviceId>, RelayHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<(i16,)> = sqlx::query_as(SELECT_DEVICE_IDS)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|(id,)| DeviceId::new(id)).collect())
        }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, RelayHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let mut conn = pool.acquire().await.map_err(StorageError::from)?;

            let rows: Vec<DeviceRow> = sqlx::query_as(SELECT_ALL_DEVICES)
                .fetch_all(&mut *conn)
                .await
                .map_err(StorageError::from)?;
            let circuit_rows: Vec<CircuitRow> = sqlx::query_as(SELECT_ALL_CIRCUITS)
                .fetch_all(&mut *conn)
                .await
                .map_err(StorageError::from)?;

            let mut circuits: BTreeMap<DeviceId, Vec<Circuit>> = BTreeMap::new();
            for row in circuit_rows {
                circuits.entry(row.device_id).or_default().push(row.circuit);
            }

            let devices = rows
                .into_iter()
                .map(|row| {
                    let owned = circuits.remove(&row.id).unwrap_or_default();
                    row.into_device(owned)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(StorageError::from)?;
            Ok(devices)
        }
    }

    fn save(&self, device: Device) -> impl Future<Output = Result<Device, RelayHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let mut tx = pool.begin().await.map_err(StorageError::from)?;

            let updated = bind_device(sqlx::query(UPDATE_DEVICE), &device)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            if updated.rows_affected() == 0 {
                return Err(NotFoundError::device(device.id()).into());
            }

            sqlx::query(DELETE_CIRCUITS)
                .bind(device.id().value())
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            insert_circuits(&mut tx, &device)
                .await
                .map_err(StorageError::from)?;
            tx.commit().await.map_err(StorageError::from)?;

            Ok(device)
        }
    }
}
