use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info};

use crate::aprs::AprsPacket;
use crate::schema::{packet_history, stations};
use crate::stations::{
    NewPacketHistoryRecord, NewStationRecord, PacketHistoryEntry, PacketHistoryRecord, Station,
    StationChangeset, StationRecord, Stats, to_millis,
};

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Default number of history rows returned per station
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

const IN_MEMORY: &str = ":memory:";

/// Applied to every pooled connection
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Open (creating if needed) the SQLite database at `path`.
pub fn create_pool(path: &str) -> Result<SqlitePool> {
    let in_memory = path == IN_MEMORY;

    if !in_memory
        && let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let manager = ConnectionManager::<SqliteConnection>::new(path);
    // Every connection to ":memory:" is a separate database
    let max_size = if in_memory { 1 } else { 8 };
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)
        .with_context(|| format!("Failed to open database {path}"))?;

    if !in_memory {
        let mut conn = pool.get().context("Failed to get database connection")?;
        conn.batch_execute("PRAGMA journal_mode = WAL;")
            .context("Failed to enable WAL journal")?;
    }

    info!("Opened station database at {}", path);
    Ok(pool)
}

pub fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut conn = pool.get().context("Failed to get database connection")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;
    for version in applied {
        info!("Applied migration {}", version);
    }
    Ok(())
}

#[derive(Clone)]
pub struct StationsRepository {
    pool: SqlitePool,
}

impl StationsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fold a decoded packet into its station and append it to the history.
    ///
    /// Returns the station as stored after the update and whether this was
    /// the first packet heard from the callsign. The read-modify-write runs in
    /// one IMMEDIATE transaction, so concurrent callers are serialised.
    pub async fn upsert(&self, packet: &AprsPacket) -> Result<(Station, bool)> {
        let pool = self.pool.clone();
        let packet = packet.clone();

        tokio::task::spawn_blocking(move || -> Result<(Station, bool)> {
            let mut conn = pool.get().context("Failed to get database connection")?;
            conn.immediate_transaction::<_, anyhow::Error, _>(|conn| upsert_packet(conn, &packet))
                .with_context(|| format!("Failed to upsert station {}", packet.source))
        })
        .await?
    }

    /// All stations, most recently heard first
    pub async fn get_all(&self) -> Result<Vec<Station>> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<Station>> {
            let mut conn = pool.get()?;
            let records = stations::table
                .order((stations::last_heard.desc(), stations::id.desc()))
                .select(StationRecord::as_select())
                .load(&mut conn)?;
            Ok(records.into_iter().map(Station::from).collect())
        })
        .await?
    }

    pub async fn get_by_callsign(&self, callsign: &str) -> Result<Option<Station>> {
        let pool = self.pool.clone();
        let callsign = callsign.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Station>> {
            let mut conn = pool.get()?;
            let record = find_station(&mut conn, &callsign)?;
            Ok(record.map(Station::from))
        })
        .await?
    }

    /// Most recent history entries for `callsign`, newest first. An unknown
    /// callsign has an empty history.
    pub async fn get_history(&self, callsign: &str, limit: i64) -> Result<Vec<PacketHistoryEntry>> {
        let pool = self.pool.clone();
        let callsign = callsign.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<PacketHistoryEntry>> {
            let mut conn = pool.get()?;
            let Some(station) = find_station(&mut conn, &callsign)? else {
                return Ok(Vec::new());
            };

            let records = PacketHistoryRecord::belonging_to(&station)
                .order((packet_history::received_at.desc(), packet_history::id.desc()))
                .limit(limit.max(0))
                .select(PacketHistoryRecord::as_select())
                .load(&mut conn)?;
            Ok(records.into_iter().map(PacketHistoryEntry::from).collect())
        })
        .await?
    }

    pub async fn get_stats(&self) -> Result<Stats> {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || -> Result<Stats> {
            let mut conn = pool.get()?;

            let total_stations: i64 = stations::table.count().get_result(&mut conn)?;
            let stations_with_position: i64 = stations::table
                .filter(stations::latitude.is_not_null())
                .filter(stations::longitude.is_not_null())
                .count()
                .get_result(&mut conn)?;
            let total_packets: i64 = packet_history::table.count().get_result(&mut conn)?;

            Ok(Stats {
                total_stations: total_stations.max(0) as u64,
                stations_with_position: stations_with_position.max(0) as u64,
                total_packets: total_packets.max(0) as u64,
            })
        })
        .await?
    }

    /// Delete history rows older than `older_than_days`; returns the number removed.
    pub async fn prune_history(&self, older_than_days: u32) -> Result<usize> {
        // A horizon reaching past the earliest representable time prunes nothing
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(older_than_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.prune_history_before(cutoff).await
    }

    pub async fn prune_history_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let pool = self.pool.clone();
        let cutoff_millis = to_millis(cutoff);

        tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut conn = pool.get()?;
            let deleted = diesel::delete(
                packet_history::table.filter(packet_history::received_at.lt(cutoff_millis)),
            )
            .execute(&mut conn)
            .context("Failed to prune packet history")?;
            debug!("Pruned {} history rows older than {}", deleted, cutoff);
            Ok(deleted)
        })
        .await?
    }
}

fn find_station(conn: &mut SqliteConnection, callsign: &str) -> QueryResult<Option<StationRecord>> {
    stations::table
        .filter(stations::callsign.eq(callsign))
        .select(StationRecord::as_select())
        .first(conn)
        .optional()
}

fn upsert_packet(conn: &mut SqliteConnection, packet: &AprsPacket) -> Result<(Station, bool)> {
    let now = to_millis(Utc::now());
    let heard_at = to_millis(packet.received_at);
    let coordinates = packet.coordinates();
    let latitude = coordinates.map(|c| c.latitude);
    let longitude = coordinates.map(|c| c.longitude);

    let existing = find_station(conn, &packet.source)?;
    let is_new = existing.is_none();

    let station_id = match existing {
        None => {
            let new_station = NewStationRecord {
                callsign: &packet.source,
                latitude,
                longitude,
                symbol: packet.symbol_code.to_string(),
                symbol_table: packet.symbol_table.to_string(),
                comment: &packet.comment,
                last_heard: heard_at,
                packet_count: 1,
                created_at: now,
                updated_at: now,
            };
            diesel::insert_into(stations::table)
                .values(&new_station)
                .execute(conn)?;

            stations::table
                .filter(stations::callsign.eq(&packet.source))
                .select(stations::id)
                .first::<i32>(conn)?
        }
        Some(record) => {
            // Symbol always follows the latest packet; position and comment
            // only when the packet carries them
            let changes = StationChangeset {
                latitude,
                longitude,
                symbol: packet.symbol_code.to_string(),
                symbol_table: packet.symbol_table.to_string(),
                comment: (!packet.comment.is_empty()).then_some(packet.comment.as_str()),
                last_heard: heard_at,
                packet_count: record.packet_count + 1,
                updated_at: now,
            };
            diesel::update(stations::table.find(record.id))
                .set(&changes)
                .execute(conn)?;
            record.id
        }
    };

    let history = NewPacketHistoryRecord {
        station_id,
        raw_packet: &packet.raw_info,
        latitude,
        longitude,
        path: packet.path.join(","),
        received_at: heard_at,
    };
    diesel::insert_into(packet_history::table)
        .values(&history)
        .execute(conn)?;

    let record = stations::table
        .find(station_id)
        .select(StationRecord::as_select())
        .first(conn)?;

    Ok((Station::from(record), is_new))
}
