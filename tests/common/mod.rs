//! Common test utilities for database-backed integration tests
//!
//! `TestDatabase` opens a fresh SQLite file inside a temporary directory and
//! applies the embedded migrations, so every test runs against an isolated
//! database that is removed when the value is dropped.

#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use tnc_tracker::aprs::AprsPacket;
use tnc_tracker::ax25::{self, Ax25Address};
use tnc_tracker::stations_repo::{SqlitePool, StationsRepository, create_pool, run_migrations};

pub struct TestDatabase {
    /// Keeps the directory (and the database in it) alive
    _dir: TempDir,
    path: String,
    pool: SqlitePool,
}

impl TestDatabase {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("Failed to create temp dir")?;
        let path = dir
            .path()
            .join("stations.db")
            .to_string_lossy()
            .into_owned();

        let pool = create_pool(&path)?;
        run_migrations(&pool)?;

        Ok(Self {
            _dir: dir,
            path,
            pool,
        })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn repository(&self) -> StationsRepository {
        StationsRepository::new(self.pool())
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// AX.25 UI frame from `source` (CALL or CALL-N) to APRS with the given info field
pub fn ui_frame(source: &str, digipeaters: &[&str], info: &[u8]) -> Vec<u8> {
    ax25::encode_ui_frame(
        &Ax25Address::new("APRS", 0),
        &address(source),
        &digipeaters.iter().map(|d| address(d)).collect::<Vec<_>>(),
        info,
    )
}

pub fn address(call: &str) -> Ax25Address {
    match call.split_once('-') {
        Some((base, ssid)) => Ax25Address::new(base, ssid.parse().unwrap_or(0)),
        None => Ax25Address::new(call, 0),
    }
}

/// Decode a frame built by [`ui_frame`] into a packet stamped `received_at`
pub fn packet_at(source: &str, info: &str, received_at: DateTime<Utc>) -> AprsPacket {
    let frame = ui_frame(source, &["WIDE1-1"], info.as_bytes());
    let decoded = ax25::decode(&frame).expect("test frame should decode");
    let mut packet = AprsPacket::from_frame(&decoded);
    packet.received_at = received_at;
    packet
}

pub fn packet(source: &str, info: &str) -> AprsPacket {
    packet_at(source, info, Utc::now())
}
