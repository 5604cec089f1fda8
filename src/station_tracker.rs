//! Ingest pipeline: AX.25 decode, APRS parse, station upsert, event publish.
//!
//! The tracker is the only producer of `StateEvent`s. Frames are processed
//! one at a time in arrival order, so subscribers observe station updates in
//! the order packets were decoded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::{debug, error, info, trace};

use crate::aprs::{AprsPacket, DataType};
use crate::ax25;
use crate::broadcaster::EventBroadcaster;
use crate::events::{RawPacket, StateEvent};
use crate::kiss_client::KissEvent;
use crate::stations::{Station, Stats};
use crate::stations_repo::StationsRepository;

pub struct StationTracker {
    repo: StationsRepository,
    broadcaster: Arc<EventBroadcaster>,
    kiss_connected: AtomicBool,
}

impl StationTracker {
    pub fn new(repo: StationsRepository, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            repo,
            broadcaster,
            kiss_connected: AtomicBool::new(false),
        }
    }

    pub fn repository(&self) -> &StationsRepository {
        &self.repo
    }

    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    pub fn is_kiss_connected(&self) -> bool {
        self.kiss_connected.load(Ordering::Acquire)
    }

    /// Record the TNC connection state, publishing only on a transition
    pub fn set_kiss_connected(&self, connected: bool) {
        let previous = self.kiss_connected.swap(connected, Ordering::AcqRel);
        if previous == connected {
            return;
        }

        let event = if connected {
            StateEvent::TncConnected
        } else {
            StateEvent::TncDisconnected
        };
        self.broadcaster.publish(event);
    }

    /// Consume events from the KISS client until its sender is dropped.
    ///
    /// A packet that cannot be stored is logged and dropped; ingest carries on
    /// with the next frame.
    pub async fn run(&self, events: flume::Receiver<KissEvent>) {
        while let Ok(event) = events.recv_async().await {
            if let Err(e) = self.handle_kiss_event(event).await {
                error!("Failed to ingest packet: {:#}", e);
            }
        }
        self.set_kiss_connected(false);
        debug!("KISS event channel closed; ingest loop finished");
    }

    pub async fn handle_kiss_event(&self, event: KissEvent) -> Result<()> {
        match event {
            KissEvent::Connected { peer } => {
                info!("TNC connected ({})", peer);
                self.set_kiss_connected(true);
            }
            KissEvent::Disconnected => {
                info!("TNC disconnected");
                self.set_kiss_connected(false);
            }
            KissEvent::Frame(bytes) => {
                self.ingest_ax25(&bytes).await?;
            }
        }
        Ok(())
    }

    /// Decode and store one AX.25 frame.
    ///
    /// Frames that are not APRS UI frames, and frames with an empty
    /// information field, are dropped with `Ok(None)`.
    pub async fn ingest_ax25(&self, bytes: &[u8]) -> Result<Option<(Station, bool)>> {
        let Some(frame) = ax25::decode(bytes) else {
            metrics::counter!("tracker.frames_rejected_total").increment(1);
            debug!(
                "Dropping undecodable AX.25 frame ({} bytes): {}",
                bytes.len(),
                hex::encode(bytes)
            );
            return Ok(None);
        };

        if frame.info.is_empty() {
            metrics::counter!("tracker.frames_rejected_total").increment(1);
            debug!("Dropping frame from {} with empty information field", frame.source);
            return Ok(None);
        }

        let packet = AprsPacket::from_frame(&frame);
        self.ingest_packet(packet).await.map(Some)
    }

    /// Store a parsed packet and publish the resulting station update
    /// followed by the raw packet.
    pub async fn ingest_packet(&self, packet: AprsPacket) -> Result<(Station, bool)> {
        metrics::counter!("tracker.packets_parsed_total", "type" => packet.data_type.as_str())
            .increment(1);
        if packet.data_type == DataType::Position && packet.position.is_none() {
            metrics::counter!("tracker.positions_missing_total").increment(1);
            debug!(
                "No position decoded from {} packet: {}",
                packet.source, packet.raw_info
            );
        }
        trace!(
            "{} > {} via [{}]: {}",
            packet.source,
            packet.destination,
            packet.path.join(","),
            packet.raw_info
        );

        let (station, is_new) = match self.repo.upsert(&packet).await {
            Ok(result) => result,
            Err(e) => {
                metrics::counter!("tracker.upsert_failures_total").increment(1);
                return Err(e);
            }
        };
        metrics::counter!("tracker.upserts_total").increment(1);

        if is_new {
            info!("New station {}", station.callsign);
        }

        self.broadcaster.publish(StateEvent::StationUpdate {
            station: station.clone(),
            is_new,
        });
        self.broadcaster
            .publish(StateEvent::RawPacket(RawPacket::from(&packet)));

        Ok((station, is_new))
    }

    /// Recompute statistics and publish them
    pub async fn publish_stats(&self) -> Result<Stats> {
        let stats = self.repo.get_stats().await?;
        metrics::gauge!("tracker.stations").set(stats.total_stations as f64);
        metrics::gauge!("tracker.stations_with_position").set(stats.stations_with_position as f64);
        self.broadcaster.publish(StateEvent::StatsUpdate { stats });
        Ok(stats)
    }

    pub async fn prune_history(&self, retention_days: u32) -> Result<usize> {
        let deleted = self.repo.prune_history(retention_days).await?;
        metrics::counter!("tracker.history_pruned_total").increment(deleted as u64);
        if deleted > 0 {
            info!(
                "Pruned {} packet history rows older than {} days",
                deleted, retention_days
            );
        }
        Ok(deleted)
    }
}
