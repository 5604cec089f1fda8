//! TNC tracker: ingest APRS traffic from a KISS TNC, keep per-station state
//! in SQLite, and relay state changes to live subscribers.

pub mod actions;
pub mod aprs;
pub mod ax25;
pub mod broadcaster;
pub mod config;
pub mod events;
pub mod geo;
pub mod kiss;
pub mod kiss_client;
pub mod log_format;
pub mod metrics;
pub mod schema;
pub mod station_tracker;
pub mod stations;
pub mod stations_repo;
pub mod web;

pub use aprs::{AprsPacket, DataType, Position};
pub use broadcaster::{ChannelSink, EventBroadcaster, EventSink, SinkError};
pub use events::{StateEvent, WireEvent};
pub use kiss_client::{KissClient, KissClientConfig, KissClientConfigBuilder, KissEvent};
pub use station_tracker::StationTracker;
pub use stations_repo::StationsRepository;
