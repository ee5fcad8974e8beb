//! boothscan: badge scanner bridge for event booths
//!
//! Reads scanned QR/barcodes from standard input, reduces each scan to a
//! canonical identifier and publishes it as a small JSON event to an MQTT
//! broker. The broker session is kept alive by `boothscan_mqtt`; every
//! publish waits for a live session first.
//!
//! ## Modules
//!
//! * `config`: Configuration structures, loading, validation, and defaults.
//!   TOML file located via `BOOTHSCAN_CONFIG` or `/etc/boothscan/config.toml`,
//!   validated with the `validator` crate.
//!
//! * `core`: Scanning pipeline:
//!   - Identifier extraction
//!   - Scan events and their wire format
//!   - Scan publisher
//!   - The input loop with duplicate suppression
//!
//! * `logger`: Centralized logging initialization using `tracing`.
//!   Console output in multiple formats, an append-only log file and
//!   optional systemd journald integration.

pub mod config;
pub mod core;
pub mod logger;
