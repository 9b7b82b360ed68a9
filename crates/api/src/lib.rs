//! Dispatcher process: WebSocket front door, result correlator, health.

pub mod app;
