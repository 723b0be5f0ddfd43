//! Asynchronous report bundle generation service.
//!
//! A client submits an assessment payload, the slow generation work runs
//! detached from the request cycle, and the client polls for completion
//! and retrieves results through time-limited access handles. Ingress and
//! worker never talk to each other directly; the durable job record is
//! the only synchronization primitive between them.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod testing;
