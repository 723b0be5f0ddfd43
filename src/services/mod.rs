pub mod access;
pub mod generator;
pub mod orchestrator;
pub mod queue;
pub mod storage;
