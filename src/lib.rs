//! Text-to-speech job dispatch: an HTTP intake that queues generation jobs, a
//! single delivery worker that forwards them to a rendering service over a
//! persistent TCP connection, and a status table updated by completion
//! callbacks.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
