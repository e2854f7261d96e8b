// Rassegna: daily topic modeling and per-newspaper aggregation for news
//
// This is the library root. `topics` is the backend-agnostic core;
// `backends` holds the three discovery algorithms; `pipeline` drives runs
// and `db` stores what they produce.

pub mod backends;
pub mod config;
pub mod db;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod status;
pub mod topics;
