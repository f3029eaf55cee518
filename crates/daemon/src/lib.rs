// notetally-daemon library: storage backends, the list-based lock, the
// aggregation engine and the process wiring shared with the CLI.

pub mod config;
pub mod engine;
pub mod hash;
pub mod lock;
pub mod logging;
pub mod provider;
pub mod runtime;
pub mod schedule;
pub mod store;
