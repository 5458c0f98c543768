// sentinel-common: Shared configuration engine and runtime support
// Used by sentinel-core (server) and by service adapters embedding the engine

pub mod config;
pub mod logging;
pub mod storage;
