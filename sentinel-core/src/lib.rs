// sentinel-core: Service layer of the sentinel monitoring server
// Exposes runtime configuration over HTTP and feeds live services with
// resolved configuration updates

pub mod service;
