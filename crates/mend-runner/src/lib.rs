//! Mend Runner - process-backed sandboxes
//!
//! Implements the `mend_core::sandbox::Sandbox` trait on top of
//! `tokio::process`:
//! - `DockerSandbox` runs inside an existing container via `docker exec`
//! - `LocalSandbox` runs against a directory on the host
//!
//! Both share a `ProcessRunner` that enforces a wall-clock timeout.

pub mod docker;
pub mod local;
pub mod runner;

// Re-export key types
pub use docker::DockerSandbox;
pub use local::LocalSandbox;
pub use runner::ProcessRunner;
