mod docker;
mod dry_run;
#[cfg(test)]
pub mod memory;

pub use docker::DockerBackend;
pub use dry_run::DryRunBackend;
