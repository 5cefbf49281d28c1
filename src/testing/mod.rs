//! Deterministic collaborators for tests, demos and the CLI simulator.
//!
//! Nothing here touches audio hardware or the network: spectra are
//! generated procedurally and manifests are built in memory.

pub mod fixture_manifest;
pub mod synthetic;

pub use fixture_manifest::{fixture_manifest, write_sine_wav, FixtureManifest};
pub use synthetic::SyntheticSpectrum;
