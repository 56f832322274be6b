//! topoforge: virtual network lab topology synthesis.
//!
//! Turns a handful of shape parameters into a complete lab: nodes,
//! switch fabrics, links, addressing and per-device day-zero
//! configuration. Five topology modes are supported (sequential chain,
//! random mesh, flat fabric, paired flat fabric, DMVPN hub-spoke) and
//! two emission backends realize the result (a declarative lab
//! document, or create/link/configure calls against a controller).

pub mod addressing;
pub mod builder;
pub mod config;
pub mod emit;
pub mod error;
pub mod guardrails;
pub mod layout;
pub mod model;
pub mod params;
pub mod render;
