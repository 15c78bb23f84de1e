//! Zigbee device definitions.
//!
//! This library describes Zigbee devices for a bridge: what each model can
//! do ([`exposes`]), how its messages translate to state ([`converters`]),
//! how it is configured after joining ([`reporting`], [`extend`]) and how a
//! joined device is matched to its definition ([`registry`]). The radio
//! itself stays behind the traits in [`radio`].

pub mod cluster;
pub mod config;
pub mod context;
pub mod converters;
pub mod definition;
pub mod devices;
pub mod error;
pub mod exposes;
pub mod extend;
pub mod fingerprint;
pub mod light;
pub mod polling;
pub mod radio;
pub mod registry;
pub mod reporting;
pub mod store;

pub use cluster::Cluster;
pub use config::{Config, MatchPolicy};
pub use context::Context;
pub use definition::{Definition, Event};
pub use error::{DefinitionError, Result};
pub use extend::{Archetype, Extend, LightOptions, SwitchOptions};
pub use registry::{Registry, Resolved};
pub use store::Store;
