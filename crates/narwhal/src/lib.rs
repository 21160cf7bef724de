#![forbid(unsafe_code)]

//! Tick-driven force-directed placement.
//!
//! `narwhal` moves a set of entities every tick under forces contributed by independent,
//! weighted force planes. Space is a 2D or 3D grid, optionally toroidal; neighbor queries go
//! through a sector index so a tick stays close to linear in the number of entities. After every
//! tick the positions can be clustered and the clusters colored stably across ticks.
//!
//! The library never installs a `tracing` subscriber.

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod force;
pub mod geometry;
pub mod plane;
pub mod rng;
pub mod sector;
pub mod weights;

pub use cluster::{
    AttractionClusterer, Cluster, ClusterBridge, ClusterParams, Clusterer, Color, ColorRegistry,
    Palette, ProximityClusterer,
};
pub use config::{
    AmplificationConfig, ClusterConfig, Dimensions, DistanceConfig, EngineConfig, GridConfig,
};
pub use engine::{Engine, Snapshot, TickReport};
pub use error::{Error, Result};
pub use force::{ForceAccumulator, ForceAggregator};
pub use geometry::{DirectionVector, Geometry, Position};
pub use plane::{ForceSource, Plane, PlaneRegistry, TagAffinity};
pub use rng::XorShift64Star;
pub use sector::{SectorCoord, SectorIndex};
pub use weights::{NoWeights, WeightProvider, WeightTable};
