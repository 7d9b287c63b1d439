//! Patchgrid is a distributed data layer for block-structured adaptive mesh
//! refinement (AMR). A problem domain is tiled by fixed-size grid patches,
//! which are partitioned across ranks along a space-filling curve. Patch data
//! containers carry ghost zones, filled by communication schedules which are
//! computed once per layout and cached. On top of this sit a flux register,
//! which makes a two-level discretization conservative, a composite
//! operator applying a per-patch operator across a refinement hierarchy, and
//! a geometric multigrid solver.
//!
//! Ranks exchange messages through a `message::comm::Communicator`; the
//! collective operations built on it, along with the schedule cache, live in
//! an explicit `context::Context` handle held by every layout.

pub mod amr;
pub mod config;
pub mod context;
pub mod copier;
pub mod data;
pub mod domain;
pub mod error;
pub mod flux_register;
pub mod index_space;
pub mod interp;
pub mod layout;
pub mod message;
pub mod multigrid;
pub mod operator;
pub mod patch;
pub mod point;
pub mod point_set;

pub use error::Error;

/// The number of spatial dimensions.
pub const DIM: usize = 2;
