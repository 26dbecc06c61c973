//! Adaptive geospatial binning of species occurrence records into a
//! quadtree of variable-resolution grid cells.
//!
//! ```rust
//! use geobin::{QuadtreeGeoBinner, Record};
//!
//! let mut binner = QuadtreeGeoBinner::new();
//! binner.add_feature(Record::point("Wood stork", -58.2, -12.6))?;
//! binner.add_feature(Record::point("Wood stork", -58.3, -12.5))?;
//!
//! let cells = binner.cells();
//! assert_eq!(cells.len(), 1);
//! assert_eq!(cells[0].species_top_list[0].count, 2);
//! # Ok::<(), geobin::BinningError>(())
//! ```

pub mod binner;
pub mod cell;
pub mod error;
pub mod network;
pub mod stats;
pub mod types;

mod patch;

pub use binner::{BinnerStats, QuadtreeGeoBinner};
pub use cell::GeoCell;
pub use error::{BinningError, Result};

pub type Binner = QuadtreeGeoBinner;

pub use geo::{Point, Rect};

pub use network::BipartiteEdge;

pub use stats::{CellArea, CellSummary, SpeciesCount, SpeciesTopList, SphericalArea};

pub use types::{Config, Geometry, Occurrence, PatchMode, Record};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Binner, BinningError, QuadtreeGeoBinner, Result};

    pub use geo::{Point, Rect};

    pub use crate::{Config, PatchMode, Record};

    pub use crate::{BipartiteEdge, CellSummary, SpeciesCount};
}
