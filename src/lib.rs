pub mod blend;
pub mod bounds;
pub mod diagnostics;
pub mod distance;
pub mod errors;
pub mod io;
pub mod merge;
pub mod progress;
pub mod registration;
pub mod volume;

pub use blend::BlendPolicy;
pub use bounds::{Boundary, BoundsAccumulator};
pub use merge::{MergeAccumulator, MergeConfig, MergeDriver, MergeError, MergeSummary};
pub use volume::{Direction, Geometry, Region, Volume};
