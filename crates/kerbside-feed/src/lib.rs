//! Kerbside feed - parking data sources
//!
//! Fetches raw bay records from the City of Melbourne sensor API (or a
//! local JSON dump) and loads suburb boundaries from GeoJSON.

pub mod file;
pub mod melbourne;
pub mod source;

pub use file::{GeoJsonBoundaries, JsonFileSource};
pub use melbourne::MelbourneClient;
pub use source::{decode_records, BaySource, BoundarySource, FeedError, StaticBoundaries, StaticSource};
