pub mod audit;
pub mod data;
pub mod dates;
pub mod intent;
pub mod params;
pub mod plan;
pub mod schema;
pub mod verdict;

pub use audit::*;
pub use data::*;
pub use dates::*;
pub use intent::*;
pub use params::*;
pub use plan::*;
pub use schema::*;
pub use verdict::*;
