pub mod dataset;
pub mod errors;
pub mod evaluation;
pub mod metric;
pub mod model;
pub mod space;

pub use dataset::*;
pub use errors::*;
pub use evaluation::*;
pub use metric::*;
pub use model::*;
pub use space::*;
