pub mod region_grow;
pub mod lasso;
pub mod area_filter;
pub mod extraction;

pub use region_grow::*;
pub use lasso::*;
pub use area_filter::*;
pub use extraction::*;
