pub mod category;
pub mod classification;
pub mod job;
pub mod lead;

pub use category::*;
pub use classification::*;
pub use job::*;
pub use lead::*;
