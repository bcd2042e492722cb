pub mod example;
pub mod outcome;
pub mod verdict;

pub use example::*;
pub use outcome::*;
pub use verdict::*;
