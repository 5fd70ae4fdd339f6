mod fs;
mod traits;
mod types;

pub use fs::*;
pub use traits::*;
pub use types::*;
