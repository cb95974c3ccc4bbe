mod subscription;
mod usage;

pub use subscription::*;
pub use usage::*;
