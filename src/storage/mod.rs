pub mod background;
pub mod instance_cache;

pub use background::{BackgroundModel, BackgroundModelBuilder, MergeReport};
pub use instance_cache::InstanceMatrixCache;
