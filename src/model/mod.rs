pub mod actor;
pub mod audit;
pub mod common;
pub mod instance;
pub mod lineage;
pub mod template;

pub use actor::*;
pub use audit::*;
pub use common::*;
pub use instance::*;
pub use lineage::*;
pub use template::*;
