pub mod euid;
pub mod filter;
pub mod graph;
pub mod layout;

pub use euid::*;
pub use filter::*;
pub use graph::*;
pub use layout::*;
