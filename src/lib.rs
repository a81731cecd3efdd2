pub mod error;
pub mod graph;
pub mod loader;
pub mod nodes;
pub mod runtime;
pub mod script;
