//! Module graph and import-cycle detection
//!
//! [`ModuleGraph`] is built once per scan from classified `@Module`
//! declarations and is immutable afterwards. [`find_cycles`] runs on its
//! structure only.

mod cycles;
mod module_graph;

pub use cycles::{find_cycles, Cycle};
pub use module_graph::{DanglingImport, ModuleCollision, ModuleGraph, ModuleNode};
