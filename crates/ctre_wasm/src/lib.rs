//! WASM bindings for the saddle-path solver.
//!
//! Inputs arrive as flat arrays or serialized core types; results go back
//! through `serde-wasm-bindgen`. All numerics live in `ctre_core`.

mod convert;
mod model;

pub use model::{solve_model, WasmLinearModel};
