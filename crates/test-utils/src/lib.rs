//! Shared test utilities for the hydro-forcing workspace.
//!
//! Provides throw-away forcing directory trees laid out the way the
//! pipeline expects them, plus a matching configuration document.
//!
//! # Usage
//!
//! ```ignore
//! use test_utils::ForcingTree;
//!
//! let tree = ForcingTree::new();
//! tree.write_downscaled("RAP", "2023061505", "202306150600.LDASIN_DOMAIN1", b"fields");
//! let config = ForcingConfig::from_yaml_str(&tree.config_yaml()).unwrap();
//! ```

pub mod fixtures;

pub use fixtures::*;
