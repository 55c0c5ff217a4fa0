//! Top-level facade crate for meterhub.
//!
//! Re-exports the core engine and the export layer so users can depend on a single crate.

pub mod core {
    pub use meterhub_core::*;
}

pub mod export {
    pub use meterhub_export::*;
}
