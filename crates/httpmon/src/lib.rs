//! Top-level facade crate for httpmon.
//!
//! Re-exports the metrics core and the server instrumentation so users can depend on a single crate.

pub mod core {
    pub use httpmon_core::*;
}

pub mod server {
    pub use httpmon_server::*;
}
