//! Federated object replication.
//!
//! federa keeps graphs of live objects in step across processes. Each side
//! streams compact, dictionary-compressed change messages and rebuilds the
//! other side's objects, deferring every object until the objects it
//! references exist.
//!
//! # Crate Structure
//!
//! - [`codec`]: Value model, object identifiers and the binary wire codec
//! - [`transport`]: Protocol packets, framing and connections
//! - [`runtime`]: Federations, object classes and service requests (behind `runtime` feature)

/// Re-export codec types.
pub mod codec {
    pub use federa_codec::*;
}

/// Re-export transport types.
pub mod transport {
    pub use federa_transport::*;
}

/// Re-export runtime types (requires `runtime` feature).
#[cfg(feature = "runtime")]
pub mod runtime {
    pub use federa_runtime::*;
}
