//! Federated object replication runtime.
//!
//! A [`Federation`] rebuilds a graph of replicated objects from streamed
//! change messages, deferring each object until everything it references
//! exists, and notifies per-class observers with exact changed flags. A
//! [`Runtime`] multiplexes any number of federations over one
//! [`Connection`](federa_transport::Connection), coalescing outgoing
//! messages and matching service replies to their requests.
//!
//! # Example
//!
//! ```
//! use federa_codec::{Value, ValueMap};
//! use federa_runtime::{Runtime, RuntimeConfig};
//! use federa_transport::{Connection, MemoryConnection};
//!
//! # fn main() -> federa_runtime::Result<()> {
//! let (client, mut server) = MemoryConnection::pair("client", "server");
//! let mut runtime = Runtime::new(RuntimeConfig::default().with_process_id("tab-1"))?;
//! runtime.connect(client)?;
//! server.open()?;
//!
//! let world = runtime.join_federation("world")?;
//! let mut props = ValueMap::new();
//! props.insert("hp".into(), Value::from(10));
//! world.create("Unit", props);
//!
//! runtime.pump()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod federation;
pub mod object;
pub mod object_class;
pub mod runtime;
pub mod service;

pub use config::{RetryPolicy, RuntimeConfig};
pub use error::{Result, RuntimeError};
pub use federation::{EventObserver, Federation, Outgoing, ServiceProvider};
pub use object::ObjectInstance;
pub use object_class::{ObjectClass, Observer, SubscriptionId};
pub use runtime::Runtime;
pub use service::{ServiceError, ServiceReply, ServiceResult};
