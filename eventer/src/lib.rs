//! TCP state-change auditing with eBPF
//!
//! Attaches a BPF program to the `sock:inet_sock_set_state` tracepoint and
//! streams every TCP state transition to userspace as an [`Event`].
//!
//! ```no_run
//! # async fn audit() -> anyhow::Result<()> {
//! let eventer = tcp_audit_ebpf::Eventer::new()?;
//! let event = eventer.event().await?;
//! println!("{event}");
//! eventer.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decoder;
pub mod dropped;
pub mod endian;
pub mod error;
pub mod eventer;
pub mod events;
pub mod factory;
pub mod module;
pub mod object;
pub mod program;
pub mod runner;
pub mod types;

pub use config::EventerConfig;
pub use decoder::{CStructDecoder, Decoder};
pub use dropped::{DropHandler, LoggingDropHandler};
pub use endian::ByteOrder;
pub use error::{DecodeError, EventerClosed, LoadError};
pub use eventer::Eventer;
pub use runner::{BpfRunner, Runner};
pub use types::{Event, SocketInfo, SocketState, TcpState};
