//! A cooperative, single-threaded AT-command manager for driving a modem
//! over a byte-oriented serial link.
//!
//! [`AtManager`] owns a two-priority work queue, a response matcher, and a
//! two-phase unsolicited-result-code (URC) recognizer, and advances all three
//! from one non-blocking call, [`AtManager::process`], invoked once per tick
//! from the embedder's own loop. No I/O is ever blocking and no error is ever
//! returned across that boundary: per-command failures surface through
//! [`ResponseCode`] and the [`Adapter::error`] hook instead.
//!
//! Build a manager with [`AtManagerBuilder`], supplying an [`Adapter`] that
//! wraps the embedder's transport (a concrete [`transport::serial::SerialAdapter`]
//! or [`transport::tcp::TcpAdapter`] are provided behind features, or the
//! embedder's own type for anything else):
//!
//! ```no_run
//! use at_chat::{AtManagerBuilder, WorkAttributes};
//! use at_chat::transport::loopback::LoopbackAdapter;
//!
//! # fn example() -> at_chat::AtResult<()> {
//! let mut manager = AtManagerBuilder::new()
//!     .with_adapter(LoopbackAdapter::new())
//!     .build()?;
//! let handle = manager.send_line(b"AT".to_vec(), WorkAttributes::default())?;
//! loop {
//!     manager.process();
//!     if let Some(ctx) = manager.context_of(handle) {
//!         if ctx.state == at_chat::WorkState::Finished {
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod builder;
pub mod config;
pub mod environment;
pub mod error;
pub(crate) mod generic;
pub mod manager;
pub mod matcher;
pub(crate) mod multiline;
pub(crate) mod queue;
pub(crate) mod raw;
pub(crate) mod state_machine;
pub mod transport;
pub mod urc;
pub mod work;

pub use adapter::{Adapter, ErrorEvent};
pub use builder::AtManagerBuilder;
pub use config::AtConfig;
pub use environment::Env;
pub use error::{AtResult, Error};
pub use manager::AtManager;
pub use raw::{RawPeer, RawTransportConfig};
pub use urc::{UrcStatus, UrcSubscription};
pub use work::{Priority, ResponseCode, WorkAttributes, WorkContext, WorkHandle, WorkKind, WorkState};

#[cfg(feature = "logging")]
pub use adapter::LoggingAdapter;
