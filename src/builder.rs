//! Type-state builder for [`AtManager`]. Grounded on
//! `jpe::builder::BaseContextBuilder`'s `PhantomData`-tagged builder states
//! and fallible `build()`, collapsed from five transport-specific states
//! (`Serial`/`Network`/`SerialAsync`/`NetworkAsync`) to two, since this
//! crate's transport selection lives in the [`Adapter`](crate::adapter::Adapter)
//! implementation the caller supplies rather than in the builder itself.

use std::marker::PhantomData;

use crate::adapter::Adapter;
use crate::config::AtConfig;
use crate::error::AtResult;
use crate::manager::AtManager;

/// Builder state: no adapter supplied yet.
pub struct Init;
/// Builder state: ready to build.
pub struct WithAdapter;

/// Type-state builder: `AtManagerBuilder::new().with_adapter(a).build()`.
pub struct AtManagerBuilder<A, T> {
    adapter: Option<A>,
    config: AtConfig,
    _marker: PhantomData<T>,
}

impl<A: Adapter> Default for AtManagerBuilder<A, Init> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Adapter> AtManagerBuilder<A, Init> {
    pub fn new() -> Self {
        Self {
            adapter: None,
            config: AtConfig::default(),
            _marker: PhantomData,
        }
    }

    /// Supply the embedder's [`Adapter`] implementation, the only
    /// transition out of [`Init`].
    pub fn with_adapter(self, adapter: A) -> AtManagerBuilder<A, WithAdapter> {
        AtManagerBuilder {
            adapter: Some(adapter),
            config: self.config,
            _marker: PhantomData,
        }
    }
}

impl<A: Adapter> AtManagerBuilder<A, WithAdapter> {
    pub fn recv_bufsize(mut self, bytes: usize) -> Self {
        self.config.recv_bufsize = bytes;
        self
    }

    /// Set the URC accumulation buffer size; `0` disables URC recognition.
    pub fn urc_bufsize(mut self, bytes: usize) -> Self {
        self.config.urc_bufsize = bytes;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn urc_end_marks(mut self, marks: impl Into<String>) -> Self {
        self.config.urc_end_marks = marks.into();
        self
    }

    pub fn urc_timeout_ms(mut self, ms: u64) -> Self {
        self.config.urc_timeout_ms = ms;
        self
    }

    pub fn mem_limit(mut self, bytes: usize) -> Self {
        self.config.mem_limit = bytes;
        self
    }

    /// Validate the accumulated configuration and construct the manager.
    /// Mirrors `at_obj_create`'s buffer-size clamping plus the type-state
    /// builder's fallible `build()`.
    pub fn build(self) -> AtResult<AtManager<A>> {
        let config = self.config.normalize()?;
        let adapter = self
            .adapter
            .expect("with_adapter was called before build is reachable");
        Ok(AtManager::new(adapter, config))
    }
}
