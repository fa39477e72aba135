//! Session/Call boundary.
//!
//! A `Session` owns a backend registry and hands out opaque tokens for the
//! connectors and views it creates. Every call takes the session plus a
//! token; nothing the caller holds is ever a raw pointer into Rust memory.
//! The C surface in `capi` is a thin wrapper around these methods.

pub mod capi;
pub mod tokens;
pub mod types;

pub use tokens::{Token, TokenKind, TokenTable};
pub use types::{MetadataRaw, ReadDataRaw, WriteDataRaw};

use crate::config::MemConfig;
use crate::connector::{BackendRegistry, ConnectorInstance, PhysicalView};
use crate::connectors;
use crate::error::{MemError, Result};
use crate::mem::cache::CachedView;
use crate::mem::{BatchStatus, MemoryView, PhysicalMemoryMetadata, ReadData, WriteData};
use crate::types::Address;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// A view as held by a session: the physical view, optionally behind a page
/// cache shared by all clones of the token.
#[derive(Clone)]
struct SessionView {
    phys: PhysicalView,
    cache: Option<Arc<CachedView<PhysicalView>>>,
}

impl SessionView {
    fn as_view(&self) -> &dyn MemoryView {
        match &self.cache {
            Some(cache) => cache.as_ref(),
            None => &self.phys,
        }
    }
}

/// Live token counts of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveTokens {
    pub connectors: usize,
    pub views: usize,
}

/// Boundary session: registry, configuration and token tables.
pub struct Session {
    id: Uuid,
    registry: BackendRegistry,
    config: MemConfig,
    connectors: Mutex<TokenTable<ConnectorInstance>>,
    views: Mutex<TokenTable<SessionView>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Open a session. The configuration is validated first.
    pub fn new(registry: BackendRegistry, config: MemConfig) -> Result<Self> {
        config.validate()?;
        let id = Uuid::new_v4();
        debug!(session = %id, backends = registry.len(), "session opened");
        Ok(Self {
            id,
            registry,
            config,
            connectors: Mutex::new(TokenTable::new(TokenKind::Connector)),
            views: Mutex::new(TokenTable::new(TokenKind::View)),
        })
    }

    /// Session over the built-in backends.
    pub fn with_builtin(config: MemConfig) -> Result<Self> {
        let registry = connectors::builtin_registry(&config);
        Self::new(registry, config)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MemConfig {
        &self.config
    }

    pub fn available_connectors(&self) -> Vec<&str> {
        self.registry.names()
    }

    pub fn live_tokens(&self) -> LiveTokens {
        LiveTokens {
            connectors: lock(&self.connectors).live(),
            views: lock(&self.views).live(),
        }
    }

    pub fn create_connector(&self, name: &str, args: &str) -> Result<Token> {
        let conn = self.registry.create(name, args)?;
        let token = lock(&self.connectors).insert(conn)?;
        debug!(session = %self.id, connector = name, token = format_args!("{token:#x}"), "connector created");
        Ok(token)
    }

    /// New token sharing the same backend.
    pub fn clone_connector(&self, token: Token) -> Result<Token> {
        let mut table = lock(&self.connectors);
        let conn = table.get(token)?.clone();
        table.insert(conn)
    }

    pub fn release_connector(&self, token: Token) -> Result<()> {
        let conn = lock(&self.connectors)
            .remove(token)
            .map_err(|e| self.report_release_error(e))?;
        // teardown, if this was the last share, runs outside the table lock
        conn.release();
        Ok(())
    }

    /// Pause the target behind a connector.
    pub fn pause_connector(&self, connector: Token) -> Result<()> {
        self.connector(connector)?.pause()
    }

    pub fn resume_connector(&self, connector: Token) -> Result<()> {
        self.connector(connector)?.resume()
    }

    fn connector(&self, token: Token) -> Result<ConnectorInstance> {
        lock(&self.connectors).get(token).cloned()
    }

    /// Derive a physical view from a connector token.
    pub fn phys_view(&self, connector: Token) -> Result<Token> {
        let phys = lock(&self.connectors).get(connector)?.physical_view();
        let cache = self
            .config
            .cache
            .enabled
            .then(|| CachedView::new(phys.clone(), self.config.io.page_size, &self.config.cache))
            .transpose()?
            .map(Arc::new);
        lock(&self.views).insert(SessionView { phys, cache })
    }

    pub fn clone_view(&self, view: Token) -> Result<Token> {
        let mut table = lock(&self.views);
        let v = table.get(view)?.clone();
        table.insert(v)
    }

    pub fn release_view(&self, view: Token) -> Result<()> {
        let v = lock(&self.views)
            .remove(view)
            .map_err(|e| self.report_release_error(e))?;
        drop(v);
        Ok(())
    }

    fn report_release_error(&self, err: MemError) -> MemError {
        if let MemError::UseAfterRelease { token } = &err {
            error!(session = %self.id, token = format_args!("{token:#x}"), "double release");
        }
        err
    }

    /// Clone the view out so I/O runs without holding the table lock.
    fn view(&self, view: Token) -> Result<SessionView> {
        lock(&self.views).get(view).cloned()
    }

    /// Reject batches above `max_batch_entries`.
    pub(crate) fn check_batch(&self, entries: usize) -> Result<()> {
        if entries > self.config.io.max_batch_entries {
            return Err(MemError::InvalidArgs(format!(
                "batch of {entries} entries exceeds limit of {}",
                self.config.io.max_batch_entries
            )));
        }
        Ok(())
    }

    pub fn read_raw_into(&self, view: Token, address: Address, out: &mut [u8]) -> Result<()> {
        self.view(view)?.as_view().read_raw_into(address, out)
    }

    pub fn read_raw_list(&self, view: Token, data: &mut [ReadData<'_>]) -> Result<BatchStatus> {
        self.check_batch(data.len())?;
        Ok(self.view(view)?.as_view().read_raw_list(data))
    }

    pub fn write_raw(&self, view: Token, address: Address, data: &[u8]) -> Result<()> {
        self.view(view)?.as_view().write_raw(address, data)
    }

    pub fn write_raw_list(&self, view: Token, data: &[WriteData<'_>]) -> Result<BatchStatus> {
        self.check_batch(data.len())?;
        Ok(self.view(view)?.as_view().write_raw_list(data))
    }

    pub fn metadata(&self, view: Token) -> Result<PhysicalMemoryMetadata> {
        Ok(self.view(view)?.phys.metadata())
    }

    /// Metadata straight from a connector token.
    pub fn connector_metadata(&self, connector: Token) -> Result<PhysicalMemoryMetadata> {
        Ok(lock(&self.connectors).get(connector)?.metadata())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let views = lock(&self.views).clear();
        let connectors = lock(&self.connectors).clear();
        if views + connectors > 0 {
            warn!(session = %self.id, views, connectors, "session closed with live tokens");
        } else {
            debug!(session = %self.id, "session closed");
        }
    }
}
