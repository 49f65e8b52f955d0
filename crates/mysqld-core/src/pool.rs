//! Start-or-reuse entry points backed by a port-keyed registry.

use crate::cancel::InterruptToken;
use crate::config::MysqldSettings;
use crate::error::Result;
use crate::mysqld::{Mysqld, SharedRegistry};
use crate::registry::Registry;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::info;

static GLOBAL_POOL: OnceLock<MysqldPool> = OnceLock::new();

/// Owns the port → instance registry and the settings new instances use.
///
/// Cloning is cheap and clones share the same registry. Starting an instance
/// holds the registry lock for the whole look-up, construct, register and
/// run sequence, so concurrent callers asking for the same port get the same
/// instance and only one process is spawned.
#[derive(Clone)]
pub struct MysqldPool {
    registry: Arc<SharedRegistry>,
    settings: Arc<MysqldSettings>,
    interrupt: InterruptToken,
}

impl std::fmt::Debug for MysqldPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqldPool")
            .field("settings", &self.settings)
            .field("ports", &self.ports())
            .finish()
    }
}

impl MysqldPool {
    pub fn new(settings: MysqldSettings) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            settings: Arc::new(settings),
            interrupt: InterruptToken::new(),
        }
    }

    /// Pool configured from `MYSQLD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(MysqldSettings::from_env()?))
    }

    /// Process-wide pool, configured from the environment on first use.
    ///
    /// For suites whose tests live in separate modules but should share one
    /// server without passing a pool around.
    pub fn global() -> Result<&'static MysqldPool> {
        if let Some(pool) = GLOBAL_POOL.get() {
            return Ok(pool);
        }
        let pool = Self::from_env()?;
        Ok(GLOBAL_POOL.get_or_init(|| pool))
    }

    pub fn settings(&self) -> &MysqldSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Registry<Mysqld>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start on the shared port if one exists, else on the configured port.
    pub fn start(&self) -> Result<Arc<Mysqld>> {
        let shared = self.lock().any_shared_port();
        self.start_on_port(shared.unwrap_or(self.settings.port))
    }

    /// Start on `port` in the configured root directory.
    pub fn start_on_port(&self, port: u16) -> Result<Arc<Mysqld>> {
        let root = self.settings.root.clone();
        self.start_at(root, port)
    }

    /// Start on `port` in `root`, or return the instance already on `port`.
    pub fn start_at(&self, root: impl AsRef<Path>, port: u16) -> Result<Arc<Mysqld>> {
        self.start_with(root.as_ref(), port, false)
    }

    /// Like [`start_at`](Self::start_at), but flags the port as shared so
    /// [`Mysqld::close`] leaves it running.
    pub fn start_shared(&self, root: impl AsRef<Path>, port: u16) -> Result<Arc<Mysqld>> {
        self.start_with(root.as_ref(), port, true)
    }

    fn start_with(&self, root: &Path, port: u16, share: bool) -> Result<Arc<Mysqld>> {
        info!("connect mysql @ {}", port);

        let mut registry = self.lock();
        if let Some(existing) = registry.get(port) {
            if share {
                registry.mark_shared(port);
            }
            return Ok(existing);
        }

        let instance = Arc::new(Mysqld::new(
            root,
            port,
            &self.settings,
            self.interrupt.clone(),
            Arc::downgrade(&self.registry),
        )?);
        registry.put(port, instance.clone());
        if share {
            registry.mark_shared(port);
        }

        if let Err(e) = instance.run() {
            registry.remove(port);
            let _ = instance.shutdown();
            return Err(e);
        }
        Ok(instance)
    }

    /// Stop the readiness wait of a start in progress on another thread.
    ///
    /// Does not take the registry lock, which the waiting start holds. An
    /// interrupt raised while the start is still deploying stays pending
    /// until the wait begins. The interrupted start returns its instance,
    /// running but maybe not ready.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Instance registered on `port`, if any.
    pub fn get(&self, port: u16) -> Option<Arc<Mysqld>> {
        self.lock().get(port)
    }

    pub fn is_shared(&self, port: u16) -> bool {
        self.lock().is_shared(port)
    }

    /// Registered ports in ascending order.
    pub fn ports(&self) -> Vec<u16> {
        self.lock().ports()
    }

    /// Stop and unregister the instance on `port` even if it is shared.
    ///
    /// Returns whether an instance was registered.
    pub fn terminate(&self, port: u16) -> Result<bool> {
        let mut registry = self.lock();
        let Some(instance) = registry.get(port) else {
            return Ok(false);
        };
        instance.shutdown()?;
        registry.remove(port);
        Ok(true)
    }
}
