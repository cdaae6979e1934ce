//! Reaction callbacks run on every successful secrets update.
//!
//! A chain is built by wrapping a no-op handler with each middleware in turn,
//! so `chain = m_n(m_{n-1}(...m_1(noop)))`: the most recently registered
//! middleware runs outermost and decides whether and when to call the chain
//! built before it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::watcher::{SharedLogger, call_guarded};

use super::types::Secrets;

/// Works with a freshly published snapshot.
pub type SecretHandler = Arc<dyn Fn(&Secrets) + Send + Sync>;

/// Wraps the next handler in the chain.
pub type SecretMiddleware = Arc<dyn Fn(SecretHandler) -> SecretHandler + Send + Sync>;

/// Build a [`SecretMiddleware`] from a closure.
pub fn middleware<F>(f: F) -> SecretMiddleware
where
    F: Fn(SecretHandler) -> SecretHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An immutable composition of middlewares.
///
/// Adding middlewares produces a new chain with a higher version; existing
/// chains are never mutated.
#[derive(Clone)]
pub struct HandlerChain {
    version: u64,
    handler: SecretHandler,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self {
            version: 0,
            handler: Arc::new(|_: &Secrets| {}),
        }
    }

    /// A new chain with `middlewares` wrapped around this one, in order.
    pub fn wrap(&self, middlewares: &[SecretMiddleware]) -> Self {
        let handler = middlewares
            .iter()
            .fold(self.handler.clone(), |next, m| m(next));
        Self {
            version: self.version + 1,
            handler,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn call(&self, secrets: &Secrets) {
        (self.handler)(secrets)
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a store's current chain and runs it.
///
/// The background watcher task reads the chain; `extend` swaps in a new one.
pub(crate) struct Notifier {
    chain: RwLock<Arc<HandlerChain>>,
    logger: SharedLogger,
}

impl Notifier {
    pub(crate) fn new(middlewares: &[SecretMiddleware], logger: SharedLogger) -> Self {
        Self {
            chain: RwLock::new(Arc::new(HandlerChain::new().wrap(middlewares))),
            logger,
        }
    }

    /// Publish a chain with `middlewares` added and return it.
    pub(crate) fn extend(&self, middlewares: &[SecretMiddleware]) -> Arc<HandlerChain> {
        let mut chain = self.chain.write();
        let next = Arc::new(chain.wrap(middlewares));
        *chain = next.clone();
        next
    }

    /// Run the current chain against `secrets`.
    pub(crate) fn notify(&self, secrets: &Secrets) {
        let chain = self.chain.read().clone();
        self.run(&chain, secrets);
    }

    /// Run a specific chain, logging instead of unwinding if it panics.
    pub(crate) fn run(&self, chain: &HandlerChain, secrets: &Secrets) {
        if let Err(panic) = call_guarded(|| chain.call(secrets)) {
            tracing::warn!("[secrets] middleware chain v{} failed: {panic}", chain.version());
            self.logger.log(&format!("secrets: middleware chain failed: {panic}"));
        }
    }
}
