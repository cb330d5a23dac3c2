//! # Contextualization
//!
//! [`contextualize`] pairs a kernel with a target tag. The resulting wrapper
//! has the kernel's calling interface; the first call for an argument-type
//! signature runs the rewriter and caches the specialization, later calls
//! reuse it.
//!
//! A [`Context`] owns the configuration and the specialization cache.
//! Wrappers created from clones of one context share its cache. The free
//! [`contextualize`] function uses a process-wide context configured from
//! the environment.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::cache::{CacheStats, SpecKey, SpecializationCache};
use crate::config::RewriteConfig;
use crate::error::{Error, RewriteError};
use crate::interp::Interpreter;
use crate::program::Kernel;
use crate::rewrite::{RewritePass, Specialization};
use crate::target::Target;
use crate::ty::Type;
use crate::value::Value;

/// Rewrite configuration plus the specialization cache.
#[derive(Clone, Default)]
pub struct Context {
    config: Arc<RewriteConfig>,
    cache: Arc<SpecializationCache>,
}

impl Context {
    pub fn new(config: RewriteConfig) -> Self {
        Self { config: Arc::new(config), cache: Arc::new(SpecializationCache::new()) }
    }

    /// The process-wide context, configured by [`RewriteConfig::from_env`]
    /// on first use.
    pub fn global() -> &'static Context {
        static GLOBAL: OnceLock<Context> = OnceLock::new();
        GLOBAL.get_or_init(|| Context::new(RewriteConfig::from_env()))
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Wrap `kernel` for the target named by `tag`.
    pub fn contextualize<T: Target>(&self, tag: T, kernel: Kernel) -> Contextualized<T> {
        Contextualized { context: self.clone(), tag, kernel }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("cache", &self.cache.stats())
            .finish()
    }
}

/// Wrap `kernel` for the target named by `tag`, using [`Context::global`].
pub fn contextualize<T: Target>(tag: T, kernel: Kernel) -> Contextualized<T> {
    Context::global().contextualize(tag, kernel)
}

/// A kernel bound to a target.
#[derive(Debug, Clone)]
pub struct Contextualized<T: Target> {
    context: Context,
    tag: T,
    kernel: Kernel,
}

impl<T: Target> Contextualized<T> {
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn tag(&self) -> T {
        self.tag
    }

    /// The specialization for `signature`, rewriting on first request.
    pub fn specialize(&self, signature: &[Type]) -> Result<Arc<Specialization>, RewriteError> {
        let key = SpecKey {
            program: self.kernel.program().id(),
            target: T::NAME,
            entry: self.kernel.def_id(),
            signature: signature.to_vec(),
        };
        self.context.cache.get_or_insert_with(key, || {
            debug!(kernel = self.kernel.name(), target = T::NAME, "cache miss");
            RewritePass::new(self.kernel.program(), T::substitution_table(), &self.context.config)
                .run(self.kernel.def_id(), signature)
                .map(Arc::new)
        })
    }

    /// Call the kernel for this target. The argument types select the
    /// specialization.
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        let signature: Vec<Type> = args.iter().map(Value::ty).collect();
        let spec = self.specialize(&signature)?;
        let value = Interpreter::new(&spec.program, self.context.config.max_call_depth).run(spec.entry, args)?;
        Ok(value)
    }
}
