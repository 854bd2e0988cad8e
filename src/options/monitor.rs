//! Live-reloaded options.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::stack::ConfigView;
use crate::options::{bind_options, BindingError, Options};

/// Holds the latest successfully bound value of `T`.
///
/// Re-bound whenever the configuration reloads. A re-bind that fails keeps
/// the previous value, so consumers never observe invalid options.
pub struct OptionsMonitor<T> {
    current: ArcSwap<T>,
}

impl<T: Options> OptionsMonitor<T> {
    /// Bind the initial value; fails like [`bind_options`].
    pub fn bind(view: &ConfigView) -> Result<Self, BindingError> {
        let initial = bind_options::<T>(view)?;
        Ok(Self {
            current: ArcSwap::from_pointee(initial),
        })
    }

    /// The latest value.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Bind again from `view` and publish the result if it is valid.
    pub fn refresh(&self, view: &ConfigView) -> Result<(), BindingError> {
        let next = bind_options::<T>(view)?;
        self.current.store(Arc::new(next));
        Ok(())
    }
}

/// Type-erased re-binding, used by the host to refresh every monitor on reload.
pub trait Rebind: Send + Sync {
    fn section(&self) -> &'static str;

    fn rebind(&self, view: &ConfigView);
}

impl<T: Options> Rebind for OptionsMonitor<T> {
    fn section(&self) -> &'static str {
        T::SECTION
    }

    fn rebind(&self, view: &ConfigView) {
        match self.refresh(view) {
            Ok(()) => tracing::debug!(section = T::SECTION, "Options re-bound"),
            Err(e) => tracing::error!(
                section = T::SECTION,
                error = %e,
                "Failed to re-bind options. Keeping previous value."
            ),
        }
    }
}
