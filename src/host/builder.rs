//! Host construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::defaults::{
    defaults_source, environment_file, environment_source, DEFAULT_ENVIRONMENT, ENVIRONMENT_VAR,
    SETTINGS_FILE,
};
use crate::config::{
    CommandLineSource, ConfigSource, ConfigStack, ConfigView, FileSource, HostSettings,
    LoggingSettings,
};
use crate::host::{Host, HostContext, HostError, HostHandle};
use crate::observability::logging;
use crate::options::{bind_options, BindingError, Options, OptionsMonitor, Rebind};
use crate::registry::{ResolveError, Resolver, ServiceCollection};
use crate::worker::{BackgroundWorker, FaultPolicy, WorkerSupervisor};

type ServiceRegistration = Box<dyn FnOnce(&HostContext, &mut ServiceCollection)>;
type OptionsRegistration =
    Box<dyn FnOnce(&ConfigView, &mut ServiceCollection) -> Result<Arc<dyn Rebind>, BindingError>>;

/// Collects configuration sources, options and services, then builds a [`Host`].
///
/// Sources are layered in the order they are added, on top of the built-in
/// defaults; later sources win.
pub struct HostBuilder {
    environment: String,
    config: ConfigStack,
    options: Vec<OptionsRegistration>,
    services: Vec<ServiceRegistration>,
    shutdown_timeout: Option<Duration>,
    fault_policy: Option<FaultPolicy>,
    install_logging: bool,
    watch_config: bool,
    handle_signals: bool,
}

impl HostBuilder {
    /// A builder with only the built-in defaults as configuration.
    pub fn new() -> Self {
        let mut config = ConfigStack::new();
        config.add_source(defaults_source());
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            config,
            options: Vec::new(),
            services: Vec::new(),
            shutdown_timeout: None,
            fault_policy: None,
            install_logging: true,
            watch_config: true,
            handle_signals: true,
        }
    }

    /// The standard source stack, lowest precedence first: defaults,
    /// `Sage.toml`, `Sage.{Environment}.toml`, `SAGE_*` variables, `args`.
    ///
    /// The environment comes from `SAGE_ENVIRONMENT`, else `Production`.
    pub fn create_default<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_settings_file(SETTINGS_FILE, None, args)
    }

    /// Like [`create_default`](Self::create_default) with an explicit settings
    /// file and, optionally, an explicit environment name.
    pub fn with_settings_file<I, S>(
        settings_file: impl Into<PathBuf>,
        environment: Option<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let settings_file = settings_file.into();
        let environment = environment
            .or_else(|| std::env::var(ENVIRONMENT_VAR).ok())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        let mut builder = Self::new();
        builder
            .environment(environment.clone())
            .add_config_source(
                FileSource::new(settings_file.clone())
                    .optional(true)
                    .reload_on_change(true),
            )
            .add_config_source(
                FileSource::new(environment_file(&settings_file, &environment))
                    .optional(true)
                    .reload_on_change(true),
            )
            .add_config_source(environment_source())
            .add_config_source(CommandLineSource::new(args));
        builder
    }

    pub fn environment(&mut self, name: impl Into<String>) -> &mut Self {
        self.environment = name.into();
        self
    }

    /// Layer another source above everything added so far.
    pub fn add_config_source(&mut self, source: impl ConfigSource) -> &mut Self {
        self.config.add_source(source);
        self
    }

    /// Bind `T` from its section during `build`, failing the build if it does
    /// not bind or validate. Registers `Arc<T>` and `Arc<OptionsMonitor<T>>`.
    pub fn add_options<T: Options>(&mut self) -> &mut Self {
        self.options.push(Box::new(|view: &ConfigView, services: &mut ServiceCollection| {
            let monitor = Arc::new(OptionsMonitor::<T>::bind(view)?);
            tracing::debug!(section = T::SECTION, "Options bound");
            services
                .add_instance(monitor.get())
                .add_instance(Arc::clone(&monitor));
            let rebind: Arc<dyn Rebind> = monitor;
            Ok(rebind)
        }));
        self
    }

    /// Add service registrations. Runs during `build`, in call order.
    pub fn configure_services<F>(&mut self, configure: F) -> &mut Self
    where
        F: FnOnce(&HostContext, &mut ServiceCollection) + 'static,
    {
        self.services.push(Box::new(configure));
        self
    }

    /// Register a background worker constructed through the registry.
    pub fn add_worker<W, F>(&mut self, factory: F) -> &mut Self
    where
        W: BackgroundWorker,
        F: Fn(&Resolver<'_>) -> Result<Arc<W>, ResolveError> + Send + Sync + 'static,
    {
        self.configure_services(move |_, services| {
            services.add_worker(factory);
        })
    }

    /// Overrides `host.shutdown_timeout_seconds`.
    pub fn shutdown_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Overrides `host.fault_policy`.
    pub fn fault_policy(&mut self, policy: FaultPolicy) -> &mut Self {
        self.fault_policy = Some(policy);
        self
    }

    /// Whether `build` installs the global log subscriber. On by default.
    pub fn install_logging(&mut self, install: bool) -> &mut Self {
        self.install_logging = install;
        self
    }

    /// Whether the host watches reload-enabled files. On by default.
    pub fn watch_config(&mut self, watch: bool) -> &mut Self {
        self.watch_config = watch;
        self
    }

    /// Whether the host listens for SIGINT, SIGTERM and SIGHUP. On by default.
    pub fn handle_signals(&mut self, handle: bool) -> &mut Self {
        self.handle_signals = handle;
        self
    }

    /// Build configuration, bind options, freeze registrations and construct
    /// every worker. Nothing is started.
    ///
    /// A failure is logged once and returned; no worker has run.
    pub fn build(self) -> Result<Host, HostError> {
        let install_logging = self.install_logging;
        let result = self.build_inner();
        if let Err(e) = &result {
            if install_logging {
                // No-op when the configured subscriber is already installed.
                let _ = logging::init(&LoggingSettings::default());
            }
            tracing::error!(error = %e, "Sage application failed to start.");
        }
        result
    }

    fn build_inner(self) -> Result<Host, HostError> {
        let view = self.config.build()?;

        let logging_settings = bind_options::<LoggingSettings>(&view)?;
        if self.install_logging {
            if let Err(e) = logging::init(&logging_settings) {
                tracing::debug!(error = %e, "Log subscriber not installed");
            }
        }
        tracing::info!("Sage application starting up.");
        tracing::info!(
            environment = %self.environment,
            sources = view.source_count(),
            generation = view.generation(),
            "Configuration loaded"
        );

        let host_settings = bind_options::<HostSettings>(&view)?;
        let shutdown_timeout = self
            .shutdown_timeout
            .unwrap_or_else(|| host_settings.shutdown_timeout());
        let fault_policy = self.fault_policy.unwrap_or(host_settings.fault_policy);

        let handle = HostHandle::new();
        let context = HostContext::new(self.environment, view.clone());

        let mut services = ServiceCollection::new();
        services
            .add_instance(Arc::new(view.clone()))
            .add_instance(Arc::new(context.clone()))
            .add_instance(Arc::new(handle.clone()))
            .add_instance(Arc::new(host_settings))
            .add_instance(Arc::new(logging_settings));

        let mut monitors = Vec::with_capacity(self.options.len());
        for register in self.options {
            monitors.push(register(&view, &mut services)?);
        }
        for configure in self.services {
            configure(&context, &mut services);
        }

        let provider = services.build();
        let mut supervisor = WorkerSupervisor::new();
        for worker in provider.resolve_all::<dyn BackgroundWorker>()? {
            supervisor.register(worker);
        }

        tracing::debug!(
            workers = ?supervisor.names(),
            shutdown_timeout_ms = u64::try_from(shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
            fault_policy = ?fault_policy,
            "Host built"
        );
        Ok(Host {
            view,
            provider,
            supervisor,
            handle,
            context,
            monitors,
            shutdown_timeout,
            fault_policy,
            watch_config: self.watch_config,
            handle_signals: self.handle_signals,
        })
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}
