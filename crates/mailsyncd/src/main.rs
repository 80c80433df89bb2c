// # mailsyncd - Newsletter Sync Daemon
//
// The mailsyncd daemon is a thin integration layer. All sync logic lives in
// mailsync-core; this binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and logging
// 3. Building the stores and registering providers
// 4. Feeding lifecycle events from stdin into the dispatcher
//
// ## Protocol
//
// One JSON lifecycle event per stdin line:
//
// ```json
// {"event":"newsletter.subscribe","subscription_id":12,"email":"jane@example.com","first_name":"Jane","last_name":"Doe","locale":"en_US"}
// ```
//
// One JSON outcome per stdout line, in input order. Logs go to stderr.
//
// ## Configuration
//
// ### Provider
// - `MAILSYNC_PROVIDER_TYPE`: Provider type (mailjet)
// - `MAILSYNC_API_KEY` / `MAILSYNC_API_SECRET`: API credentials
// - `MAILSYNC_WS_ADDRESS`: API base address (optional)
// - `MAILSYNC_NEWSLETTER_LIST`: Default list address (optional)
// - `MAILSYNC_EXCEPTION_ON_ERRORS`: Stop on the first failed event (optional)
//
// Provider settings are persisted in the settings store; unset variables keep
// the stored value.
//
// ### Storefront
// - `MAILSYNC_LANGUAGES`: Active languages, e.g. `1:en_US,2:fr_FR`
// - `MAILSYNC_LIST_MAPPINGS`: Contact list per language, e.g. `1=News EN,2=News FR`
//
// ### Stores
// - `MAILSYNC_STORE_TYPE`: Type of stores (file, memory)
// - `MAILSYNC_STORE_DIR`: Directory of the JSON stores (for file)
//
// ### Engine
// - `MAILSYNC_EVENT_CHANNEL_CAPACITY`: Sync event channel capacity
// - `MAILSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export MAILSYNC_API_KEY=your_key
// export MAILSYNC_API_SECRET=your_secret
// export MAILSYNC_NEWSLETTER_LIST=newsletter@lists.mailjet.com
// export MAILSYNC_LANGUAGES=1:en_US,2:fr_FR
// export MAILSYNC_STORE_TYPE=file
// export MAILSYNC_STORE_DIR=/var/lib/mailsync
//
// storefront-events | mailsyncd
// ```

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use mailsync_core::config::parse_bool;
use mailsync_core::traits::{
    ConfigStore, LanguageId, ListMappingStore, LocaleRegistry, NewsletterDirectory,
    SubscriberStore,
};
use mailsync_core::{
    Collaborators, EngineConfig, EventDispatcher, EventKind, FileConfigStore,
    FileListMappingStore, FileNewsletterDirectory, FileSubscriberStore, HandlerOutcome,
    LifecycleEvent, MemoryConfigStore,
    MemoryListMappingStore, MemoryNewsletterDirectory, MemorySubscriberStore, ProviderConfig,
    ProviderRegistry, ProviderSettings, StaticLocaleRegistry, StoreConfig, SyncConfig, SyncEngine,
    SyncEvent,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum MailsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error, including a failed event in strict mode
    RuntimeError = 2,
}

impl From<MailsyncExitCode> for ExitCode {
    fn from(code: MailsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    provider_type: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    ws_address: Option<String>,
    newsletter_list: Option<String>,
    exception_on_errors: Option<bool>,
    languages: String,
    list_mappings: Option<String>,
    store_type: String,
    store_dir: Option<String>,
    event_channel_capacity: Option<usize>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            provider_type: env::var("MAILSYNC_PROVIDER_TYPE")
                .unwrap_or_else(|_| "mailjet".to_string()),
            api_key: env::var("MAILSYNC_API_KEY").ok(),
            api_secret: env::var("MAILSYNC_API_SECRET").ok(),
            ws_address: env::var("MAILSYNC_WS_ADDRESS").ok(),
            newsletter_list: env::var("MAILSYNC_NEWSLETTER_LIST").ok(),
            exception_on_errors: env::var("MAILSYNC_EXCEPTION_ON_ERRORS")
                .ok()
                .map(|s| parse_bool(&s)),
            languages: env::var("MAILSYNC_LANGUAGES").unwrap_or_default(),
            list_mappings: env::var("MAILSYNC_LIST_MAPPINGS").ok(),
            store_type: env::var("MAILSYNC_STORE_TYPE").unwrap_or_else(|_| "memory".to_string()),
            store_dir: env::var("MAILSYNC_STORE_DIR").ok(),
            event_channel_capacity: env::var("MAILSYNC_EVENT_CHANNEL_CAPACITY")
                .ok()
                .map(|s| s.parse::<usize>())
                .transpose()
                .context("MAILSYNC_EVENT_CHANNEL_CAPACITY must be a number")?,
            log_level: env::var("MAILSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate what can be checked before any store is opened
    fn validate(&self) -> Result<()> {
        match self.provider_type.as_str() {
            "mailjet" => {}
            _ => anyhow::bail!(
                "MAILSYNC_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: mailjet",
                self.provider_type
            ),
        }

        for (name, value) in [
            ("MAILSYNC_API_KEY", &self.api_key),
            ("MAILSYNC_API_SECRET", &self.api_secret),
        ] {
            if value.as_deref().is_some_and(str::is_empty) {
                anyhow::bail!("{} is set but empty", name);
            }
        }

        match self.store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "MAILSYNC_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        self.store_config().validate()?;
        if let StoreConfig::File { dir } = self.store_config()
            && !Path::new(&dir).is_dir()
        {
            anyhow::bail!(
                "MAILSYNC_STORE_DIR does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                dir,
                dir
            );
        }

        StaticLocaleRegistry::parse(&self.languages)?;
        if let Some(ref mappings) = self.list_mappings {
            parse_list_mappings(mappings)?;
        }

        self.engine_config().validate()?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "MAILSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn store_config(&self) -> StoreConfig {
        match self.store_type.as_str() {
            "file" => StoreConfig::File {
                dir: self.store_dir.clone().unwrap_or_default(),
            },
            _ => StoreConfig::Memory,
        }
    }

    fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::default();
        if let Some(capacity) = self.event_channel_capacity {
            engine.event_channel_capacity = capacity;
        }
        engine
    }

    /// Overlay the environment onto the stored provider settings
    fn apply_to(&self, settings: &mut ProviderSettings) {
        let overrides = [
            (&self.api_key, &mut settings.api_key),
            (&self.api_secret, &mut settings.api_secret),
            (&self.ws_address, &mut settings.ws_address),
            (&self.newsletter_list, &mut settings.newsletter_list),
        ];
        for (value, target) in overrides {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        if let Some(flag) = self.exception_on_errors {
            settings.exception_on_errors = flag;
        }
    }
}

/// Parse `id=name` pairs separated by commas, e.g. `1=News EN,2=News FR`
fn parse_list_mappings(entries: &str) -> Result<HashMap<LanguageId, String>> {
    let mut names = HashMap::new();
    for entry in entries.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id, name) = entry
            .split_once('=')
            .with_context(|| format!("Invalid list mapping '{}', expected id=name", entry))?;
        let id = id
            .trim()
            .parse::<LanguageId>()
            .with_context(|| format!("Invalid language id in '{}'", entry))?;
        names.insert(id, name.trim().to_string());
    }
    Ok(names)
}

/// Subscription id to email map, fed from the event stream
#[derive(Clone)]
enum Newsletters {
    File(Arc<FileNewsletterDirectory>),
    Memory(Arc<MemoryNewsletterDirectory>),
}

impl Newsletters {
    fn directory(&self) -> Arc<dyn NewsletterDirectory> {
        match self {
            Newsletters::File(directory) => directory.clone() as Arc<dyn NewsletterDirectory>,
            Newsletters::Memory(directory) => directory.clone() as Arc<dyn NewsletterDirectory>,
        }
    }

    async fn set_email(&self, subscription_id: u64, email: &str) -> Result<()> {
        match self {
            Newsletters::File(directory) => {
                directory
                    .set_email(subscription_id, email)
                    .await
                    .with_context(|| {
                        format!("Failed to record newsletter subscription {}", subscription_id)
                    })?
            }
            Newsletters::Memory(directory) => directory.set_email(subscription_id, email).await,
        }
        Ok(())
    }
}

/// The local stores, either file-backed or in memory
struct Stores {
    subscribers: Arc<dyn SubscriberStore>,
    list_mappings: Arc<dyn ListMappingStore>,
    settings: Arc<dyn ConfigStore>,
    newsletters: Newsletters,
}

impl Stores {
    async fn open(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::File { dir } => {
                let dir = Path::new(dir);
                info!("Using file stores in {}", dir.display());
                Ok(Self {
                    subscribers: Arc::new(
                        FileSubscriberStore::new(dir.join("subscribers.json")).await?,
                    ),
                    list_mappings: Arc::new(
                        FileListMappingStore::new(dir.join("list_mappings.json")).await?,
                    ),
                    settings: Arc::new(FileConfigStore::new(dir.join("settings.json")).await?),
                    newsletters: Newsletters::File(Arc::new(
                        FileNewsletterDirectory::new(dir.join("newsletters.json")).await?,
                    )),
                })
            }
            StoreConfig::Memory => {
                warn!("Using in-memory stores; nothing survives a restart");
                Ok(Self {
                    subscribers: Arc::new(MemorySubscriberStore::new()),
                    list_mappings: Arc::new(MemoryListMappingStore::new()),
                    settings: Arc::new(MemoryConfigStore::new()),
                    newsletters: Newsletters::Memory(Arc::new(MemoryNewsletterDirectory::new())),
                })
            }
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return MailsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return MailsyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries outcomes; logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MailsyncExitCode::ConfigError.into();
    }

    info!("Starting mailsyncd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MailsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let components = match build(&config).await {
            Ok(components) => components,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return MailsyncExitCode::ConfigError;
            }
        };

        match run_daemon(components).await {
            Ok(()) => MailsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                MailsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Everything the event loop needs
struct Components {
    dispatcher: EventDispatcher,
    newsletters: Newsletters,
    subscribers: Arc<dyn SubscriberStore>,
    sync_events: mpsc::Receiver<SyncEvent>,
}

/// Open stores, persist settings, create the provider and the engine
async fn build(config: &Config) -> Result<Components> {
    let stores = Stores::open(&config.store_config()).await?;

    let mut settings = ProviderSettings::load(stores.settings.as_ref()).await?;
    config.apply_to(&mut settings);
    mailsync_core::admin::save_provider_settings(stores.settings.as_ref(), &settings).await?;

    let sync_config = SyncConfig {
        provider: ProviderConfig::from_settings(&settings),
        stores: config.store_config(),
        engine: config.engine_config(),
    };
    sync_config
        .validate()
        .context("Provider settings are incomplete; set MAILSYNC_API_KEY and MAILSYNC_API_SECRET")?;

    let locales = Arc::new(StaticLocaleRegistry::parse(&config.languages)?);
    let active = locales.active_languages().await?;
    info!("{} active language(s)", active.len());

    if let Some(ref mappings) = config.list_mappings {
        let names = parse_list_mappings(mappings)?;
        mailsync_core::admin::save_list_mappings(
            locales.as_ref(),
            stores.list_mappings.as_ref(),
            &names,
        )
        .await?;
    }

    let registry = ProviderRegistry::new();

    #[cfg(feature = "mailjet")]
    {
        info!("Registering Mailjet provider");
        mailsync_provider_mailjet::register(&registry);
    }

    let api = registry.create_provider(&sync_config.provider)?;
    info!("Using {} provider", api.provider_name());

    let newsletters = stores.newsletters;
    let collaborators = Collaborators {
        api: Arc::from(api),
        subscribers: Arc::clone(&stores.subscribers),
        list_mappings: stores.list_mappings,
        locales,
        config: Arc::clone(&stores.settings),
        newsletters: newsletters.directory(),
    };

    let (engine, sync_events) = SyncEngine::new(collaborators, &sync_config.engine)?;
    let dispatcher = EventDispatcher::new(Arc::new(engine), stores.settings);
    info!("Handling events: {}", dispatcher.subscribed_events().join(", "));

    Ok(Components {
        dispatcher,
        newsletters,
        subscribers: stores.subscribers,
        sync_events,
    })
}

/// Run the event loop until stdin closes or a shutdown signal arrives
async fn run_daemon(components: Components) -> Result<()> {
    let Components {
        dispatcher,
        newsletters,
        subscribers,
        mut sync_events,
    } = components;

    let event_logger = tokio::spawn(async move {
        while let Some(event) = sync_events.recv().await {
            log_sync_event(&event);
        }
    });

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut stdout = tokio::io::stdout();

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    info!("Ready to process lifecycle events");

    let result: Result<()> = loop {
        let line = tokio::select! {
            signal = &mut shutdown => {
                match signal {
                    Ok(signal) => info!("Received shutdown signal: {}", signal),
                    Err(e) => error!("Shutdown error: {}", e),
                }
                break Ok(());
            }
            line = lines.next() => line,
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => break Err(e).context("Failed to read stdin"),
            None => {
                info!("Input closed");
                break Ok(());
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let event: LifecycleEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Ignoring malformed event: {}", e);
                write_line(&mut stdout, &serde_json::json!({
                    "success": false,
                    "message": format!("Malformed event: {}", e),
                }))
                .await?;
                continue;
            }
        };

        if let (EventKind::Subscribe, Some(id)) = (event.kind, event.subscription_id)
            && let Err(e) = newsletters.set_email(id, &event.email).await
        {
            break Err(e);
        }

        match dispatcher.dispatch_strict(&event).await {
            Ok(outcome) => {
                if let Err(e) = track_email_change(&newsletters, &event, &outcome).await {
                    break Err(e);
                }
                write_line(&mut stdout, &outcome).await?;
            }
            Err(e) => {
                write_line(&mut stdout, &serde_json::json!({
                    "event": event.kind,
                    "success": false,
                    "message": e.to_string(),
                }))
                .await?;
                break Err(e).context("Stopping on failed event");
            }
        }
    };

    info!("Shutting down daemon");
    drop(dispatcher);
    if let Err(e) = event_logger.await {
        warn!("Sync event logger ended abnormally: {}", e);
    }

    subscribers
        .flush()
        .await
        .context("Failed to flush subscriber store")?;

    result
}

/// Keep the newsletter directory on the email the storefront now holds
async fn track_email_change(
    newsletters: &Newsletters,
    event: &LifecycleEvent,
    outcome: &HandlerOutcome,
) -> Result<()> {
    if let (EventKind::Update, Some(id), true) = (event.kind, event.subscription_id, outcome.success)
    {
        newsletters.set_email(id, &event.email).await?;
    }
    Ok(())
}

async fn write_line<T: serde::Serialize>(stdout: &mut tokio::io::Stdout, value: &T) -> Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;
    Ok(())
}

fn log_sync_event(event: &SyncEvent) {
    match event {
        SyncEvent::ContactCreated { email, contact_id } => {
            info!("Contact {} created for {}", contact_id, email)
        }
        SyncEvent::ListJoined {
            email,
            list_name,
            relation_id,
        } => info!("{} joined '{}' (relation {})", email, list_name, relation_id),
        SyncEvent::ListLeft { email, relation_id } => {
            info!("{} left relation {}", email, relation_id)
        }
        SyncEvent::Unsubscribed { email, relation_id } => {
            info!("{} unsubscribed (relation {})", email, relation_id)
        }
        SyncEvent::OperationFailed {
            operation,
            email,
            error,
        } => debug!("{} for {} failed: {}", operation, email, error),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
