//! usherd - The usher background service
//!
//! This is the main entry point for the usherd service.
//! It wires together all the components:
//! - Configuration loading and rule seeding
//! - Store initialization
//! - Launch monitor and intervention controller
//! - Foreground event stream (fed by platform notifiers over IPC)
//! - IPC server and the IPC-backed intervention surface

mod surface;

use anyhow::{Context, Result};
use clap::Parser;
use usher_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload, ServiceStateSnapshot, SkipReason, API_VERSION,
};
use usher_config::{load_config, validate_spec, InterventionDefaults};
use usher_core::{
    CoreEvent, InterventionController, LaunchMonitor, MonitorDecision, SessionTable,
    StartDecision,
};
use usher_host_api::{
    ChannelSource, ForegroundEvent, ForegroundHandle, ForegroundSource, InterventionSurface,
};
use usher_ipc::{IpcServer, ServerMessage};
use usher_store::{AuditEvent, AuditEventType, RuleStore, SqliteStore};
use usher_util::{
    default_config_path, ClientId, MonotonicInstant, RateLimiter, UsherError,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use surface::IpcSurface;

/// usherd - Launch interception and delay enforcement service
#[derive(Parser, Debug)]
#[command(name = "usherd")]
#[command(about = "Launch interception and delay enforcement service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/usher/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set USHER_SOCKET env var)
    #[arg(short, long, env = "USHER_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set USHER_DATA_DIR env var)
    #[arg(short, long, env = "USHER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    defaults: InterventionDefaults,
    store: Arc<dyn RuleStore>,
    sessions: Arc<SessionTable>,
    controller: InterventionController,
    monitor: LaunchMonitor,
    source: ChannelSource,
    fg_handle: ForegroundHandle,
    ipc: Arc<IpcServer>,
    rate_limiter: RateLimiter,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        // Load configuration
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            seed_rules = settings.rules.len(),
            "Configuration loaded"
        );

        // Determine paths
        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        // Create data directory
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        // Initialize store
        let db_path = data_dir.join("usherd.db");
        let store: Arc<dyn RuleStore> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        // Log service start
        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        // Seed rules for targets not already in the store; the store is the
        // runtime authority, so existing rules win over config
        let mut seeded = 0;
        for rule in &settings.rules {
            match store.get_rule(&rule.target) {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    store
                        .upsert_rule(rule)
                        .with_context(|| format!("Failed to seed rule for {}", rule.target))?;
                    seeded += 1;
                }
                Err(e) => return Err(e).context("Failed to read rule during seeding"),
            }
        }

        let rule_count = store.list_rules()?.len();
        store.append_audit(AuditEvent::new(AuditEventType::RulesLoaded { rule_count }))?;

        info!(rule_count, seeded, "Rules loaded");

        // Session table, monitor, controller
        let sessions = Arc::new(SessionTable::new());
        let monitor = LaunchMonitor::new(store.clone(), sessions.clone());
        let controller = InterventionController::new(sessions.clone(), store.clone());

        // Foreground event stream, fed from ReportForeground commands
        let source = ChannelSource::new();
        let fg_handle = source.handle();

        // Initialize IPC server
        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        // Rate limiter: 30 requests per second per client
        let rate_limiter = RateLimiter::new(30, Duration::from_secs(1));

        Ok(Self {
            defaults: settings.service.defaults,
            store,
            sessions,
            controller,
            monitor,
            source,
            fg_handle,
            ipc: Arc::new(ipc),
            rate_limiter,
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            defaults,
            store,
            sessions,
            controller,
            mut monitor,
            source,
            fg_handle,
            ipc,
            mut rate_limiter,
        } = self;

        let surface: Arc<dyn InterventionSurface> = Arc::new(IpcSurface::new(ipc.clone()));

        // Get channels
        let mut fg_events = source.subscribe();
        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .expect("Message receiver should be available");

        // Spawn IPC accept task
        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        // Main event loop
        let tick_interval = Duration::from_millis(100);
        let mut tick_timer = tokio::time::interval(tick_interval);

        info!("Service running");

        loop {
            tokio::select! {
                // Signals - graceful shutdown
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Tick timer - drive countdowns and decision timeouts
                _ = tick_timer.tick() => {
                    let now = usher_util::now();
                    let now_mono = MonotonicInstant::now();

                    let events = controller.tick(now, now_mono);
                    for event in events {
                        handle_core_event(&controller, &sessions, &store, &surface, &ipc, event)
                            .await;
                    }
                }

                // Foreground transitions (reported over IPC)
                Some(fg_event) = fg_events.recv() => {
                    handle_foreground(
                        &mut monitor,
                        &controller,
                        &sessions,
                        &store,
                        &surface,
                        &ipc,
                        fg_event,
                    )
                    .await;
                }

                // IPC messages
                Some(msg) = ipc_messages.recv() => {
                    handle_ipc_message(
                        &controller,
                        &sessions,
                        &mut monitor,
                        &store,
                        &surface,
                        &ipc,
                        &defaults,
                        &fg_handle,
                        &mut rate_limiter,
                        msg,
                    )
                    .await;
                }
            }
        }

        // Graceful shutdown: resolve every open session, fail open
        info!("Shutting down usherd");

        let now_mono = MonotonicInstant::now();
        for event in controller.resolve_all(now_mono) {
            handle_core_event(&controller, &sessions, &store, &surface, &ipc, event).await;
        }

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Build a full state snapshot for clients
fn snapshot(store: &Arc<dyn RuleStore>, sessions: &Arc<SessionTable>) -> ServiceStateSnapshot {
    let rule_count = store.list_rules().map(|r| r.len()).unwrap_or(0);

    ServiceStateSnapshot {
        api_version: API_VERSION,
        rule_count,
        active_sessions: sessions.infos(MonotonicInstant::now()),
    }
}

/// Broadcast a terminal session event plus the refreshed state
fn broadcast_resolved(
    ipc: &Arc<IpcServer>,
    store: &Arc<dyn RuleStore>,
    sessions: &Arc<SessionTable>,
    event: CoreEvent,
) {
    if let CoreEvent::SessionResolved {
        session_id,
        target_id,
        outcome,
        reason,
        dwell,
    } = event
    {
        ipc.broadcast_event(Event::new(EventPayload::SessionResolved {
            session_id,
            target_id,
            outcome,
            reason,
            dwell,
        }));
        ipc.broadcast_event(Event::new(EventPayload::StateChanged(snapshot(
            store, sessions,
        ))));
    }
}

/// Route one core event to the surface and the event stream
async fn handle_core_event(
    controller: &InterventionController,
    sessions: &Arc<SessionTable>,
    store: &Arc<dyn RuleStore>,
    surface: &Arc<dyn InterventionSurface>,
    ipc: &Arc<IpcServer>,
    event: CoreEvent,
) {
    match event {
        CoreEvent::CountdownStarted { ref session_id, .. }
        | CoreEvent::DecisionRequired { ref session_id, .. } => {
            let now_mono = MonotonicInstant::now();
            let info = match sessions.info_by_id(session_id, now_mono) {
                Some(info) => info,
                None => return, // already resolved
            };

            if let Err(e) = surface.present(&info).await {
                // Fail open: the launch must never hang on an internal error
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "Surface present failed, resolving session open"
                );
                if let Some(resolved) = controller.fail(session_id, now_mono) {
                    broadcast_resolved(ipc, store, sessions, resolved);
                }
            }
        }

        CoreEvent::SessionResolved {
            ref session_id,
            outcome,
            ..
        } => {
            if let Err(e) = surface.dismiss(session_id, outcome).await {
                warn!(session_id = %session_id, error = %e, "Surface dismiss failed");
            }
            broadcast_resolved(ipc, store, sessions, event);
        }
    }
}

/// Process one foreground transition through the monitor and controller
async fn handle_foreground(
    monitor: &mut LaunchMonitor,
    controller: &InterventionController,
    sessions: &Arc<SessionTable>,
    store: &Arc<dyn RuleStore>,
    surface: &Arc<dyn InterventionSurface>,
    ipc: &Arc<IpcServer>,
    fg_event: ForegroundEvent,
) {
    let now_mono = MonotonicInstant::now();

    match monitor.observe(&fg_event, now_mono) {
        MonitorDecision::Trigger(rule) => match controller.start(&rule, &fg_event, now_mono) {
            StartDecision::Started(events) => {
                for event in events {
                    handle_core_event(controller, sessions, store, surface, ipc, event).await;
                }
            }
            StartDecision::AlreadyActive { session_id } => {
                debug!(
                    target_id = %fg_event.target_id,
                    session_id = %session_id,
                    "Trigger ignored, session already active"
                );
            }
        },
        MonitorDecision::NoAction(reason) => {
            debug!(target_id = %fg_event.target_id, reason = ?reason, "No intervention");

            // Unknown targets are the overwhelming common case (every app
            // switch); only ruled targets are worth recording
            if !matches!(reason, SkipReason::UnknownTarget) {
                let _ = store.append_audit(AuditEvent::new(AuditEventType::LaunchSkipped {
                    target_id: fg_event.target_id.clone(),
                    reason: reason.clone(),
                }));
                ipc.broadcast_event(Event::new(EventPayload::LaunchSkipped {
                    target_id: fg_event.target_id,
                    reason,
                }));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_ipc_message(
    controller: &InterventionController,
    sessions: &Arc<SessionTable>,
    monitor: &mut LaunchMonitor,
    store: &Arc<dyn RuleStore>,
    surface: &Arc<dyn InterventionSurface>,
    ipc: &Arc<IpcServer>,
    defaults: &InterventionDefaults,
    fg_handle: &ForegroundHandle,
    rate_limiter: &mut RateLimiter,
    msg: ServerMessage,
) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            // Rate limiting
            if !rate_limiter.check(&client_id) {
                let response = Response::error(
                    request.request_id,
                    ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                );
                let _ = ipc.send_response(&client_id, response).await;
                return;
            }

            let response = handle_command(
                controller,
                sessions,
                monitor,
                store,
                surface,
                ipc,
                defaults,
                fg_handle,
                &client_id,
                request.request_id,
                request.command,
            )
            .await;

            let _ = ipc.send_response(&client_id, response).await;
        }

        ServerMessage::ClientConnected { client_id, info } => {
            info!(
                client_id = %client_id,
                role = ?info.role,
                uid = ?info.uid,
                "Client connected"
            );

            let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
                client_id: client_id.to_string(),
                role: format!("{:?}", info.role),
                uid: info.uid,
            }));
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Client disconnected");

            let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                client_id: client_id.to_string(),
            }));

            // Clean up rate limiter
            rate_limiter.remove_client(&client_id);
        }
    }
}

fn map_core_error(request_id: u64, e: UsherError) -> Response {
    let code = match &e {
        UsherError::InvalidState(_) => ErrorCode::InvalidState,
        UsherError::ValidationError(_) => ErrorCode::ValidationFailed,
        UsherError::StoreError(_) => ErrorCode::StorageError,
        _ => ErrorCode::InternalError,
    };
    Response::error(request_id, ErrorInfo::new(code, e.to_string()))
}

#[allow(clippy::too_many_arguments)]
async fn handle_command(
    controller: &InterventionController,
    sessions: &Arc<SessionTable>,
    monitor: &mut LaunchMonitor,
    store: &Arc<dyn RuleStore>,
    surface: &Arc<dyn InterventionSurface>,
    ipc: &Arc<IpcServer>,
    defaults: &InterventionDefaults,
    fg_handle: &ForegroundHandle,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> Response {
    let now = usher_util::now();
    let now_mono = MonotonicInstant::now();

    match command {
        Command::GetState => {
            Response::success(request_id, ResponsePayload::State(snapshot(store, sessions)))
        }

        Command::ListRules => match store.list_rules() {
            Ok(rules) => Response::success(request_id, ResponsePayload::Rules(rules)),
            Err(e) => Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::StorageError, e.to_string()),
            ),
        },

        Command::GetRule { target_id } => match store.get_rule(&target_id) {
            Ok(rule) => Response::success(request_id, ResponsePayload::Rule(rule)),
            Err(e) if e.is_not_found() => Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::RuleNotFound, e.to_string()),
            ),
            Err(e) => Response::error(
                request_id,
                ErrorInfo::new(ErrorCode::StorageError, e.to_string()),
            ),
        },

        Command::UpsertRule { spec } => {
            if let Some(info) = ipc.get_client_info(client_id).await {
                if !info.role.can_edit_rules() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
                    );
                }
            }

            // Rejected specs never reach the store
            let rule = match validate_spec(&spec, defaults) {
                Ok(rule) => rule,
                Err(errors) => {
                    let message = errors
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::ValidationFailed, message),
                    );
                }
            };

            match store.upsert_rule(&rule) {
                Ok(()) => {
                    let _ = store.append_audit(AuditEvent::new(AuditEventType::RuleUpserted {
                        target_id: rule.target.clone(),
                    }));
                    ipc.broadcast_event(Event::new(EventPayload::RuleChanged {
                        target_id: rule.target.clone(),
                    }));

                    info!(target_id = %rule.target, "Rule upserted");

                    Response::success(
                        request_id,
                        ResponsePayload::RuleUpserted {
                            target_id: rule.target,
                        },
                    )
                }
                Err(e) => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::StorageError, e.to_string()),
                ),
            }
        }

        Command::RemoveRule { target_id } => {
            if let Some(info) = ipc.get_client_info(client_id).await {
                if !info.role.can_edit_rules() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
                    );
                }
            }

            match store.remove_rule(&target_id) {
                Ok(()) => {
                    monitor.forget(&target_id);
                    let _ = store.append_audit(AuditEvent::new(AuditEventType::RuleRemoved {
                        target_id: target_id.clone(),
                    }));
                    ipc.broadcast_event(Event::new(EventPayload::RuleRemoved {
                        target_id: target_id.clone(),
                    }));

                    info!(target_id = %target_id, "Rule removed");

                    Response::success(request_id, ResponsePayload::RuleRemoved { target_id })
                }
                Err(e) if e.is_not_found() => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::RuleNotFound, e.to_string()),
                ),
                Err(e) => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::StorageError, e.to_string()),
                ),
            }
        }

        Command::ReportForeground {
            target_id,
            timestamp,
        } => {
            if let Some(info) = ipc.get_client_info(client_id).await {
                if !info.role.can_report() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Reporting not allowed"),
                    );
                }
            }

            let ts = timestamp.unwrap_or(now);
            if fg_handle.report(target_id, ts) {
                Response::success(request_id, ResponsePayload::Reported)
            } else {
                Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::InternalError, "Event stream closed"),
                )
            }
        }

        Command::Decide {
            session_id,
            outcome,
        } => {
            if let Some(info) = ipc.get_client_info(client_id).await {
                if !info.role.can_decide() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Deciding not allowed"),
                    );
                }
            }

            match controller.decide(&session_id, outcome, now_mono) {
                Ok(event) => {
                    handle_core_event(controller, sessions, store, surface, ipc, event).await;
                    Response::success(
                        request_id,
                        ResponsePayload::Decided {
                            session_id,
                            outcome,
                        },
                    )
                }
                Err(e) => map_core_error(request_id, e),
            }
        }

        Command::CancelSession { session_id } => {
            if let Some(info) = ipc.get_client_info(client_id).await {
                if !info.role.can_decide() {
                    return Response::error(
                        request_id,
                        ErrorInfo::new(ErrorCode::PermissionDenied, "Cancelling not allowed"),
                    );
                }
            }

            match controller.cancel(&session_id, now_mono) {
                Ok(event) => {
                    handle_core_event(controller, sessions, store, surface, ipc, event).await;
                    Response::success(request_id, ResponsePayload::Cancelled { session_id })
                }
                Err(e) => map_core_error(request_id, e),
            }
        }

        Command::GetUsage { target_id, day } => {
            let day = day.unwrap_or_else(|| now.date_naive());
            match store.get_usage(&target_id, day) {
                Ok(stats) => Response::success(request_id, ResponsePayload::Usage(stats)),
                Err(e) => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::StorageError, e.to_string()),
                ),
            }
        }

        Command::SubscribeEvents => Response::success(
            request_id,
            ResponsePayload::Subscribed {
                client_id: client_id.clone(),
            },
        ),

        Command::UnsubscribeEvents => {
            Response::success(request_id, ResponsePayload::Unsubscribed)
        }

        Command::GetHealth => {
            let health = HealthStatus {
                live: true,
                ready: true,
                store_ok: store.is_healthy(),
                rule_count: store.list_rules().map(|r| r.len()).unwrap_or(0),
            };
            Response::success(request_id, ResponsePayload::Health(health))
        }

        Command::Ping => Response::success(request_id, ResponsePayload::Pong),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "usherd starting");

    // Create and run the service
    let service = Service::new(&args).await?;
    service.run().await
}
