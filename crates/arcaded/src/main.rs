//! arcaded - The gaming center billing service
//!
//! This is the main entry point for the arcaded service.
//! It wires together all the components:
//! - Tariff loading
//! - Store initialization and session recovery
//! - Core billing engine
//! - IPC server for the front desk UI

use anyhow::{Context, Result};
use arcade_api::{
    Command, ErrorCode, ErrorInfo, Event, EventPayload, Response, ResponsePayload,
};
use arcade_config::load_config;
use arcade_core::{CoreEngine, CoreError, CoreEvent};
use arcade_ipc::{IpcServer, ServerMessage};
use arcade_store::{AuditEvent, AuditEventType, SqliteStore, Store, StoreError};
use arcade_util::{default_config_path, ClientId, Clock, SystemClock};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// arcaded - Session billing service for gaming centers
#[derive(Parser, Debug)]
#[command(name = "arcaded")]
#[command(about = "Session billing service for gaming centers", long_about = None)]
struct Args {
    /// Tariff file path (default: ~/.config/arcade/tariff.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set ARCADE_SOCKET env var)
    #[arg(short, long, env = "ARCADE_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set ARCADE_DATA_DIR env var)
    #[arg(short, long, env = "ARCADE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    engine: CoreEngine,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
    tick_interval: Duration,
    snapshot_interval: Duration,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let tariff = load_config(&args.config)
            .with_context(|| format!("Failed to load tariff from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            stations = tariff.stations.len(),
            plans = tariff.plans.len(),
            "Tariff loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| tariff.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| tariff.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("arcaded.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        store.append_audit(AuditEvent::at(clock.now(), AuditEventType::ServiceStarted))?;

        let tick_interval = tariff.service.tick_interval;
        let snapshot_interval = tariff.service.snapshot_interval;

        let mut engine = CoreEngine::new(tariff, store.clone(), clock);

        match store.load_snapshot() {
            Ok(Some(snapshot)) => {
                let restored = engine.restore(&snapshot);
                info!(
                    restored,
                    saved_at = %snapshot.timestamp,
                    "Recovery snapshot loaded"
                );
            }
            Ok(None) => debug!("No recovery snapshot"),
            Err(e) => warn!(error = %e, "Failed to load recovery snapshot, starting empty"),
        }

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            engine,
            ipc: Arc::new(ipc),
            store,
            tick_interval,
            snapshot_interval,
        })
    }

    async fn run(self) -> Result<()> {
        let ipc_ref = self.ipc.clone();
        let mut ipc_messages = ipc_ref
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let engine = Arc::new(Mutex::new(self.engine));
        let store = self.store.clone();

        let ipc_accept = ipc_ref.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut tick_timer = tokio::time::interval(self.tick_interval);
        let mut snapshot_timer = tokio::time::interval(self.snapshot_interval);
        tick_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        snapshot_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Service running");

        loop {
            tokio::select! {
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

                // Warnings, expiry, pending settlements, retention
                _ = tick_timer.tick() => {
                    let events = {
                        let mut engine = engine.lock().await;
                        engine.tick()
                    };

                    Self::broadcast_core_events(&engine, &ipc_ref, events).await;
                }

                _ = snapshot_timer.tick() => {
                    let engine = engine.lock().await;
                    if let Err(e) = engine.save_snapshot() {
                        warn!(error = %e, "Failed to save recovery snapshot");
                    }
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&engine, &ipc_ref, &store, msg).await;
                }
            }
        }

        info!("Shutting down arcaded");

        {
            let engine = engine.lock().await;
            match engine.save_snapshot() {
                Ok(()) => info!(
                    live_sessions = engine.live_session_count(),
                    "Live sessions saved for recovery"
                ),
                Err(e) => error!(error = %e, "Failed to save live sessions on shutdown"),
            }
            if engine.pending_records() > 0 {
                error!(
                    pending = engine.pending_records(),
                    "Settlements could not be written to the store"
                );
            }
        }

        ipc_ref.broadcast_event(Event::new(EventPayload::Shutdown));

        let stopped = engine.lock().await.record_audit(AuditEventType::ServiceStopped);
        if let Err(e) = stopped {
            warn!(error = %e, "Failed to log service shutdown");
        }

        ipc_ref.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    async fn broadcast_core_events(
        engine: &Arc<Mutex<CoreEngine>>,
        ipc: &Arc<IpcServer>,
        events: Vec<CoreEvent>,
    ) {
        let mut state_changed = false;

        for event in events {
            state_changed |= matches!(
                event,
                CoreEvent::SessionStarted { .. }
                    | CoreEvent::SessionTerminated { .. }
                    | CoreEvent::SessionCancelled { .. }
            );
            ipc.broadcast_event(Event::new(event_payload(event)));
        }

        if state_changed {
            let state = engine.lock().await.get_state();
            ipc.broadcast_event(Event::new(EventPayload::StateChanged(state)));
        }
    }

    async fn handle_ipc_message(
        engine: &Arc<Mutex<CoreEngine>>,
        ipc: &Arc<IpcServer>,
        store: &Arc<dyn Store>,
        msg: ServerMessage,
    ) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                let (response, events) =
                    Self::handle_command(engine, store, &client_id, request.request_id, request.command)
                        .await;

                let _ = ipc.send_response(&client_id, response).await;
                Self::broadcast_core_events(engine, ipc, events).await;
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(client_id = %client_id, uid = ?info.uid, "Client connected");

                let _ = engine
                    .lock()
                    .await
                    .record_audit(AuditEventType::ClientConnected {
                        client_id: client_id.to_string(),
                        uid: info.uid,
                    });
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = engine
                    .lock()
                    .await
                    .record_audit(AuditEventType::ClientDisconnected {
                        client_id: client_id.to_string(),
                    });
            }
        }
    }

    async fn handle_command(
        engine: &Arc<Mutex<CoreEngine>>,
        store: &Arc<dyn Store>,
        client_id: &ClientId,
        request_id: u64,
        command: Command,
    ) -> (Response, Vec<CoreEvent>) {
        let response = match command {
            Command::GetState => {
                let state = engine.lock().await.get_state();
                Response::success(request_id, ResponsePayload::State(state))
            }

            Command::StartSession(start) => {
                let result = engine.lock().await.start_session(&start);
                match result {
                    Ok(applied) => {
                        return (
                            Response::success(
                                request_id,
                                ResponsePayload::SessionStarted {
                                    session: applied.session,
                                },
                            ),
                            applied.events,
                        );
                    }
                    Err(e) => core_error(request_id, &e),
                }
            }

            Command::Transition {
                session_id,
                expected_revision,
                request,
            } => {
                let result = engine
                    .lock()
                    .await
                    .apply(session_id, expected_revision, &request);
                match result {
                    Ok(applied) => {
                        return (
                            Response::success(
                                request_id,
                                ResponsePayload::TransitionApplied {
                                    session: applied.session,
                                    transaction: applied.transaction,
                                },
                            ),
                            applied.events,
                        );
                    }
                    Err(e) => core_error(request_id, &e),
                }
            }

            Command::GetSnapshot { session_id } => {
                match engine.lock().await.snapshot(session_id) {
                    Ok(snapshot) => Response::success(request_id, ResponsePayload::Snapshot(snapshot)),
                    Err(e) => core_error(request_id, &e),
                }
            }

            Command::RecentTransactions { limit } => match store.recent_transactions(limit) {
                Ok(transactions) => Response::success(
                    request_id,
                    ResponsePayload::Transactions { transactions },
                ),
                Err(e) => store_error(request_id, &e),
            },

            Command::DailyRevenue { day } => match store.daily_revenue(day) {
                Ok(summary) => Response::success(
                    request_id,
                    ResponsePayload::Revenue {
                        day: summary.day,
                        total: summary.total,
                        transaction_count: summary.transaction_count,
                    },
                ),
                Err(e) => store_error(request_id, &e),
            },

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
                let health = engine.lock().await.health();
                Response::success(request_id, ResponsePayload::Health(health))
            }

            Command::Ping => Response::success(request_id, ResponsePayload::Pong),
        };

        (response, Vec::new())
    }
}

fn core_error(request_id: u64, e: &CoreError) -> Response {
    Response::error(request_id, ErrorInfo::new(e.code(), e.to_string()))
}

fn store_error(request_id: u64, e: &StoreError) -> Response {
    error!(error = %e, "Store query failed");
    Response::error(request_id, ErrorInfo::new(ErrorCode::StoreError, e.to_string()))
}

/// Protocol form of an engine event
fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::SessionStarted {
            session_id,
            station_id,
            planned_minutes,
        } => EventPayload::SessionStarted {
            session_id,
            station_id,
            planned_minutes,
        },
        CoreEvent::SessionPaused { session_id, reason } => {
            EventPayload::SessionPaused { session_id, reason }
        }
        CoreEvent::SessionResumed { session_id } => EventPayload::SessionResumed { session_id },
        CoreEvent::SessionExtended {
            session_id,
            minutes_added,
            planned_minutes,
        } => EventPayload::SessionExtended {
            session_id,
            minutes_added,
            planned_minutes,
        },
        CoreEvent::Warning {
            session_id,
            kind,
            remaining_minutes,
        } => EventPayload::WarningIssued {
            session_id,
            kind,
            remaining_minutes,
        },
        CoreEvent::Expired {
            session_id,
            snapshot,
        } => EventPayload::SessionExpired {
            session_id,
            snapshot,
        },
        CoreEvent::SessionTerminated { transaction } => {
            EventPayload::SessionTerminated { transaction }
        }
        CoreEvent::SessionCancelled { cancellation } => {
            EventPayload::SessionCancelled { cancellation }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "arcaded starting");

    let service = Service::new(&args).await?;
    service.run().await
}
