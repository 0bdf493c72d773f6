//! CLI commands

use anyhow::{Context, Result, anyhow, bail};
use clap::{Subcommand, ValueEnum};
use std::sync::Arc;
use tether_core::store::FileStore;
use tether_core::{
    Clock, CountdownTick, EventName, LogoutReason, NoticeLevel, Role, SessionEvent, SessionStatus,
    SystemClock,
};
use tether_http::types::AuditQuery;
use tether_session::{SessionConfig, Tether};
use tokio::sync::mpsc;
use tracing::info;

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        username: String,

        /// Password (prompting is left to the shell)
        #[arg(long, env = "TETHER_PASSWORD", hide_env_values = true)]
        password: String,

        /// Account role: user or admin
        #[arg(long, default_value = "user")]
        role: Role,
    },

    /// Show the stored identity and confirm it with the server
    Whoami {
        /// Skip the dashboard probe
        #[arg(long)]
        offline: bool,
    },

    /// Exchange the refresh token for a new token set
    Refresh,

    /// List device sessions of this account
    Sessions {
        #[arg(long)]
        status: Option<StatusFilter>,
    },

    /// Revoke the session of one device
    Revoke {
        /// Device id as shown by `sessions`
        device_id: String,
    },

    /// Read the admin audit log
    Audit {
        #[arg(long)]
        user_id: Option<String>,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "10")]
        limit: u32,

        #[arg(long)]
        event_type: Option<String>,
    },

    /// Keep the session alive, refreshing silently, until it ends or Ctrl-C
    Watch,

    /// End the session
    Logout,

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StatusFilter {
    Active,
    Revoked,
    Expired,
}

impl From<StatusFilter> for SessionStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Active => Self::Active,
            StatusFilter::Revoked => Self::Revoked,
            StatusFilter::Expired => Self::Expired,
        }
    }
}

impl Commands {
    pub async fn execute(self, settings: SessionConfig) -> Result<()> {
        if let Self::Config = self {
            println!("{}", config::render(&settings)?);
            return Ok(());
        }

        let state_dir = settings.state_dir();
        let store = FileStore::in_dir(&state_dir)
            .with_context(|| format!("opening session store in {}", state_dir.display()))?;
        info!(path = %store.path().display(), "using session store");
        let tether = Tether::new(&settings, Arc::new(store))?;
        print_notices(&tether);

        match self {
            Self::Login {
                username,
                password,
                role,
            } => login(&tether, &username, &password, role).await,
            Self::Whoami { offline } => whoami(&tether, offline).await,
            Self::Refresh => {
                tether.lifecycle.resume().await?;
                let tokens = tether.lifecycle.refresh().await?;
                println!("Refreshed; access token valid until {}", format_exp(tokens.exp));
                Ok(())
            }
            Self::Sessions { status } => sessions(&tether, status.map(Into::into)).await,
            Self::Revoke { device_id } => revoke(&tether, &device_id).await,
            Self::Audit {
                user_id,
                page,
                limit,
                event_type,
            } => {
                let query = AuditQuery {
                    user_id,
                    page,
                    limit,
                    event_type,
                };
                audit(&tether, &query).await
            }
            Self::Watch => watch(&tether, &settings).await,
            Self::Logout => {
                tether.lifecycle.logout(LogoutReason::UserRequested).await;
                println!("Signed out");
                Ok(())
            }
            Self::Config => Ok(()),
        }
    }
}

fn print_notices(tether: &Tether) {
    tether.events().subscribe(EventName::Notice, |event| {
        if let SessionEvent::Notice(notice) = event {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Warning => "warn",
                NoticeLevel::Danger => "error",
            };
            eprintln!("[{tag}] {}", notice.message);
        }
    });
}

/// `exp` with the time left, e.g. `1700000600 (in 9m 58s)`
fn format_exp(exp: i64) -> String {
    let remaining = exp - SystemClock.now();
    if remaining <= 0 {
        return format!("{exp} (expired)");
    }
    format!("{exp} (in {})", CountdownTick::new(remaining, remaining).label())
}

async fn login(tether: &Tether, username: &str, password: &str, role: Role) -> Result<()> {
    let record = tether.lifecycle.login(username, password, role).await?;
    println!(
        "Signed in as {} ({}) on device {}",
        record.username, record.role, record.device_id
    );
    println!("Access token valid until {}", format_exp(record.exp));
    Ok(())
}

async fn whoami(tether: &Tether, offline: bool) -> Result<()> {
    let record = tether
        .lifecycle
        .record()
        .ok_or_else(|| anyhow!("not signed in"))?;

    println!("User:     {}", record.username);
    println!("Role:     {}", record.role);
    println!("Device:   {}", record.device_id);
    println!("Expires:  {}", format_exp(record.exp));
    if let Some(at) = record.last_refresh_at {
        println!("Refreshed at: {at}");
    }

    if !offline {
        tether.lifecycle.resume().await?;
        let probe = tether.lifecycle.probe_dashboard(record.role).await?;
        println!("Server confirms {} until {}", probe.username, format_exp(probe.exp));
    }
    Ok(())
}

async fn sessions(tether: &Tether, status: Option<SessionStatus>) -> Result<()> {
    tether.lifecycle.resume().await?;
    let listed = tether.registry.list_active(status).await?;
    let own = tether.client.session().device_id().unwrap_or_default();

    println!("{} session(s)", listed.count);
    for session in &listed.sessions {
        let marker = if session.is_device(&own) { "*" } else { " " };
        println!(
            "{marker} {:<38} {:<8} {:<10} {:<10} {}",
            session.device_id,
            session.status.as_str(),
            session.browser.as_deref().unwrap_or("-"),
            session.os.as_deref().unwrap_or("-"),
            session.ip_address.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn revoke(tether: &Tether, device_id: &str) -> Result<()> {
    tether.lifecycle.resume().await?;
    let listed = tether.registry.list_active(None).await?;
    let target = listed
        .current(device_id)
        .ok_or_else(|| anyhow!("no session listed for device {device_id}"))?;
    tether.registry.revoke(target).await?;
    println!("Revoked {device_id}");
    Ok(())
}

async fn audit(tether: &Tether, query: &AuditQuery) -> Result<()> {
    tether.lifecycle.resume().await?;
    let page = tether.audit.fetch(query).await?;
    println!(
        "Page {}/{} ({} entries)",
        query.page,
        page.total_pages(query.limit),
        page.total_count
    );
    for entry in &page.logs {
        let flag = if entry.is_suspicious() { "!" } else { " " };
        println!(
            "{flag} {:<25} {:<20} {:<16} {}",
            entry.timestamp.as_deref().unwrap_or("-"),
            entry.event_type,
            entry.ip_address.as_deref().unwrap_or("-"),
            entry.user_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn watch(tether: &Tether, settings: &SessionConfig) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let events = tether.events();
    let ended = tx.clone();
    let logged_out = events.subscribe(EventName::LoggedOut, move |event| {
        if let SessionEvent::LoggedOut { reason } = event {
            let _ = ended.send(*reason);
        }
    });
    let ticks = events.subscribe(EventName::Countdown, |event| {
        if let SessionEvent::Countdown(tick) = event
            && (tick.remaining_secs % 60 == 0 || tick.remaining_secs <= 10)
        {
            eprintln!("session expires in {} ({:?})", tick.label(), tick.urgency);
        }
    });
    drop(tx);

    let state = tether.lifecycle.resume().await?;
    if !state.is_authenticated() {
        bail!("not signed in");
    }
    tether.registry.start_polling(settings.poll_interval());
    println!("Watching session; Ctrl-C to stop");

    tokio::select! {
        reason = rx.recv() => {
            if let Some(reason) = reason {
                println!("Session ended: {reason}");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            println!("Stopped watching; session kept");
        }
    }

    tether.registry.stop_polling();
    events.unsubscribe(logged_out);
    events.unsubscribe(ticks);
    Ok(())
}
