use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use time::OffsetDateTime;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogFormat;

const DEFAULT_FILTER: &str = "info";

pub fn init_logger(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match format {
        LogFormat::Json => fmt::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init()
            .map_err(|err| anyhow!(err))?,
        LogFormat::Text => fmt::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|err| anyhow!(err))?,
    }

    Ok(())
}

/// One access-control decision as written to the audit trail.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub request_id: String,
    pub remote_address: Option<IpAddr>,
    pub method: String,
    pub uri: String,
    pub action: String,
    pub indices: Vec<String>,
    pub user: Option<String>,
    pub decision: String,
    pub block: Option<String>,
    pub history: String,
    pub elapsed_ms: u128,
}

#[derive(Debug)]
pub struct AuditLogBuilder {
    event: AuditEvent,
}

impl AuditLogBuilder {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            event: AuditEvent {
                request_id: request_id.into(),
                remote_address: None,
                method: String::new(),
                uri: String::new(),
                action: String::new(),
                indices: Vec::new(),
                user: None,
                decision: String::from("UNKNOWN"),
                block: None,
                history: String::new(),
                elapsed_ms: 0,
            },
        }
    }

    pub fn remote_address(mut self, addr: Option<IpAddr>) -> Self {
        self.event.remote_address = addr;
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.event.method = method.into();
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.event.uri = uri.into();
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.event.action = action.into();
        self
    }

    pub fn indices<I, S>(mut self, indices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event.indices = indices.into_iter().map(Into::into).collect();
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.event.user = Some(user.into());
        self
    }

    pub fn decision(mut self, decision: impl Into<String>) -> Self {
        self.event.decision = decision.into();
        self
    }

    pub fn block(mut self, block: impl Into<String>) -> Self {
        self.event.block = Some(block.into());
        self
    }

    pub fn history(mut self, history: impl Into<String>) -> Self {
        self.event.history = history.into();
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.event.elapsed_ms = elapsed.as_millis();
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }

    pub fn log(self) {
        log_audit(self.build());
    }
}

pub fn log_audit(event: AuditEvent) {
    let AuditEvent {
        request_id,
        remote_address,
        method,
        uri,
        action,
        indices,
        user,
        decision,
        block,
        history,
        elapsed_ms,
    } = event;

    let ts = utc_timestamp(OffsetDateTime::now_utc());
    let remote_field = remote_address.map(|addr| addr.to_string());
    let indices_field = indices.join(",");

    tracing::info!(
        target: "audit_log",
        ts,
        request_id,
        remote_address = remote_field.as_deref(),
        method,
        uri,
        action,
        indices = indices_field,
        user = user.as_deref(),
        decision,
        block = block.as_deref(),
        history,
        elapsed_ms
    );
}

fn utc_timestamp(now: OffsetDateTime) -> String {
    let (year, month, day) = now.to_calendar_date();
    let (hour, minute, second) = now.to_hms();
    let month_number: u8 = month.into();
    format!(
        "{year:04}-{month_number:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{millisecond:03}Z",
        millisecond = now.millisecond()
    )
}
