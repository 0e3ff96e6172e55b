use std::sync::OnceLock;

use anyhow::Result;
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub json_logs: bool,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "inbox-server".into()),
            json_logs: std::env::var("LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// Initializes the global `tracing` subscriber. Idempotent: a second call
/// (e.g. from a test harness that also calls it) is a no-op.
///
/// Unlike the fleet-wide deployment this crate is descended from, there is
/// no OpenTelemetry exporter here — just structured fmt logging, since the
/// backend runs as a single deployable rather than dozens of per-provider
/// services that needed trace correlation across process boundaries.
pub fn init_telemetry(cfg: &TelemetryConfig) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg.json_logs {
        let fmt_layer = tracing_subscriber::fmt::layer().json().flatten_event(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok();
    }

    INIT.set(()).ok();
    Ok(())
}

/// Records the fields every request/job span carries, so log lines across
/// the webhook processor, HTTP handlers, and outbound sender can be
/// correlated by organization and conversation without each call site
/// repeating the boilerplate.
pub fn with_common_fields(
    span: &Span,
    organization_id: &str,
    conversation_id: Option<&str>,
    msg_id: Option<&str>,
) {
    span.record("organization_id", tracing::field::display(organization_id));
    if let Some(conversation_id) = conversation_id {
        span.record("conversation_id", tracing::field::display(conversation_id));
    }
    if let Some(msg_id) = msg_id {
        span.record("msg_id", tracing::field::display(msg_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tracing_test::traced_test]
    #[test]
    fn with_common_fields_records_conversation_id() {
        let span = tracing::info_span!("job", organization_id = tracing::field::Empty, conversation_id = tracing::field::Empty);
        with_common_fields(&span, "org-1", Some("conv-1"), None);
        let _enter = span.enter();
        tracing::info!("processing");
        assert!(tracing_test::logs_contain("processing"));
    }
}
