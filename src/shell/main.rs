use std::net::SocketAddr;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};

use tip_ledger::application::policy::LocationPolicy;
use tip_ledger::core::chargeback::ChargebackPolicy;
use tip_ledger::shell::http::router;
use tip_ledger::shell::state::AppState;

fn policy_from_env() -> LocationPolicy {
    let mut policy = LocationPolicy::new(
        std::env::var("LOCATION_ID").unwrap_or_else(|_| "loc-default".to_string()),
    );
    if let Ok(value) = std::env::var("CHARGEBACK_POLICY") {
        policy.chargeback_policy = match value.as_str() {
            "BUSINESS_ABSORBS" => ChargebackPolicy::BusinessAbsorbs,
            _ => ChargebackPolicy::EmployeeChargeback,
        };
    }
    if let Ok(value) = std::env::var("CLAWBACK_FLOOR_CENTS") {
        if let Ok(floor) = value.parse() {
            policy.clawback_floor_cents = floor;
        }
    }
    policy
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let policy = policy_from_env();
    tracing::info!(location_id = %policy.location_id, "starting tip ledger");

    let state = AppState::in_memory(policy);
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = "0.0.0.0:8080".parse()?;
    tracing::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
