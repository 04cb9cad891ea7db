use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use harbor_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

/// GET /health - service health with a database probe
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_check = match state.db.get() {
        Ok(mut conn) => match diesel::sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => HealthCheck {
                name: "database".into(),
                status: HealthStatus::Healthy,
                message: None,
            },
            Err(e) => HealthCheck {
                name: "database".into(),
                status: HealthStatus::Unhealthy,
                message: Some(format!("{e}")),
            },
        },
        Err(e) => HealthCheck {
            name: "database".into(),
            status: HealthStatus::Unhealthy,
            message: Some(format!("{e}")),
        },
    };

    let response = HealthResponse::healthy("harbor-messaging", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![db_check]);

    Json(response)
}

/// GET /metrics - Prometheus exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
