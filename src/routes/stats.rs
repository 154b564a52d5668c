//! `/api/stats/*`. Spend and call-volume reporting for the
//! authenticated dashboard user.

use axum::{Json, extract::{Query, State}, http::HeaderMap, response::IntoResponse};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{error::ApiError, log_pipeline::Stats, routes::auth::authenticate, state::AppState};

#[derive(Deserialize)]
pub struct DailyQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct OverviewBody {
    pub total_spend_usd: f64,
    pub window: Stats,
}

pub async fn overview(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let total_spend_usd = state
        .db
        .usage()
        .get_user_spend_total(claims.user_id, CancellationToken::new())
        .await?;

    let to_ts = Utc::now();
    let from_ts = to_ts - chrono::Duration::days(30);
    let window = state
        .search
        .get_stats(claims.user_id, from_ts, to_ts)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(OverviewBody { total_spend_usd, window }))
}

pub async fn daily(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DailyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = authenticate(&state, &headers).await?;
    let end = query.end.unwrap_or_else(|| Utc::now().date_naive());
    let start = query
        .start
        .unwrap_or_else(|| end.checked_sub_days(Days::new(30)).unwrap_or(end));

    let stats = state
        .db
        .usage()
        .get_daily_stats(claims.user_id, start, end, CancellationToken::new())
        .await?;
    Ok(Json(stats))
}
