//! Route handlers
//!
//! Each handler parses its input, calls the service and wraps the result in
//! the JSON envelope. Errors bubble up to the router, which maps them to a
//! status code.

use serde::de::DeserializeOwned;
use serde_json::json;

use super::ApiState;
use super::types::{ApiRequest, ApiResponse};
use crate::error::{GamificationError, Result};
use crate::leaderboard::LeaderboardCategory;
use crate::ledger::TransactionDraft;
use crate::metrics::{MetricsEvent, MetricsPatch};
use crate::service::{BulkSyncRequest, LeaderboardQuery, validate_user_id};

/// Upper bound for `radius`
const MAX_CONTEXT_RADIUS: usize = 50;

/// Parse a JSON body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body)
        .map_err(|e| GamificationError::Validation(format!("invalid request body: {}", e)))
}

fn parse_usize(req: &ApiRequest, key: &str) -> Result<Option<usize>> {
    match req.query_param(key) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            GamificationError::Validation(format!("'{}' must be a non-negative integer", key))
        }),
    }
}

pub fn health() -> Result<ApiResponse> {
    Ok(ApiResponse::ok(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

pub fn achievements(state: &ApiState) -> Result<ApiResponse> {
    let catalog = state.service.catalog();
    Ok(ApiResponse::ok(json!({
        "total": catalog.len(),
        "totalRewardPoints": catalog.total_reward_points(),
        "achievements": catalog.definitions(),
    })))
}

pub fn get_metrics(state: &ApiState, user_id: &str) -> Result<ApiResponse> {
    Ok(ApiResponse::ok(state.service.profile(user_id)?))
}

pub fn patch_metrics(state: &ApiState, user_id: &str, body: &str) -> Result<ApiResponse> {
    validate_user_id(user_id)?;
    let patch: MetricsPatch = parse_body(body)?;
    Ok(ApiResponse::ok(state.service.patch_metrics(user_id, &patch)?))
}

pub fn post_event(state: &ApiState, user_id: &str, body: &str) -> Result<ApiResponse> {
    validate_user_id(user_id)?;
    let event: MetricsEvent = parse_body(body)?;
    Ok(ApiResponse::ok(state.service.process_event(user_id, &event)?))
}

pub fn sync(state: &ApiState, user_id: &str) -> Result<ApiResponse> {
    Ok(ApiResponse::ok(state.service.sync(user_id)?))
}

pub fn bulk_sync(state: &ApiState, user_id: &str, body: &str) -> Result<ApiResponse> {
    validate_user_id(user_id)?;
    let request: BulkSyncRequest = parse_body(body)?;
    Ok(ApiResponse::ok(state.service.bulk_sync(user_id, &request)?))
}

pub fn dashboard(state: &ApiState, user_id: &str) -> Result<ApiResponse> {
    Ok(ApiResponse::ok(state.service.dashboard(user_id)?))
}

pub fn weekly_report(state: &ApiState, user_id: &str) -> Result<ApiResponse> {
    Ok(ApiResponse::ok(state.service.weekly_report(user_id)?))
}

pub fn get_ledger(state: &ApiState, user_id: &str) -> Result<ApiResponse> {
    Ok(ApiResponse::ok(state.service.ledger(user_id)?))
}

pub fn post_ledger(state: &ApiState, user_id: &str, body: &str) -> Result<ApiResponse> {
    validate_user_id(user_id)?;
    let draft: TransactionDraft = parse_body(body)?;
    Ok(ApiResponse::ok(
        state.service.append_transaction(user_id, &draft)?,
    ))
}

fn parse_category(raw: &str) -> Result<LeaderboardCategory> {
    LeaderboardCategory::from_str(raw).ok_or_else(|| {
        let known: Vec<&str> = LeaderboardCategory::ALL.iter().map(|c| c.as_str()).collect();
        GamificationError::Validation(format!(
            "unknown leaderboard category '{}' (expected one of: {})",
            raw,
            known.join(", ")
        ))
    })
}

pub fn leaderboard(state: &ApiState, category: &str, req: &ApiRequest) -> Result<ApiResponse> {
    let category = parse_category(category)?;
    let settings = &state.leaderboard;

    let page = parse_usize(req, "page")?.unwrap_or(1).max(1);
    let page_size = parse_usize(req, "pageSize")?
        .unwrap_or(settings.page_size)
        .clamp(1, settings.max_page_size.max(1));
    let radius = parse_usize(req, "radius")?
        .unwrap_or(settings.context_radius)
        .min(MAX_CONTEXT_RADIUS);
    let around = match req.query_param("around").filter(|a| !a.is_empty()) {
        Some(user_id) => {
            validate_user_id(user_id)?;
            Some(user_id.to_string())
        }
        None => None,
    };

    let query = LeaderboardQuery {
        page,
        page_size,
        around,
        radius,
    };
    Ok(ApiResponse::ok(state.service.leaderboard(category, &query)?))
}

pub fn snapshot(state: &ApiState, category: &str) -> Result<ApiResponse> {
    let category = parse_category(category)?;
    Ok(ApiResponse::ok(state.service.record_snapshot(category)?))
}
