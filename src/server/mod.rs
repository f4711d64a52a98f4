//! HTTP API
//!
//! Listens on the configured address and serves:
//! - GET /health
//! - GET /gamification/achievements - the catalog
//! - GET|POST /gamification/metrics/:userId - profile, partial metrics update
//! - POST /gamification/events/:userId - one event
//! - GET /gamification/sync/:userId, POST /gamification/bulk-sync/:userId
//! - GET /gamification/dashboard/:userId, GET /gamification/report/:userId
//! - GET|POST /gamification/ledger/:userId - history, manual transaction
//! - GET /gamification/leaderboard/:category,
//!   POST /gamification/leaderboard/:category/snapshot
//!
//! Routing is a pure function of the request so it can be tested without a
//! socket. The accept loop is blocking and runs until `ShutdownHandle::shutdown`.

pub mod handlers;
pub mod types;

pub use types::{ApiRequest, ApiResponse, percent_decode};

use std::io::Read;
use std::sync::Arc;

use serde_json::Value;
use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, error, info, warn};

use crate::config::{LeaderboardSettings, ServerSettings};
use crate::error::{GamificationError, Result};
use crate::service::GamificationService;

pub const AUTH_HEADER: &str = "X-Levelup-Token";

/// Everything a handler can reach
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<GamificationService>,
    pub leaderboard: LeaderboardSettings,
}

impl ApiState {
    pub fn new(service: Arc<GamificationService>, leaderboard: LeaderboardSettings) -> Self {
        Self {
            service,
            leaderboard,
        }
    }
}

/// Routes that take a user id as their last segment
const USER_ROUTES: [&str; 7] = [
    "metrics",
    "events",
    "sync",
    "bulk-sync",
    "dashboard",
    "report",
    "ledger",
];

/// Dispatch one request
pub fn route(state: &ApiState, req: &ApiRequest) -> ApiResponse {
    let segments = req.segments();
    let decoded: Vec<String> = segments.iter().map(|s| percent_decode(s)).collect();
    let parts: Vec<&str> = decoded.iter().map(String::as_str).collect();

    let result = match (req.method.as_str(), parts.as_slice()) {
        ("GET", ["health"]) => handlers::health(),
        ("GET", ["gamification", "achievements"]) => handlers::achievements(state),

        ("GET", ["gamification", "metrics", user]) => handlers::get_metrics(state, user),
        ("POST", ["gamification", "metrics", user]) => {
            handlers::patch_metrics(state, user, &req.body)
        }
        ("POST", ["gamification", "events", user]) => handlers::post_event(state, user, &req.body),
        ("GET", ["gamification", "sync", user]) => handlers::sync(state, user),
        ("POST", ["gamification", "bulk-sync", user]) => {
            handlers::bulk_sync(state, user, &req.body)
        }
        ("GET", ["gamification", "dashboard", user]) => handlers::dashboard(state, user),
        ("GET", ["gamification", "report", user]) => handlers::weekly_report(state, user),
        ("GET", ["gamification", "ledger", user]) => handlers::get_ledger(state, user),
        ("POST", ["gamification", "ledger", user]) => handlers::post_ledger(state, user, &req.body),

        ("GET", ["gamification", "leaderboard", category]) => {
            handlers::leaderboard(state, category, req)
        }
        ("POST", ["gamification", "leaderboard", category, "snapshot"]) => {
            handlers::snapshot(state, category)
        }

        (_, ["gamification", area]) if USER_ROUTES.contains(area) => Err(
            GamificationError::Validation("userId is required".to_string()),
        ),
        _ => return ApiResponse::not_found(&req.path),
    };

    result.unwrap_or_else(|e| ApiResponse::from_error(&e))
}

/// Stops a running `HttpServer` from another thread
#[derive(Clone)]
pub struct ShutdownHandle(Arc<Server>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.unblock();
    }
}

pub struct HttpServer {
    server: Arc<Server>,
    state: ApiState,
    auth_token: Option<String>,
    max_body_bytes: usize,
}

impl HttpServer {
    pub fn bind(settings: &ServerSettings, state: ApiState) -> Result<Self> {
        let bind_addr = settings.bind_addr();
        let server = Server::http(&bind_addr).map_err(|e| {
            GamificationError::Io(std::io::Error::other(format!(
                "failed to bind {}: {}",
                bind_addr, e
            )))
        })?;

        let auth_token = settings.token().map(str::to_string);
        info!(
            "[levelup:http] Server listening on http://{} (auth: {})",
            bind_addr,
            if auth_token.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            server: Arc::new(server),
            state,
            auth_token,
            max_body_bytes: settings.max_body_bytes,
        })
    }

    /// Bound port; useful after binding port 0
    pub fn port(&self) -> Option<u16> {
        self.server.server_addr().to_ip().map(|addr| addr.port())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.server))
    }

    /// Serve requests until shut down
    pub fn run(&self) {
        for request in self.server.incoming_requests() {
            self.handle(request);
        }
        info!("[levelup:http] Server stopped");
    }

    fn handle(&self, mut request: Request) {
        let method = request.method().to_string();
        let url = request.url().to_string();

        if !is_authorized(&request, self.auth_token.as_deref()) {
            warn!("[levelup:http] Unauthorized {} {}", method, url);
            let resp = ApiResponse::error(401, "unauthorized", "missing or invalid token");
            respond_json(request, resp.status, &resp.body);
            return;
        }

        let body = match read_request_body(&mut request, self.max_body_bytes) {
            Ok(body) => body,
            Err(resp) => {
                respond_json(request, resp.status, &resp.body);
                return;
            }
        };

        let api_request = ApiRequest::new(method, &url, body);
        let resp = route(&self.state, &api_request);
        debug!(
            "[levelup:http] {} {} -> {}",
            api_request.method, api_request.path, resp.status
        );
        respond_json(request, resp.status, &resp.body);
    }
}

fn is_authorized(request: &Request, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(AUTH_HEADER))
        .is_some_and(|h| h.value.as_str() == expected)
}

fn read_request_body(
    request: &mut Request,
    max_body_bytes: usize,
) -> std::result::Result<String, ApiResponse> {
    let too_large = || {
        ApiResponse::error(
            413,
            "payload_too_large",
            format!("request body exceeds {} bytes", max_body_bytes),
        )
    };
    if request.body_length().is_some_and(|len| len > max_body_bytes) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    let mut reader = request.as_reader().take((max_body_bytes + 1) as u64);
    if let Err(e) = reader.read_to_end(&mut body) {
        error!("[levelup:http] Failed to read body: {}", e);
        return Err(ApiResponse::error(400, "bad_request", "failed to read body"));
    }
    if body.len() > max_body_bytes {
        return Err(too_large());
    }

    String::from_utf8(body)
        .map_err(|_| ApiResponse::error(400, "bad_request", "request body is not UTF-8"))
}

fn respond_json(request: Request, status: u16, value: &Value) {
    let body = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"success\":false,\"error\":{\"code\":\"serialize\"}}".to_string());
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response.add_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!("[levelup:http] Failed to send response: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn state() -> ApiState {
        let service = GamificationService::with_builtin_catalog(Arc::new(MemoryStore::new()));
        ApiState::new(Arc::new(service), LeaderboardSettings::default())
    }

    fn call(state: &ApiState, method: &str, url: &str, body: Value) -> ApiResponse {
        let body = if body.is_null() {
            String::new()
        } else {
            body.to_string()
        };
        route(state, &ApiRequest::new(method, url, body))
    }

    #[test]
    fn test_health_and_unknown_route() {
        let state = state();
        let health = call(&state, "GET", "/health", Value::Null);
        assert_eq!(health.status, 200);
        assert_eq!(health.body["data"]["status"], "ok");

        let missing = call(&state, "GET", "/nope", Value::Null);
        assert_eq!(missing.status, 404);
        assert_eq!(missing.body["error"]["code"], "not_found");
    }

    #[test]
    fn test_missing_or_invalid_user_id() {
        let state = state();
        let missing = call(&state, "GET", "/gamification/metrics", Value::Null);
        assert_eq!(missing.status, 400);
        assert_eq!(missing.body["error"]["code"], "validation_error");

        let invalid = call(&state, "POST", "/gamification/events/bad%20id", json!({"type": "message-sent"}));
        assert_eq!(invalid.status, 400);
    }

    #[test]
    fn test_event_route_shape() {
        let state = state();
        let resp = call(
            &state,
            "POST",
            "/gamification/events/u1",
            json!({"type": "message-sent", "data": {"agentId": "einstein"}}),
        );
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["success"], true);
        assert_eq!(resp.body["data"]["eventProcessed"], true);
        assert_eq!(resp.body["data"]["pointsAwarded"], 10);
        assert_eq!(resp.body["data"]["gamification"]["userId"], "u1");

        let unknown = call(
            &state,
            "POST",
            "/gamification/events/u1",
            json!({"type": "moon-landing", "data": {}}),
        );
        assert_eq!(unknown.status, 200);
        assert_eq!(unknown.body["data"]["eventProcessed"], false);
        assert_eq!(unknown.body["data"]["pointsAwarded"], 0);
    }

    #[test]
    fn test_bad_body_is_400() {
        let state = state();
        let resp = route(
            &state,
            &ApiRequest::new("POST", "/gamification/metrics/u1", "{not json"),
        );
        assert_eq!(resp.status, 400);

        let unknown_field = call(&state, "POST", "/gamification/metrics/u1", json!({"bogus": 1}));
        assert_eq!(unknown_field.status, 400);
    }

    #[test]
    fn test_ledger_routes() {
        let state = state();
        let earn = call(
            &state,
            "POST",
            "/gamification/ledger/u1",
            json!({"type": "earn", "amount": 100, "reason": "welcome"}),
        );
        assert_eq!(earn.status, 200);
        assert_eq!(earn.body["data"]["balanceAfter"], 100);

        let overspend = call(
            &state,
            "POST",
            "/gamification/ledger/u1",
            json!({"type": "spend", "amount": 500, "reason": "theme"}),
        );
        assert_eq!(overspend.status, 409);

        let history = call(&state, "GET", "/gamification/ledger/u1", Value::Null);
        assert_eq!(history.body["data"]["summary"]["balance"], 100);
        assert_eq!(history.body["data"]["transactions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_range_numbers_are_400_and_store_nothing() {
        use crate::metrics::MetricsSource;

        let state = state();
        let patch = call(
            &state,
            "POST",
            "/gamification/metrics/u1",
            json!({"totalMessages": u64::MAX}),
        );
        assert_eq!(patch.status, 400);
        assert_eq!(patch.body["error"]["code"], "validation_error");
        assert_eq!(state.service.store().metrics("u1").unwrap(), None);

        let max = i64::MAX as u64;
        let earn = call(
            &state,
            "POST",
            "/gamification/ledger/u1",
            json!({"type": "earn", "amount": max, "reason": "import"}),
        );
        assert_eq!(earn.status, 200);
        let overflow = call(
            &state,
            "POST",
            "/gamification/ledger/u1",
            json!({"type": "earn", "amount": 1, "reason": "one more"}),
        );
        assert_eq!(overflow.status, 400);

        let history = call(&state, "GET", "/gamification/ledger/u1", Value::Null);
        assert_eq!(history.body["data"]["summary"]["balance"], i64::MAX);
        assert_eq!(history.body["data"]["transactions"].as_array().unwrap().len(), 1);

        // the server keeps answering
        let health = call(&state, "GET", "/health", Value::Null);
        assert_eq!(health.status, 200);
    }

    #[test]
    fn test_leaderboard_routes() {
        let state = state();
        for user in ["ada", "bob", "cy"] {
            call(
                &state,
                "POST",
                &format!("/gamification/events/{}", user),
                json!({"type": "message-sent"}),
            );
        }

        let board = call(
            &state,
            "GET",
            "/gamification/leaderboard/total-points?pageSize=2&around=cy&radius=1",
            Value::Null,
        );
        assert_eq!(board.status, 200);
        assert_eq!(board.body["data"]["total"], 3);
        assert_eq!(board.body["data"]["entries"].as_array().unwrap().len(), 2);
        assert_eq!(board.body["data"]["context"].as_array().unwrap().len(), 2);

        let bad = call(&state, "GET", "/gamification/leaderboard/karma", Value::Null);
        assert_eq!(bad.status, 400);
        let bad_page = call(
            &state,
            "GET",
            "/gamification/leaderboard/total-points?page=x",
            Value::Null,
        );
        assert_eq!(bad_page.status, 400);

        let snap = call(
            &state,
            "POST",
            "/gamification/leaderboard/total-points/snapshot",
            Value::Null,
        );
        assert_eq!(snap.status, 200);
        assert_eq!(snap.body["data"]["entries"], 3);
    }

    #[test]
    fn test_catalog_route() {
        let state = state();
        let resp = call(&state, "GET", "/gamification/achievements", Value::Null);
        assert_eq!(resp.status, 200);
        assert_eq!(
            resp.body["data"]["total"],
            state.service.catalog().len() as u64
        );
    }
}
