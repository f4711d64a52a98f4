//! Request and response shapes of the HTTP API

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::GamificationError;

/// A request reduced to what routing needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    /// Decoded query pairs in order
    pub query: Vec<(String, String)>,
    pub body: String,
}

impl ApiRequest {
    /// Split `url` into path and query
    pub fn new(method: impl Into<String>, url: &str, body: impl Into<String>) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (url, Vec::new()),
        };
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.to_string(),
            query,
            body: body.into(),
        }
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path segments with empty ones dropped
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

/// Decode `%XX` escapes and `+`; malformed escapes are kept as-is
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Status code plus JSON envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// `{success: true, data}`
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status: 200,
                body: json!({ "success": true, "data": data }),
            },
            Err(e) => Self::from_error(&GamificationError::from(e)),
        }
    }

    /// `{success: false, error: {code, message}}`
    pub fn error(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({
                "success": false,
                "error": { "code": code, "message": message.into() },
            }),
        }
    }

    pub fn from_error(err: &GamificationError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            tracing::error!("[levelup:http] {}", err);
        }
        Self::error(status, err.code(), err.to_string())
    }

    pub fn not_found(path: &str) -> Self {
        Self::error(404, "not_found", format!("no route for {}", path))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_splits_query() {
        let req = ApiRequest::new(
            "get",
            "/gamification/leaderboard/total-points?page=2&around=ada%40example.com&flag",
            "",
        );
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/gamification/leaderboard/total-points");
        assert_eq!(req.query_param("page"), Some("2"));
        assert_eq!(req.query_param("around"), Some("ada@example.com"));
        assert_eq!(req.query_param("flag"), Some(""));
        assert_eq!(req.query_param("radius"), None);
        assert_eq!(req.segments(), vec!["gamification", "leaderboard", "total-points"]);
    }

    #[test]
    fn test_percent_decode_edge_cases() {
        assert_eq!(percent_decode("a+b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%41%42"), "AB");
    }

    #[test]
    fn test_error_envelope() {
        let resp = ApiResponse::from_error(&GamificationError::InsufficientBalance {
            requested: 50,
            available: 10,
        });
        assert_eq!(resp.status, 409);
        assert_eq!(resp.body["success"], false);
        assert_eq!(resp.body["error"]["code"], "insufficient_balance");
        assert!(!resp.is_success());

        let ok = ApiResponse::ok(json!({"status": "ok"}));
        assert_eq!(ok.body["data"]["status"], "ok");
        assert!(ok.is_success());
    }
}
