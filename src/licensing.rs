//! Plan/quota rules and the REST collaborators that enforce them.
//!
//! The backend owns the real accounting; this module only consumes its
//! endpoints and applies the published eligibility rules before any
//! network session is opened. Everything speaks the `ok` boolean envelope.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// Subscription plan tags as the backend reports them. Tags we do not know
/// about default-allow; the backend is the authority on new plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanType {
    Demo,
    Basic,
    Pro,
    Enterprise,
    Unknown(String),
}

impl From<&str> for PlanType {
    fn from(tag: &str) -> Self {
        match tag {
            "demo" => PlanType::Demo,
            "basic" => PlanType::Basic,
            "pro" => PlanType::Pro,
            "enterprise" => PlanType::Enterprise,
            other => PlanType::Unknown(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for PlanType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(PlanType::from(tag.as_str()))
    }
}

/// Per-user quota snapshot from `GET /user/limits/{userId}`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserLimits {
    pub plan_type: PlanType,
    #[serde(default)]
    pub trial_used: u32,
    #[serde(default)]
    pub active_connections: u32,
}

/// Applies the plan eligibility rules. `Err` carries the plan-specific
/// limit message shown to the user; no network session may be opened after
/// a denial.
pub fn check_plan_limit(limits: &UserLimits) -> Result<()> {
    let allowed = match limits.plan_type {
        PlanType::Demo => limits.trial_used < 3,
        PlanType::Basic => limits.active_connections < 3,
        PlanType::Pro => limits.active_connections < 6,
        PlanType::Enterprise => true,
        PlanType::Unknown(_) => true,
    };
    if allowed {
        return Ok(());
    }

    let message = match limits.plan_type {
        PlanType::Demo => format!(
            "Demo limit reached ({}/3 connections). Upgrade your plan.",
            limits.trial_used
        ),
        PlanType::Basic => format!(
            "Basic plan limit reached ({}/3 simultaneous connections).",
            limits.active_connections
        ),
        _ => format!(
            "Pro plan limit reached ({}/6 simultaneous connections).",
            limits.active_connections
        ),
    };
    Err(EngineError::LimitExceeded(message))
}

/// Backend collaborators the lifecycle controller talks to. Abstracted so
/// lifecycle tests run without a license service.
#[async_trait]
pub trait LicenseBackend: Send + Sync {
    /// Quota snapshot for a user. `None` when the backend has no usable
    /// answer, which default-allows the connect.
    async fn user_limits(&self, user_id: &str) -> Result<Option<UserLimits>>;

    /// Authorizes and opens the remote-session record for a code.
    async fn open_session(&self, code: &str, technician_id: Option<&str>) -> Result<()>;

    /// Closes the remote-session record. Best-effort; callers log failures.
    async fn close_session(&self, code: &str) -> Result<()>;

    /// Releases one active-connection slot. Best-effort.
    async fn decrement_connection(&self, user_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct LimitsResponse {
    ok: bool,
    user: Option<UserLimits>,
}

#[derive(Deserialize)]
struct AckResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionRequest<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    technician_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseSessionRequest<'a> {
    code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecrementRequest<'a> {
    user_id: &'a str,
}

/// Production backend client.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LicenseBackend for HttpBackend {
    async fn user_limits(&self, user_id: &str) -> Result<Option<UserLimits>> {
        let url = format!("{}/user/limits/{}", self.base_url, user_id);
        let response: LimitsResponse = self.http.get(url).send().await?.json().await?;
        if response.ok {
            Ok(response.user)
        } else {
            tracing::warn!(user_id, "limits lookup returned ok=false, default-allowing");
            Ok(None)
        }
    }

    async fn open_session(&self, code: &str, technician_id: Option<&str>) -> Result<()> {
        let url = format!("{}/remote/connect", self.base_url);
        let body = OpenSessionRequest {
            code,
            technician_id,
        };
        let response: AckResponse = self.http.post(url).json(&body).send().await?.json().await?;
        if response.ok {
            Ok(())
        } else {
            Err(EngineError::SessionRejected {
                code: code.to_string(),
                reason: response.error.unwrap_or_else(|| "rejected".into()),
            })
        }
    }

    async fn close_session(&self, code: &str) -> Result<()> {
        let url = format!("{}/remote/close", self.base_url);
        self.http
            .post(url)
            .json(&CloseSessionRequest { code })
            .send()
            .await?;
        Ok(())
    }

    async fn decrement_connection(&self, user_id: &str) -> Result<()> {
        let url = format!("{}/user/decrement-connection", self.base_url);
        self.http
            .post(url)
            .json(&DecrementRequest { user_id })
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(plan: &str, trial_used: u32, active: u32) -> UserLimits {
        UserLimits {
            plan_type: PlanType::from(plan),
            trial_used,
            active_connections: active,
        }
    }

    #[test]
    fn demo_allows_under_three_trials() {
        assert!(check_plan_limit(&limits("demo", 2, 0)).is_ok());
    }

    #[test]
    fn demo_denies_at_three_trials_with_specific_message() {
        let err = check_plan_limit(&limits("demo", 3, 0)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Demo limit reached (3/3"), "{message}");
    }

    #[test]
    fn basic_caps_simultaneous_connections_at_three() {
        assert!(check_plan_limit(&limits("basic", 0, 2)).is_ok());
        assert!(check_plan_limit(&limits("basic", 0, 3)).is_err());
    }

    #[test]
    fn pro_caps_simultaneous_connections_at_six() {
        assert!(check_plan_limit(&limits("pro", 0, 5)).is_ok());
        let err = check_plan_limit(&limits("pro", 0, 6)).unwrap_err();
        assert!(err.to_string().contains("6/6"));
    }

    #[test]
    fn enterprise_and_unknown_plans_always_pass() {
        assert!(check_plan_limit(&limits("enterprise", 99, 99)).is_ok());
        assert!(check_plan_limit(&limits("founders", 99, 99)).is_ok());
    }

    #[test]
    fn limits_payload_deserializes_with_missing_counters() {
        let parsed: LimitsResponse = serde_json::from_str(
            r#"{"ok":true,"user":{"planType":"pro","activeConnections":4}}"#,
        )
        .unwrap();
        let user = parsed.user.unwrap();
        assert_eq!(user.plan_type, PlanType::Pro);
        assert_eq!(user.trial_used, 0);
        assert_eq!(user.active_connections, 4);
    }

    #[test]
    fn open_session_request_omits_absent_technician() {
        let json = serde_json::to_string(&OpenSessionRequest {
            code: "123456789",
            technician_id: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"code":"123456789"}"#);

        let json = serde_json::to_string(&OpenSessionRequest {
            code: "123456789",
            technician_id: Some("u-1"),
        })
        .unwrap();
        assert!(json.contains(r#""technicianId":"u-1""#));
    }
}
