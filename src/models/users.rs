use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub monthly_income: f64,
    pub financial_goals: String,
    pub spending_limit: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub profile: UserProfile,
}

/// A user payload plus the bearer token handed out by login/register.
/// The user half is kept raw until it goes through `normalize_user`.
pub struct AuthPayload {
    pub user: Value,
    pub token: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserStats {
    pub name: String,
    pub member_since: String,
    pub days_active: i64,
    pub monthly_income: f64,
    pub spending_limit: f64,
    pub profile_completion: f64,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_income: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financial_goals: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spending_limit: Option<f64>,
}

/// Maps any observed server user shape (snake_case or camelCase, nested under
/// `user` or flat) into the canonical `User`. Idempotent: feeding a serialized
/// normalized user back in yields the same user.
///
/// Precedence per field, first present wins:
/// id | _id, name | fullName, isActive | is_active, createdAt | created_at,
/// profile.monthly_income | profile.monthlyIncome | monthlyIncome (same
/// scheme for the other profile fields). Absent fields default
/// deterministically; timestamps default to now.
pub fn normalize_user(payload: &Value) -> User {
    let user = payload.get("user").unwrap_or(payload);
    let now = Utc::now().to_rfc3339();

    User {
        id: str_field(user, &["id", "_id"]).unwrap_or_default(),
        email: str_field(user, &["email"]).unwrap_or_default(),
        name: str_field(user, &["name", "fullName"]).unwrap_or_else(|| "Usuário".to_string()),
        age: user.get("age").and_then(Value::as_u64).map(|age| age as u32),
        is_active: bool_field(user, &["isActive", "is_active"]).unwrap_or(true),
        created_at: str_field(user, &["createdAt", "created_at"]).unwrap_or_else(|| now.clone()),
        updated_at: str_field(user, &["updatedAt", "updated_at"]).unwrap_or(now),
        profile: UserProfile {
            monthly_income: profile_field(user, "monthly_income", "monthlyIncome")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
            financial_goals: profile_field(user, "financial_goals", "financialGoals")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            spending_limit: profile_field(user, "spending_limit", "spendingLimit")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0),
        },
    }
}

/// Login and register bodies come back as `{user, token}` or nested under
/// `{data: {...}}`; returns `None` when either half is missing.
pub fn extract_auth_payload(body: &Value) -> Option<AuthPayload> {
    let scope = body.get("data").unwrap_or(body);
    let user = scope.get("user").or_else(|| body.get("user"))?.clone();
    let token = scope
        .get("token")
        .or_else(|| body.get("token"))?
        .as_str()?
        .to_string();

    Some(AuthPayload { user, token })
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn bool_field(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_bool))
}

fn profile_field<'a>(user: &'a Value, snake: &str, camel: &str) -> Option<&'a Value> {
    let profile = user.get("profile");
    profile
        .and_then(|p| p.get(snake))
        .or_else(|| profile.and_then(|p| p.get(camel)))
        .or_else(|| user.get(camel))
        .filter(|v| !v.is_null())
}
