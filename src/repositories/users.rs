use serde_json::{json, Value};

use super::api::{ApiClient, ApiError};
use crate::models::users::{self, AuthPayload, UserStats, UserUpdate};

#[derive(Clone)]
pub struct UserRepository {
    api: ApiClient,
}

impl UserRepository {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload, ApiError> {
        let body = self
            .api
            .post("/users/login", &json!({"email": email, "password": password}))
            .await?;

        users::extract_auth_payload(&body).ok_or_else(invalid_auth_body)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        age: Option<u32>,
    ) -> Result<AuthPayload, ApiError> {
        let mut payload = json!({"email": email, "password": password, "name": name});
        if let Some(age) = age {
            payload["age"] = json!(age);
        }

        let body = self.api.post("/users/register", &payload).await?;
        users::extract_auth_payload(&body).ok_or_else(invalid_auth_body)
    }

    /// Body comes back as `{user}` or as the bare user object; callers put it
    /// through `normalize_user` either way.
    pub async fn get_profile(&self, user_id: &str) -> Result<Value, ApiError> {
        self.api.get(&format!("/users/profile/{user_id}"), &[]).await
    }

    pub async fn update_profile(&self, user_id: &str, updates: &UserUpdate) -> Result<Value, ApiError> {
        let body = serde_json::to_value(updates).map_err(|e| ApiError::Unknown(e.to_string()))?;
        self.api.put(&format!("/users/profile/{user_id}"), &body).await
    }

    pub async fn get_stats(&self, user_id: &str) -> Result<UserStats, ApiError> {
        let body = self.api.get(&format!("/users/stats/{user_id}"), &[]).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Unknown(e.to_string()))
    }
}

fn invalid_auth_body() -> ApiError {
    ApiError::Unknown("Resposta inválida do servidor: usuário ou token não encontrado".to_string())
}
