use serde::Serialize;
use serde_json::Value;

use super::api::{ApiClient, ApiError};
use crate::models::summary::Summary;
use crate::models::transactions::{
    NewTransaction, TransactionFilter, TransactionPage, TransactionUpdate,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayload<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    data: &'a NewTransaction,
}

#[derive(Clone)]
pub struct TransactionRepository {
    api: ApiClient,
}

impl TransactionRepository {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self, filter: &TransactionFilter) -> Result<TransactionPage, ApiError> {
        let mut query = vec![
            ("page".to_string(), filter.page.to_string()),
            ("limit".to_string(), filter.limit.to_string()),
        ];
        if let Some(category) = &filter.category {
            query.push(("category".to_string(), category.clone()));
        }
        if let Some(kind) = filter.kind {
            query.push(("type".to_string(), kind.as_str().to_string()));
        }
        if let Some(start) = &filter.start_date {
            query.push(("startDate".to_string(), start.clone()));
        }
        if let Some(end) = &filter.end_date {
            query.push(("endDate".to_string(), end.clone()));
        }

        let body = self
            .api
            .get(&format!("/transactions/user/{}", filter.user_id), &query)
            .await?;
        serde_json::from_value(body).map_err(|e| ApiError::Unknown(e.to_string()))
    }

    pub async fn create(&self, user_id: &str, data: &NewTransaction) -> Result<Value, ApiError> {
        let payload = serde_json::to_value(CreatePayload { user_id, data })
            .map_err(|e| ApiError::Unknown(e.to_string()))?;
        self.api.post("/transactions", &payload).await
    }

    pub async fn update(
        &self,
        transaction_id: &str,
        data: &TransactionUpdate,
    ) -> Result<Value, ApiError> {
        let payload = serde_json::to_value(data).map_err(|e| ApiError::Unknown(e.to_string()))?;
        self.api.put(&format!("/transactions/{transaction_id}"), &payload).await
    }

    pub async fn delete(&self, transaction_id: &str) -> Result<Value, ApiError> {
        self.api.delete(&format!("/transactions/{transaction_id}")).await
    }

    pub async fn summary(&self, user_id: &str, period: &str) -> Result<Summary, ApiError> {
        let body = self
            .api
            .get(
                &format!("/transactions/user/{user_id}/summary"),
                &[("period".to_string(), period.to_string())],
            )
            .await?;
        serde_json::from_value(body).map_err(|e| ApiError::Unknown(e.to_string()))
    }

    pub async fn categories(&self, user_id: &str) -> Result<Vec<String>, ApiError> {
        let body = self
            .api
            .get(&format!("/transactions/user/{user_id}/categories"), &[])
            .await?;

        Ok(body
            .get("categories")
            .and_then(Value::as_array)
            .map(|categories| {
                categories
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}
