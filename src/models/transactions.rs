use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub amount: f64,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// The filter a listing was made with; kept around so mutations can refetch
/// the exact same page afterwards.
#[derive(Clone, Debug)]
pub struct TransactionFilter {
    pub user_id: String,
    pub page: u32,
    pub limit: u32,
    pub category: Option<String>,
    pub kind: Option<TransactionType>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl TransactionFilter {
    pub fn new(user_id: impl Into<String>) -> Self {
        TransactionFilter {
            user_id: user_id.into(),
            page: 1,
            limit: 20,
            category: None,
            kind: None,
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Pagination {
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub total: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransactionPage {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Amounts are stored with currency-minor precision; round before anything
/// leaves the client.
pub fn round_amount(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
