use serde::{Deserialize, Serialize};

use super::transactions::{Transaction, TransactionType};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: f64,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Summary {
    pub income: f64,
    pub expenses: f64,
    pub balance: f64,
    #[serde(default)]
    pub categories: Vec<CategoryTotal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CategoryShare {
    pub category: String,
    pub amount: f64,
    pub count: u64,
    pub percentage: u32,
}

impl Summary {
    /// Derives the same figures the server-side summary endpoint produces
    /// from a locally held list. Categories are aggregated over expenses.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut income = 0.0;
        let mut expenses = 0.0;
        let mut categories: Vec<CategoryTotal> = Vec::new();

        for tx in transactions {
            match tx.kind {
                TransactionType::Income => income += tx.amount,
                TransactionType::Expense => {
                    expenses += tx.amount;
                    match categories.iter_mut().find(|c| c.category == tx.category) {
                        Some(entry) => {
                            entry.amount += tx.amount;
                            entry.count += 1;
                        }
                        None => categories.push(CategoryTotal {
                            category: tx.category.clone(),
                            amount: tx.amount,
                            count: 1,
                        }),
                    }
                }
            }
        }

        Summary {
            income,
            expenses,
            balance: income - expenses,
            categories,
        }
    }

    /// Percentage of total expenses per category, 0 when there are no
    /// expenses at all.
    pub fn category_shares(&self) -> Vec<CategoryShare> {
        let total_expenses = self.expenses.abs();

        self.categories
            .iter()
            .map(|entry| CategoryShare {
                category: entry.category.clone(),
                amount: entry.amount.abs(),
                count: entry.count,
                percentage: if total_expenses > 0.0 {
                    ((entry.amount.abs() / total_expenses) * 100.0).round() as u32
                } else {
                    0
                },
            })
            .collect()
    }
}
