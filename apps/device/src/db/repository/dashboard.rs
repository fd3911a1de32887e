use async_trait::async_trait;
use mintyflow_core::{month_window, DashboardStats, Millis, TransactionKind};
use rusqlite::params;
use rust_decimal::Decimal;

use super::holdings::{user_investments, user_policies};
use super::planning::{user_bills, user_budgets};
use super::{DashboardRepository, Result, SqliteRepository};
use crate::db::codec::{decimal_at, enum_at};

#[async_trait]
impl DashboardRepository for SqliteRepository {
    async fn dashboard_stats(&self, user_id: &str, now: Millis) -> Result<DashboardStats> {
        let (month_start, month_end) = month_window(now);
        self.store
            .read(move |conn| {
                let total_balance = {
                    let mut stmt = conn.prepare("SELECT balance FROM wallets WHERE userId = ?1")?;
                    let balances = stmt
                        .query_map(params![user_id], |row| decimal_at(row, 0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    balances.into_iter().sum::<Decimal>()
                };

                let mut monthly_income = Decimal::ZERO;
                let mut monthly_expenses = Decimal::ZERO;
                {
                    let mut stmt = conn.prepare(
                        "SELECT type, amount FROM transactions
                         WHERE userId = ?1 AND date >= ?2 AND date <= ?3",
                    )?;
                    let rows = stmt
                        .query_map(params![user_id, month_start, month_end], |row| {
                            Ok((enum_at(row, 0, TransactionKind::parse)?, decimal_at(row, 1)?))
                        })?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    for (kind, amount) in rows {
                        match kind {
                            TransactionKind::Income => monthly_income += amount,
                            TransactionKind::Expense => monthly_expenses += amount,
                            TransactionKind::Transfer => {}
                        }
                    }
                }

                let investments = user_investments(conn, user_id)?;
                let policies = user_policies(conn, user_id)?;
                let active: Vec<_> = policies.iter().filter(|p| p.is_active).collect();

                let upcoming_bills = user_bills(conn, user_id)?
                    .into_iter()
                    .filter(|b| b.is_due_soon(now))
                    .collect();
                let budget_alerts = user_budgets(conn, user_id)?
                    .into_iter()
                    .filter(|b| b.contains(now) && !b.crossed_thresholds().is_empty())
                    .collect();

                Ok(DashboardStats {
                    total_balance,
                    monthly_income,
                    monthly_expenses,
                    investment_value: investments.iter().map(|i| i.current_value).sum(),
                    investment_gains: investments.iter().map(|i| i.gain()).sum(),
                    active_policies: active.len(),
                    total_coverage: active.iter().map(|p| p.coverage_amount).sum(),
                    upcoming_bills,
                    budget_alerts,
                })
            })
            .await
    }
}
