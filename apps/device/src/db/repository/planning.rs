use async_trait::async_trait;
use mintyflow_core::{
    Bill, BillInterval, Budget, BudgetAlerts, BudgetPeriod, Cadence, Goal, Millis, SyncAction,
};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use super::{
    assign_id, enqueue_change, not_found, BillRepository, BudgetRepository, BudgetStatus, GoalRepository,
    Result, SqliteRepository,
};
use crate::db::codec::{decimal_at, decode_bool, encode_bool, encode_decimal, enum_at};
use crate::db::now_millis;

pub(super) const BUDGET_COLUMNS: &str = "id, userId, categoryId, amount, spent, period, startDate, \
     endDate, createdAt, updatedAt, alertAt50, alertAt80, alertAt100";

const GOAL_COLUMNS: &str = "id, userId, name, targetAmount, currentAmount, deadline, createdAt, \
     updatedAt, isCompleted, icon, color";

pub(super) const BILL_COLUMNS: &str = "id, userId, name, amount, dueDate, recurringInterval, \
     categoryId, walletId, isPaid, reminderDays, createdAt, updatedAt, lastPaidDate, notes";

pub(super) fn row_to_budget(row: &rusqlite::Row) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        amount: decimal_at(row, 3)?,
        spent: decimal_at(row, 4)?,
        period: enum_at(row, 5, BudgetPeriod::parse)?,
        start_date: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        end_date: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        created_at: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
        alerts: BudgetAlerts {
            at50_percent: decode_bool(row.get(10)?),
            at80_percent: decode_bool(row.get(11)?),
            at100_percent: decode_bool(row.get(12)?),
        },
    })
}

fn row_to_goal(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        target_amount: decimal_at(row, 3)?,
        current_amount: decimal_at(row, 4)?,
        deadline: row.get(5)?,
        created_at: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        is_completed: decode_bool(row.get(8)?),
        icon: row.get(9)?,
        color: row.get(10)?,
    })
}

pub(super) fn row_to_bill(row: &rusqlite::Row) -> rusqlite::Result<Bill> {
    Ok(Bill {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        amount: decimal_at(row, 3)?,
        due_date: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        recurring_interval: enum_at(row, 5, BillInterval::parse)?,
        category_id: row.get(6)?,
        wallet_id: row.get(7)?,
        is_paid: decode_bool(row.get(8)?),
        reminder_days: row.get::<_, Option<u32>>(9)?.unwrap_or(mintyflow_core::REMINDER_DAYS_BEFORE_BILL),
        created_at: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
        last_paid_date: row.get(12)?,
        notes: row.get(13)?,
    })
}

fn select_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn user_budgets(conn: &Connection, user_id: &str) -> Result<Vec<Budget>> {
    select_all(
        conn,
        &format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE userId = ?1 ORDER BY startDate, id"),
        params![user_id],
        row_to_budget,
    )
}

pub(super) fn user_bills(conn: &Connection, user_id: &str) -> Result<Vec<Bill>> {
    select_all(
        conn,
        &format!("SELECT {BILL_COLUMNS} FROM bills WHERE userId = ?1 ORDER BY dueDate, id"),
        params![user_id],
        row_to_bill,
    )
}

#[async_trait]
impl BudgetRepository for SqliteRepository {
    async fn create_budget(&self, budget: &Budget) -> Result<Budget> {
        let mut budget = budget.clone();
        assign_id(&mut budget.id);
        budget.validate()?;
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO budgets ({BUDGET_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                    ),
                    params![
                        budget.id,
                        budget.user_id,
                        budget.category_id,
                        encode_decimal(budget.amount),
                        encode_decimal(budget.spent),
                        budget.period.as_str(),
                        budget.start_date,
                        budget.end_date,
                        budget.created_at,
                        budget.updated_at,
                        encode_bool(budget.alerts.at50_percent),
                        encode_bool(budget.alerts.at80_percent),
                        encode_bool(budget.alerts.at100_percent),
                    ],
                )?;
                enqueue_change(conn, &budget.user_id, "budgets", &budget.id, SyncAction::Insert, &budget, now)?;
                Ok(budget)
            })
            .await
    }

    async fn list_budgets(&self, user_id: &str) -> Result<Vec<Budget>> {
        self.store.read(move |conn| user_budgets(conn, user_id)).await
    }

    async fn recompute_budget_spent(&self, budget_id: &str) -> Result<BudgetStatus> {
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                let mut budget = conn
                    .query_row(
                        &format!("SELECT {BUDGET_COLUMNS} FROM budgets WHERE id = ?1"),
                        params![budget_id],
                        row_to_budget,
                    )
                    .optional()?
                    .ok_or_else(|| not_found("budget", budget_id))?;

                let mut stmt = conn.prepare(
                    "SELECT amount FROM transactions
                     WHERE userId = ?1 AND categoryId = ?2 AND type = 'expense'
                       AND date >= ?3 AND date <= ?4",
                )?;
                let amounts = stmt
                    .query_map(
                        params![budget.user_id, budget.category_id, budget.start_date, budget.end_date],
                        |row| decimal_at(row, 0),
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                budget.spent = amounts.into_iter().sum::<Decimal>();
                budget.updated_at = now;

                conn.execute(
                    "UPDATE budgets SET spent = ?2, updatedAt = ?3 WHERE id = ?1",
                    params![budget.id, encode_decimal(budget.spent), now],
                )?;
                enqueue_change(conn, &budget.user_id, "budgets", &budget.id, SyncAction::Update, &budget, now)?;

                let crossed = budget.crossed_thresholds();
                Ok(BudgetStatus { budget, crossed })
            })
            .await
    }
}

#[async_trait]
impl GoalRepository for SqliteRepository {
    async fn create_goal(&self, goal: &Goal) -> Result<Goal> {
        let mut goal = goal.clone();
        assign_id(&mut goal.id);
        goal.validate()?;
        goal.is_completed |= goal.current_amount >= goal.target_amount;
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    &format!("INSERT INTO goals ({GOAL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
                    params![
                        goal.id,
                        goal.user_id,
                        goal.name,
                        encode_decimal(goal.target_amount),
                        encode_decimal(goal.current_amount),
                        goal.deadline,
                        goal.created_at,
                        goal.updated_at,
                        encode_bool(goal.is_completed),
                        goal.icon,
                        goal.color,
                    ],
                )?;
                enqueue_change(conn, &goal.user_id, "goals", &goal.id, SyncAction::Insert, &goal, now)?;
                Ok(goal)
            })
            .await
    }

    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        self.store
            .read(move |conn| {
                select_all(
                    conn,
                    &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE userId = ?1 ORDER BY createdAt, id"),
                    params![user_id],
                    row_to_goal,
                )
            })
            .await
    }

    async fn contribute_to_goal(&self, goal_id: &str, amount: Decimal) -> Result<Goal> {
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                let mut goal = conn
                    .query_row(
                        &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1"),
                        params![goal_id],
                        row_to_goal,
                    )
                    .optional()?
                    .ok_or_else(|| not_found("goal", goal_id))?;
                goal.contribute(amount)?;
                goal.updated_at = now;
                conn.execute(
                    "UPDATE goals SET currentAmount = ?2, isCompleted = ?3, updatedAt = ?4 WHERE id = ?1",
                    params![
                        goal.id,
                        encode_decimal(goal.current_amount),
                        encode_bool(goal.is_completed),
                        now
                    ],
                )?;
                enqueue_change(conn, &goal.user_id, "goals", &goal.id, SyncAction::Update, &goal, now)?;
                Ok(goal)
            })
            .await
    }
}

#[async_trait]
impl BillRepository for SqliteRepository {
    async fn create_bill(&self, bill: &Bill) -> Result<Bill> {
        let mut bill = bill.clone();
        assign_id(&mut bill.id);
        bill.validate()?;
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO bills ({BILL_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                    ),
                    params![
                        bill.id,
                        bill.user_id,
                        bill.name,
                        encode_decimal(bill.amount),
                        bill.due_date,
                        bill.recurring_interval.as_str(),
                        bill.category_id,
                        bill.wallet_id,
                        encode_bool(bill.is_paid),
                        bill.reminder_days,
                        bill.created_at,
                        bill.updated_at,
                        bill.last_paid_date,
                        bill.notes,
                    ],
                )?;
                enqueue_change(conn, &bill.user_id, "bills", &bill.id, SyncAction::Insert, &bill, now)?;
                Ok(bill)
            })
            .await
    }

    async fn list_bills(&self, user_id: &str) -> Result<Vec<Bill>> {
        self.store.read(move |conn| user_bills(conn, user_id)).await
    }

    async fn mark_bill_paid(&self, bill_id: &str, paid_at: Millis) -> Result<Bill> {
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                let mut bill = conn
                    .query_row(
                        &format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = ?1"),
                        params![bill_id],
                        row_to_bill,
                    )
                    .optional()?
                    .ok_or_else(|| not_found("bill", bill_id))?;

                // Paying closes the current cycle; the next one starts unpaid.
                bill.last_paid_date = Some(paid_at);
                bill.due_date = bill.recurring_interval.advance(bill.due_date);
                bill.is_paid = false;
                bill.updated_at = now;

                conn.execute(
                    "UPDATE bills SET lastPaidDate = ?2, dueDate = ?3, isPaid = ?4, updatedAt = ?5 WHERE id = ?1",
                    params![bill.id, paid_at, bill.due_date, encode_bool(bill.is_paid), now],
                )?;
                enqueue_change(conn, &bill.user_id, "bills", &bill.id, SyncAction::Update, &bill, now)?;
                Ok(bill)
            })
            .await
    }

    async fn upcoming_bills(&self, user_id: &str, now: Millis) -> Result<Vec<Bill>> {
        let bills = self.list_bills(user_id).await?;
        Ok(bills.into_iter().filter(|b| b.is_due_soon(now)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{repo_with_user, transaction, wallet};
    use super::super::{TransactionRepository, WalletRepository};
    use super::*;
    use chrono::{TimeZone, Utc};
    use mintyflow_core::{AlertThreshold, TransactionKind, REMINDER_DAYS_BEFORE_BILL};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const DAY: Millis = 24 * 60 * 60 * 1000;

    fn budget(amount: Decimal) -> Budget {
        Budget {
            id: "b1".into(),
            user_id: "u1".into(),
            category_id: "food".into(),
            amount,
            spent: Decimal::ZERO,
            period: BudgetPeriod::Monthly,
            start_date: 100,
            end_date: 200,
            created_at: 1,
            updated_at: 1,
            alerts: BudgetAlerts::default(),
        }
    }

    #[tokio::test]
    async fn test_recompute_counts_only_expenses_in_window_and_category() {
        let repo = repo_with_user("u1").await;
        repo.create_wallet(&wallet("w1", "u1", dec!(1000))).await.unwrap();
        repo.create_budget(&budget(dec!(100))).await.unwrap();

        let mut other_category = transaction("t3", "w1", TransactionKind::Expense, dec!(500), 150);
        other_category.category_id = Some("rent".into());
        for tx in [
            transaction("t1", "w1", TransactionKind::Expense, dec!(45.50), 150),
            transaction("t2", "w1", TransactionKind::Expense, dec!(40), 200),
            other_category,
            transaction("t4", "w1", TransactionKind::Expense, dec!(99), 201),
            transaction("t5", "w1", TransactionKind::Income, dec!(70), 150),
        ] {
            repo.add_transaction(&tx).await.unwrap();
        }

        let status = repo.recompute_budget_spent("b1").await.unwrap();
        assert_eq!(status.budget.spent, dec!(85.50));
        assert_eq!(
            status.crossed,
            vec![AlertThreshold::Half, AlertThreshold::EightyPercent]
        );
        assert_eq!(repo.list_budgets("u1").await.unwrap()[0].spent, dec!(85.50));
    }

    #[tokio::test]
    async fn test_goal_contributions_complete_once() {
        let repo = repo_with_user("u1").await;
        let goal = Goal {
            id: "g1".into(),
            user_id: "u1".into(),
            name: "Laptop".into(),
            target_amount: dec!(1000),
            current_amount: dec!(900),
            deadline: None,
            created_at: 1,
            updated_at: 1,
            is_completed: false,
            icon: Some("laptop".into()),
            color: None,
        };
        repo.create_goal(&goal).await.unwrap();

        let updated = repo.contribute_to_goal("g1", dec!(150)).await.unwrap();
        assert!(updated.is_completed);
        assert_eq!(updated.current_amount, dec!(1050));

        let stored = repo.list_goals("u1").await.unwrap().remove(0);
        assert!(stored.is_completed);
        assert_eq!(stored.icon.as_deref(), Some("laptop"));

        assert!(repo.contribute_to_goal("g1", dec!(-5)).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_bill_paid_advances_due_date() {
        let repo = repo_with_user("u1").await;
        let due = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap().timestamp_millis();
        let bill = Bill {
            id: "bill1".into(),
            user_id: "u1".into(),
            name: "Internet".into(),
            amount: dec!(49.99),
            due_date: due,
            recurring_interval: BillInterval::Monthly,
            category_id: None,
            wallet_id: None,
            is_paid: false,
            reminder_days: REMINDER_DAYS_BEFORE_BILL,
            created_at: 1,
            updated_at: 1,
            last_paid_date: None,
            notes: Some("fiber".into()),
        };
        repo.create_bill(&bill).await.unwrap();

        assert_eq!(repo.upcoming_bills("u1", due - 4 * DAY).await.unwrap().len(), 0);
        assert_eq!(repo.upcoming_bills("u1", due - 2 * DAY).await.unwrap().len(), 1);

        let paid = repo.mark_bill_paid("bill1", due - DAY).await.unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap().timestamp_millis();
        assert_eq!(paid.due_date, expected);
        assert_eq!(paid.last_paid_date, Some(due - DAY));
        assert_eq!(repo.upcoming_bills("u1", due).await.unwrap().len(), 0);
        assert_eq!(repo.list_bills("u1").await.unwrap()[0], paid);
    }
}
