use async_trait::async_trait;
use mintyflow_core::{
    next_premium_date, InstallmentFrequency, Investment, InvestmentType, LifeInsurance, Millis,
    PremiumFrequency, SyncAction, ValidationError,
};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::debug;

use super::{
    assign_id, enqueue_change, not_found, InsuranceRepository, InvestmentRepository, Result,
    SqliteRepository,
};
use crate::db::codec::{
    decimal_at, decode_bool, encode_bool, encode_decimal, enum_at, optional_decimal_at,
    optional_enum_at,
};
use crate::db::now_millis;

const INVESTMENT_COLUMNS: &str = "id, userId, name, type, provider, accountNumber, purchaseValue, \
     currentValue, startDate, maturityDate, interestRate, installmentAmount, frequency, notes, \
     createdAt, updatedAt";

const POLICY_COLUMNS: &str = "id, userId, policyName, provider, policyNumber, premium, \
     premiumFrequency, startDate, endDate, coverageAmount, isActive, nextPremiumDate, lastPaidDate, \
     createdAt, updatedAt, notes";

fn row_to_investment(row: &rusqlite::Row) -> rusqlite::Result<Investment> {
    Ok(Investment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        investment_type: enum_at(row, 3, InvestmentType::parse)?,
        provider: row.get(4)?,
        account_number: row.get(5)?,
        purchase_value: decimal_at(row, 6)?,
        current_value: decimal_at(row, 7)?,
        start_date: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        maturity_date: row.get(9)?,
        interest_rate: optional_decimal_at(row, 10)?,
        installment_amount: optional_decimal_at(row, 11)?,
        frequency: optional_enum_at(row, 12, InstallmentFrequency::parse)?,
        notes: row.get(13)?,
        created_at: row.get::<_, Option<i64>>(14)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(15)?.unwrap_or(0),
    })
}

fn row_to_policy(row: &rusqlite::Row) -> rusqlite::Result<LifeInsurance> {
    Ok(LifeInsurance {
        id: row.get(0)?,
        user_id: row.get(1)?,
        policy_name: row.get(2)?,
        provider: row.get(3)?,
        policy_number: row.get(4)?,
        premium: decimal_at(row, 5)?,
        premium_frequency: enum_at(row, 6, PremiumFrequency::parse)?,
        start_date: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        end_date: row.get(8)?,
        coverage_amount: decimal_at(row, 9)?,
        is_active: decode_bool(row.get(10)?),
        next_premium_date: row.get(11)?,
        last_paid_date: row.get(12)?,
        created_at: row.get::<_, Option<i64>>(13)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(14)?.unwrap_or(0),
        notes: row.get(15)?,
    })
}

pub(super) fn user_investments(conn: &Connection, user_id: &str) -> Result<Vec<Investment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVESTMENT_COLUMNS} FROM investments WHERE userId = ?1 ORDER BY createdAt, id"
    ))?;
    let rows = stmt
        .query_map(params![user_id], row_to_investment)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(super) fn user_policies(conn: &Connection, user_id: &str) -> Result<Vec<LifeInsurance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POLICY_COLUMNS} FROM life_insurance WHERE userId = ?1 ORDER BY createdAt, id"
    ))?;
    let rows = stmt
        .query_map(params![user_id], row_to_policy)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_policy(conn: &Connection, id: &str) -> Result<LifeInsurance> {
    conn.query_row(
        &format!("SELECT {POLICY_COLUMNS} FROM life_insurance WHERE id = ?1"),
        params![id],
        row_to_policy,
    )
    .optional()?
    .ok_or_else(|| not_found("policy", id))
}

fn reschedule(policy: &mut LifeInsurance, now: Millis) {
    policy.next_premium_date = next_premium_date(
        policy.premium_frequency,
        policy.start_date,
        policy.last_paid_date,
        policy.end_date,
        now,
    );
}

fn save_schedule(conn: &Connection, policy: &LifeInsurance, now: Millis) -> Result<()> {
    conn.execute(
        "UPDATE life_insurance SET premiumFrequency = ?2, nextPremiumDate = ?3, lastPaidDate = ?4,
            updatedAt = ?5 WHERE id = ?1",
        params![
            policy.id,
            policy.premium_frequency.as_str(),
            policy.next_premium_date,
            policy.last_paid_date,
            now
        ],
    )?;
    enqueue_change(conn, &policy.user_id, "life_insurance", &policy.id, SyncAction::Update, policy, now)?;
    Ok(())
}

#[async_trait]
impl InvestmentRepository for SqliteRepository {
    async fn create_investment(&self, investment: &Investment) -> Result<Investment> {
        let mut investment = investment.clone();
        assign_id(&mut investment.id);
        investment.validate()?;
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO investments ({INVESTMENT_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                    ),
                    params![
                        investment.id,
                        investment.user_id,
                        investment.name,
                        investment.investment_type.as_str(),
                        investment.provider,
                        investment.account_number,
                        encode_decimal(investment.purchase_value),
                        encode_decimal(investment.current_value),
                        investment.start_date,
                        investment.maturity_date,
                        investment.interest_rate.map(encode_decimal),
                        investment.installment_amount.map(encode_decimal),
                        investment.frequency.map(|f| f.as_str()),
                        investment.notes,
                        investment.created_at,
                        investment.updated_at,
                    ],
                )?;
                enqueue_change(
                    conn,
                    &investment.user_id,
                    "investments",
                    &investment.id,
                    SyncAction::Insert,
                    &investment,
                    now,
                )?;
                Ok(investment)
            })
            .await
    }

    async fn list_investments(&self, user_id: &str) -> Result<Vec<Investment>> {
        self.store.read(move |conn| user_investments(conn, user_id)).await
    }

    async fn refresh_valuation(
        &self,
        investment_id: &str,
        current_value: Decimal,
        now: Millis,
    ) -> Result<Investment> {
        if current_value < Decimal::ZERO {
            return Err(ValidationError::NegativeValue { field: "current value" }.into());
        }
        self.store
            .transaction(move |conn| {
                let mut investment = conn
                    .query_row(
                        &format!("SELECT {INVESTMENT_COLUMNS} FROM investments WHERE id = ?1"),
                        params![investment_id],
                        row_to_investment,
                    )
                    .optional()?
                    .ok_or_else(|| not_found("investment", investment_id))?;
                investment.current_value = current_value;
                investment.updated_at = now;
                conn.execute(
                    "UPDATE investments SET currentValue = ?2, updatedAt = ?3 WHERE id = ?1",
                    params![investment.id, encode_decimal(current_value), now],
                )?;
                enqueue_change(
                    conn,
                    &investment.user_id,
                    "investments",
                    &investment.id,
                    SyncAction::Update,
                    &investment,
                    now,
                )?;
                debug!(id = %investment.id, gain = %investment.gain(), "valuation refreshed");
                Ok(investment)
            })
            .await
    }
}

#[async_trait]
impl InsuranceRepository for SqliteRepository {
    async fn create_policy(&self, policy: &LifeInsurance, now: Millis) -> Result<LifeInsurance> {
        let mut policy = policy.clone();
        assign_id(&mut policy.id);
        policy.validate()?;
        if policy.next_premium_date.is_none() {
            reschedule(&mut policy, now);
        }
        let written_at = now_millis();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO life_insurance ({POLICY_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                    ),
                    params![
                        policy.id,
                        policy.user_id,
                        policy.policy_name,
                        policy.provider,
                        policy.policy_number,
                        encode_decimal(policy.premium),
                        policy.premium_frequency.as_str(),
                        policy.start_date,
                        policy.end_date,
                        encode_decimal(policy.coverage_amount),
                        encode_bool(policy.is_active),
                        policy.next_premium_date,
                        policy.last_paid_date,
                        policy.created_at,
                        policy.updated_at,
                        policy.notes,
                    ],
                )?;
                enqueue_change(
                    conn,
                    &policy.user_id,
                    "life_insurance",
                    &policy.id,
                    SyncAction::Insert,
                    &policy,
                    written_at,
                )?;
                Ok(policy)
            })
            .await
    }

    async fn list_policies(&self, user_id: &str) -> Result<Vec<LifeInsurance>> {
        self.store.read(move |conn| user_policies(conn, user_id)).await
    }

    async fn record_premium_paid(&self, policy_id: &str, paid_at: Millis) -> Result<LifeInsurance> {
        self.store
            .transaction(move |conn| {
                let mut policy = load_policy(conn, policy_id)?;
                policy.last_paid_date = Some(paid_at);
                reschedule(&mut policy, paid_at);
                policy.updated_at = paid_at;
                save_schedule(conn, &policy, paid_at)?;
                Ok(policy)
            })
            .await
    }

    async fn change_premium_frequency(
        &self,
        policy_id: &str,
        frequency: PremiumFrequency,
        now: Millis,
    ) -> Result<LifeInsurance> {
        self.store
            .transaction(move |conn| {
                let mut policy = load_policy(conn, policy_id)?;
                policy.premium_frequency = frequency;
                reschedule(&mut policy, now);
                policy.updated_at = now;
                save_schedule(conn, &policy, now)?;
                Ok(policy)
            })
            .await
    }
}
