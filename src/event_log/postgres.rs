//! PostgreSQL ledger store
//!
//! Each mutating method is one database transaction:
//!
//! ```text
//! BEGIN
//!   SET LOCAL lock_timeout          -- bounded wait, 55P03 → Busy
//!   SELECT .. accounts_tb .. ORDER BY account_id FOR UPDATE
//!   INSERT / UPDATE event row
//!   re-project affected accounts from rows read in this transaction
//!   UPSERT balance_snapshots_tb
//! COMMIT
//! ```
//!
//! Account rows are immutable and serve purely as per-account mutexes shared
//! by every process writing to the same database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use tracing::debug;

use super::error::StoreError;
use super::store::LedgerStore;
use super::types::{
    AccountEvents, BalanceSnapshot, FundingAppend, FundingEvent, FundingStatus, FundingTransition,
    IdempotencyToken, NewFundingEvent, NewTransferEvent, TransferEvent, TransferEventStatus,
};
use crate::account::{Account, PhoneNumber};
use crate::balance::{Balance, project_events};
use crate::core_types::AccountId;

pub struct PgStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_wait: Duration) -> Self {
        Self {
            pool,
            lock_timeout_ms: lock_wait.as_millis().max(1) as u64,
        }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms);
        sqlx::query(&stmt).execute(&mut *tx).await?;
        Ok(tx)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let raw_phone: String = row.try_get("phone")?;
    let phone = PhoneNumber::parse(&raw_phone)
        .map_err(|e| StoreError::Corrupt(format!("accounts_tb.phone: {}", e)))?;
    Ok(Account {
        account_id: row.try_get("account_id")?,
        phone,
        created_at: row.try_get("created_at")?,
    })
}

fn funding_from_row(row: &PgRow) -> Result<FundingEvent, StoreError> {
    let status_id: i16 = row.try_get("status")?;
    let status = FundingStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Corrupt(format!("Invalid funding status: {}", status_id)))?;
    let raw_token: String = row.try_get("idempotency_token")?;
    let idempotency_token = IdempotencyToken::parse(&raw_token)
        .map_err(|e| StoreError::Corrupt(format!("funding_events_tb.idempotency_token: {}", e)))?;

    Ok(FundingEvent {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        status,
        idempotency_token,
        created_at: row.try_get("created_at")?,
        settled_at: row.try_get("settled_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> Result<TransferEvent, StoreError> {
    let status_id: i16 = row.try_get("status")?;
    let status = TransferEventStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Corrupt(format!("Invalid transfer status: {}", status_id)))?;
    let raw_txn: String = row.try_get("transaction_id")?;
    let transaction_id = raw_txn
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("Invalid transaction_id: {}", raw_txn)))?;

    Ok(TransferEvent {
        id: row.try_get("id")?,
        transaction_id,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        amount: row.try_get("amount")?,
        status,
        description: row.try_get("description")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn snapshot_from_row(row: &PgRow) -> Result<BalanceSnapshot, StoreError> {
    Ok(BalanceSnapshot {
        account_id: row.try_get("account_id")?,
        balance: Balance::new(row.try_get("available")?, row.try_get("pending")?),
        version: row.try_get("version")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// Statements shared by the transactional paths
// ============================================================================

/// Lock account rows in ascending id order; returns the ids that exist.
async fn lock_accounts(
    conn: &mut PgConnection,
    account_ids: &[AccountId],
) -> Result<Vec<AccountId>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT account_id FROM accounts_tb
        WHERE account_id = ANY($1)
        ORDER BY account_id
        FOR UPDATE
        "#,
    )
    .bind(account_ids.to_vec())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|r| r.try_get::<i64, _>("account_id").map_err(StoreError::from))
        .collect()
}

async fn load_events(
    conn: &mut PgConnection,
    account_id: AccountId,
) -> Result<AccountEvents, StoreError> {
    let funding_rows = sqlx::query(
        r#"
        SELECT id, account_id, provider, amount, status, idempotency_token,
               created_at, settled_at
        FROM funding_events_tb
        WHERE account_id = $1
        ORDER BY id
        "#,
    )
    .bind(account_id)
    .fetch_all(&mut *conn)
    .await?;

    let transfer_rows = sqlx::query(
        r#"
        SELECT id, transaction_id, sender_id, receiver_id, amount, status,
               description, processed_at
        FROM transfer_events_tb
        WHERE sender_id = $1 OR receiver_id = $1
        ORDER BY id
        "#,
    )
    .bind(account_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(AccountEvents {
        funding: funding_rows
            .iter()
            .map(funding_from_row)
            .collect::<Result<_, _>>()?,
        transfers: transfer_rows
            .iter()
            .map(transfer_from_row)
            .collect::<Result<_, _>>()?,
    })
}

async fn project_in(conn: &mut PgConnection, account_id: AccountId) -> Result<Balance, StoreError> {
    let events = load_events(conn, account_id).await?;
    project_events(account_id, &events).map_err(|_| StoreError::Overflow(account_id))
}

async fn upsert_snapshot(
    conn: &mut PgConnection,
    account_id: AccountId,
    balance: Balance,
) -> Result<BalanceSnapshot, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO balance_snapshots_tb (account_id, available, pending, version, updated_at)
        VALUES ($1, $2, $3, 1, NOW())
        ON CONFLICT (account_id) DO UPDATE
        SET available = EXCLUDED.available,
            pending = EXCLUDED.pending,
            version = balance_snapshots_tb.version + 1,
            updated_at = NOW()
        RETURNING account_id, available, pending, version, updated_at
        "#,
    )
    .bind(account_id)
    .bind(balance.available)
    .bind(balance.pending)
    .fetch_one(&mut *conn)
    .await?;

    snapshot_from_row(&row)
}

async fn reproject(
    conn: &mut PgConnection,
    account_id: AccountId,
) -> Result<BalanceSnapshot, StoreError> {
    let balance = project_in(conn, account_id).await?;
    upsert_snapshot(conn, account_id, balance).await
}

async fn funding_row_by_token(
    conn: &mut PgConnection,
    token: &IdempotencyToken,
) -> Result<Option<FundingEvent>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT id, account_id, provider, amount, status, idempotency_token,
               created_at, settled_at
        FROM funding_events_tb
        WHERE idempotency_token = $1
        "#,
    )
    .bind(token.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(funding_from_row).transpose()
}

#[async_trait]
impl LedgerStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn create_account(&self, phone: &PhoneNumber) -> Result<Account, StoreError> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO accounts_tb (phone) VALUES ($1)
            RETURNING account_id, phone, created_at
            "#,
        )
        .bind(phone.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let account = account_from_row(&row)?;

        upsert_snapshot(&mut tx, account.account_id, Balance::ZERO).await?;
        tx.commit().await?;

        debug!(account_id = account.account_id, "Account row created");
        Ok(account)
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT account_id, phone, created_at FROM accounts_tb WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<Account>, StoreError> {
        let row =
            sqlx::query("SELECT account_id, phone, created_at FROM accounts_tb WHERE phone = $1")
                .bind(phone.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_account_ids(&self) -> Result<Vec<AccountId>, StoreError> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT account_id FROM accounts_tb ORDER BY account_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn account_events(&self, account_id: AccountId) -> Result<AccountEvents, StoreError> {
        let mut conn = self.pool.acquire().await?;
        load_events(&mut conn, account_id).await
    }

    async fn funding_by_token(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<FundingEvent>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        funding_row_by_token(&mut conn, token).await
    }

    async fn append_funding(&self, event: &NewFundingEvent) -> Result<FundingAppend, StoreError> {
        event.check()?;
        let mut tx = self.begin().await?;
        if lock_accounts(&mut tx, &[event.account_id]).await?.is_empty() {
            return Err(StoreError::AccountNotFound(event.account_id));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO funding_events_tb
                (account_id, provider, amount, status, idempotency_token, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (idempotency_token) DO NOTHING
            RETURNING id, account_id, provider, amount, status, idempotency_token,
                      created_at, settled_at
            "#,
        )
        .bind(event.account_id)
        .bind(&event.provider)
        .bind(event.amount)
        .bind(FundingStatus::Pending.id())
        .bind(event.idempotency_token.as_str())
        .bind(event.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            let existing = funding_row_by_token(&mut tx, &event.idempotency_token)
                .await?
                .ok_or_else(|| {
                    StoreError::Corrupt("token conflict without a stored row".to_string())
                })?;
            tx.rollback().await?;
            return Ok(FundingAppend::Existing(existing));
        };

        let created = funding_from_row(&row)?;
        reproject(&mut tx, event.account_id).await?;
        tx.commit().await?;
        Ok(FundingAppend::Created(created))
    }

    async fn resolve_funding(
        &self,
        token: &IdempotencyToken,
        outcome: FundingStatus,
        at: DateTime<Utc>,
    ) -> Result<FundingTransition, StoreError> {
        let mut tx = self.begin().await?;

        let Some(current) = funding_row_by_token(&mut tx, token).await? else {
            return Ok(FundingTransition::NotFound);
        };
        lock_accounts(&mut tx, &[current.account_id]).await?;

        let updated = sqlx::query(
            r#"
            UPDATE funding_events_tb
            SET status = $1, settled_at = $2
            WHERE idempotency_token = $3 AND status = $4
            RETURNING id, account_id, provider, amount, status, idempotency_token,
                      created_at, settled_at
            "#,
        )
        .bind(outcome.id())
        .bind(at)
        .bind(token.as_str())
        .bind(FundingStatus::Pending.id())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            // Lost the race or already terminal: report the stored outcome.
            let stored = funding_row_by_token(&mut tx, token)
                .await?
                .unwrap_or(current);
            tx.rollback().await?;
            return Ok(FundingTransition::AlreadyTerminal(stored));
        };

        let applied = funding_from_row(&row)?;
        reproject(&mut tx, applied.account_id).await?;
        tx.commit().await?;
        Ok(FundingTransition::Applied(applied))
    }

    async fn append_transfer(
        &self,
        event: &NewTransferEvent,
    ) -> Result<TransferEvent, StoreError> {
        event.check()?;
        let mut tx = self.begin().await?;

        let locked = lock_accounts(&mut tx, &[event.sender_id, event.receiver_id]).await?;
        for id in [event.sender_id, event.receiver_id] {
            if !locked.contains(&id) {
                return Err(StoreError::AccountNotFound(id));
            }
        }

        let sender_before = project_in(&mut tx, event.sender_id).await?;
        if sender_before.available < event.amount {
            return Err(StoreError::Overdraft {
                available: sender_before.available,
                requested: event.amount,
            });
        }

        let row = sqlx::query(
            r#"
            INSERT INTO transfer_events_tb
                (transaction_id, sender_id, receiver_id, amount, status, description, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, transaction_id, sender_id, receiver_id, amount, status,
                      description, processed_at
            "#,
        )
        .bind(event.transaction_id.to_string())
        .bind(event.sender_id)
        .bind(event.receiver_id)
        .bind(event.amount)
        .bind(TransferEventStatus::Completed.id())
        .bind(&event.description)
        .bind(event.processed_at)
        .fetch_one(&mut *tx)
        .await?;
        let appended = transfer_from_row(&row)?;

        reproject(&mut tx, event.sender_id).await?;
        reproject(&mut tx, event.receiver_id).await?;
        tx.commit().await?;
        Ok(appended)
    }

    async fn snapshot(&self, account_id: AccountId) -> Result<Option<BalanceSnapshot>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT account_id, available, pending, version, updated_at
            FROM balance_snapshots_tb
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn refresh_snapshot(&self, account_id: AccountId) -> Result<BalanceSnapshot, StoreError> {
        let mut tx = self.begin().await?;
        if lock_accounts(&mut tx, &[account_id]).await?.is_empty() {
            return Err(StoreError::AccountNotFound(account_id));
        }
        let snapshot = reproject(&mut tx, account_id).await?;
        tx.commit().await?;
        Ok(snapshot)
    }
}
