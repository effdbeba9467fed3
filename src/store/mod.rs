//! Durable cooldown state and the dispensation log, backed by PostgreSQL.
//!
//! The cooldown check and commit are collapsed into a single atomic claim:
//! an insert-or-conditional-update that only succeeds when no record exists
//! or the existing record is older than the cooldown window. Concurrent
//! requests for the same address therefore race on one statement, and the
//! database picks exactly one winner regardless of how many process
//! instances are running.

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue, ColumnTrait, DatabaseConnection, DbErr, DeleteMany, EntityTrait, Insert,
    QueryFilter, QueryOrder, QuerySelect, UpdateMany,
};
use tracing::debug;

use crate::entities::{cooldown_record, dispensation};

/// Outcome of an admission claim against the cooldown store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The window was claimed; `previous` is the timestamp to restore if
    /// issuance fails.
    Claimed { previous: Option<i64> },
    /// Another dispensation inside the window already holds the record.
    Active { retry_after_secs: i64 },
}

/// Seconds left in the window, or `None` when a new dispensation is allowed.
pub fn cooldown_remaining(last_dispensed_at: i64, now: i64, cooldown_secs: i64) -> Option<i64> {
    let elapsed = now - last_dispensed_at;
    if elapsed >= cooldown_secs {
        None
    } else {
        Some(cooldown_secs - elapsed)
    }
}

#[derive(Clone)]
pub struct CooldownStore {
    database: DatabaseConnection,
}

impl CooldownStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub async fn last_dispensed(&self, address: &str) -> Result<Option<i64>, DbErr> {
        let record = cooldown_record::Entity::find_by_id(address)
            .one(&self.database)
            .await?;
        Ok(record.map(|r| r.last_dispensed_at))
    }

    /// Atomically claims the cooldown window for `address` at `now`.
    ///
    /// Exactly one of N concurrent claims for the same address succeeds: the
    /// insert either creates the record or conditionally overwrites it when
    /// the stored timestamp is outside the window, all in one statement.
    pub async fn try_claim(
        &self,
        address: &str,
        now: i64,
        cooldown_secs: i64,
    ) -> Result<ClaimOutcome, DbErr> {
        assert!(cooldown_secs > 0, "Cooldown window must be positive");
        let previous = self.last_dispensed(address).await?;
        let cutoff = now - cooldown_secs;

        let rows = claim_query(address, now, cutoff)
            .exec_without_returning(&self.database)
            .await?;

        if rows == 0 {
            let last = self.last_dispensed(address).await?.unwrap_or(now);
            let retry_after_secs = cooldown_remaining(last, now, cooldown_secs).unwrap_or(1);
            debug!(address, retry_after_secs, "cooldown claim lost");
            return Ok(ClaimOutcome::Active { retry_after_secs });
        }

        Ok(ClaimOutcome::Claimed { previous })
    }

    /// Reverts a claim after a failed issuance, but only while the record
    /// still holds our claim timestamp; a concurrent dispensation that has
    /// since re-claimed the window is left untouched.
    pub async fn release(
        &self,
        address: &str,
        claimed_at: i64,
        previous: Option<i64>,
    ) -> Result<(), DbErr> {
        match previous {
            Some(prev) => {
                restore_query(address, claimed_at, prev)
                    .exec(&self.database)
                    .await?;
            }
            None => {
                discard_query(address, claimed_at)
                    .exec(&self.database)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn record_dispensation(
        &self,
        address: &str,
        amount_wei: i64,
        tx_hash: &str,
    ) -> Result<(), DbErr> {
        let entry = dispensation::ActiveModel {
            id: ActiveValue::NotSet,
            recipient_address: ActiveValue::Set(address.to_string()),
            amount_wei: ActiveValue::Set(amount_wei),
            tx_hash: ActiveValue::Set(tx_hash.to_string()),
            created_at: ActiveValue::Set(Utc::now().fixed_offset()),
        };
        dispensation::Entity::insert(entry)
            .exec(&self.database)
            .await?;
        Ok(())
    }

    pub async fn recent_dispensations(
        &self,
        address: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<dispensation::Model>, DbErr> {
        let mut select = dispensation::Entity::find();
        if let Some(address) = address {
            select = select.filter(dispensation::Column::RecipientAddress.eq(address));
        }
        select
            .order_by_desc(dispensation::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.database)
            .await
    }

    /// Total wei dispensed and request count, for the status endpoint.
    pub async fn totals(&self) -> Result<(i64, i64), DbErr> {
        let stats = dispensation::Entity::find()
            .select_only()
            .column_as(dispensation::Column::AmountWei.sum(), "total_amount")
            .column_as(dispensation::Column::Id.count(), "total_count")
            .into_tuple::<(Option<i64>, i64)>()
            .one(&self.database)
            .await?
            .unwrap_or((None, 0));
        Ok((stats.0.unwrap_or(0), stats.1))
    }
}

/// The admission claim: insert the record, or overwrite it only when the
/// stored timestamp has left the window. The `WHERE` guard on the conflict
/// action is what makes N concurrent claims resolve to one winner.
fn claim_query(address: &str, now: i64, cutoff: i64) -> Insert<cooldown_record::ActiveModel> {
    let claim = cooldown_record::ActiveModel {
        address: ActiveValue::Set(address.to_string()),
        last_dispensed_at: ActiveValue::Set(now),
    };
    cooldown_record::Entity::insert(claim).on_conflict(
        OnConflict::column(cooldown_record::Column::Address)
            .update_column(cooldown_record::Column::LastDispensedAt)
            .action_and_where(
                Expr::col((
                    cooldown_record::Entity,
                    cooldown_record::Column::LastDispensedAt,
                ))
                .lte(cutoff),
            )
            .to_owned(),
    )
}

/// Puts the prior timestamp back, guarded on the record still holding our
/// claim so a concurrent re-claim is never clobbered.
fn restore_query(address: &str, claimed_at: i64, prev: i64) -> UpdateMany<cooldown_record::Entity> {
    cooldown_record::Entity::update_many()
        .col_expr(cooldown_record::Column::LastDispensedAt, Expr::value(prev))
        .filter(cooldown_record::Column::Address.eq(address))
        .filter(cooldown_record::Column::LastDispensedAt.eq(claimed_at))
}

/// Drops a claim that created the record, with the same still-ours guard.
fn discard_query(address: &str, claimed_at: i64) -> DeleteMany<cooldown_record::Entity> {
    cooldown_record::Entity::delete_many()
        .filter(cooldown_record::Column::Address.eq(address))
        .filter(cooldown_record::Column::LastDispensedAt.eq(claimed_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    const DAY: i64 = 24 * 60 * 60;
    const ADDR: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn window_blocks_until_exactly_elapsed() {
        let t = 1_700_000_000;
        assert_eq!(cooldown_remaining(t, t, DAY), Some(DAY));
        assert_eq!(cooldown_remaining(t, t + 1, DAY), Some(DAY - 1));
        assert_eq!(cooldown_remaining(t, t + DAY - 1, DAY), Some(1));
        assert_eq!(cooldown_remaining(t, t + DAY, DAY), None);
        assert_eq!(cooldown_remaining(t, t + DAY + 1, DAY), None);
    }

    #[test]
    fn clock_regression_still_blocks() {
        // A wall-clock step backwards must not open the window early.
        let t = 1_700_000_000;
        assert_eq!(cooldown_remaining(t, t - 10, DAY), Some(DAY + 10));
    }

    #[test]
    fn claim_is_one_conditional_statement() {
        let now = 1_700_000_000;
        let sql = claim_query(ADDR, now, now - DAY)
            .build(DbBackend::Postgres)
            .to_string();

        // The whole claim must be a single upsert: any split into separate
        // get and set calls reopens the double-dispensation race.
        assert!(sql.starts_with(r#"INSERT INTO "cooldown_records""#), "{sql}");
        assert!(sql.contains(r#"ON CONFLICT ("address") DO UPDATE"#), "{sql}");
        assert!(
            sql.contains(r#""last_dispensed_at" = "excluded"."last_dispensed_at""#),
            "{sql}"
        );
        // The guard that lets exactly one of N concurrent claims win.
        assert!(
            sql.contains(&format!(
                r#""cooldown_records"."last_dispensed_at" <= {}"#,
                now - DAY
            )),
            "{sql}"
        );
    }

    #[test]
    fn restore_only_reverts_our_own_claim() {
        let sql = restore_query(ADDR, 1_700_000_000, 1_600_000_000)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.starts_with(r#"UPDATE "cooldown_records""#), "{sql}");
        assert!(sql.contains(r#""last_dispensed_at" = 1600000000"#), "{sql}");
        assert!(sql.contains(&format!(r#""address" = '{ADDR}'"#)), "{sql}");
        assert!(
            sql.contains(r#""last_dispensed_at" = 1700000000"#),
            "{sql}"
        );
    }

    #[test]
    fn discard_only_removes_our_own_claim() {
        let sql = discard_query(ADDR, 1_700_000_000)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.starts_with(r#"DELETE FROM "cooldown_records""#), "{sql}");
        assert!(sql.contains(&format!(r#""address" = '{ADDR}'"#)), "{sql}");
        assert!(
            sql.contains(r#""last_dispensed_at" = 1700000000"#),
            "{sql}"
        );
    }
}
