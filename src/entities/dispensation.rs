//! Dispensation log entity for auditing faucet payouts.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dispensations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Recipient wallet address, EIP-55 checksummed form
    #[sea_orm(column_type = "String(StringLen::N(42))")]
    pub recipient_address: String,
    /// Amount of Sepolia ETH sent, in wei
    pub amount_wei: i64,
    /// Transaction hash returned by the submission endpoint
    #[sea_orm(column_type = "String(StringLen::N(66))")]
    pub tx_hash: String,
    /// Timestamp of the dispensation
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
