//! Cooldown record entity: last successful dispensation per address.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cooldown_records")]
pub struct Model {
    /// Recipient wallet address, EIP-55 checksummed form
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(StringLen::N(42))")]
    pub address: String,
    /// Seconds since epoch of the last successful dispensation
    pub last_dispensed_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
