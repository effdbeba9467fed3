#![allow(unused_imports)]

pub use super::cooldown_record::Entity as CooldownRecord;
pub use super::dispensation::Entity as Dispensation;
