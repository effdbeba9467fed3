pub mod cooldown_record;
pub mod dispensation;
pub mod prelude;
