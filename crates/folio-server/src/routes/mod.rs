pub mod health;
pub mod query;
pub mod realtime;
pub mod reports;
pub mod track;
