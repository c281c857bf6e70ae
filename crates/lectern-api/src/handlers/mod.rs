pub mod documents;
pub mod uploads;
