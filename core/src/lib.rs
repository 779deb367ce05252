pub mod cases;
pub mod chat;
pub mod demo;
pub mod error;
pub mod limits;
pub mod reminders;
pub mod run;
