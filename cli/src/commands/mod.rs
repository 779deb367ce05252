pub mod case;
pub mod chat;
pub mod health;
pub mod knowledge;
pub mod remind;
pub mod run;
