pub mod activity;
pub mod challenge;
pub mod skill;
pub mod user;
