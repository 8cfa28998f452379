pub mod activity;
pub mod handlers;
pub mod leveling;
pub mod streaks;
pub mod xp;
