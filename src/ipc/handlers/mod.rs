pub mod activity;
pub mod badges;
pub mod core;
pub mod engine;
