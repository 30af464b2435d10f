pub mod activity;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod grade;
pub mod ipc;
pub mod model;
pub mod orchestrator;
pub mod rules;
pub mod store;
