pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod review;
pub mod scan;
pub mod ui;
