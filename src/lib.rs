// HRM Bus Tracker: live reconciliation of the Halifax Transit vehicle feed
pub mod hbt_config;
pub mod hbt_controllers;
pub mod hbt_destinations;
pub mod hbt_engine;
pub mod hbt_feed;
pub mod hbt_filter;
pub mod hbt_models;
pub mod hbt_normalizer;
pub mod hbt_scheduler;
#[cfg(test)]
mod hbt_testing;
pub mod hbt_views;
