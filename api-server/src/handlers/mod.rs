//! HTTP handlers

pub mod health;
pub mod upload;
pub mod alerts;
pub mod jobs;
