//! Alert query models

use serde::Deserialize;

use flowguard_core::constants::DEFAULT_ALERT_LIMIT;

#[derive(Debug, Deserialize, Default)]
pub struct AlertQuery {
    pub limit: Option<i64>,
}

impl AlertQuery {
    /// Requested window; negative means none
    pub fn limit(&self) -> usize {
        match self.limit {
            Some(n) if n < 0 => 0,
            Some(n) => n as usize,
            None => DEFAULT_ALERT_LIMIT,
        }
    }
}
