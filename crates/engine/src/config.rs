//! Engine configuration.
//!
//! Every default the engine applies lives here and is handed to
//! [`Engine::builder`](crate::Engine::builder) at construction time. All
//! sections deserialize with defaults, so a partial config file is fine.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::CategoryKind;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub categories: CategoryDefaults,
    pub migration: MigrationDefaults,
    pub dashboard: DashboardConfig,
}

/// Defaults for categories created explicitly without icon or color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryDefaults {
    pub icon: String,
    pub color: String,
}

impl Default for CategoryDefaults {
    fn default() -> Self {
        Self {
            icon: "💰".to_string(),
            color: "#00C49F".to_string(),
        }
    }
}

/// Defaults for categories the migration creates from legacy labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationDefaults {
    pub kind: CategoryKind,
    pub icon: String,
    pub color: String,
    /// Prefix of the placeholder ids reported by dry runs.
    pub dry_run_prefix: String,
}

impl Default for MigrationDefaults {
    fn default() -> Self {
        Self {
            kind: CategoryKind::Expense,
            icon: "💸".to_string(),
            color: "#FF8042".to_string(),
            dry_run_prefix: "DRY_".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Length of the rolling summary window, in days.
    pub window_days: u32,
    /// Number of calendar months in the trend, current month included.
    pub trend_months: u32,
    /// Timezone used to assign transactions to calendar months.
    pub timezone: Tz,
    /// Label of the breakdown entry collecting unresolvable categories.
    pub fallback_name: String,
    pub fallback_icon: String,
    pub fallback_color: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            trend_months: 12,
            timezone: Tz::UTC,
            fallback_name: "Other".to_string(),
            fallback_icon: "💰".to_string(),
            fallback_color: "#00C49F".to_string(),
        }
    }
}
