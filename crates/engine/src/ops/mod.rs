use std::sync::Arc;

use crate::{EngineConfig, EngineError, ResultEngine, store::Store};

mod budgets;
mod categories;
mod dashboard;
mod migrate;
mod resolve;
mod transactions;

pub use dashboard::{BreakdownEntry, ExpenseBreakdown, MonthlyTrend, Summary};
pub use migrate::{CreatedCategory, LegacyGroupReport, MigrationMode, MigrationReport};
pub use transactions::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT, TransactionQuery};

/// Entry point of every read and administrative operation.
///
/// Cheap to clone: all clones share the same store handle.
#[derive(Clone, Debug)]
pub struct Engine {
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn Store>>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Pass the required store
    pub fn store(mut self, store: Arc<dyn Store>) -> EngineBuilder {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> EngineBuilder {
        self.config = config;
        self
    }

    /// Construct `Engine`
    pub fn build(self) -> ResultEngine<Engine> {
        let store = self
            .store
            .ok_or_else(|| EngineError::InvalidConfig("missing store".to_string()))?;
        if self.config.dashboard.trend_months == 0 {
            return Err(EngineError::InvalidConfig(
                "dashboard.trend_months must be at least 1".to_string(),
            ));
        }
        Ok(Engine {
            store,
            config: self.config,
        })
    }
}
