//! One-shot consolidation of category references.
//!
//! Phase A turns serialized wrappers and id-shaped labels into canonical ids.
//! Phase B groups the remaining free-text labels by their normalized form,
//! finds or creates one category per group and points every variant at it.
//! Running it twice in `Apply` mode changes nothing the second time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    Category, CategoryRef, EngineError, ObjectId, ResultEngine, Transaction,
    store::{
        BulkWriteOutcome, CategoryFilter, CategoryUpdate, GroupKey, Grouping, TransactionFilter,
    },
    util::normalize_label,
};

use super::Engine;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
    /// Compute and report, write nothing.
    #[default]
    Dry,
    Apply,
}

impl MigrationMode {
    pub fn is_dry(self) -> bool {
        self == Self::Dry
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedCategory {
    pub id: ObjectId,
    pub name: String,
}

/// Outcome of one legacy label group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyGroupReport {
    /// Normalized label shared by every variant.
    pub key: String,
    /// Representative variant.
    pub example: String,
    pub variants: Vec<String>,
    pub occurrences: u64,
    /// Target category; a `DRY_` placeholder for categories a dry run would
    /// create, `None` when the group is cleared or failed.
    pub category_id: Option<String>,
    pub matched_existing: bool,
    /// Transactions rewritten, or that would be rewritten in a dry run.
    pub transactions: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub mode: MigrationMode,
    pub wrapper_objects_found: u64,
    pub wrapper_objects_converted: u64,
    /// Non-string, non-object category values; left untouched.
    pub unsupported_values_found: u64,
    pub id_strings_found: u64,
    pub id_strings_converted: u64,
    pub legacy_groups_found: u64,
    pub categories_created: Vec<CreatedCategory>,
    pub transactions_updated: u64,
    pub groups: Vec<LegacyGroupReport>,
    pub errors: Vec<String>,
}

impl MigrationReport {
    fn new(mode: MigrationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Records a non-fatal failure; store outages abort the run instead.
    fn absorb(&mut self, context: &str, err: EngineError) -> ResultEngine<()> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(context, error = %err, "category migration step failed");
        self.errors.push(format!("{context}: {err}"));
        Ok(())
    }

    /// Records one error per rejected document; returns the rewritten count.
    fn absorb_outcome(&mut self, context: &str, outcome: BulkWriteOutcome) -> ResultEngine<u64> {
        for failure in outcome.failures {
            let context = format!("{context}transaction {}", failure.transaction_id);
            self.absorb(&context, EngineError::WriteFailed(failure.message))?;
        }
        Ok(outcome.modified)
    }
}

struct Variant {
    label: String,
    count: u64,
}

impl Engine {
    pub async fn migrate_categories(&self, mode: MigrationMode) -> ResultEngine<MigrationReport> {
        let mut report = MigrationReport::new(mode);
        info!(dry_run = mode.is_dry(), "category migration started");

        self.convert_serialized(&mut report).await?;
        self.convert_id_strings(&mut report).await?;
        self.consolidate_labels(&mut report).await?;

        info!(
            dry_run = mode.is_dry(),
            wrappers = report.wrapper_objects_converted,
            id_strings = report.id_strings_converted,
            groups = report.legacy_groups_found,
            created = report.categories_created.len(),
            updated = report.transactions_updated,
            errors = report.errors.len(),
            "category migration finished"
        );
        Ok(report)
    }

    async fn convert_serialized(&self, report: &mut MigrationReport) -> ResultEngine<()> {
        let filter = TransactionFilter::default().category(CategoryFilter::Serialized);
        let (found, unsupported): (Vec<Transaction>, Vec<Transaction>) = self
            .store
            .find_transactions(&filter, None)
            .await?
            .into_iter()
            .partition(|tx| {
                matches!(&tx.category, CategoryRef::Serialized(value) if value.is_object())
            });
        report.wrapper_objects_found = found.len() as u64;
        report.unsupported_values_found = unsupported.len() as u64;
        if !unsupported.is_empty() {
            warn!(
                count = unsupported.len(),
                "category values that are neither labels nor wrappers left as is"
            );
        }

        let updates = canonical_updates(found, report);
        report.wrapper_objects_converted = self.write_updates(updates, report).await?;
        info!(
            dry_run = report.mode.is_dry(),
            found = report.wrapper_objects_found,
            converted = report.wrapper_objects_converted,
            "serialized category references"
        );
        Ok(())
    }

    async fn convert_id_strings(&self, report: &mut MigrationReport) -> ResultEngine<()> {
        let filter = TransactionFilter::default().category(CategoryFilter::Text);
        let found: Vec<Transaction> = self
            .store
            .find_transactions(&filter, None)
            .await?
            .into_iter()
            .filter(|tx| tx.category.normalize().is_some())
            .collect();
        report.id_strings_found = found.len() as u64;

        let updates = canonical_updates(found, report);
        report.id_strings_converted = self.write_updates(updates, report).await?;
        info!(
            dry_run = report.mode.is_dry(),
            found = report.id_strings_found,
            converted = report.id_strings_converted,
            "id-shaped category labels"
        );
        Ok(())
    }

    /// One unordered bulk write; returns the converted count.
    async fn write_updates(
        &self,
        updates: Vec<CategoryUpdate>,
        report: &mut MigrationReport,
    ) -> ResultEngine<u64> {
        if report.mode.is_dry() || updates.is_empty() {
            return Ok(updates.len() as u64);
        }
        let outcome = self.store.bulk_update_category(updates).await?;
        report.absorb_outcome("", outcome)
    }

    /// Points every transaction selected by `filter` at `category`.
    async fn rewrite_group(
        &self,
        group: &LegacyGroupReport,
        filter: &TransactionFilter,
        category: CategoryRef,
        report: &mut MigrationReport,
    ) -> ResultEngine<u64> {
        let outcome = self.store.update_category_many(filter, category).await?;
        let context = format!("legacy group \"{}\": ", group.example);
        report.absorb_outcome(&context, outcome)
    }

    async fn consolidate_labels(&self, report: &mut MigrationReport) -> ResultEngine<()> {
        let filter = TransactionFilter::default().category(CategoryFilter::Text);
        let rows = self.store.aggregate(&filter, Grouping::Category).await?;

        let mut groups: BTreeMap<String, Vec<Variant>> = BTreeMap::new();
        for row in rows {
            let GroupKey::Category(CategoryRef::Text(label)) = row.key else {
                continue;
            };
            if ObjectId::parse(label.trim()).is_some() {
                continue;
            }
            groups
                .entry(normalize_label(&label))
                .or_default()
                .push(Variant {
                    label,
                    count: row.count,
                });
        }
        report.legacy_groups_found = groups.len() as u64;

        for (key, variants) in groups {
            let mut group = legacy_group(key, variants);
            if let Err(err) = self.consolidate_group(&mut group, report).await {
                let context = format!("legacy group \"{}\"", group.example);
                report.absorb(&context, err)?;
            }
            report.transactions_updated += group.transactions;
            report.groups.push(group);
        }
        info!(
            dry_run = report.mode.is_dry(),
            groups = report.legacy_groups_found,
            created = report.categories_created.len(),
            updated = report.transactions_updated,
            "legacy category labels"
        );
        Ok(())
    }

    async fn consolidate_group(
        &self,
        group: &mut LegacyGroupReport,
        report: &mut MigrationReport,
    ) -> ResultEngine<()> {
        let filter = TransactionFilter::default()
            .category(CategoryFilter::TextIn(group.variants.clone()));
        let dry_run = report.mode.is_dry();

        // Blank labels carry no name to build a category from.
        if group.key.is_empty() {
            group.transactions = if dry_run {
                self.store.count_transactions(&filter).await?
            } else {
                self.rewrite_group(group, &filter, CategoryRef::Null, report)
                    .await?
            };
            return Ok(());
        }

        let target = match self.match_category(&group.key).await? {
            Some(existing) => {
                group.matched_existing = true;
                Some(existing.id)
            }
            None if dry_run => None,
            None => Some(self.create_legacy_category(&group.example, report).await?),
        };

        match target {
            Some(id) => {
                group.category_id = Some(id.to_string());
                group.transactions = if dry_run {
                    self.store.count_transactions(&filter).await?
                } else {
                    self.rewrite_group(group, &filter, CategoryRef::Id(id), report)
                        .await?
                };
            }
            None => {
                let placeholder = format!(
                    "{}{}",
                    self.config.migration.dry_run_prefix,
                    group.example.trim()
                );
                info!(
                    dry_run,
                    key = %group.key,
                    category = %placeholder,
                    "would create category"
                );
                group.category_id = Some(placeholder);
                group.transactions = self.store.count_transactions(&filter).await?;
            }
        }
        Ok(())
    }

    async fn create_legacy_category(
        &self,
        label: &str,
        report: &mut MigrationReport,
    ) -> ResultEngine<ObjectId> {
        let defaults = &self.config.migration;
        let category = Category::new(
            label.trim().to_string(),
            defaults.kind,
            defaults.icon.clone(),
            defaults.color.clone(),
        );
        let created = self.store.insert_category(category).await?;
        info!(id = %created.id, name = %created.name, "category created");
        report.categories_created.push(CreatedCategory {
            id: created.id,
            name: created.name,
        });
        Ok(created.id)
    }
}

/// Pairs each convertible transaction with its canonical id; the rest are
/// reported.
fn canonical_updates(
    found: Vec<Transaction>,
    report: &mut MigrationReport,
) -> Vec<CategoryUpdate> {
    let mut updates = Vec::with_capacity(found.len());
    for tx in found {
        match tx.category.normalize() {
            Some(id) => updates.push(CategoryUpdate {
                transaction_id: tx.id,
                category: CategoryRef::Id(id),
            }),
            None => {
                warn!(transaction = %tx.id, category = %tx.category.to_json(), "unconvertible category");
                report.errors.push(format!(
                    "transaction {}: unconvertible category {}",
                    tx.id,
                    tx.category.to_json()
                ));
            }
        }
    }
    updates
}

/// Builds the group entry, choosing the most frequent variant as
/// representative (ties: shortest, then smallest).
fn legacy_group(key: String, mut variants: Vec<Variant>) -> LegacyGroupReport {
    variants.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.label.len().cmp(&b.label.len()))
            .then_with(|| a.label.cmp(&b.label))
    });
    let occurrences = variants.iter().map(|variant| variant.count).sum();
    let labels: Vec<String> = variants.into_iter().map(|variant| variant.label).collect();
    LegacyGroupReport {
        key,
        example: labels.first().cloned().unwrap_or_default(),
        variants: labels,
        occurrences,
        category_id: None,
        matched_existing: false,
        transactions: 0,
    }
}
