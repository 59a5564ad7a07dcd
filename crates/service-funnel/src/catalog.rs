/// Load-once index of the service catalog.
///
/// Records are grouped by category and kept in file order, both across categories
/// and within a category. That order is the tie-break for every lookup the funnel
/// performs, so nothing here ever sorts.
use std::collections::HashMap;

use crate::error::AppError;
use crate::model::{Category, ServiceRecord};
use crate::parser::{split_funnel, CatalogRow};

#[derive(Debug)]
struct CategoryEntry {
    category_id: i64,
    records: Vec<ServiceRecord>,
}

#[derive(Debug, Default)]
pub struct CatalogIndex {
    entries: Vec<CategoryEntry>,
    by_id: HashMap<i64, usize>,
    record_count: usize,
}

impl CatalogIndex {
    /// Group `rows` by category. Fails on the first row with a blank or
    /// malformed question funnel.
    pub fn build(rows: impl IntoIterator<Item = CatalogRow>) -> Result<Self, AppError> {
        let mut index = CatalogIndex::default();

        for (idx, row) in rows.into_iter().enumerate() {
            let raw = row.question_funnel.as_deref().unwrap_or("");
            let question_path = split_funnel(raw).ok_or_else(|| AppError::Parse {
                row: idx + 1,
                message: format!(
                    "service {} has an empty or malformed question funnel",
                    row.service_id
                ),
            })?;

            let record = ServiceRecord {
                category_id: row.category_id,
                category_name: row.category_name,
                service_id: row.service_id,
                question_path,
            };

            let slot = match index.by_id.get(&record.category_id) {
                Some(&slot) => slot,
                None => {
                    index.entries.push(CategoryEntry {
                        category_id: record.category_id,
                        records: Vec::new(),
                    });
                    let slot = index.entries.len() - 1;
                    index.by_id.insert(record.category_id, slot);
                    slot
                }
            };
            index.entries[slot].records.push(record);
            index.record_count += 1;
        }

        Ok(index)
    }

    /// Records for a category in catalog order. Empty for unknown categories.
    pub fn records_for(&self, category_id: i64) -> &[ServiceRecord] {
        self.by_id
            .get(&category_id)
            .map(|&slot| self.entries[slot].records.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, category_id: i64) -> bool {
        !self.records_for(category_id).is_empty()
    }

    /// First token of the first record's path.
    pub fn first_question(&self, category_id: i64) -> Result<&str, AppError> {
        self.first_record(category_id)?
            .question_path
            .first()
            .map(String::as_str)
            .ok_or_else(|| category_not_found(category_id))
    }

    /// Name carried by the category's first record.
    pub fn category_name(&self, category_id: i64) -> Result<&str, AppError> {
        Ok(self.first_record(category_id)?.category_name.as_str())
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<Category> {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry.records.first().map(|r| Category {
                    category_id: entry.category_id,
                    category_name: r.category_name.clone(),
                })
            })
            .collect()
    }

    pub fn category_count(&self) -> usize {
        self.entries.len()
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    fn first_record(&self, category_id: i64) -> Result<&ServiceRecord, AppError> {
        self.records_for(category_id)
            .first()
            .ok_or_else(|| category_not_found(category_id))
    }
}

fn category_not_found(category_id: i64) -> AppError {
    AppError::NotFound(format!("Category not found: {category_id}"))
}


#[cfg(test)]
mod tests {
    use super::fixtures::{plumbing_catalog, row};
    use super::*;

    #[test]
    fn groups_preserving_first_seen_order() {
        let index = CatalogIndex::build(vec![
            row(5, "Electrical", 50, "outlet > install"),
            row(1, "Plumbing", 10, "type > leak > faucet"),
            row(5, "Electrical", 51, "panel > upgrade"),
            row(1, "Plumbing", 11, "type > leak > pipe"),
        ])
        .unwrap();

        let ids: Vec<i64> = index.categories().iter().map(|c| c.category_id).collect();
        assert_eq!(ids, vec![5, 1]);

        let services: Vec<i64> = index.records_for(5).iter().map(|r| r.service_id).collect();
        assert_eq!(services, vec![50, 51]);
        assert_eq!(index.category_count(), 2);
        assert_eq!(index.record_count(), 4);
    }

    #[test]
    fn first_question_and_name_come_from_first_record() {
        let index = plumbing_catalog();
        assert_eq!(index.first_question(1).unwrap(), "type");
        assert_eq!(index.first_question(2).unwrap(), "material");
        assert_eq!(index.category_name(2).unwrap(), "Roofing");
    }

    #[test]
    fn unknown_category_is_not_found() {
        let index = plumbing_catalog();
        assert!(index.records_for(99).is_empty());
        assert!(!index.contains(99));
        assert!(matches!(index.first_question(99), Err(AppError::NotFound(_))));
        assert!(matches!(index.category_name(99), Err(AppError::NotFound(_))));
    }

    #[test]
    fn empty_funnel_fails_build_with_row_number() {
        let mut bad = row(1, "Plumbing", 12, "");
        bad.question_funnel = None;
        let err = CatalogIndex::build(vec![row(1, "Plumbing", 10, "type > leak"), bad]).unwrap_err();
        match err {
            AppError::Parse { row, message } => {
                assert_eq!(row, 2);
                assert!(message.contains("12"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }

        let blank = CatalogIndex::build(vec![row(1, "Plumbing", 10, "  ")]);
        assert!(matches!(blank, Err(AppError::Parse { row: 1, .. })));
    }

    #[test]
    fn empty_catalog_has_no_categories() {
        let index = CatalogIndex::build(Vec::new()).unwrap();
        assert!(index.categories().is_empty());
        assert_eq!(index.record_count(), 0);
    }
}
