use std::collections::BTreeMap;

use logbook_contract::FieldDef;
use rayon::prelude::*;

use crate::record::Record;

/// A contiguous run of records printed on one page.
#[derive(Debug, Clone, Copy)]
pub struct PageGroup<'a> {
    /// 0-based page index.
    pub index: usize,
    /// Position of the first record in the whole sequence.
    pub start: usize,
    pub records: &'a [Record],
}

impl PageGroup<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Slices `records` into pages of `rows_per_page` (the last page may be short).
pub fn paginate(records: &[Record], rows_per_page: usize) -> Vec<PageGroup<'_>> {
    let rows = rows_per_page.max(1);
    records
        .chunks(rows)
        .enumerate()
        .map(|(index, chunk)| PageGroup {
            index,
            start: index * rows,
            records: chunk,
        })
        .collect()
}

/// Per-field integer sums: minutes for TIME fields, units for COUNT fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSums {
    values: BTreeMap<&'static str, i64>,
}

impl FieldSums {
    pub fn zeroed(fields: &[FieldDef]) -> Self {
        Self {
            values: fields.iter().map(|f| (f.name, 0)).collect(),
        }
    }

    pub fn get(&self, field: &str) -> i64 {
        self.values.get(field).copied().unwrap_or(0)
    }

    pub fn add(&mut self, field: &'static str, amount: i64) {
        let entry = self.values.entry(field).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn plus(&self, other: &FieldSums) -> FieldSums {
        let mut out = self.clone();
        for (field, amount) in &other.values {
            out.add(field, *amount);
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }
}

pub fn aggregate(group: &PageGroup<'_>, fields: &[FieldDef]) -> FieldSums {
    let mut sums = FieldSums::zeroed(fields);
    for record in group.records {
        for field in fields {
            sums.add(field.name, record.get(field.name).aggregate(field.kind));
        }
    }
    sums
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTotals {
    /// Sum of all earlier pages.
    pub carried_forward: FieldSums,
    pub this_page: FieldSums,
    /// `carried_forward + this_page`.
    pub running: FieldSums,
}

/// Left-to-right prefix scan over per-page sums.
pub fn running(page_sums: Vec<FieldSums>) -> Vec<PageTotals> {
    let mut out = Vec::with_capacity(page_sums.len());
    let mut carried = FieldSums::default();
    for this_page in page_sums {
        let running = carried.plus(&this_page);
        out.push(PageTotals {
            carried_forward: carried,
            this_page,
            running: running.clone(),
        });
        carried = running;
    }
    out
}

pub fn page_totals(groups: &[PageGroup<'_>], fields: &[FieldDef], parallel: bool) -> Vec<PageTotals> {
    let sums: Vec<FieldSums> = if parallel {
        groups.par_iter().map(|group| aggregate(group, fields)).collect()
    } else {
        groups.iter().map(|group| aggregate(group, fields)).collect()
    };
    running(sums)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logbook_contract::{FieldKind, aggregate_fields_v1};

    fn fields() -> Vec<FieldDef> {
        aggregate_fields_v1().copied().collect()
    }

    fn flights(n: usize, se: &str) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new()
                    .with("Fecha", format!("{:02}/01/2024", (i % 28) + 1))
                    .with("SE", se)
                    .with("Tiempo total de vuelo", se)
                    .with("Landings Día", "1")
            })
            .collect()
    }

    #[test]
    fn paginate_slices_in_order() {
        let records = flights(31, "1:00");
        let groups = paginate(&records, 14);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.iter().map(PageGroup::len).collect::<Vec<_>>(), vec![14, 14, 3]);
        assert_eq!(groups[2].start, 28);
        assert_eq!(groups[1].index, 1);
        assert!(std::ptr::eq(&groups[1].records[0], &records[14]));
        assert!(paginate(&[], 14).is_empty());
        assert_eq!(paginate(&records[..3], 0).len(), 3);
    }

    #[test]
    fn aggregate_counts_bad_cells_as_zero() {
        let records = vec![
            Record::new().with("SE", "1:30").with("Landings Noche", "2"),
            Record::new().with("SE", "--").with("Landings Noche", "x"),
            Record::new().with("SE", 0.5).with("Landings Noche", true),
        ];
        let groups = paginate(&records, 14);
        let sums = aggregate(&groups[0], &fields());
        assert_eq!(sums.get("SE"), 120);
        assert_eq!(sums.get("Landings Noche"), 3);
        assert_eq!(sums.get("IFR"), 0);
        assert_eq!(sums.iter().count(), 13);
    }

    #[test]
    fn fifteen_records_carry_forward_twenty_one_hours() {
        let records = flights(15, "1:30");
        let groups = paginate(&records, 14);
        let totals = page_totals(&groups, &fields(), false);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].this_page.get("SE"), 1260);
        assert_eq!(totals[0].carried_forward.get("SE"), 0);
        assert_eq!(totals[0].running.get("SE"), 1260);
        assert_eq!(totals[1].carried_forward.get("SE"), 1260);
        assert_eq!(totals[1].this_page.get("SE"), 90);
        assert_eq!(totals[1].running.get("SE"), 1350);
        assert_eq!(totals[1].running.get("Landings Día"), 15);
    }

    #[test]
    fn running_totals_satisfy_recurrence_and_match_whole_sum() {
        let mut records = Vec::new();
        for i in 0..47 {
            let minutes = (i * 37) % 200;
            records.push(
                Record::new()
                    .with("IFR", format!("{}:{:02}", minutes / 60, minutes % 60))
                    .with("Landings Día", (i % 4) as i64),
            );
        }
        let fields = fields();
        let groups = paginate(&records, 9);
        let totals = page_totals(&groups, &fields, false);
        for k in 1..totals.len() {
            assert_eq!(totals[k].carried_forward, totals[k - 1].running);
            assert_eq!(
                totals[k].running,
                totals[k - 1].running.plus(&totals[k].this_page)
            );
        }
        let whole: i64 = records
            .iter()
            .map(|r| r.get("IFR").aggregate(FieldKind::Time))
            .sum();
        let page_sum: i64 = totals.iter().map(|t| t.this_page.get("IFR")).sum();
        assert_eq!(page_sum, whole);
        assert_eq!(totals.last().map(|t| t.running.get("IFR")), Some(whole));
    }

    #[test]
    fn parallel_aggregation_matches_sequential() {
        let records = flights(100, "0:45");
        let groups = paginate(&records, 7);
        assert_eq!(
            page_totals(&groups, &fields(), true),
            page_totals(&groups, &fields(), false)
        );
    }
}
