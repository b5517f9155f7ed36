//! Per-age summary printed after generation

use crate::strata;
use crate::validator::SplitTotals;
use dgl_common::ManifestImage;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeSummary {
    pub age: u8,
    pub total: usize,
    pub splits: SplitTotals,
}

/// Counts per configured age, in ascending age order
///
/// Images of ages outside the strata are not counted.
pub fn summarize(images: &[ManifestImage]) -> Vec<AgeSummary> {
    let mut rows: Vec<AgeSummary> = strata::ages()
        .map(|age| AgeSummary {
            age,
            total: 0,
            splits: SplitTotals::default(),
        })
        .collect();

    for image in images {
        if let Some(row) = rows.iter_mut().find(|row| row.age == image.age) {
            row.total += 1;
            if let Some(split) = image.split {
                row.splits.add(split);
            }
        }
    }
    rows
}

pub fn render_summary(rows: &[AgeSummary]) -> String {
    let mut out = String::from("Manifest summary\n");
    for row in rows {
        let _ = writeln!(out, "age {}: total={}, {}", row.age, row.total, row.splits);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgl_common::Split;

    fn image(id: &str, age: u8, split: Split) -> ManifestImage {
        ManifestImage {
            id: id.to_string(),
            age,
            path: format!("/images/{}/{}.jpg", age, id),
            split: Some(split),
        }
    }

    #[test]
    fn test_summary_counts_by_age() {
        let images = vec![
            image("0001", 4, Split::Train),
            image("0002", 4, Split::Test),
            image("0003", 11, Split::Val),
            image("0004", 12, Split::Val),
        ];
        let rows = summarize(&images);
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].total, 2);
        assert_eq!(rows[0].splits.test, 1);
        assert_eq!(rows[7].splits.val, 1);

        let text = render_summary(&rows);
        assert!(text.starts_with("Manifest summary\nage 4: total=2, train=1, val=0, test=1\n"));
        assert!(text.contains("age 7: total=0, train=0, val=0, test=0\n"));
    }
}
