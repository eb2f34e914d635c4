use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};

use super::model::FeatureValue;

// ---------------------------------------------------------------------------
// Category counts
// ---------------------------------------------------------------------------

/// One bar of a category chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

/// Count occurrences of each label, most frequent first.
///
/// Ties are broken by label so the order is stable across runs.
pub fn count_categories<S: AsRef<str>>(labels: &[S]) -> Vec<CategoryCount> {
    let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
    for label in labels {
        *tally.entry(label.as_ref()).or_default() += 1;
    }

    let mut counts: Vec<CategoryCount> = tally
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    // BTreeMap already yields labels ascending; a stable sort keeps that for ties.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Category counts for a loaded feature, or `None` if it is not a 1-D sequence.
pub fn feature_counts(value: &FeatureValue) -> Option<Vec<CategoryCount>> {
    value.labels().map(|labels| count_categories(labels.as_slice()))
}

/// Write counts as CSV with a `category,count` header.
pub fn write_counts_csv<W: Write>(writer: W, counts: &[CategoryCount]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["category", "count"])
        .context("writing CSV header")?;
    for c in counts {
        let count = c.count.to_string();
        csv.write_record([c.category.as_str(), count.as_str()])
            .with_context(|| format!("writing CSV row for '{}'", c.category))?;
    }
    csv.flush().context("flushing CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Scatter series
// ---------------------------------------------------------------------------

/// Points of an embedding split into named series by an optional label feature.
///
/// Labels shorter than the point list leave the remaining points unlabelled.
pub fn scatter_series(
    points: &[[f64; 2]],
    labels: Option<&[String]>,
) -> BTreeMap<String, Vec<[f64; 2]>> {
    let mut series: BTreeMap<String, Vec<[f64; 2]>> = BTreeMap::new();
    for (i, p) in points.iter().enumerate() {
        let name = labels
            .and_then(|l| l.get(i))
            .cloned()
            .unwrap_or_else(|| "points".to_string());
        series.entry(name).or_default().push(*p);
    }
    series
}
