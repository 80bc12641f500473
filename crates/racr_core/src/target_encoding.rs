//! Out-of-fold target encoding for high-cardinality categoricals
//!
//! Training rows never see their own label: each fold is encoded with
//! per-category means computed from the remaining folds. The table shipped
//! with the model is fitted on the full training set and applied unchanged
//! to test and inference rows.

use crate::deterministic::LcgRng;
use crate::errors::EncodingError;
use crate::features::LapFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Fitted category → mean-target mapping with a fallback for unseen values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEncoding {
    pub category: String,
    pub means: BTreeMap<String, f64>,
    pub global_mean: f64,
}

impl TargetEncoding {
    /// Encoded value for `value`; unseen categories get the global mean
    pub fn encode(&self, value: &str) -> f64 {
        self.means.get(value).copied().unwrap_or(self.global_mean)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.means.contains_key(value)
    }

    /// Name of the encoded column produced for this category
    pub fn column(&self) -> String {
        encoded_column(&self.category)
    }
}

/// `track` → `track_te`
pub fn encoded_column(category: &str) -> String {
    format!("{category}_te")
}

/// Fold index for every row, k-fold style.
///
/// The first `rows % folds` folds receive one extra row. Without a shuffle
/// seed folds are contiguous in row order.
pub fn fold_assignments(
    rows: usize,
    folds: usize,
    shuffle_seed: Option<u64>,
) -> Result<Vec<usize>, EncodingError> {
    if folds < 2 {
        return Err(EncodingError::InvalidFoldCount(folds));
    }
    if rows < folds {
        return Err(EncodingError::TooFewRows { folds, rows });
    }

    let mut order: Vec<usize> = (0..rows).collect();
    if let Some(seed) = shuffle_seed {
        LcgRng::new(seed).shuffle(&mut order);
    }

    let base = rows / folds;
    let extra = rows % folds;
    let mut assignment = vec![0; rows];
    let mut cursor = 0;
    for fold in 0..folds {
        let size = base + usize::from(fold < extra);
        for &row in &order[cursor..cursor + size] {
            assignment[row] = fold;
        }
        cursor += size;
    }
    Ok(assignment)
}

#[derive(Default, Clone, Copy)]
struct Acc {
    sum: f64,
    count: usize,
}

impl Acc {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn columns<'a>(
    frame: &'a LapFrame,
    category_col: &str,
    target_col: &str,
) -> Result<(&'a [String], &'a [f64]), EncodingError> {
    let categories = frame
        .categorical(category_col)
        .ok_or_else(|| EncodingError::MissingCategory(category_col.to_string()))?;
    let target = frame
        .numeric(target_col)
        .ok_or_else(|| EncodingError::MissingTarget(target_col.to_string()))?;
    if target.iter().any(|t| !t.is_finite()) {
        return Err(EncodingError::MissingTargetValues(target_col.to_string()));
    }
    Ok((categories, target))
}

/// Fit the encoding on `frame` and write its out-of-fold column.
///
/// Rows of fold `f` are encoded with means over rows outside `f`. A
/// category absent from those rows falls back to the mean target of the
/// rows outside `f`. Returns the production table fitted on every row.
pub fn fit_target_encoding(
    frame: &mut LapFrame,
    category_col: &str,
    target_col: &str,
    fold_count: usize,
    shuffle_seed: Option<u64>,
) -> Result<TargetEncoding, EncodingError> {
    let (oof, encoding) = {
        let (categories, target) = columns(frame, category_col, target_col)?;
        let folds = fold_assignments(frame.len(), fold_count, shuffle_seed)?;

        // per fold and per (fold, category) sums; "outside f" is total minus f
        let mut total = Acc::default();
        let mut per_category: BTreeMap<&str, Acc> = BTreeMap::new();
        let mut per_fold = vec![Acc::default(); fold_count];
        let mut per_fold_category: Vec<BTreeMap<&str, Acc>> = vec![BTreeMap::new(); fold_count];

        for ((category, &y), &fold) in categories.iter().zip(target).zip(&folds) {
            total.add(y);
            per_category.entry(category).or_default().add(y);
            per_fold[fold].add(y);
            per_fold_category[fold].entry(category).or_default().add(y);
        }

        let outside = |whole: Acc, part: Acc| Acc {
            sum: whole.sum - part.sum,
            count: whole.count - part.count,
        };

        let oof: Vec<f64> = categories
            .iter()
            .zip(&folds)
            .map(|(category, &fold)| {
                let rest = outside(total, per_fold[fold]);
                let in_fold = per_fold_category[fold]
                    .get(category.as_str())
                    .copied()
                    .unwrap_or_default();
                let rest_category = outside(per_category[category.as_str()], in_fold);
                rest_category
                    .mean()
                    .or_else(|| rest.mean())
                    .unwrap_or(f64::NAN)
            })
            .collect();

        let encoding = TargetEncoding {
            category: category_col.to_string(),
            means: per_category
                .iter()
                .filter_map(|(k, acc)| acc.mean().map(|m| (k.to_string(), m)))
                .collect(),
            global_mean: total.mean().unwrap_or(f64::NAN),
        };
        (oof, encoding)
    };
    debug!(
        categories = encoding.means.len(),
        global_mean = encoding.global_mean,
        "fitted {category_col} target encoding over {fold_count} folds"
    );

    frame.insert_numeric(encoding.column(), oof);
    Ok(encoding)
}

/// Encode `frame`'s category column with a fitted table.
///
/// Categories missing from the table receive the table's global mean.
pub fn apply_target_encoding(
    frame: &mut LapFrame,
    encoding: &TargetEncoding,
    category_col: &str,
) -> Result<(), EncodingError> {
    let encoded = frame
        .categorical(category_col)
        .ok_or_else(|| EncodingError::MissingCategory(category_col.to_string()))?
        .iter()
        .map(|c| encoding.encode(c))
        .collect();
    frame.insert_numeric(encoded_column(category_col), encoded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(categories: &[&str], targets: &[f64]) -> LapFrame {
        let mut frame = LapFrame::new(vec!["r".to_string(); categories.len()]);
        frame.insert_categorical("track", categories.iter().map(|s| s.to_string()).collect());
        frame.insert_numeric("y", targets.to_vec());
        frame
    }

    #[test]
    fn folds_follow_kfold_sizes() {
        let folds = fold_assignments(7, 3, None).unwrap();
        assert_eq!(folds, vec![0, 0, 0, 1, 1, 2, 2]);

        let shuffled = fold_assignments(7, 3, Some(5)).unwrap();
        let mut sizes = [0; 3];
        shuffled.iter().for_each(|&f| sizes[f] += 1);
        assert_eq!(sizes, [3, 2, 2]);
    }

    #[test]
    fn rejects_bad_fold_counts() {
        assert_eq!(
            fold_assignments(10, 1, None),
            Err(EncodingError::InvalidFoldCount(1))
        );
        assert_eq!(
            fold_assignments(3, 5, None),
            Err(EncodingError::TooFewRows { folds: 5, rows: 3 })
        );
    }

    #[test]
    fn row_never_sees_its_own_label() {
        // five folds of one row each; A appears in folds 0-3 only
        let mut f = frame(&["A", "A", "A", "A", "B"], &[10.0, 20.0, 30.0, 40.0, 100.0]);
        let table = fit_target_encoding(&mut f, "track", "y", 5, None).unwrap();
        let oof = f.numeric("track_te").unwrap();

        assert_eq!(oof[0], 30.0);
        assert_eq!(oof[1], (10.0 + 30.0 + 40.0) / 3.0);
        assert_eq!(oof[3], 20.0);
        // B only lives in fold 4: falls back to the mean of folds 0-3
        assert_eq!(oof[4], 25.0);

        assert_eq!(table.means["A"], 25.0);
        assert_eq!(table.means["B"], 100.0);
        assert_eq!(table.global_mean, 40.0);
    }

    #[test]
    fn every_absent_category_gets_the_same_fallback() {
        let mut f = frame(
            &["A", "A", "B", "C", "A", "A"],
            &[1.0, 1.0, 50.0, 70.0, 3.0, 3.0],
        );
        fit_target_encoding(&mut f, "track", "y", 3, None).unwrap();
        let oof = f.numeric("track_te").unwrap();
        // fold 1 holds B and C, neither appears elsewhere
        assert_eq!(oof[2], 2.0);
        assert_eq!(oof[3], 2.0);
    }

    #[test]
    fn apply_uses_global_mean_for_unseen_values() {
        let table = TargetEncoding {
            category: "track".into(),
            means: BTreeMap::from([("A".to_string(), 90.0)]),
            global_mean: 85.0,
        };
        let mut f = frame(&["A", "Z"], &[0.0, 0.0]);
        apply_target_encoding(&mut f, &table, "track").unwrap();
        assert_eq!(f.numeric("track_te").unwrap(), &[90.0, 85.0]);
    }

    #[test]
    fn missing_columns_and_labels_are_errors() {
        let mut f = frame(&["A", "B"], &[1.0, f64::NAN]);
        assert_eq!(
            fit_target_encoding(&mut f, "track", "y", 2, None),
            Err(EncodingError::MissingTargetValues("y".into()))
        );
        assert_eq!(
            fit_target_encoding(&mut f, "compound", "y", 2, None),
            Err(EncodingError::MissingCategory("compound".into()))
        );
    }
}
