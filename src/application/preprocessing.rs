//! Robust feature scaling.
//!
//! Each column is centered on its median and divided by its interquartile
//! range (25th to 75th percentile). Percentiles use linear interpolation
//! between closest ranks, so values line up with scalers fit elsewhere on the
//! same data. Columns with a zero IQR keep a scale of 1.

use ndarray::{Array1, Array2, ArrayView1, Axis};

const LOWER_QUANTILE: f64 = 0.25;
const UPPER_QUANTILE: f64 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub struct RobustScaler {
    center: Array1<f32>,
    scale: Array1<f32>,
}

impl RobustScaler {
    /// Fit median and IQR per column.
    pub fn fit(data: &Array2<f32>) -> Self {
        let columns = data.ncols();
        let mut center = Array1::<f32>::zeros(columns);
        let mut scale = Array1::<f32>::ones(columns);

        for (idx, column) in data.axis_iter(Axis(1)).enumerate() {
            let sorted = sorted_finite(column);
            if sorted.is_empty() {
                continue;
            }
            center[idx] = quantile(&sorted, 0.5) as f32;
            let iqr = quantile(&sorted, UPPER_QUANTILE) - quantile(&sorted, LOWER_QUANTILE);
            if iqr.abs() > f64::EPSILON {
                scale[idx] = iqr as f32;
            }
        }

        Self { center, scale }
    }

    pub fn transform(&self, data: &Array2<f32>) -> Array2<f32> {
        let mut scaled = data.clone();
        for mut row in scaled.axis_iter_mut(Axis(0)) {
            row -= &self.center;
            row /= &self.scale;
        }
        scaled
    }

    pub fn fit_transform(data: &Array2<f32>) -> Array2<f32> {
        Self::fit(data).transform(data)
    }

    pub fn center(&self) -> &Array1<f32> {
        &self.center
    }

    pub fn scale(&self) -> &Array1<f32> {
        &self.scale
    }
}

fn sorted_finite(column: ArrayView1<'_, f32>) -> Vec<f64> {
    let mut values: Vec<f64> = column
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| f64::from(*v))
        .collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Linear-interpolated quantile of an already sorted, non-empty slice
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 0.25), 1.75);
        assert_eq!(quantile(&sorted, 0.75), 3.25);
        assert_eq!(quantile(&[7.0], 0.25), 7.0);
    }

    #[test]
    fn test_fit_median_and_iqr() {
        let data = array![[1.0f32, 10.0], [2.0, 10.0], [3.0, 10.0], [4.0, 10.0], [5.0, 10.0]];
        let scaler = RobustScaler::fit(&data);

        assert_eq!(scaler.center().to_vec(), vec![3.0, 10.0]);
        // IQR of 1..5 is 4 - 2 = 2; constant column keeps unit scale
        assert_eq!(scaler.scale().to_vec(), vec![2.0, 1.0]);
    }

    #[test]
    fn test_transform_centers_on_median() {
        let data = array![[1.0f32], [2.0], [3.0], [4.0], [5.0]];
        let scaled = RobustScaler::fit_transform(&data);
        assert_eq!(
            scaled.column(0).to_vec(),
            vec![-1.0, -0.5, 0.0, 0.5, 1.0]
        );
    }

    #[test]
    fn test_single_row_batch() {
        let data = array![[3.5f32, -2.0]];
        let scaled = RobustScaler::fit_transform(&data);
        assert!(scaled.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_outlier_does_not_move_scale() {
        let calm = array![[1.0f32], [2.0], [3.0], [4.0], [5.0]];
        let spiky = array![[1.0f32], [2.0], [3.0], [4.0], [5000.0]];
        assert_eq!(
            RobustScaler::fit(&calm).scale(),
            RobustScaler::fit(&spiky).scale()
        );
    }
}
