//! Small robust-statistics helpers shared by the estimator, the weight
//! controller's outlier check and the escalation SLA.
//!
//! All helpers ignore non-finite samples and return `None` on empty input.

fn finite_sorted(samples: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = samples.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

/// Median; even-length input averages the two middle values.
pub fn median(samples: &[f64]) -> Option<f64> {
    let v = finite_sorted(samples);
    if v.is_empty() {
        return None;
    }
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Median absolute deviation around `center`.
pub fn mad(samples: &[f64], center: f64) -> Option<f64> {
    let deviations: Vec<f64> = samples
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - center).abs())
        .collect();
    median(&deviations)
}

pub fn mean(samples: &[f64]) -> Option<f64> {
    let v: Vec<f64> = samples.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        None
    } else {
        Some(v.iter().sum::<f64>() / v.len() as f64)
    }
}

/// Percentile `p` in [0,1] with linear interpolation between closest ranks.
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    let v = finite_sorted(samples);
    if v.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 1.0) * (v.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(v[lower] + (v[upper] - v[lower]) * frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_mad_ignores_nan() {
        let samples = [1.0, 2.0, f64::NAN, 3.0, 4.0, 100.0];
        let m = median(&samples).unwrap();
        assert_eq!(m, 3.0);
        assert_eq!(mad(&samples, m), Some(1.0));
    }

    #[test]
    fn test_percentile_interpolates() {
        let samples = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&samples, 0.75), Some(40.0));
        assert_eq!(percentile(&[10.0, 20.0], 0.75), Some(17.5));
        assert_eq!(percentile(&[7.0], 0.75), Some(7.0));
    }
}
