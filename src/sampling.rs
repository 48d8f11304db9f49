//! Small random-sampling helpers shared by the touch and timing generators

use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal};

/// Draw from a normal distribution; a non-positive spread yields `mean`
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return mean;
    }
    match Normal::new(mean, std_dev) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean,
    }
}

/// Gaussian draw truncated to `mean ± limit`
pub fn bounded_gaussian<R: Rng + ?Sized>(rng: &mut R, std_dev: f64, limit: f64) -> f64 {
    gaussian(rng, 0.0, std_dev).clamp(-limit, limit)
}

/// Draw from a log-normal distribution given its median and shape `sigma`
pub fn log_normal<R: Rng + ?Sized>(rng: &mut R, median: f64, sigma: f64) -> f64 {
    if median <= 0.0 || sigma <= 0.0 {
        return median;
    }
    match LogNormal::new(median.ln(), sigma) {
        Ok(distribution) => distribution.sample(rng),
        Err(_) => median,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_gaussian_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng, 5.0, 2.0)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;

        assert!((mean - 5.0).abs() < 0.1, "mean was {}", mean);
        assert!((var.sqrt() - 2.0).abs() < 0.1, "std dev was {}", var.sqrt());
    }

    #[test]
    fn test_bounded_gaussian_respects_limit() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..5_000 {
            let v = bounded_gaussian(&mut rng, 10.0, 3.0);
            assert!((-3.0..=3.0).contains(&v));
        }
    }

    #[test]
    fn test_log_normal_median() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut samples: Vec<f64> = (0..20_001).map(|_| log_normal(&mut rng, 1.2, 0.5)).collect();
        samples.sort_by(|a, b| a.total_cmp(b));
        let median = samples[samples.len() / 2];
        assert!((median - 1.2).abs() < 0.05, "median was {}", median);
    }

    #[test]
    fn test_degenerate_spread_returns_centre() {
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(gaussian(&mut rng, 3.0, 0.0), 3.0);
        assert_eq!(gaussian(&mut rng, 3.0, f64::NAN), 3.0);
        assert_eq!(log_normal(&mut rng, 2.0, 0.0), 2.0);
    }

    #[test]
    fn test_log_normal_is_positive() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..5_000 {
            assert!(log_normal(&mut rng, 1.2, 0.5) > 0.0);
        }
    }
}
