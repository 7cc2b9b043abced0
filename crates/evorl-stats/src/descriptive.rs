/// Descriptive statistics of a batch of `f64` values.
///
/// Non-finite values are ignored; `skipped` records how many there were.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveStats {
    /// Number of finite values summarized.
    pub count: usize,
    /// Number of non-finite values left out.
    pub skipped: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Upper median for even counts.
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl DescriptiveStats {
    /// Computes statistics from unsorted values.
    ///
    /// # Returns
    ///
    /// * `Some(DescriptiveStats)` - if at least one value is finite
    /// * `None` - otherwise
    ///
    /// # Examples
    ///
    /// ```
    /// # use evorl_stats::descriptive::DescriptiveStats;
    /// let stats = DescriptiveStats::new([5.0, 2.0, f64::NAN, 4.0, 1.0, 3.0]).unwrap();
    /// assert_eq!(stats.count, 5);
    /// assert_eq!(stats.skipped, 1);
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.median, 3.0);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut skipped = 0;
        let mut values = values
            .into_iter()
            .filter(|v| {
                let finite = v.is_finite();
                if !finite {
                    skipped += 1;
                }
                finite
            })
            .collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);

        let min = *values.first()?;
        let max = *values.last()?;
        let count = values.len();
        #[expect(clippy::cast_precision_loss)]
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let median = values[count / 2];
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            count,
            skipped,
            min,
            max,
            mean,
            median,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        assert_eq!(DescriptiveStats::new(Vec::<f64>::new()), None);
    }

    #[test]
    fn test_all_non_finite() {
        assert_eq!(DescriptiveStats::new([f64::NAN, f64::INFINITY]), None);
    }

    #[test]
    fn test_single_value() {
        let stats = DescriptiveStats::new([-7.5]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.min, -7.5);
        assert_eq!(stats.max, -7.5);
        assert_eq!(stats.median, -7.5);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_spread() {
        let stats = DescriptiveStats::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
        assert_eq!(stats.median, 5.0);
        assert_eq!(stats.skipped, 0);
    }
}
