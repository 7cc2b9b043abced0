//! Summary statistics for rollout rewards.
//!
//! - [`descriptive`]: min / max / mean / median / standard deviation of a batch
//!
//! ```
//! use evorl_stats::descriptive::DescriptiveStats;
//!
//! let rewards = [12.0, 30.0, 18.0];
//! let stats = DescriptiveStats::new(rewards).unwrap();
//! assert_eq!(stats.max, 30.0);
//! assert_eq!(stats.mean, 20.0);
//! ```

pub mod descriptive;
