//! Configuration for simkern simulation kernels
//!
//! This module provides the configuration types controlling how a kernel
//! instance runs, from time resolution and limits to the partitioning of a
//! distributed run.

use crate::core::errors::SimError;
use crate::core::fes::FesKind;
use crate::core::time::TimeValue;
use serde::{Deserialize, Serialize};

/// Enumeration of supported event schedulers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SchedulerKind {
    /// Take events from the future event set as fast as possible
    Sequential,
    /// Pace events against the wall clock; `speed` > 1 runs faster than real time
    RealTime { speed: f64 },
}

impl Default for SchedulerKind {
    fn default() -> Self {
        SchedulerKind::Sequential
    }
}

/// Assignment of the components matching `pattern` to a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionAssignment {
    pub pattern: String,
    pub partition: u32,
}

/// Settings of a partitioned (distributed) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsimConfig {
    pub partition_id: u32,
    pub num_partitions: u32,
    /// Minimum delay of any connection crossing partitions; must be positive
    pub lookahead: TimeValue,
    /// First matching assignment wins
    pub partition_map: Vec<PartitionAssignment>,
}

impl ParsimConfig {
    /// Create a new partition setting for `partition_id` out of `num_partitions`
    pub fn new(partition_id: u32, num_partitions: u32, lookahead: TimeValue) -> Self {
        Self {
            partition_id,
            num_partitions,
            lookahead,
            partition_map: Vec::new(),
        }
    }

    /// Place the components whose full path matches `pattern` on `partition`
    pub fn assign(mut self, pattern: &str, partition: u32) -> Self {
        self.partition_map.push(PartitionAssignment {
            pattern: pattern.to_string(),
            partition,
        });
        self
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.num_partitions == 0 || self.partition_id >= self.num_partitions {
            return Err(SimError::Config(format!(
                "partition id {} out of range for {} partitions",
                self.partition_id, self.num_partitions
            )));
        }
        if self.lookahead <= TimeValue::ZERO {
            return Err(SimError::Config(
                "lookahead must be positive for the null message protocol".to_string(),
            ));
        }
        if let Some(a) = self
            .partition_map
            .iter()
            .find(|a| a.partition >= self.num_partitions)
        {
            return Err(SimError::Config(format!(
                "'{}' is assigned to nonexistent partition {}",
                a.pattern, a.partition
            )));
        }
        Ok(())
    }
}

/// Configuration for a simulation kernel
///
/// Values not set here may still be supplied per component by the
/// environment (see `Environment::read_parameter`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Time resolution: one tick is 10^time_scale_exp seconds
    pub time_scale_exp: i32,
    pub sim_time_limit: Option<TimeValue>,
    pub event_limit: Option<u64>,
    pub real_time_limit_ms: Option<u64>,
    pub fes: FesKind,
    pub scheduler: SchedulerKind,
    /// Validate emitted signals against their declarations
    pub check_signals: bool,
    /// Refuse changes to immutable parameters after initialization
    pub param_mutability_check: bool,
    /// Let components take objects owned by someone else
    pub allow_object_stealing: bool,
    /// Intern equal parameter values across components of the same type
    pub share_parameters: bool,
    pub seed: u64,
    /// Stack size of activity execution contexts, in bytes
    pub activity_stack_size: usize,
    /// Expected fingerprint, checked when the run terminates normally
    pub fingerprint: Option<String>,
    pub parsim: Option<ParsimConfig>,
}

impl KernelConfig {
    /// Create a new kernel configuration with default values
    pub fn new() -> Self {
        Self {
            time_scale_exp: TimeValue::DEFAULT_SCALE_EXP,
            sim_time_limit: None,
            event_limit: None,
            real_time_limit_ms: None,
            fes: FesKind::default(),
            scheduler: SchedulerKind::default(),
            check_signals: true,
            param_mutability_check: true,
            allow_object_stealing: false,
            share_parameters: true,
            seed: 0,
            activity_stack_size: 1024 * 1024,
            fingerprint: None,
            parsim: None,
        }
    }

    pub fn with_time_scale_exp(mut self, exp: i32) -> Self {
        self.time_scale_exp = exp;
        self
    }

    pub fn with_sim_time_limit(mut self, limit: TimeValue) -> Self {
        self.sim_time_limit = Some(limit);
        self
    }

    pub fn with_event_limit(mut self, events: u64) -> Self {
        self.event_limit = Some(events);
        self
    }

    pub fn with_real_time_limit_ms(mut self, ms: u64) -> Self {
        self.real_time_limit_ms = Some(ms);
        self
    }

    pub fn with_fes(mut self, fes: FesKind) -> Self {
        self.fes = fes;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_check_signals(mut self, check: bool) -> Self {
        self.check_signals = check;
        self
    }

    pub fn with_param_mutability_check(mut self, check: bool) -> Self {
        self.param_mutability_check = check;
        self
    }

    pub fn with_object_stealing(mut self, allow: bool) -> Self {
        self.allow_object_stealing = allow;
        self
    }

    pub fn with_parameter_sharing(mut self, share: bool) -> Self {
        self.share_parameters = share;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_activity_stack_size(mut self, bytes: usize) -> Self {
        self.activity_stack_size = bytes;
        self
    }

    /// Expect the run to produce this fingerprint
    ///
    /// # Arguments
    /// * `fingerprint` - Hex string in `xxxx-xxxx` form
    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = Some(fingerprint.to_string());
        self
    }

    pub fn with_parsim(mut self, parsim: ParsimConfig) -> Self {
        self.parsim = Some(parsim);
        self
    }

    /// Check the settings for consistency
    pub fn validate(&self) -> Result<(), SimError> {
        if !(TimeValue::MIN_SCALE_EXP..=TimeValue::MAX_SCALE_EXP).contains(&self.time_scale_exp) {
            return Err(SimError::Config(format!(
                "time scale exponent {} out of range",
                self.time_scale_exp
            )));
        }
        if let SchedulerKind::RealTime { speed } = self.scheduler {
            if !(speed > 0.0) {
                return Err(SimError::Config(format!("real-time speed {} must be positive", speed)));
            }
        }
        if self.activity_stack_size < 16 * 1024 {
            return Err(SimError::Config(format!(
                "activity stack size {} is too small",
                self.activity_stack_size
            )));
        }
        if let Some(limit) = self.sim_time_limit {
            if limit < TimeValue::ZERO {
                return Err(SimError::Config("negative simulation time limit".to_string()));
            }
        }
        if let Some(parsim) = &self.parsim {
            parsim.validate()?;
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.scheduler, SchedulerKind::Sequential);
        assert_eq!(config.fes, FesKind::Heap);
        assert!(config.check_signals);
        assert!(!config.allow_object_stealing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = KernelConfig::new()
            .with_sim_time_limit(TimeValue::from_secs(20))
            .with_event_limit(100)
            .with_fes(FesKind::Lazy)
            .with_seed(42);
        assert_eq!(config.sim_time_limit, Some(TimeValue::from_secs(20)));
        assert_eq!(config.event_limit, Some(100));
        assert_eq!(config.fes, FesKind::Lazy);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(KernelConfig::new().with_time_scale_exp(3).validate().is_err());
        assert!(KernelConfig::new()
            .with_scheduler(SchedulerKind::RealTime { speed: 0.0 })
            .validate()
            .is_err());
        let parsim = ParsimConfig::new(0, 2, TimeValue::ZERO);
        assert!(KernelConfig::new().with_parsim(parsim).validate().is_err());
        let parsim = ParsimConfig::new(0, 2, TimeValue::from_millis(1)).assign("net.b", 5);
        assert!(KernelConfig::new().with_parsim(parsim).validate().is_err());
    }
}
