//! Playback health watchdog and fallback chain
//!
//! The watchdog is a pure state machine fed one position sample per check.
//! The coordinator owns the timer that produces the samples and acts on the
//! verdicts; a stuck verdict advances the [`FallbackChain`].

use crate::{
    adapter::AdapterKind,
    config::{HealthThresholds, WatchdogConfig},
    types::PlaybackMethod,
};
use std::collections::VecDeque;
use tracing::debug;

/// One observation of the active adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSample {
    /// Position in seconds
    pub position: f64,
    /// Playback paused by the user
    pub paused: bool,
    /// Adapter reported `loaded`
    pub loaded: bool,
}

/// Watchdog decision after a check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Not enough evidence yet
    Pending,
    /// Position advanced; playback is healthy
    Progressing,
    /// Ask the adapter to play again before giving up
    ResumeAttempt,
    /// Playback will not start; fall back
    Stuck { position: f64 },
}

/// Detects playback that never starts or stops advancing
#[derive(Debug, Clone)]
pub struct HealthWatchdog {
    thresholds: HealthThresholds,
    epsilon: f64,
    allow_resume: bool,
    start_position: f64,
    last_position: Option<f64>,
    checks: u32,
    stalled_checks: u32,
    resume_attempted: bool,
}

impl HealthWatchdog {
    /// Watchdog for a session; thresholds depend on the method and only the
    /// native adapter gets a resume attempt
    pub fn new(
        config: &WatchdogConfig,
        method: PlaybackMethod,
        adapter: AdapterKind,
        start_position: f64,
    ) -> Self {
        let thresholds = if method.is_direct() {
            config.direct
        } else {
            config.transcode
        };
        Self {
            thresholds,
            epsilon: config.progress_epsilon,
            allow_resume: adapter == AdapterKind::Native,
            start_position,
            last_position: None,
            checks: 0,
            stalled_checks: 0,
            resume_attempted: false,
        }
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }

    pub fn resume_attempted(&self) -> bool {
        self.resume_attempted
    }

    /// Evaluate one sample
    pub fn check(&mut self, sample: HealthSample) -> Verdict {
        let baseline = self.last_position.unwrap_or(self.start_position);
        self.last_position = Some(sample.position);

        if sample.position - baseline > self.epsilon {
            self.checks += 1;
            return Verdict::Progressing;
        }

        // Paused time does not count against the thresholds
        if sample.paused {
            self.stalled_checks = 0;
            return Verdict::Pending;
        }

        self.checks += 1;
        self.stalled_checks += 1;
        let at_start = (sample.position - self.start_position).abs() <= self.epsilon;

        let stuck = (sample.loaded && self.stalled_checks >= self.thresholds.stall_checks)
            || (!sample.loaded && at_start && self.checks >= self.thresholds.zero_position_checks)
            || self.checks >= self.thresholds.max_checks;

        debug!(
            checks = self.checks,
            stalled = self.stalled_checks,
            position = sample.position,
            loaded = sample.loaded,
            stuck,
            "Health check"
        );

        if !stuck {
            return Verdict::Pending;
        }

        if self.allow_resume && !self.resume_attempted {
            self.resume_attempted = true;
            self.checks = 0;
            self.stalled_checks = 0;
            return Verdict::ResumeAttempt;
        }

        Verdict::Stuck {
            position: sample.position,
        }
    }
}

/// One attempt in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackStep {
    pub adapter: AdapterKind,
    pub method: PlaybackMethod,
}

impl std::fmt::Display for FallbackStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.adapter, self.method)
    }
}

/// Remaining attempts after the current adapter, in order:
/// platform-native, then generic, then Transcode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackChain {
    steps: VecDeque<FallbackStep>,
}

impl FallbackChain {
    /// Build the chain for a session that is starting on `current`
    pub fn after(current: FallbackStep, transcode_supported: bool) -> Self {
        let mut steps = VecDeque::new();
        if current.adapter == AdapterKind::Native && current.method.is_direct() {
            steps.push_back(FallbackStep {
                adapter: AdapterKind::Generic,
                method: current.method,
            });
        }
        if current.method.is_direct() && transcode_supported {
            steps.push_back(FallbackStep {
                adapter: AdapterKind::Adaptive,
                method: PlaybackMethod::Transcode,
            });
        }
        Self { steps }
    }

    /// Take the next attempt
    pub fn next_step(&mut self) -> Option<FallbackStep> {
        self.steps.pop_front()
    }

    pub fn peek(&self) -> Option<&FallbackStep> {
        self.steps.front()
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(position: f64, loaded: bool) -> HealthSample {
        HealthSample {
            position,
            paused: false,
            loaded,
        }
    }

    fn direct(adapter: AdapterKind) -> HealthWatchdog {
        HealthWatchdog::new(
            &WatchdogConfig::default(),
            PlaybackMethod::DirectPlay,
            adapter,
            0.0,
        )
    }

    #[test]
    fn test_advancing_position_progresses() {
        let mut watchdog = direct(AdapterKind::Generic);
        assert_eq!(watchdog.check(sample(0.0, false)), Verdict::Pending);
        assert_eq!(watchdog.check(sample(1.0, true)), Verdict::Progressing);
    }

    #[test]
    fn test_loaded_but_frozen_is_stuck() {
        let mut watchdog = direct(AdapterKind::Generic);
        assert_eq!(watchdog.check(sample(3.0, true)), Verdict::Progressing);

        let mut watchdog = direct(AdapterKind::Generic);
        assert_eq!(watchdog.check(sample(0.0, true)), Verdict::Pending);
        assert_eq!(
            watchdog.check(sample(0.0, true)),
            Verdict::Stuck { position: 0.0 }
        );
    }

    #[test]
    fn test_never_loaded_at_start() {
        let mut watchdog = direct(AdapterKind::Generic);
        for _ in 0..3 {
            assert_eq!(watchdog.check(sample(0.0, false)), Verdict::Pending);
        }
        assert_eq!(
            watchdog.check(sample(0.0, false)),
            Verdict::Stuck { position: 0.0 }
        );
    }

    #[test]
    fn test_paused_is_never_stuck() {
        let mut watchdog = direct(AdapterKind::Generic);
        for _ in 0..3 {
            let verdict = watchdog.check(HealthSample {
                position: 5.0,
                paused: true,
                loaded: true,
            });
            assert_ne!(verdict, Verdict::Stuck { position: 5.0 });
        }
    }

    #[test]
    fn test_long_pause_does_not_use_up_checks() {
        let mut watchdog = direct(AdapterKind::Generic);
        for _ in 0..20 {
            let verdict = watchdog.check(HealthSample {
                position: 0.0,
                paused: true,
                loaded: true,
            });
            assert_eq!(verdict, Verdict::Pending);
        }
        assert_eq!(watchdog.checks(), 0);

        // First resumed sample that has not moved yet is still given time
        assert_eq!(watchdog.check(sample(0.0, true)), Verdict::Pending);
        assert_eq!(watchdog.check(sample(1.0, true)), Verdict::Progressing);
    }

    #[test]
    fn test_native_gets_one_resume_attempt() {
        let mut watchdog = direct(AdapterKind::Native);
        watchdog.check(sample(0.0, true));
        assert_eq!(watchdog.check(sample(0.0, true)), Verdict::ResumeAttempt);
        assert!(watchdog.resume_attempted());

        watchdog.check(sample(0.0, true));
        assert_eq!(
            watchdog.check(sample(0.0, true)),
            Verdict::Stuck { position: 0.0 }
        );
    }

    #[test]
    fn test_transcode_is_more_patient() {
        let mut watchdog = HealthWatchdog::new(
            &WatchdogConfig::default(),
            PlaybackMethod::Transcode,
            AdapterKind::Adaptive,
            0.0,
        );
        for _ in 0..9 {
            assert_eq!(watchdog.check(sample(0.0, false)), Verdict::Pending);
        }
        assert!(matches!(
            watchdog.check(sample(0.0, false)),
            Verdict::Stuck { .. }
        ));
    }

    #[test]
    fn test_chain_from_native() {
        let mut chain = FallbackChain::after(
            FallbackStep {
                adapter: AdapterKind::Native,
                method: PlaybackMethod::DirectPlay,
            },
            true,
        );
        assert_eq!(chain.remaining(), 2);
        assert_eq!(
            chain.next_step(),
            Some(FallbackStep {
                adapter: AdapterKind::Generic,
                method: PlaybackMethod::DirectPlay
            })
        );
        assert_eq!(
            chain.next_step(),
            Some(FallbackStep {
                adapter: AdapterKind::Adaptive,
                method: PlaybackMethod::Transcode
            })
        );
        assert!(chain.is_exhausted());
    }

    #[test]
    fn test_chain_from_transcode_is_empty() {
        let chain = FallbackChain::after(
            FallbackStep {
                adapter: AdapterKind::Adaptive,
                method: PlaybackMethod::Transcode,
            },
            true,
        );
        assert!(chain.is_exhausted());
    }

    #[test]
    fn test_chain_without_transcode_support() {
        let mut chain = FallbackChain::after(
            FallbackStep {
                adapter: AdapterKind::Generic,
                method: PlaybackMethod::DirectStream,
            },
            false,
        );
        assert_eq!(chain.next_step(), None);
    }
}
