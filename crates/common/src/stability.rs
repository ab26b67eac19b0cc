//! Detecting when an asynchronously rendered answer has finished arriving
//!
//! Two loosely coupled signals come from the renderer: a transient loading
//! indicator and the number of rendered answer blocks. The detector waits for
//! the indicator to clear (tolerating an indicator that never showed up) and
//! then for the answer count to grow past its snapshot.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::PollingConfig;
use crate::poll::{Ignorable, Poller, ProbeError};

/// Two-phase wait for new content
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    loading_timeout: Duration,
    growth_timeout: Duration,
    interval: Duration,
    ignoring: Ignorable,
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

impl StabilityDetector {
    pub fn new(loading_timeout: Duration, growth_timeout: Duration) -> Self {
        Self {
            loading_timeout,
            growth_timeout,
            interval: PollingConfig::default().interval(),
            ignoring: Ignorable::transient_lookup(),
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.loading_timeout(), config.growth_timeout()).with_interval(config.interval())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn growth_timeout(&self) -> Duration {
        self.growth_timeout
    }

    fn poller(&self, timeout: Duration) -> Poller {
        Poller::new(timeout, self.interval).ignoring(self.ignoring.clone())
    }

    /// Wait until the loading indicator is gone and the answer count has grown.
    ///
    /// The count is snapshotted once the indicator clears. Returns `Ok(true)`
    /// only when the count grew within the growth timeout, which covers the
    /// snapshot read as well. A loading indicator that never clears is not a
    /// failure; the growth phase runs regardless. Non-transient probe
    /// failures from either phase are returned as errors.
    pub fn wait_for_new_content<L, C>(
        &self,
        loading_gone: L,
        mut count_now: C,
    ) -> Result<bool, ProbeError>
    where
        L: FnMut() -> Result<bool, ProbeError>,
        C: FnMut() -> Result<usize, ProbeError>,
    {
        self.wait_for_loading(loading_gone)?;

        // snapshot and growth share one growth deadline
        let started = Instant::now();
        let Some(baseline) = self.read_count(self.growth_timeout, &mut count_now)? else {
            debug!("answer count never became readable");
            return Ok(false);
        };

        let remaining = self.growth_timeout.saturating_sub(started.elapsed());
        self.growth_within(baseline, remaining, count_now)
    }

    /// Same as [`wait_for_new_content`](Self::wait_for_new_content) with a
    /// baseline taken earlier, typically just before the question was sent
    pub fn wait_for_new_content_since<L, C>(
        &self,
        baseline: usize,
        loading_gone: L,
        count_now: C,
    ) -> Result<bool, ProbeError>
    where
        L: FnMut() -> Result<bool, ProbeError>,
        C: FnMut() -> Result<usize, ProbeError>,
    {
        self.wait_for_loading(loading_gone)?;
        self.wait_for_growth(baseline, count_now)
    }

    fn wait_for_loading<L>(&self, mut loading_gone: L) -> Result<(), ProbeError>
    where
        L: FnMut() -> Result<bool, ProbeError>,
    {
        let loading = self.poller(self.loading_timeout).poll(&mut loading_gone)?;
        if !loading.satisfied {
            debug!(
                elapsed = ?loading.elapsed,
                "loading indicator still visible, checking answer count anyway"
            );
        }
        Ok(())
    }

    /// Wait until `count_now()` exceeds `baseline`
    pub fn wait_for_growth<C>(&self, baseline: usize, count_now: C) -> Result<bool, ProbeError>
    where
        C: FnMut() -> Result<usize, ProbeError>,
    {
        self.growth_within(baseline, self.growth_timeout, count_now)
    }

    fn growth_within<C>(
        &self,
        baseline: usize,
        timeout: Duration,
        mut count_now: C,
    ) -> Result<bool, ProbeError>
    where
        C: FnMut() -> Result<usize, ProbeError>,
    {
        let growth = self
            .poller(timeout)
            .poll(|| Ok(count_now()? > baseline))?;

        if growth.satisfied {
            info!(baseline, elapsed = ?growth.elapsed, "new answer block rendered");
        } else {
            debug!(baseline, elapsed = ?growth.elapsed, "answer count did not grow");
        }
        Ok(growth.satisfied)
    }

    /// Read the answer count, retrying through transient lookup failures.
    ///
    /// `None` when no read succeeded within the growth timeout.
    pub fn snapshot<C>(&self, count_now: C) -> Result<Option<usize>, ProbeError>
    where
        C: FnMut() -> Result<usize, ProbeError>,
    {
        self.read_count(self.growth_timeout, count_now)
    }

    fn read_count<C>(&self, timeout: Duration, mut count_now: C) -> Result<Option<usize>, ProbeError>
    where
        C: FnMut() -> Result<usize, ProbeError>,
    {
        let mut baseline = None;
        self.poller(timeout).poll(|| {
            baseline = Some(count_now()?);
            Ok(true)
        })?;
        Ok(baseline)
    }
}
