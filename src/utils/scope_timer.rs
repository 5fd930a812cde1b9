// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use std::time::{Duration, Instant};

/// Logs how long the enclosing scope took when dropped.
pub struct ScopeTimer<'a> {
    name: &'a str,
    start_time: Instant,
    budget: Option<Duration>,
}

impl<'a> ScopeTimer<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            start_time: Instant::now(),
            budget: None,
        }
    }

    /// Timer that warns instead of tracing when the scope overruns `budget`.
    pub fn with_budget(name: &'a str, budget: Duration) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new(name)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn over_budget(&self) -> bool {
        self.budget.is_some_and(|budget| self.elapsed() > budget)
    }
}

impl Drop for ScopeTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start_time.elapsed();
        match self.budget {
            Some(budget) if elapsed > budget => {
                log::warn!("{} took {:.2?} (budget {:.2?})", self.name, elapsed, budget)
            }
            _ => log::trace!("{} took {:.2?}", self.name, elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_overrun() {
        let _ = env_logger::builder().is_test(true).try_init();
        let timer = ScopeTimer::with_budget("sleepy", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.over_budget());
        assert!(timer.elapsed() >= Duration::from_millis(5));

        let plain = ScopeTimer::new("plain");
        assert!(!plain.over_budget());
    }
}
