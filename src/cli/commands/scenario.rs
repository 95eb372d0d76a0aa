//! Scenario command - shared vs thread-local walkthrough
//!
//! Token A is shared, token B thread-local. Two threads each look up A and
//! then B on the same manager: both must see one A and their own B.

use crate::config::Config;
use crate::error::{CacheError, CacheResult};
use crate::registry::{CacheManager, CacheMode};
use crate::ui::{self, UiContext};
use std::sync::Arc;
use std::thread::ScopedJoinHandle;

/// Marker caches; only their allocation identity matters
#[derive(Default)]
struct PageState;

#[derive(Default)]
struct RowBuffer;

/// Instances one thread observed, as allocation addresses
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub shared: usize,
    pub thread_local: usize,
}

/// Result of the walkthrough
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub observations: [Observation; 2],
}

impl ScenarioReport {
    /// Both threads saw the same shared instance
    pub fn shared_is_common(&self) -> bool {
        self.observations[0].shared == self.observations[1].shared
    }

    /// The threads saw different thread-local instances
    pub fn locals_are_distinct(&self) -> bool {
        self.observations[0].thread_local != self.observations[1].thread_local
    }

    pub fn passed(&self) -> bool {
        self.shared_is_common() && self.locals_are_distinct()
    }
}

fn addr<T>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as usize
}

/// Run the two-thread walkthrough on a fresh manager
pub fn run(config: &Config) -> CacheResult<ScenarioReport> {
    let shared = CacheManager::register_type::<PageState>(CacheMode::Shared);
    let local = CacheManager::register_type::<RowBuffer>(CacheMode::ThreadLocal);
    let manager = CacheManager::with_config(&config.manager);

    // Instances stay alive until compared so no address can be reused
    let seen = std::thread::scope(|s| {
        let observe = || -> CacheResult<(Arc<PageState>, Arc<RowBuffer>)> {
            Ok((manager.get(&shared)?, manager.get(&local)?))
        };
        let first = s.spawn(observe);
        let second = s.spawn(observe);
        let join = |h: ScopedJoinHandle<'_, CacheResult<(Arc<PageState>, Arc<RowBuffer>)>>| {
            h.join().unwrap_or_else(|_| {
                Err(CacheError::Internal("scenario thread panicked".to_string()))
            })
        };
        Ok::<_, CacheError>([join(first)?, join(second)?])
    })?;

    let observations = seen.each_ref().map(|(a, b)| Observation {
        shared: addr(a),
        thread_local: addr(b),
    });
    manager.dispose();
    Ok(ScenarioReport { observations })
}

/// Execute the scenario command
pub fn execute(config: &Config) -> CacheResult<()> {
    let report = run(config)?;
    let ctx = UiContext::detect();

    ui::banner(&ctx, "Shared vs thread-local scenario");
    for (i, obs) in report.observations.iter().enumerate() {
        ui::heading(&ctx, &format!("Thread {}", i + 1));
        ui::field(&ctx, "A (shared)", &format!("{:#x}", obs.shared));
        ui::field(&ctx, "B (per thread)", &format!("{:#x}", obs.thread_local));
    }

    ui::heading(&ctx, "Checks");
    ui::check(
        &ctx,
        "A identical across threads",
        yes_no(report.shared_is_common()),
        report.shared_is_common(),
    );
    ui::check(
        &ctx,
        "B distinct per thread",
        yes_no(report.locals_are_distinct()),
        report.locals_are_distinct(),
    );

    if report.passed() {
        ui::verdict(&ctx, true, "Scenario passed");
        Ok(())
    } else {
        ui::verdict(&ctx, false, "Scenario failed");
        Err(CacheError::InvariantViolation(
            "shared/thread-local scenario failed".to_string(),
        ))
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
