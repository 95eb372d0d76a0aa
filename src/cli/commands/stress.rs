//! Stress command - drive one manager from many threads

use crate::cli::args::{OutputFormat, StressArgs};
use crate::config::{Config, ConstructionStrategy, ManagerConfig};
use crate::error::{BoxError, CacheError, CacheResult};
use crate::registry::{CacheManager, CacheMode, CacheStats, CacheToken};
use crate::ui::{self, UiContext};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Barrier;
use std::time::Instant;
use tracing::{debug, info};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Cache instance used by the stress run; the serial identifies the instance
#[derive(Debug)]
pub struct Probe {
    serial: u64,
}

fn build_probe() -> Result<Probe, BoxError> {
    Ok(Probe {
        serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
    })
}

/// Parameters of one stress run
#[derive(Debug, Clone)]
pub struct StressPlan {
    pub threads: usize,
    pub tokens: usize,
    pub rounds: usize,
    pub mode: CacheMode,
    pub strategy: ConstructionStrategy,
}

/// Outcome of a stress run
#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub mode: CacheMode,
    pub strategy: ConstructionStrategy,
    pub threads: usize,
    pub tokens: usize,
    pub rounds: usize,
    pub lookups: u64,
    pub instances_observed: usize,
    pub instances_expected: usize,
    pub violations: Vec<String>,
    pub elapsed_ms: u64,
    pub stats: CacheStats,
}

impl StressReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Execute the stress command
pub fn execute(args: StressArgs, config: &Config) -> CacheResult<()> {
    let plan = StressPlan {
        threads: args.threads.unwrap_or(config.stress.threads),
        tokens: args.tokens.unwrap_or(config.stress.tokens),
        rounds: args.rounds.unwrap_or(config.stress.rounds),
        mode: args.mode.unwrap_or(config.stress.mode),
        strategy: args
            .strategy
            .map(Into::into)
            .unwrap_or(config.manager.construction),
    };

    let manager_config = ManagerConfig {
        construction: plan.strategy,
        label: config
            .manager
            .label
            .clone()
            .or_else(|| Some("stress".to_string())),
    };
    let report = run(&plan, &manager_config)?;

    match args.format {
        OutputFormat::Table => print_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Plain => print_plain(&report),
    }

    if report.passed() {
        Ok(())
    } else {
        Err(CacheError::InvariantViolation(report.violations.join("; ")))
    }
}

/// Register `plan.tokens` cache types and look them up from `plan.threads`
/// threads against one manager.
pub fn run(plan: &StressPlan, manager_config: &ManagerConfig) -> CacheResult<StressReport> {
    if plan.threads == 0 || plan.tokens == 0 || plan.rounds == 0 {
        return Err(CacheError::User(
            "threads, tokens and rounds must all be at least 1".to_string(),
        ));
    }

    // Create the manager before registering so every lookup exercises growth
    let manager = CacheManager::with_config(manager_config);
    let tokens: Vec<CacheToken<Probe>> = (0..plan.tokens)
        .map(|_| CacheManager::register_type_with(plan.mode, build_probe))
        .collect();
    info!(
        "Stressing manager {} with {} {} token(s) on {} thread(s)",
        manager.id(),
        plan.tokens,
        plan.mode,
        plan.threads
    );

    let barrier = Barrier::new(plan.threads);
    let started = Instant::now();
    let per_thread: Vec<CacheResult<Vec<u64>>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..plan.threads)
            .map(|_| s.spawn(|| worker(&manager, &tokens, plan.rounds, &barrier)))
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(CacheError::Internal("stress worker panicked".to_string()))
                })
            })
            .collect()
    });
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let per_thread = per_thread.into_iter().collect::<CacheResult<Vec<_>>>()?;

    let mut violations = Vec::new();
    let mut observed = HashSet::new();
    for (t, token) in tokens.iter().enumerate() {
        let serials: Vec<u64> = per_thread.iter().map(|seen| seen[t]).collect();
        let distinct: HashSet<u64> = serials.iter().copied().collect();
        observed.extend(distinct.iter().copied());

        match plan.mode {
            CacheMode::Shared if distinct.len() != 1 => violations.push(format!(
                "shared token {} observed {} instances",
                token.index(),
                distinct.len()
            )),
            CacheMode::ThreadLocal if distinct.len() != plan.threads => violations.push(format!(
                "thread-local token {} observed {} instances across {} threads",
                token.index(),
                distinct.len(),
                plan.threads
            )),
            _ => {}
        }
    }

    let instances_expected = match plan.mode {
        CacheMode::Shared => plan.tokens,
        CacheMode::ThreadLocal => plan.tokens * plan.threads,
    };
    manager.dispose();

    Ok(StressReport {
        mode: plan.mode,
        strategy: plan.strategy,
        threads: plan.threads,
        tokens: plan.tokens,
        rounds: plan.rounds,
        lookups: (plan.threads * plan.tokens * plan.rounds) as u64,
        instances_observed: observed.len(),
        instances_expected,
        violations,
        elapsed_ms,
        stats: manager.stats(),
    })
}

/// Look up every token `rounds` times. Returns the serial seen per token,
/// failing if a thread ever sees a token change instance.
fn worker(
    manager: &CacheManager,
    tokens: &[CacheToken<Probe>],
    rounds: usize,
    barrier: &Barrier,
) -> CacheResult<Vec<u64>> {
    barrier.wait();
    let mut seen: Vec<u64> = Vec::with_capacity(tokens.len());
    for round in 0..rounds {
        for (t, token) in tokens.iter().enumerate() {
            let serial = manager.get(token)?.serial;
            if round == 0 {
                seen.push(serial);
            } else if seen[t] != serial {
                return Err(CacheError::InvariantViolation(format!(
                    "token {} changed instance from {} to {}",
                    token.index(),
                    seen[t],
                    serial
                )));
            }
        }
    }
    debug!("Stress worker finished {} round(s)", rounds);
    Ok(seen)
}

fn print_table(report: &StressReport) {
    let ctx = UiContext::detect();
    ui::banner(&ctx, "Cache registry stress");

    ui::heading(&ctx, "Run");
    ui::field(&ctx, "mode", report.mode.name());
    ui::field(&ctx, "strategy", report.strategy.name());
    ui::field(
        &ctx,
        "workload",
        &format!(
            "{} thread(s) x {} token(s) x {} round(s)",
            report.threads, report.tokens, report.rounds
        ),
    );
    ui::field(&ctx, "lookups", &report.lookups.to_string());
    ui::field(&ctx, "elapsed", &format!("{} ms", report.elapsed_ms));

    let stats = &report.stats;
    ui::heading(&ctx, "Counters");
    ui::field(&ctx, "hits", &stats.hits.to_string());
    ui::field(&ctx, "misses", &stats.misses.to_string());
    ui::field(&ctx, "hit rate", &format!("{:.2}%", stats.hit_rate()));
    ui::field(&ctx, "constructions", &stats.constructions.to_string());
    ui::field(&ctx, "discarded speculative", &stats.discarded.to_string());
    ui::field(&ctx, "slot array grows", &stats.grows.to_string());

    let per_token = match report.mode {
        CacheMode::Shared => "one instance per token",
        CacheMode::ThreadLocal => "one instance per token per thread",
    };
    ui::heading(&ctx, "Invariants");
    ui::check(
        &ctx,
        per_token,
        &format!(
            "{} observed, {} expected",
            report.instances_observed, report.instances_expected
        ),
        report.instances_observed == report.instances_expected,
    );
    ui::check(
        &ctx,
        "stable instance per thread",
        &format!("{} violation(s)", report.violations.len()),
        report.passed(),
    );
    for violation in &report.violations {
        ui::note(&ctx, violation);
    }

    if report.passed() {
        ui::verdict(&ctx, true, "All invariants held");
    } else {
        ui::verdict(&ctx, false, "Invariant violations detected");
    }
}

fn print_plain(report: &StressReport) {
    println!("mode={}", report.mode);
    println!("strategy={}", report.strategy.name());
    println!("threads={}", report.threads);
    println!("tokens={}", report.tokens);
    println!("lookups={}", report.lookups);
    println!("instances_observed={}", report.instances_observed);
    println!("instances_expected={}", report.instances_expected);
    println!("constructions={}", report.stats.constructions);
    println!("discarded={}", report.stats.discarded);
    println!("passed={}", report.passed());
}
