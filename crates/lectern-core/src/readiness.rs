use crate::concurrency::check_interrupt;
use crate::CoreError;
use lectern_profile::ContainerName;
use lectern_runtime::{ContainerEngine, ContainerState, HealthStatus};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Readiness {
    Ready { attempts: u32 },
    TimedOut { attempts: u32, pending: Vec<String> },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// Names from `names` that are not ready yet. A container with a health
/// check must report `healthy`; without one, running is enough.
fn pending_containers(
    engine: &dyn ContainerEngine,
    names: &[ContainerName],
) -> Result<Vec<String>, CoreError> {
    let running = engine.running_names()?;
    let mut pending: Vec<String> = names
        .iter()
        .filter(|n| !running.iter().any(|r| *n == r.as_str()))
        .map(|n| n.as_str().to_owned())
        .collect();
    if !pending.is_empty() {
        return Ok(pending);
    }
    for name in names {
        let ready = match engine.inspect(name.as_str())? {
            Some(inspect) => match inspect.health {
                Some(health) => health == HealthStatus::Healthy,
                None => inspect.state == ContainerState::Running,
            },
            None => false,
        };
        if !ready {
            pending.push(name.as_str().to_owned());
        }
    }
    Ok(pending)
}

/// Poll up to `max_attempts` times, sleeping `interval` between polls
/// (never after the last one). Engine errors during a poll count as a
/// failed poll.
pub fn wait_ready(
    engine: &dyn ContainerEngine,
    names: &[ContainerName],
    max_attempts: u32,
    interval: Duration,
    sleeper: &dyn Sleeper,
) -> Result<Readiness, CoreError> {
    let mut pending: Vec<String> = names.iter().map(|n| n.as_str().to_owned()).collect();
    for attempt in 1..=max_attempts {
        check_interrupt()?;
        match pending_containers(engine, names) {
            Ok(p) if p.is_empty() => {
                debug!("services ready after {attempt} poll(s)");
                return Ok(Readiness::Ready { attempts: attempt });
            }
            Ok(p) => {
                debug!("poll {attempt}/{max_attempts}: waiting for {}", p.join(", "));
                pending = p;
            }
            Err(e) => debug!("poll {attempt}/{max_attempts} failed: {e}"),
        }
        if attempt < max_attempts {
            sleeper.sleep(interval);
        }
    }
    Ok(Readiness::TimedOut {
        attempts: max_attempts,
        pending,
    })
}
