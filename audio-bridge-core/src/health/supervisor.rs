use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::health::component::ManagedComponent;
use crate::models::config::BridgeConfig;
use crate::models::error::BridgeError;
use crate::models::state::{ComponentHealth, ComponentKind};
use crate::models::status::ComponentStatus;
use crate::session::stop_signal::StopSignal;
use crate::traits::bridge_delegate::HealthObserver;

struct Tracked {
    component: ManagedComponent,
    health: ComponentHealth,
    next_attempt_at: Instant,
    failed_at: Option<Instant>,
    last_error: Option<String>,
}

/// A health change produced by one supervisor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthTransition {
    pub component: ComponentKind,
    pub from: ComponentHealth,
    pub to: ComponentHealth,
}

/// Drives each component through
/// `healthy → degraded → recovering → healthy | failed`, with a bounded
/// recovery budget and a cool-down before a failed component is retried.
///
/// Component failures never propagate out of the supervisor; observers (the
/// distributor, the bridge delegate) degrade service instead.
pub struct HealthSupervisor {
    config: Arc<BridgeConfig>,
    tracked: Mutex<Vec<Tracked>>,
    published: Mutex<HashMap<ComponentKind, ComponentStatus>>,
    observers: Mutex<Vec<Arc<dyn HealthObserver>>>,
}

impl HealthSupervisor {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self {
            config,
            tracked: Mutex::new(Vec::new()),
            published: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Start watching a component. It is assumed healthy until the next tick.
    pub fn add_component(&self, component: ManagedComponent) {
        let kind = component.kind();
        self.published.lock().insert(
            kind,
            ComponentStatus {
                component: kind,
                health: ComponentHealth::Healthy,
                last_error: None,
            },
        );
        self.tracked.lock().push(Tracked {
            component,
            health: ComponentHealth::Healthy,
            next_attempt_at: Instant::now(),
            failed_at: None,
            last_error: None,
        });
    }

    pub fn add_observer(&self, observer: Arc<dyn HealthObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn health(&self, kind: ComponentKind) -> Option<ComponentHealth> {
        self.published.lock().get(&kind).map(|s| s.health)
    }

    /// Published status of every component, in a stable order.
    pub fn statuses(&self) -> Vec<ComponentStatus> {
        let mut statuses: Vec<ComponentStatus> = self.published.lock().values().cloned().collect();
        statuses.sort_by_key(|s| s.component.name());
        statuses
    }

    pub fn is_healthy(&self) -> bool {
        self.published.lock().values().all(|s| s.health.is_healthy())
    }

    pub fn tick(&self) -> Vec<HealthTransition> {
        self.tick_at(Instant::now())
    }

    /// Evaluate every component once at `now` and notify observers of changes.
    pub fn tick_at(&self, now: Instant) -> Vec<HealthTransition> {
        let mut transitions = Vec::new();
        {
            let mut tracked = self.tracked.lock();
            for entry in tracked.iter_mut() {
                let from = entry.health;
                let to = self.step(entry, now);
                entry.health = to;
                if from != to {
                    transitions.push(HealthTransition {
                        component: entry.component.kind(),
                        from,
                        to,
                    });
                }
                self.published.lock().insert(
                    entry.component.kind(),
                    ComponentStatus {
                        component: entry.component.kind(),
                        health: to,
                        last_error: entry.last_error.clone(),
                    },
                );
            }
        }

        if !transitions.is_empty() {
            let observers: Vec<Arc<dyn HealthObserver>> = self.observers.lock().clone();
            for t in &transitions {
                for observer in &observers {
                    observer.on_health_changed(t.component, t.to);
                }
            }
        }
        transitions
    }

    fn step(&self, entry: &mut Tracked, now: Instant) -> ComponentHealth {
        let name = entry.component.kind().name();
        match entry.health {
            ComponentHealth::Healthy => {
                if entry.component.check_health() {
                    entry.last_error = None;
                    ComponentHealth::Healthy
                } else {
                    entry.last_error = entry.component.last_error();
                    log::warn!(
                        "[HEALTH] {} degraded: {}",
                        name,
                        entry.last_error.as_deref().unwrap_or("health check failed")
                    );
                    ComponentHealth::Degraded
                }
            }
            ComponentHealth::Degraded => self.recover(entry, 1, now),
            ComponentHealth::Recovering { attempts } => {
                if now < entry.next_attempt_at {
                    ComponentHealth::Recovering { attempts }
                } else {
                    self.recover(entry, attempts + 1, now)
                }
            }
            ComponentHealth::Failed => {
                let cooled = entry
                    .failed_at
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.config.failed_cooldown);
                if !cooled {
                    ComponentHealth::Failed
                } else if entry.component.check_health() {
                    log::info!("[HEALTH] {} came back after cool-down", name);
                    entry.failed_at = None;
                    entry.last_error = None;
                    ComponentHealth::Healthy
                } else {
                    log::warn!("[HEALTH] {} still down after cool-down, retrying recovery", name);
                    ComponentHealth::Degraded
                }
            }
        }
    }

    /// Make recovery attempt number `attempt` and decide the resulting state.
    fn recover(&self, entry: &mut Tracked, attempt: u32, now: Instant) -> ComponentHealth {
        let name = entry.component.kind().name();
        log::info!(
            "[HEALTH] Attempting {} recovery ({}/{})",
            name,
            attempt,
            self.config.recovery_budget
        );

        let outcome = entry
            .component
            .attempt_recovery()
            .and_then(|()| {
                if entry.component.check_health() {
                    Ok(())
                } else {
                    Err(BridgeError::RecoveryExhausted(
                        entry
                            .component
                            .last_error()
                            .unwrap_or_else(|| "health check failed after recovery".into()),
                    ))
                }
            });

        match outcome {
            Ok(()) => {
                log::info!("[HEALTH] {} recovered", name);
                entry.last_error = None;
                ComponentHealth::Healthy
            }
            Err(e) => {
                entry.last_error = Some(e.to_string());
                if attempt >= self.config.recovery_budget {
                    log::error!("[HEALTH] {} failed after {} recovery attempts: {}", name, attempt, e);
                    entry.failed_at = Some(now);
                    ComponentHealth::Failed
                } else {
                    entry.next_attempt_at = now + backoff(self.config.recovery_backoff, attempt);
                    ComponentHealth::Recovering { attempts: attempt }
                }
            }
        }
    }

    fn next_wait(&self) -> Duration {
        let recovering = self
            .published
            .lock()
            .values()
            .any(|s| matches!(s.health, ComponentHealth::Degraded | ComponentHealth::Recovering { .. }));
        if recovering {
            self.config.recovery_backoff.min(self.config.supervisor_interval)
        } else {
            self.config.supervisor_interval
        }
    }

    /// Tick periodically until `stop` fires.
    pub fn spawn(self: Arc<Self>, stop: StopSignal) -> Result<thread::JoinHandle<()>, BridgeError> {
        thread::Builder::new()
            .name("health-supervisor".into())
            .spawn(move || {
                while !stop.wait(self.next_wait()) {
                    self.tick();
                }
                log::debug!("[HEALTH] Supervisor stopped");
            })
            .map_err(|e| BridgeError::InitializationFailed(format!("failed to spawn supervisor: {}", e)))
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at 2^5.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.saturating_sub(1).min(5))
}
