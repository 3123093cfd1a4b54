//! Fleet state and the tick / e-stop state machine.
//!
//! The simulator never reads a clock. Hosts pass `now_ms` (milliseconds on
//! their own epoch, e.g. `Date.now()`) into every time-dependent call, the
//! same way the machine core is driven by `tick(dt_ms)`.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::error::{FleetError, FleetResult};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RobotStatus {
    Idle,
    Running,
    Error,
    Estopped,
}

impl RobotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RobotStatus::Idle => "idle",
            RobotStatus::Running => "running",
            RobotStatus::Error => "error",
            RobotStatus::Estopped => "estopped",
        }
    }
}

/// Axis name and half-open sampling range `[min, max)` in degrees.
pub const JOINT_RANGES: [(&str, f64, f64); 6] = [
    ("j1", -180.0, 180.0),
    ("j2", -90.0, 90.0),
    ("j3", -90.0, 90.0),
    ("j4", -180.0, 180.0),
    ("j5", -120.0, 120.0),
    ("j6", -180.0, 180.0),
];

/// Six joint angles in degrees. Values are not normalized.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct Joints {
    pub j1: f64,
    pub j2: f64,
    pub j3: f64,
    pub j4: f64,
    pub j5: f64,
    pub j6: f64,
}

impl Joints {
    pub fn from_array([j1, j2, j3, j4, j5, j6]: [f64; 6]) -> Self {
        Self { j1, j2, j3, j4, j5, j6 }
    }

    pub fn as_array(&self) -> [f64; 6] {
        [self.j1, self.j2, self.j3, self.j4, self.j5, self.j6]
    }

    /// One independent uniform draw per axis over `JOINT_RANGES`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_array(JOINT_RANGES.map(|(_, min, max)| rng.gen_range(min..max)))
    }

    /// Name of the first axis holding NaN or an infinity.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        JOINT_RANGES
            .iter()
            .zip(self.as_array())
            .find(|(_, v)| !v.is_finite())
            .map(|((name, _, _), _)| *name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Robot {
    pub id: String,
    pub name: String,
    pub status: RobotStatus,
    pub joints: Joints,
    /// Host time (ms) of the last update to this record.
    pub heartbeat: f64,
}

impl Robot {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        status: RobotStatus,
        joints: Joints,
        heartbeat: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            joints,
            heartbeat,
        }
    }
}

/// Immutable view of the fleet. Every mutation swaps in a fresh slice.
pub type FleetSnapshot = Arc<[Robot]>;

pub type ListenerId = u32;

type Listener = Box<dyn FnMut(&FleetSnapshot)>;

/// The six demo arms shown on the dashboard.
pub fn demo_fleet<R: Rng + ?Sized>(rng: &mut R, now_ms: f64) -> Vec<Robot> {
    [
        ("D7-001", "Diana 7", RobotStatus::Running),
        ("D7-002", "Thor", RobotStatus::Idle),
        ("D7-003", "Yu 5", RobotStatus::Running),
        ("D7-004", "Agile Hand", RobotStatus::Running),
        ("D7-005", "AMR", RobotStatus::Error),
        ("D7-006", "Agile Core", RobotStatus::Idle),
    ]
    .into_iter()
    .map(|(id, name, status)| Robot::new(id, name, status, Joints::sample(&mut *rng), now_ms))
    .collect()
}

fn validate_seed(robots: &[Robot]) -> FleetResult<()> {
    if robots.is_empty() {
        return Err(FleetError::EmptyFleet);
    }
    let mut seen = HashSet::with_capacity(robots.len());
    for (idx, r) in robots.iter().enumerate() {
        if r.id.is_empty() {
            return Err(FleetError::EmptyId(idx));
        }
        if !seen.insert(r.id.as_str()) {
            return Err(FleetError::DuplicateId(r.id.clone()));
        }
        if let Some(axis) = r.joints.first_non_finite() {
            return Err(FleetError::NonFiniteJoint { id: r.id.clone(), axis });
        }
        if !r.heartbeat.is_finite() {
            return Err(FleetError::NonFiniteHeartbeat(r.id.clone()));
        }
    }
    Ok(())
}

/// Sole owner and writer of the fleet.
pub struct FleetSimulator {
    config: SimConfig,
    rng: SmallRng,
    fleet: FleetSnapshot,
    initialized: bool,
    // Latest host time seen; never moves backwards.
    clock_ms: f64,
    // Some(release time) while the e-stop flag is set.
    estop_until: Option<f64>,
    // Some(due time) while periodic ticking is armed.
    next_tick_at: Option<f64>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: ListenerId,
}

impl FleetSimulator {
    pub fn new(config: SimConfig) -> FleetResult<Self> {
        config.validate()?;
        Ok(Self {
            rng: SmallRng::seed_from_u64(config.seed),
            config,
            fleet: Arc::from(Vec::new()),
            initialized: false,
            clock_ms: f64::NEG_INFINITY,
            estop_until: None,
            next_tick_at: None,
            listeners: Vec::new(),
            next_listener_id: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Installs the seed fleet. Allowed once.
    pub fn initialize(&mut self, seed: Vec<Robot>) -> FleetResult<()> {
        if self.initialized {
            return Err(FleetError::AlreadyInitialized);
        }
        validate_seed(&seed)?;
        let latest = seed.iter().map(|r| r.heartbeat).fold(self.clock_ms, f64::max);
        self.clock_ms = latest;
        self.initialized = true;
        console_log!("Fleet initialized with {} robots", seed.len());
        self.replace(seed);
        Ok(())
    }

    /// Seeds the demo fleet from the simulator's own generator.
    pub fn load_demo(&mut self, now_ms: f64) -> FleetResult<()> {
        let seed = demo_fleet(&mut self.rng, now_ms);
        self.initialize(seed)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current snapshot. Cheap: clones the `Arc`, not the robots.
    pub fn fleet(&self) -> FleetSnapshot {
        Arc::clone(&self.fleet)
    }

    pub fn robot(&self, id: &str) -> Option<&Robot> {
        self.fleet.iter().find(|r| r.id == id)
    }

    // ── Clock ─────────────────────────────────────────────────────────────

    fn observe(&mut self, now_ms: f64) -> f64 {
        debug_assert!(now_ms.is_finite(), "host time must be finite, got {now_ms}");
        if now_ms > self.clock_ms {
            self.clock_ms = now_ms;
        }
        self.clock_ms
    }

    fn release_expired_estop(&mut self, now: f64) {
        if self.estop_until.is_some_and(|until| now >= until) {
            self.estop_until = None;
            console_log!("E-stop cooldown elapsed, ticks resume");
        }
    }

    // ── Tick ──────────────────────────────────────────────────────────────

    /// One simulation step at `now_ms`. Returns false when suppressed by the
    /// e-stop flag, in which case nothing changes.
    pub fn tick(&mut self, now_ms: f64) -> bool {
        let now = self.observe(now_ms);
        self.release_expired_estop(now);
        if self.estop_until.is_some() {
            return false;
        }

        let p_err = self.config.error_probability;
        let rng = &mut self.rng;
        let next: Vec<Robot> = self
            .fleet
            .iter()
            .map(|r| {
                let joints = Joints::sample(&mut *rng);
                let status = match r.status {
                    RobotStatus::Estopped => RobotStatus::Estopped,
                    _ if rng.gen_bool(p_err) => RobotStatus::Error,
                    other => other,
                };
                Robot {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    status,
                    joints,
                    heartbeat: now.max(r.heartbeat),
                }
            })
            .collect();
        self.replace(next);
        true
    }

    // ── Periodic trigger ──────────────────────────────────────────────────

    /// Arms periodic ticking; the first tick is due one interval from now.
    pub fn start(&mut self, now_ms: f64) {
        if self.next_tick_at.is_some() {
            return;
        }
        let now = self.observe(now_ms);
        self.next_tick_at = Some(now + self.config.tick_interval_ms);
        console_log!("Simulation started ({} ms interval)", self.config.tick_interval_ms);
    }

    pub fn stop(&mut self) {
        if self.next_tick_at.take().is_some() {
            console_log!("Simulation stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick_at.is_some()
    }

    /// Drives the schedule. Runs at most one tick per call; periods missed
    /// since the last poll are skipped rather than replayed.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        let now = self.observe(now_ms);
        let Some(due) = self.next_tick_at else {
            self.release_expired_estop(now);
            return false;
        };
        if now < due {
            self.release_expired_estop(now);
            return false;
        }
        let interval = self.config.tick_interval_ms;
        let missed = ((now - due) / interval).floor();
        self.next_tick_at = Some(due + (missed + 1.0) * interval);
        self.tick(now)
    }

    // ── E-Stop ────────────────────────────────────────────────────────────

    /// Forces every robot to `Estopped` and suppresses ticks for the
    /// configured cooldown. Calling again re-arms the cooldown.
    pub fn emergency_stop(&mut self, now_ms: f64) {
        let now = self.observe(now_ms);
        self.estop_until = Some(now + self.config.estop_cooldown_ms);
        let next: Vec<Robot> = self
            .fleet
            .iter()
            .map(|r| Robot {
                status: RobotStatus::Estopped,
                ..r.clone()
            })
            .collect();
        console_log!("EMERGENCY STOP: {} robots halted", next.len());
        self.replace(next);
    }

    /// Flag state as of `now_ms`; clears the flag if the cooldown has run out.
    pub fn estop_active(&mut self, now_ms: f64) -> bool {
        let now = self.observe(now_ms);
        self.release_expired_estop(now);
        self.estop_until.is_some()
    }

    /// Flag state as of the last observed host time.
    pub fn estop_engaged(&self) -> bool {
        self.estop_until.is_some()
    }

    /// Operator reset: clears the flag now and returns estopped robots to idle.
    pub fn reset(&mut self, now_ms: f64) {
        let now = self.observe(now_ms);
        self.estop_until = None;
        let next: Vec<Robot> = self
            .fleet
            .iter()
            .map(|r| match r.status {
                RobotStatus::Estopped => Robot {
                    status: RobotStatus::Idle,
                    heartbeat: now.max(r.heartbeat),
                    ..r.clone()
                },
                _ => r.clone(),
            })
            .collect();
        console_log!("E-stop reset");
        self.replace(next);
    }

    /// Puts every robot into `Running`. Refused while the e-stop flag is set.
    pub fn run_all(&mut self, now_ms: f64) -> bool {
        let now = self.observe(now_ms);
        self.release_expired_estop(now);
        if self.estop_until.is_some() {
            console_log!("run_all refused: e-stop engaged");
            return false;
        }
        let next: Vec<Robot> = self
            .fleet
            .iter()
            .map(|r| Robot {
                status: RobotStatus::Running,
                heartbeat: now.max(r.heartbeat),
                ..r.clone()
            })
            .collect();
        self.replace(next);
        true
    }

    // ── Observers ─────────────────────────────────────────────────────────

    pub fn subscribe(&mut self, listener: Box<dyn FnMut(&FleetSnapshot)>) -> ListenerId {
        let id = self.next_listener_id;
        self.next_listener_id = self.next_listener_id.wrapping_add(1);
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn replace(&mut self, next: Vec<Robot>) {
        debug_assert!(
            self.fleet.is_empty() || next.len() == self.fleet.len(),
            "fleet replacement must keep every robot"
        );
        self.fleet = Arc::from(next);
        let snapshot = Arc::clone(&self.fleet);
        for (_, listener) in self.listeners.iter_mut() {
            listener(&snapshot);
        }
    }
}
