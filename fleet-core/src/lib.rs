use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

// --- LOGGING ---
#[cfg(target_arch = "wasm32")]
fn log(s: &str) {
    web_sys::console::log_1(&JsValue::from_str(s));
}

#[cfg(not(target_arch = "wasm32"))]
fn log(_s: &str) {}

macro_rules! console_log {
    ($($t:tt)*) => ($crate::log(&format!($($t)*)))
}

pub mod arm;
pub mod config;
pub mod error;
pub mod fleet;

pub use arm::{ArmRenderer, ArmView, DrawSurface, PathRecorder, Point, forward_kinematics};
pub use config::{RenderConfig, SimConfig};
pub use error::{FleetError, FleetResult};
pub use fleet::{FleetSimulator, FleetSnapshot, Joints, ListenerId, Robot, RobotStatus};

#[derive(Serialize)]
struct FleetState<'a> {
    robots: &'a [Robot],
    estop: bool,
    running: bool,
}

fn from_js<T: serde::de::DeserializeOwned + Default>(value: JsValue) -> FleetResult<T> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| FleetError::Malformed(e.to_string()))
}

/// JavaScript handle over one simulator and the canvases drawing its arms.
#[wasm_bindgen]
pub struct FleetBrain {
    sim: FleetSimulator,
    render: RenderConfig,
}

impl FleetBrain {
    pub fn from_config(config: SimConfig) -> FleetResult<Self> {
        console_log!("FleetBrain: simulator ready (seed {})", config.seed);
        Ok(Self {
            sim: FleetSimulator::new(config)?,
            render: RenderConfig::default(),
        })
    }

    pub fn simulator(&self) -> &FleetSimulator {
        &self.sim
    }

    /// Binds an arbitrary surface to a robot and keeps it redrawn.
    pub fn attach_surface<S: DrawSurface + 'static>(&mut self, robot_id: String, surface: S) -> ListenerId {
        let mut view = ArmView::new(robot_id, ArmRenderer::new(self.render.clone()), surface);
        view.on_fleet_changed(&self.sim.fleet());
        self.sim.subscribe(Box::new(move |fleet: &FleetSnapshot| {
            view.on_fleet_changed(fleet);
        }))
    }
}

#[wasm_bindgen]
impl FleetBrain {
    /// `config` may be `undefined` or a partial `SimConfig` object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<FleetBrain, JsError> {
        Ok(Self::from_config(from_js(config)?)?)
    }

    pub fn set_render_config(&mut self, config: JsValue) -> Result<(), JsError> {
        self.render = from_js(config)?;
        Ok(())
    }

    /// Seeds the fleet from an array of robot records.
    pub fn initialize(&mut self, robots: JsValue) -> Result<(), JsError> {
        let seed: Vec<Robot> = from_js(robots)?;
        Ok(self.sim.initialize(seed)?)
    }

    pub fn load_demo(&mut self, now_ms: f64) -> Result<(), JsError> {
        Ok(self.sim.load_demo(now_ms)?)
    }

    // ── Simulation control ────────────────────────────────────────────────

    pub fn start(&mut self, now_ms: f64) {
        self.sim.start(now_ms);
    }

    pub fn stop(&mut self) {
        self.sim.stop();
    }

    pub fn is_running(&self) -> bool {
        self.sim.is_running()
    }

    /// Call from the host's timer or animation frame; true if a tick ran.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        self.sim.poll(now_ms)
    }

    pub fn tick(&mut self, now_ms: f64) -> bool {
        self.sim.tick(now_ms)
    }

    // ── E-Stop ────────────────────────────────────────────────────────────

    pub fn emergency_stop(&mut self, now_ms: f64) {
        self.sim.emergency_stop(now_ms);
    }

    pub fn estop_active(&mut self, now_ms: f64) -> bool {
        self.sim.estop_active(now_ms)
    }

    pub fn reset(&mut self, now_ms: f64) {
        self.sim.reset(now_ms);
    }

    pub fn run_all(&mut self, now_ms: f64) -> bool {
        self.sim.run_all(now_ms)
    }

    // ── State ─────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> JsValue {
        let fleet = self.sim.fleet();
        let state = FleetState {
            robots: &fleet,
            estop: self.sim.estop_engaged(),
            running: self.sim.is_running(),
        };
        serde_wasm_bindgen::to_value(&state).unwrap_or(JsValue::NULL)
    }

    /// Projected arm points for one robot, or `null` if the id is unknown.
    pub fn arm_points(&self, robot_id: &str) -> JsValue {
        let Some(robot) = self.sim.robot(robot_id) else {
            return JsValue::NULL;
        };
        let points = ArmRenderer::new(self.render.clone()).points(&robot.joints);
        serde_wasm_bindgen::to_value(&points).unwrap_or(JsValue::NULL)
    }

    // ── Canvases ──────────────────────────────────────────────────────────

    /// Draws `robot_id` on `canvas` now and after every fleet change.
    /// Returns a handle for `detach_canvas`.
    pub fn attach_canvas(&mut self, robot_id: String, canvas: HtmlCanvasElement) -> Result<u32, JsError> {
        canvas.set_width(self.render.width as u32);
        canvas.set_height(self.render.height as u32);
        let ctx = canvas
            .get_context("2d")
            .map_err(|_| JsError::new("canvas refused a 2d context"))?
            .ok_or_else(|| JsError::new("canvas has no 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| JsError::new("2d context has an unexpected type"))?;
        Ok(self.attach_surface(robot_id, ctx))
    }

    pub fn detach_canvas(&mut self, handle: u32) -> bool {
        self.sim.unsubscribe(handle)
    }
}
