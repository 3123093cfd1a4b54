//! Planar arm projection and drawing.
//!
//! Each link is laid out at its joint's angle measured from the vertical,
//! independently of the previous link. This is not serial-chain kinematics;
//! the dashboard has always drawn arms this way and the output must stay
//! identical.

use serde::Serialize;
use web_sys::CanvasRenderingContext2d;

use crate::config::RenderConfig;
use crate::fleet::{Joints, Robot};

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Base point followed by the end of each of the six links.
pub fn forward_kinematics(joints: &Joints, base: Point, lengths: &[f64; 6]) -> [Point; 7] {
    let mut points = [base; 7];
    let (mut x, mut y) = (base.x, base.y);
    for (i, (angle, len)) in joints.as_array().into_iter().zip(lengths).enumerate() {
        // multiply before dividing; `to_radians` rounds differently
        let rad = (angle * std::f64::consts::PI) / 180.0;
        x += len * rad.sin();
        y -= len * rad.cos();
        points[i + 1] = Point::new(x, y);
    }
    points
}

/// The subset of a 2d canvas context the renderer needs.
pub trait DrawSurface {
    fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn set_stroke_style(&mut self, style: &str);
    fn set_line_width(&mut self, width: f64);
    fn set_line_cap(&mut self, cap: &str);
    fn begin_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn stroke(&mut self);
}

impl DrawSurface for CanvasRenderingContext2d {
    fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        CanvasRenderingContext2d::clear_rect(self, x, y, w, h);
    }

    fn set_stroke_style(&mut self, style: &str) {
        CanvasRenderingContext2d::set_stroke_style_str(self, style);
    }

    fn set_line_width(&mut self, width: f64) {
        CanvasRenderingContext2d::set_line_width(self, width);
    }

    fn set_line_cap(&mut self, cap: &str) {
        CanvasRenderingContext2d::set_line_cap(self, cap);
    }

    fn begin_path(&mut self) {
        CanvasRenderingContext2d::begin_path(self);
    }

    fn move_to(&mut self, x: f64, y: f64) {
        CanvasRenderingContext2d::move_to(self, x, y);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        CanvasRenderingContext2d::line_to(self, x, y);
    }

    fn stroke(&mut self) {
        CanvasRenderingContext2d::stroke(self);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    Clear { x: f64, y: f64, w: f64, h: f64 },
    StrokeStyle(String),
    LineWidth(f64),
    LineCap(String),
    BeginPath,
    MoveTo(Point),
    LineTo(Point),
    Stroke,
}

/// In-memory surface that records every call, for headless use and tests.
#[derive(Default, Debug)]
pub struct PathRecorder {
    pub ops: Vec<DrawOp>,
}

impl PathRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertices of the most recently begun path.
    pub fn last_path(&self) -> Vec<Point> {
        let start = self
            .ops
            .iter()
            .rposition(|op| *op == DrawOp::BeginPath)
            .map_or(0, |i| i + 1);
        self.ops[start..]
            .iter()
            .filter_map(|op| match op {
                DrawOp::MoveTo(p) | DrawOp::LineTo(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn stroke_count(&self) -> usize {
        self.ops.iter().filter(|op| **op == DrawOp::Stroke).count()
    }
}

impl DrawSurface for PathRecorder {
    fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.ops.push(DrawOp::Clear { x, y, w, h });
    }

    fn set_stroke_style(&mut self, style: &str) {
        self.ops.push(DrawOp::StrokeStyle(style.to_string()));
    }

    fn set_line_width(&mut self, width: f64) {
        self.ops.push(DrawOp::LineWidth(width));
    }

    fn set_line_cap(&mut self, cap: &str) {
        self.ops.push(DrawOp::LineCap(cap.to_string()));
    }

    fn begin_path(&mut self) {
        self.ops.push(DrawOp::BeginPath);
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.ops.push(DrawOp::MoveTo(Point::new(x, y)));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.ops.push(DrawOp::LineTo(Point::new(x, y)));
    }

    fn stroke(&mut self) {
        self.ops.push(DrawOp::Stroke);
    }
}

#[derive(Clone, Debug, Default)]
pub struct ArmRenderer {
    config: RenderConfig,
}

impl ArmRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn points(&self, joints: &Joints) -> [Point; 7] {
        let base = Point::new(self.config.base_x, self.config.base_y);
        forward_kinematics(joints, base, &self.config.link_lengths)
    }

    /// Clears the surface and strokes the arm as one connected path.
    pub fn render<S: DrawSurface + ?Sized>(&self, surface: &mut S, joints: &Joints) {
        debug_assert!(
            joints.first_non_finite().is_none(),
            "cannot draw non-finite joints: {joints:?}"
        );
        let cfg = &self.config;
        let [base, links @ ..] = self.points(joints);

        surface.clear_rect(0.0, 0.0, cfg.width, cfg.height);
        surface.set_stroke_style(&cfg.stroke_style);
        surface.set_line_width(cfg.line_width);
        surface.set_line_cap(&cfg.line_cap);
        surface.begin_path();
        surface.move_to(base.x, base.y);
        for p in links {
            surface.line_to(p.x, p.y);
        }
        surface.stroke();
    }
}

/// One renderer bound to one robot and one surface.
pub struct ArmView<S: DrawSurface> {
    robot_id: String,
    renderer: ArmRenderer,
    surface: S,
    last_drawn: Option<Joints>,
}

impl<S: DrawSurface> ArmView<S> {
    pub fn new(robot_id: impl Into<String>, renderer: ArmRenderer, surface: S) -> Self {
        Self {
            robot_id: robot_id.into(),
            renderer,
            surface,
            last_drawn: None,
        }
    }

    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Fleet-changed hook. Redraws only when this robot's joints moved;
    /// returns whether anything was drawn.
    pub fn on_fleet_changed(&mut self, fleet: &[Robot]) -> bool {
        let Some(robot) = fleet.iter().find(|r| r.id == self.robot_id) else {
            return false;
        };
        if self.last_drawn == Some(robot.joints) {
            return false;
        }
        self.redraw(robot.joints);
        true
    }

    pub fn redraw(&mut self, joints: Joints) {
        self.renderer.render(&mut self.surface, &joints);
        self.last_drawn = Some(joints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::RobotStatus;

    fn approx_eq(a: f64, b: f64) {
        assert!(
            (a - b).abs() <= 1e-9,
            "expected {:.9}, got {:.9} (|diff|={:.9})",
            b,
            a,
            (a - b).abs()
        );
    }

    fn seg_len(a: Point, b: Point) -> f64 {
        ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
    }

    #[test]
    fn zero_pose_is_a_vertical_line_above_the_base() {
        let pts = ArmRenderer::default().points(&Joints::default());
        assert_eq!(pts[0], Point::new(150.0, 160.0));
        let lengths = [40.0, 35.0, 30.0, 25.0, 20.0, 15.0];
        for (i, want) in lengths.iter().enumerate() {
            approx_eq(pts[i + 1].x, 150.0);
            assert!(pts[i + 1].y < pts[i].y, "segment {i} does not go up");
            approx_eq(seg_len(pts[i], pts[i + 1]), *want);
        }
        approx_eq(pts[6].y, 160.0 - 165.0);
    }

    #[test]
    fn link_angles_are_absolute_not_chained() {
        // j1 at 90 lays the first link flat; the rest still point straight up.
        let joints = Joints { j1: 90.0, ..Joints::default() };
        let pts = ArmRenderer::default().points(&joints);
        approx_eq(pts[1].x, 190.0);
        approx_eq(pts[1].y, 160.0);
        for i in 2..7 {
            approx_eq(pts[i].x, 190.0);
        }
        approx_eq(pts[6].y, 160.0 - 125.0);
    }

    #[test]
    fn negative_and_wrapped_angles_mirror_and_repeat() {
        let base = Point::new(0.0, 0.0);
        let lengths = [1.0; 6];
        let left = forward_kinematics(&Joints::from_array([-90.0; 6]), base, &lengths);
        approx_eq(left[6].x, -6.0);
        approx_eq(left[6].y, 0.0);

        let a = forward_kinematics(&Joints::from_array([30.0; 6]), base, &lengths);
        let b = forward_kinematics(&Joints::from_array([390.0; 6]), base, &lengths);
        for (p, q) in a.iter().zip(b.iter()) {
            approx_eq(p.x, q.x);
            approx_eq(p.y, q.y);
        }
    }

    #[test]
    fn render_draws_one_stroked_path_and_is_repeatable() {
        let renderer = ArmRenderer::default();
        let joints = Joints::from_array([12.5, -40.0, 33.0, 170.0, -119.0, 5.0]);

        let mut first = PathRecorder::new();
        renderer.render(&mut first, &joints);
        let mut second = PathRecorder::new();
        renderer.render(&mut second, &joints);
        assert_eq!(first.ops, second.ops);

        assert_eq!(first.ops[0], DrawOp::Clear { x: 0.0, y: 0.0, w: 300.0, h: 200.0 });
        assert!(first.ops.contains(&DrawOp::StrokeStyle("#60a5fa".to_string())));
        assert!(first.ops.contains(&DrawOp::LineWidth(12.0)));
        assert!(first.ops.contains(&DrawOp::LineCap("round".to_string())));
        assert_eq!(first.stroke_count(), 1);
        assert_eq!(first.last_path(), renderer.points(&joints).to_vec());
    }

    #[test]
    fn view_redraws_only_when_its_joints_change() {
        let mut view = ArmView::new("B", ArmRenderer::default(), PathRecorder::new());
        let a = Robot::new("A", "a", RobotStatus::Idle, Joints::default(), 0.0);
        let mut b = Robot::new("B", "b", RobotStatus::Running, Joints::default(), 0.0);

        assert!(view.on_fleet_changed(&[a.clone(), b.clone()]));
        assert!(!view.on_fleet_changed(&[a.clone(), b.clone()]));

        b.status = RobotStatus::Estopped;
        assert!(!view.on_fleet_changed(&[a.clone(), b.clone()]));

        b.joints.j2 = 45.0;
        assert!(view.on_fleet_changed(&[a.clone(), b.clone()]));
        assert_eq!(view.surface().stroke_count(), 2);

        assert!(!view.on_fleet_changed(&[a]));
    }
}
