use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::input::ActionStates;
use super::metrics::MetricsAccumulator;
use super::rendering::TextPainter;
use super::scene::SceneRuntime;
use super::{InputAction, InputSnapshot, KeyPress, Renderer, Scene, Viewport};

pub const FPS_CAP_ENV_VAR: &str = "GALLERY_FPS_CAP";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    /// Logical drawing surface; the window scales it to fit.
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub max_render_fps: Option<u32>,
    /// TrueType/OpenType face for canvas text; `None` uses the built-in
    /// bitmaps.
    pub font_path: Option<PathBuf>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Gallery".to_string(),
            canvas_width: 800,
            canvas_height: 600,
            window_width: 800,
            window_height: 600,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            max_render_fps: None,
            font_path: None,
        }
    }
}

impl LoopConfig {
    pub fn canvas(&self) -> Viewport {
        Viewport {
            width: self.canvas_width.max(1),
            height: self.canvas_height.max(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(config: LoopConfig, scene: Box<dyn Scene>) -> Result<(), AppError> {
    let canvas = config.canvas();
    let mut runtime = SceneRuntime::new(scene, canvas);

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let text = TextPainter::from_config(config.font_path.as_deref());
    let mut renderer =
        Renderer::new(Arc::clone(&window), canvas, text).map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let effective_render_cap = resolve_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);
    let mut input_collector = InputCollector::default();

    runtime.load();
    info!(
        target_tps,
        canvas_width = canvas.width,
        canvas_height = canvas.height,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut last_applied_title: Option<String> = None;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = window.inner_size();
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::Focused(false) => {
                    input_collector.release_all();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    input_collector.handle_keyboard_input(&event);
                }
                WindowEvent::RedrawRequested => {
                    let now = Instant::now();
                    let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                    last_frame_instant = now;

                    let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
                    accumulator = accumulator.saturating_add(clamped_frame_dt);

                    let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                    for _ in 0..step_plan.ticks_to_run {
                        let input_snapshot = input_collector.snapshot_for_tick();
                        runtime.update(fixed_dt_seconds, &input_snapshot);
                        metrics_accumulator.record_tick();
                    }
                    accumulator = step_plan.remaining_accumulator;

                    if step_plan.dropped_backlog > Duration::ZERO {
                        let dropped_ticks =
                            (step_plan.dropped_backlog.as_nanos() / fixed_dt.as_nanos()) as u32;
                        metrics_accumulator.record_dropped_ticks(dropped_ticks);
                        warn!(
                            dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                            dropped_ticks,
                            max_ticks_per_frame,
                            "sim_clamp_triggered"
                        );
                    }

                    let elapsed_since_last_present =
                        Instant::now().saturating_duration_since(last_present_instant);
                    let cap_sleep =
                        compute_cap_sleep(elapsed_since_last_present, render_frame_target);
                    if cap_sleep > Duration::ZERO {
                        thread::sleep(cap_sleep);
                    }

                    if let Err(error) = renderer.render_world(runtime.world()) {
                        warn!(error = %error, "renderer_draw_failed");
                        window_target.exit();
                    }
                    last_present_instant = Instant::now();

                    let next_title = runtime.debug_title();
                    if next_title != last_applied_title {
                        match &next_title {
                            Some(title) => window.set_title(title),
                            None => window.set_title(&config.window_title),
                        }
                        last_applied_title = next_title;
                    }
                    metrics_accumulator.record_frame(raw_frame_dt);

                    if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                        info!(
                            fps = snapshot.fps,
                            tps = snapshot.tps,
                            frame_time_ms = snapshot.frame_time_ms,
                            dropped_ticks = snapshot.dropped_ticks,
                            "loop_metrics"
                        );
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                window.request_redraw();
            }
            Event::LoopExiting => {
                runtime.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Accumulates window keyboard events between ticks. Held keys become
/// action states; presses and typed text are queued and drained by
/// `snapshot_for_tick`.
#[derive(Debug, Default)]
struct InputCollector {
    action_states: ActionStates,
    pending_presses: Vec<KeyPress>,
    pending_text: String,
    toggle_chat_is_down: bool,
}

impl InputCollector {
    fn handle_keyboard_input(&mut self, key_event: &KeyEvent) {
        self.handle_key(
            key_event.physical_key,
            key_event.state,
            key_event.text.as_deref(),
        );
    }

    fn handle_key(&mut self, key: PhysicalKey, state: ElementState, text: Option<&str>) {
        let is_pressed = state == ElementState::Pressed;
        self.update_action_state_from_physical_key(key, is_pressed);

        if key == PhysicalKey::Code(KeyCode::F1) {
            self.handle_toggle_chat_key_state(state);
            return;
        }
        if !is_pressed {
            return;
        }
        match key_press_for(key) {
            Some(press) => self.pending_presses.push(press),
            None => {
                if let Some(text) = text {
                    self.push_typed_text(text);
                }
            }
        }
    }

    fn handle_toggle_chat_key_state(&mut self, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if !self.toggle_chat_is_down {
                    self.pending_presses.push(KeyPress::ToggleChat);
                }
                self.toggle_chat_is_down = true;
            }
            ElementState::Released => self.toggle_chat_is_down = false,
        }
    }

    fn push_typed_text(&mut self, text: &str) {
        self.pending_text
            .extend(text.chars().filter(|ch| !ch.is_control()));
    }

    fn update_action_state_from_physical_key(&mut self, key: PhysicalKey, is_pressed: bool) {
        match key {
            PhysicalKey::Code(KeyCode::KeyW) | PhysicalKey::Code(KeyCode::ArrowUp) => {
                self.action_states.set(InputAction::MoveUp, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyS) | PhysicalKey::Code(KeyCode::ArrowDown) => {
                self.action_states.set(InputAction::MoveDown, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyA) | PhysicalKey::Code(KeyCode::ArrowLeft) => {
                self.action_states.set(InputAction::MoveLeft, is_pressed);
            }
            PhysicalKey::Code(KeyCode::KeyD) | PhysicalKey::Code(KeyCode::ArrowRight) => {
                self.action_states.set(InputAction::MoveRight, is_pressed);
            }
            _ => {}
        }
    }

    /// Focus loss never delivers the matching releases.
    fn release_all(&mut self) {
        self.action_states = ActionStates::default();
        self.toggle_chat_is_down = false;
    }

    fn snapshot_for_tick(&mut self) -> InputSnapshot {
        InputSnapshot::new(
            self.action_states,
            std::mem::take(&mut self.pending_presses),
            std::mem::take(&mut self.pending_text),
        )
    }
}

fn key_press_for(key: PhysicalKey) -> Option<KeyPress> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    match code {
        KeyCode::ArrowLeft => Some(KeyPress::ArrowLeft),
        KeyCode::ArrowRight => Some(KeyPress::ArrowRight),
        KeyCode::ArrowUp => Some(KeyPress::ArrowUp),
        KeyCode::ArrowDown => Some(KeyPress::ArrowDown),
        KeyCode::Escape => Some(KeyPress::Escape),
        KeyCode::Enter | KeyCode::NumpadEnter => Some(KeyPress::Enter),
        KeyCode::Backspace => Some(KeyPress::Backspace),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn resolve_render_fps_cap(config_cap: Option<u32>) -> Option<u32> {
    let raw = match env::var(FPS_CAP_ENV_VAR) {
        Ok(value) => value,
        Err(env::VarError::NotPresent) => return normalize_render_fps_cap(config_cap),
        Err(err) => {
            warn!(
                env_var = FPS_CAP_ENV_VAR,
                error = %err,
                "unable to read fps cap env var; falling back to config"
            );
            return normalize_render_fps_cap(config_cap);
        }
    };
    parse_render_fps_cap(&raw).unwrap_or_else(|| {
        warn!(
            env_var = FPS_CAP_ENV_VAR,
            value = raw.as_str(),
            "invalid fps cap env var value; falling back to config"
        );
        normalize_render_fps_cap(config_cap)
    })
}

/// `off` disables the cap; any positive integer sets it.
fn parse_render_fps_cap(raw: &str) -> Option<Option<u32>> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("off") {
        return Some(None);
    }
    match trimmed.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(fps) => Some(Some(fps)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut InputCollector, code: KeyCode, text: Option<&str>) {
        input.handle_key(PhysicalKey::Code(code), ElementState::Pressed, text);
    }

    fn release(input: &mut InputCollector, code: KeyCode) {
        input.handle_key(PhysicalKey::Code(code), ElementState::Released, None);
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        let raw_frame_dt = Duration::from_millis(600);

        assert_eq!(
            clamp_frame_delta(raw_frame_dt, max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn plan_sim_steps_keeps_partial_tick_remainder() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(20), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 1);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(4));
    }

    #[test]
    fn wasd_and_arrow_keys_map_to_actions() {
        let mut input = InputCollector::default();

        input.update_action_state_from_physical_key(PhysicalKey::Code(KeyCode::KeyW), true);
        input.update_action_state_from_physical_key(PhysicalKey::Code(KeyCode::ArrowLeft), true);

        let snapshot = input.snapshot_for_tick();
        assert!(snapshot.is_down(InputAction::MoveUp));
        assert!(snapshot.is_down(InputAction::MoveLeft));
        assert!(!snapshot.is_down(InputAction::MoveDown));
    }

    #[test]
    fn key_release_clears_action_state() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::KeyD, Some("d"));
        release(&mut input, KeyCode::KeyD);

        let snapshot = input.snapshot_for_tick();
        assert!(!snapshot.is_down(InputAction::MoveRight));
    }

    #[test]
    fn held_actions_persist_across_ticks() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::KeyS, Some("s"));

        assert!(input.snapshot_for_tick().is_down(InputAction::MoveDown));
        assert!(input.snapshot_for_tick().is_down(InputAction::MoveDown));
    }

    #[test]
    fn key_presses_are_delivered_for_a_single_tick_in_order() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::ArrowRight, None);
        press(&mut input, KeyCode::ArrowLeft, None);
        press(&mut input, KeyCode::Escape, Some("\u{1b}"));

        let first = input.snapshot_for_tick();
        let second = input.snapshot_for_tick();

        assert_eq!(
            first.key_presses(),
            &[KeyPress::ArrowRight, KeyPress::ArrowLeft, KeyPress::Escape]
        );
        assert!(second.key_presses().is_empty());
        assert!(first.typed_text().is_empty());
    }

    #[test]
    fn arrow_keys_are_both_held_actions_and_presses() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::ArrowRight, None);

        let snapshot = input.snapshot_for_tick();
        assert!(snapshot.is_down(InputAction::MoveRight));
        assert!(snapshot.was_pressed(KeyPress::ArrowRight));
    }

    #[test]
    fn toggle_chat_is_edge_triggered() {
        let mut input = InputCollector::default();

        press(&mut input, KeyCode::F1, None);
        assert!(input.snapshot_for_tick().was_pressed(KeyPress::ToggleChat));

        press(&mut input, KeyCode::F1, None);
        assert!(!input.snapshot_for_tick().was_pressed(KeyPress::ToggleChat));

        release(&mut input, KeyCode::F1);
        press(&mut input, KeyCode::F1, None);
        assert!(input.snapshot_for_tick().was_pressed(KeyPress::ToggleChat));
    }

    #[test]
    fn typed_text_is_collected_and_control_characters_dropped() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::KeyH, Some("h"));
        press(&mut input, KeyCode::KeyI, Some("i"));
        press(&mut input, KeyCode::Tab, Some("\t"));
        press(&mut input, KeyCode::Enter, Some("\r"));
        press(&mut input, KeyCode::Backspace, Some("\u{8}"));

        let snapshot = input.snapshot_for_tick();
        assert_eq!(snapshot.typed_text(), "hi");
        assert_eq!(
            snapshot.key_presses(),
            &[KeyPress::Enter, KeyPress::Backspace]
        );
        assert!(input.snapshot_for_tick().typed_text().is_empty());
    }

    #[test]
    fn committed_unicode_text_passes_through() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::KeyN, Some("你好"));
        assert_eq!(input.snapshot_for_tick().typed_text(), "你好");
    }

    #[test]
    fn focus_loss_releases_held_actions() {
        let mut input = InputCollector::default();
        press(&mut input, KeyCode::KeyA, Some("a"));
        input.release_all();
        assert!(!input.snapshot_for_tick().is_down(InputAction::MoveLeft));
    }

    #[test]
    fn target_frame_duration_none_when_cap_off() {
        assert_eq!(target_frame_duration(None), None);
    }

    #[test]
    fn target_frame_duration_for_60hz_is_expected() {
        let duration = target_frame_duration(Some(60)).expect("duration");
        assert!((duration.as_secs_f64() - (1.0 / 60.0)).abs() < 0.000_001);
    }

    #[test]
    fn compute_cap_sleep_zero_when_over_budget() {
        let sleep = compute_cap_sleep(Duration::from_millis(20), target_frame_duration(Some(60)));
        assert_eq!(sleep, Duration::ZERO);
    }

    #[test]
    fn compute_cap_sleep_positive_when_under_budget() {
        let sleep = compute_cap_sleep(Duration::from_millis(5), target_frame_duration(Some(60)));
        assert!(sleep > Duration::ZERO);
    }

    #[test]
    fn normalize_render_fps_cap_disables_zero() {
        assert_eq!(normalize_render_fps_cap(Some(0)), None);
        assert_eq!(normalize_render_fps_cap(Some(60)), Some(60));
    }

    #[test]
    fn fps_cap_env_values_parse() {
        assert_eq!(parse_render_fps_cap("144"), Some(Some(144)));
        assert_eq!(parse_render_fps_cap(" off "), Some(None));
        assert_eq!(parse_render_fps_cap("0"), None);
        assert_eq!(parse_render_fps_cap("fast"), None);
    }

    #[test]
    fn default_config_matches_gallery_canvas() {
        let config = LoopConfig::default();
        assert_eq!(
            config.canvas(),
            Viewport {
                width: 800,
                height: 600
            }
        );
        assert_eq!(config.target_tps, 60);
        assert_eq!(config.max_ticks_per_frame, 5);
    }
}
