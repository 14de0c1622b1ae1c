use std::sync::Arc;

use super::input::{ActionStates, InputAction, KeyPress};
use super::rendering::Viewport;
use crate::assets::LoadedImage;
use crate::geometry::Rect;

#[derive(Debug, Clone, Default)]
pub struct InputSnapshot {
    actions: ActionStates,
    key_presses: Vec<KeyPress>,
    typed_text: String,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(actions: ActionStates, key_presses: Vec<KeyPress>, typed_text: String) -> Self {
        Self {
            actions,
            key_presses,
            typed_text,
        }
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.is_down(action)
    }

    pub fn key_presses(&self) -> &[KeyPress] {
        &self.key_presses
    }

    #[cfg(test)]
    pub(crate) fn was_pressed(&self, key: KeyPress) -> bool {
        self.key_presses.contains(&key)
    }

    /// Printable text typed since the previous tick, control characters
    /// already removed.
    pub fn typed_text(&self) -> &str {
        &self.typed_text
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.actions.set(action, is_down);
        self
    }

    pub fn with_key_press(mut self, key: KeyPress) -> Self {
        self.key_presses.push(key);
        self
    }

    pub fn with_typed_text(mut self, text: &str) -> Self {
        self.typed_text.push_str(text);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionMarker {
    pub bounds: Rect,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct ActorVisual {
    pub bounds: Rect,
    /// `None` draws the placeholder rectangle.
    pub image: Option<Arc<LoadedImage>>,
}

#[derive(Debug, Clone, Default)]
pub struct ModalView {
    pub title: String,
    /// Wrapped under the title.
    pub description: String,
    pub image: Option<Arc<LoadedImage>>,
    pub counter: Option<String>,
    pub show_navigation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleStyle {
    Visitor,
    Guide,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLineView {
    pub style: BubbleStyle,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPanelView {
    pub lines: Vec<ChatLineView>,
    pub input_line: String,
    pub sending: bool,
    pub settings_lines: Vec<String>,
}

/// Everything the renderer draws for one frame. Scenes write it during
/// `update`; the renderer only reads it.
#[derive(Debug)]
pub struct SceneWorld {
    canvas: Viewport,
    background: Option<Arc<LoadedImage>>,
    region_markers: Vec<RegionMarker>,
    actor: Option<ActorVisual>,
    modal: Option<ModalView>,
    chat_panel: Option<ChatPanelView>,
}

impl SceneWorld {
    pub fn new(canvas: Viewport) -> Self {
        Self {
            canvas,
            background: None,
            region_markers: Vec::new(),
            actor: None,
            modal: None,
            chat_panel: None,
        }
    }

    pub fn canvas(&self) -> Viewport {
        self.canvas
    }

    pub fn set_background(&mut self, background: Option<Arc<LoadedImage>>) {
        self.background = background;
    }

    pub fn background(&self) -> Option<&Arc<LoadedImage>> {
        self.background.as_ref()
    }

    pub fn set_region_markers(&mut self, markers: Vec<RegionMarker>) {
        self.region_markers = markers;
    }

    pub fn region_markers(&self) -> &[RegionMarker] {
        &self.region_markers
    }

    pub fn set_actor(&mut self, actor: Option<ActorVisual>) {
        self.actor = actor;
    }

    pub fn actor(&self) -> Option<&ActorVisual> {
        self.actor.as_ref()
    }

    pub fn set_modal(&mut self, modal: Option<ModalView>) {
        self.modal = modal;
    }

    pub fn modal(&self) -> Option<&ModalView> {
        self.modal.as_ref()
    }

    pub fn set_chat_panel(&mut self, chat_panel: Option<ChatPanelView>) {
        self.chat_panel = chat_panel;
    }

    pub fn chat_panel(&self) -> Option<&ChatPanelView> {
        self.chat_panel.as_ref()
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.canvas);
    }
}

pub trait Scene {
    fn load(&mut self, world: &mut SceneWorld);
    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot, world: &mut SceneWorld);
    fn unload(&mut self, world: &mut SceneWorld);
    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        None
    }
}

pub(crate) struct SceneRuntime {
    scene: Box<dyn Scene>,
    world: SceneWorld,
    is_loaded: bool,
}

impl SceneRuntime {
    pub(crate) fn new(scene: Box<dyn Scene>, canvas: Viewport) -> Self {
        Self {
            scene,
            world: SceneWorld::new(canvas),
            is_loaded: false,
        }
    }

    pub(crate) fn load(&mut self) {
        if self.is_loaded {
            return;
        }
        self.scene.load(&mut self.world);
        self.is_loaded = true;
    }

    pub(crate) fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        if !self.is_loaded {
            return;
        }
        self.scene.update(fixed_dt_seconds, input, &mut self.world);
    }

    pub(crate) fn world(&self) -> &SceneWorld {
        &self.world
    }

    pub(crate) fn debug_title(&self) -> Option<String> {
        self.scene.debug_title(&self.world)
    }

    pub(crate) fn shutdown(&mut self) {
        if !self.is_loaded {
            return;
        }
        self.scene.unload(&mut self.world);
        self.world.clear();
        self.is_loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MarkerScene;

    impl Scene for MarkerScene {
        fn load(&mut self, world: &mut SceneWorld) {
            world.set_region_markers(vec![RegionMarker {
                bounds: Rect::new(1.0, 2.0, 3.0, 4.0),
                label: "hall".to_string(),
            }]);
        }

        fn update(&mut self, _fixed_dt_seconds: f32, input: &InputSnapshot, world: &mut SceneWorld) {
            if input.was_pressed(KeyPress::Escape) {
                world.set_modal(None);
            }
        }

        fn unload(&mut self, _world: &mut SceneWorld) {}

        fn debug_title(&self, world: &SceneWorld) -> Option<String> {
            Some(format!("markers {}", world.region_markers().len()))
        }
    }

    fn canvas() -> Viewport {
        Viewport {
            width: 800,
            height: 600,
        }
    }

    #[test]
    fn snapshot_builders_round_trip_through_accessors() {
        let snapshot = InputSnapshot::empty()
            .with_action_down(InputAction::MoveLeft, true)
            .with_key_press(KeyPress::ArrowRight)
            .with_key_press(KeyPress::Enter)
            .with_typed_text("hi");

        assert!(snapshot.is_down(InputAction::MoveLeft));
        assert!(!snapshot.is_down(InputAction::MoveUp));
        assert_eq!(
            snapshot.key_presses(),
            &[KeyPress::ArrowRight, KeyPress::Enter]
        );
        assert!(snapshot.was_pressed(KeyPress::Enter));
        assert!(!snapshot.was_pressed(KeyPress::Escape));
        assert_eq!(snapshot.typed_text(), "hi");
    }

    #[test]
    fn runtime_loads_once_and_ignores_updates_before_load() {
        let mut runtime = SceneRuntime::new(Box::<MarkerScene>::default(), canvas());
        runtime.update(1.0 / 60.0, &InputSnapshot::empty());
        assert!(runtime.world().region_markers().is_empty());

        runtime.load();
        runtime.load();
        runtime.update(1.0 / 60.0, &InputSnapshot::empty());

        assert_eq!(runtime.world().region_markers().len(), 1);
        assert_eq!(runtime.debug_title().as_deref(), Some("markers 1"));
    }

    #[test]
    fn shutdown_clears_world_but_keeps_canvas() {
        let mut runtime = SceneRuntime::new(Box::<MarkerScene>::default(), canvas());
        runtime.load();
        runtime.shutdown();
        runtime.shutdown();

        assert!(runtime.world().region_markers().is_empty());
        assert_eq!(runtime.world().canvas().width, 800);
    }
}
