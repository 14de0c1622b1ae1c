mod areas;
mod carousel;
mod chat_panel;
mod interaction;
mod player;
mod session;

use std::sync::Arc;

use engine::{
    ActorVisual, AssetLoadError, AssetLoader, InputSnapshot, LoadScope, LoadedImage, ModalView,
    RegionMarker, Scene, SceneWorld,
};
use tracing::{info, warn};

pub(crate) use chat_panel::ChatPanel;
use player::Facing;
use session::{GallerySession, SessionCommand};

const PLAYER_FRONT_SPRITE: &str = "character_front.png";
const PLAYER_BACK_SPRITE: &str = "character_back.png";
const MAP_IMAGE: &str = "第一层/Map.png";

#[derive(Debug, Default)]
struct StaticImages {
    player_front: Option<Arc<LoadedImage>>,
    player_back: Option<Arc<LoadedImage>>,
    map: Option<Arc<LoadedImage>>,
}

impl StaticImages {
    fn slot_mut(&mut self, locator: &str) -> Option<&mut Option<Arc<LoadedImage>>> {
        match locator {
            PLAYER_FRONT_SPRITE => Some(&mut self.player_front),
            PLAYER_BACK_SPRITE => Some(&mut self.player_back),
            MAP_IMAGE => Some(&mut self.map),
            _ => None,
        }
    }

    fn sprite_for(&self, facing: Facing) -> Option<Arc<LoadedImage>> {
        match facing {
            Facing::Front => self.player_front.clone(),
            Facing::Back => self.player_back.clone(),
        }
    }
}

pub(crate) struct GalleryScene {
    loader: AssetLoader,
    session: GallerySession<Arc<LoadedImage>>,
    chat: ChatPanel,
    images: StaticImages,
}

impl GalleryScene {
    pub(crate) fn new(loader: AssetLoader, chat: ChatPanel) -> Self {
        Self {
            loader,
            session: GallerySession::default(),
            chat,
            images: StaticImages::default(),
        }
    }

    fn request_static_images(&self) {
        for locator in [PLAYER_FRONT_SPRITE, PLAYER_BACK_SPRITE, MAP_IMAGE] {
            if let Err(error) = self.loader.request(LoadScope::Persistent, locator) {
                warn!(locator, error = %error, "static_asset_request_failed");
            }
        }
    }

    fn apply_load_events(&mut self) {
        for event in self.loader.drain() {
            match event.scope {
                LoadScope::Persistent => self.apply_static_image(&event.locator, event.result),
                LoadScope::Batch(session) => {
                    self.session
                        .apply_image(session, &event.locator, event.result);
                }
            }
        }
    }

    fn apply_static_image(
        &mut self,
        locator: &str,
        result: Result<Arc<LoadedImage>, AssetLoadError>,
    ) {
        let Some(slot) = self.images.slot_mut(locator) else {
            return;
        };
        match result {
            Ok(image) => {
                info!(
                    locator,
                    width = image.width(),
                    height = image.height(),
                    "static_asset_loaded"
                );
                *slot = Some(image);
            }
            Err(error) => warn!(locator, error = %error, "asset_load_failed"),
        }
    }

    fn run_commands(&mut self, commands: Vec<SessionCommand>) {
        for command in commands {
            match command {
                SessionCommand::LoadImages { session, locators } => {
                    self.loader.begin_batch(session);
                    for locator in &locators {
                        if let Err(error) =
                            self.loader.request(LoadScope::Batch(session), locator.as_str())
                        {
                            self.session.apply_image(session, locator, Err(error));
                        }
                    }
                }
                SessionCommand::RetireImages => self.loader.retire_batches(),
            }
        }
    }

    fn sync_world(&self, world: &mut SceneWorld) {
        let player = self.session.player();
        world.set_background(self.images.map.clone());
        world.set_actor(Some(ActorVisual {
            bounds: player.bounds(),
            image: self.images.sprite_for(player.facing),
        }));

        let carousel = self.session.carousel();
        world.set_modal(self.session.open_area().map(|area| ModalView {
            title: area.name.to_string(),
            description: area.description.to_string(),
            image: carousel.current().cloned(),
            counter: carousel.counter_text(),
            show_navigation: carousel.shows_navigation(),
        }));
        world.set_chat_panel(self.chat.view());
    }
}

impl Scene for GalleryScene {
    fn load(&mut self, world: &mut SceneWorld) {
        self.request_static_images();
        world.set_region_markers(
            self.session
                .areas()
                .iter()
                .map(|area| RegionMarker {
                    bounds: area.bounds,
                    label: area.name.to_string(),
                })
                .collect(),
        );
        self.sync_world(world);
        info!(areas = self.session.areas().len(), "scene_loaded");
    }

    fn update(&mut self, _fixed_dt_seconds: f32, input: &InputSnapshot, world: &mut SceneWorld) {
        self.apply_load_events();
        self.chat.poll();

        let presses = self.chat.handle_input(input);
        let movement_enabled = !self.chat.is_open();
        let commands = self
            .session
            .tick(input, &presses, world.canvas(), movement_enabled);
        self.run_commands(commands);

        self.sync_world(world);
    }

    fn unload(&mut self, _world: &mut SceneWorld) {
        self.loader.retire_batches();
        info!("scene_unloaded");
    }

    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        self.session
            .open_area()
            .map(|area| format!("Gallery - {}", area.name))
    }
}
