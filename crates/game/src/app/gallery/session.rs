use std::fmt::Display;

use engine::{InputSnapshot, KeyPress, Viewport};
use tracing::{debug, info, warn};

use super::areas::{first_overlapping, image_locators, InteractionArea, AREAS};
use super::carousel::Carousel;
use super::interaction::InteractionTracker;
use super::player::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModalPhase {
    /// Waiting on this many image loads to settle.
    Loading { pending: usize },
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModalSession {
    pub(crate) id: u64,
    pub(crate) area: usize,
    pub(crate) phase: ModalPhase,
}

/// Work the scene must hand to the image loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionCommand {
    LoadImages { session: u64, locators: Vec<String> },
    RetireImages,
}

/// All mutable exhibit state, advanced once per tick.
#[derive(Debug)]
pub(crate) struct GallerySession<T> {
    areas: Vec<InteractionArea>,
    player: Player,
    tracker: InteractionTracker,
    carousel: Carousel<T>,
    modal: Option<ModalSession>,
    last_session_id: u64,
}

impl<T> Default for GallerySession<T> {
    fn default() -> Self {
        Self::with_areas(AREAS.to_vec())
    }
}

impl<T> GallerySession<T> {
    pub(crate) fn with_areas(areas: Vec<InteractionArea>) -> Self {
        Self {
            areas,
            player: Player::default(),
            tracker: InteractionTracker::default(),
            carousel: Carousel::default(),
            modal: None,
            last_session_id: 0,
        }
    }

    /// While the modal is open only carousel keys are handled. Otherwise
    /// the player moves (when allowed) and the occupied area is re-evaluated.
    pub(crate) fn tick(
        &mut self,
        input: &InputSnapshot,
        presses: &[KeyPress],
        canvas: Viewport,
        movement_enabled: bool,
    ) -> Vec<SessionCommand> {
        let mut commands = Vec::new();

        if self.is_modal_open() {
            for key in presses {
                match key {
                    KeyPress::ArrowLeft => self.carousel.previous(),
                    KeyPress::ArrowRight => self.carousel.next(),
                    KeyPress::Escape => {
                        commands.push(self.close_modal());
                        break;
                    }
                    _ => {}
                }
            }
            return commands;
        }

        if movement_enabled {
            self.player.step(input, canvas);
        }

        let hit = first_overlapping(&self.areas, &self.player.bounds());
        if let Some(area) = self.tracker.observe(hit) {
            commands.push(self.begin_modal(area));
        }
        commands
    }

    fn begin_modal(&mut self, area: usize) -> SessionCommand {
        self.last_session_id += 1;
        let id = self.last_session_id;
        if let Some(previous) = self.modal.take() {
            info!(session = previous.id, "modal_superseded");
        }

        self.carousel.reset();
        let image_set = self.areas[area].image_set;
        let locators = image_locators(image_set);
        info!(
            area = self.areas[area].name,
            session = id,
            images = locators.len(),
            "modal_loading"
        );
        self.modal = Some(ModalSession {
            id,
            area,
            phase: ModalPhase::Loading {
                pending: locators.len(),
            },
        });
        if locators.is_empty() {
            self.finish_opening();
        }

        SessionCommand::LoadImages {
            session: id,
            locators,
        }
    }

    /// Records one settled image load. Results for any session other than
    /// the loading one are discarded; returns whether it was applied.
    pub(crate) fn apply_image<E: Display>(
        &mut self,
        session: u64,
        locator: &str,
        result: Result<T, E>,
    ) -> bool {
        let Some(modal) = self.modal.as_mut().filter(|modal| modal.id == session) else {
            debug!(session, locator, "stale_image_discarded");
            return false;
        };
        let ModalPhase::Loading { pending } = &mut modal.phase else {
            debug!(session, locator, "stale_image_discarded");
            return false;
        };
        *pending = pending.saturating_sub(1);
        let remaining = *pending;

        match result {
            Ok(image) => self.carousel.push(image),
            Err(error) => warn!(locator, error = %error, "asset_load_failed"),
        }
        if remaining == 0 {
            self.finish_opening();
        }
        true
    }

    fn finish_opening(&mut self) {
        let Some(modal) = self.modal.as_mut() else {
            return;
        };
        modal.phase = ModalPhase::Open;
        info!(
            area = self.areas[modal.area].name,
            session = modal.id,
            images = self.carousel.len(),
            "modal_opened"
        );
    }

    pub(crate) fn close_modal(&mut self) -> SessionCommand {
        if let Some(modal) = self.modal.take() {
            info!(area = self.areas[modal.area].name, session = modal.id, "modal_closed");
        }
        self.carousel.reset();
        self.tracker.reset_after_close();
        SessionCommand::RetireImages
    }

    pub(crate) fn is_modal_open(&self) -> bool {
        matches!(
            self.modal,
            Some(ModalSession {
                phase: ModalPhase::Open,
                ..
            })
        )
    }

    /// The area whose modal is on screen.
    pub(crate) fn open_area(&self) -> Option<&InteractionArea> {
        self.modal
            .as_ref()
            .filter(|modal| modal.phase == ModalPhase::Open)
            .map(|modal| &self.areas[modal.area])
    }

    #[cfg(test)]
    pub(crate) fn modal(&self) -> Option<&ModalSession> {
        self.modal.as_ref()
    }

    pub(crate) fn areas(&self) -> &[InteractionArea] {
        &self.areas
    }

    pub(crate) fn player(&self) -> &Player {
        &self.player
    }

    pub(crate) fn carousel(&self) -> &Carousel<T> {
        &self.carousel
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{InputAction, Vec2};

    const CANVAS: Viewport = Viewport {
        width: 800,
        height: 600,
    };

    type TestSession = GallerySession<&'static str>;

    fn teleport(session: &mut TestSession, x: f32, y: f32) {
        session.player_mut().position = Vec2 { x, y };
    }

    fn idle_tick(session: &mut TestSession) -> Vec<SessionCommand> {
        session.tick(&InputSnapshot::empty(), &[], CANVAS, true)
    }

    fn press(session: &mut TestSession, key: KeyPress) -> Vec<SessionCommand> {
        session.tick(&InputSnapshot::empty(), &[key], CANVAS, true)
    }

    fn loading_session(commands: &[SessionCommand]) -> (u64, Vec<String>) {
        match commands {
            [SessionCommand::LoadImages { session, locators }] => (*session, locators.clone()),
            other => panic!("expected one load command, got {other:?}"),
        }
    }

    fn settle_all(session: &mut TestSession, id: u64, locators: &[String]) {
        for locator in locators {
            session.apply_image::<String>(id, locator, Ok("img"));
        }
    }

    #[test]
    fn entering_an_area_starts_exactly_one_load() {
        let mut session = TestSession::default();
        assert!(idle_tick(&mut session).is_empty());

        teleport(&mut session, 660.0, 210.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));
        assert_eq!(id, 1);
        assert_eq!(locators.len(), 18);
        assert!(idle_tick(&mut session).is_empty());
        assert!(idle_tick(&mut session).is_empty());
    }

    #[test]
    fn leaving_and_reentering_starts_a_second_session() {
        let mut session = TestSession::default();
        teleport(&mut session, 660.0, 210.0);
        loading_session(&idle_tick(&mut session));

        teleport(&mut session, 0.0, 0.0);
        assert!(idle_tick(&mut session).is_empty());
        teleport(&mut session, 660.0, 210.0);
        let (id, _) = loading_session(&idle_tick(&mut session));
        assert_eq!(id, 2);
    }

    #[test]
    fn modal_opens_once_every_load_has_settled() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));
        assert_eq!(locators.len(), 6);

        for locator in &locators[..5] {
            session.apply_image::<String>(id, locator, Ok("img"));
        }
        assert!(!session.is_modal_open());
        session.apply_image::<String>(id, &locators[5], Ok("img"));
        assert!(session.is_modal_open());
        assert_eq!(session.open_area().map(|area| area.name), Some("帝国末路"));
        assert_eq!(session.carousel().index(), 0);
    }

    #[test]
    fn images_are_kept_in_settle_order_and_failures_dropped() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));

        let order = [3usize, 0, 5, 1, 4, 2];
        let names = ["d", "a", "f", "b", "e", "c"];
        for (slot, name) in order.iter().zip(names) {
            let result = if *slot == 5 {
                Err("missing".to_string())
            } else {
                Ok(name)
            };
            session.apply_image(id, &locators[*slot], result);
        }

        assert!(session.is_modal_open());
        assert_eq!(session.carousel().len(), 5);
        assert_eq!(session.carousel().current(), Some(&"d"));
        let mut seen = Vec::new();
        let mut walk = session.carousel().clone();
        for _ in 0..walk.len() {
            seen.push(*walk.current().expect("image"));
            walk.next();
        }
        assert_eq!(seen, vec!["d", "a", "b", "e", "c"]);
    }

    #[test]
    fn all_failed_loads_still_open_an_empty_modal() {
        let mut session = TestSession::default();
        teleport(&mut session, 260.0, 360.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));
        for locator in &locators {
            session.apply_image(id, locator, Err::<&str, _>("decode failed"));
        }
        assert!(session.is_modal_open());
        assert_eq!(session.carousel().len(), 0);
        assert!(!session.carousel().shows_navigation());
    }

    #[test]
    fn unknown_image_set_opens_immediately() {
        let mut areas = AREAS.to_vec();
        areas[0].image_set = "无图";
        let mut session = TestSession::with_areas(areas);
        teleport(&mut session, 660.0, 210.0);
        let (_, locators) = loading_session(&idle_tick(&mut session));
        assert!(locators.is_empty());
        assert!(session.is_modal_open());
    }

    #[test]
    fn movement_and_collisions_freeze_while_the_modal_is_open() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));
        settle_all(&mut session, id, &locators);

        let before = session.player().position;
        let held = InputSnapshot::empty().with_action_down(InputAction::MoveLeft, true);
        assert!(session.tick(&held, &[], CANVAS, true).is_empty());
        assert_eq!(session.player().position, before);
    }

    #[test]
    fn movement_continues_while_images_load() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        loading_session(&idle_tick(&mut session));

        let held = InputSnapshot::empty().with_action_down(InputAction::MoveLeft, true);
        session.tick(&held, &[], CANVAS, true);
        assert_eq!(session.player().position.x, 407.0);
    }

    #[test]
    fn movement_disabled_keeps_player_still() {
        let mut session = TestSession::default();
        let held = InputSnapshot::empty().with_action_down(InputAction::MoveRight, true);
        session.tick(&held, &[], CANVAS, false);
        assert_eq!(session.player().position.x, 100.0);
    }

    #[test]
    fn carousel_keys_navigate_and_escape_closes() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));
        settle_all(&mut session, id, &locators);

        press(&mut session, KeyPress::ArrowLeft);
        assert_eq!(session.carousel().index(), 5);
        press(&mut session, KeyPress::ArrowRight);
        assert_eq!(session.carousel().index(), 0);
        press(&mut session, KeyPress::ArrowUp);
        assert_eq!(session.carousel().index(), 0);

        assert_eq!(
            press(&mut session, KeyPress::Escape),
            vec![SessionCommand::RetireImages]
        );
        assert!(!session.is_modal_open());
        assert!(session.modal().is_none());
        assert_eq!(session.carousel().len(), 0);
    }

    #[test]
    fn closing_while_inside_does_not_reopen() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));
        settle_all(&mut session, id, &locators);
        press(&mut session, KeyPress::Escape);

        assert!(idle_tick(&mut session).is_empty());
        assert!(idle_tick(&mut session).is_empty());

        teleport(&mut session, 0.0, 0.0);
        idle_tick(&mut session);
        teleport(&mut session, 410.0, 140.0);
        assert_eq!(loading_session(&idle_tick(&mut session)).0, 2);
    }

    #[test]
    fn superseded_session_results_are_discarded() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        let (first, first_locators) = loading_session(&idle_tick(&mut session));

        teleport(&mut session, 660.0, 210.0);
        let (second, _) = loading_session(&idle_tick(&mut session));
        assert_ne!(first, second);

        assert!(!session.apply_image::<String>(first, &first_locators[0], Ok("late")));
        assert_eq!(session.carousel().len(), 0);
        assert_eq!(session.modal().map(|modal| modal.area), Some(0));
    }

    #[test]
    fn results_after_close_are_discarded() {
        let mut session = TestSession::default();
        teleport(&mut session, 410.0, 140.0);
        let (id, locators) = loading_session(&idle_tick(&mut session));
        settle_all(&mut session, id, &locators);
        press(&mut session, KeyPress::Escape);

        assert!(!session.apply_image::<String>(id, &locators[0], Ok("late")));
        assert_eq!(session.carousel().len(), 0);
    }
}
