use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::app::{
    ActorVisual, BubbleStyle, ChatPanelView, ModalView, RegionMarker, SceneWorld,
};
use crate::assets::LoadedImage;
use crate::geometry::Rect;

use super::text::{TextPainter, LINE_ADVANCE, LINE_HEIGHT};
use super::Viewport;

const CLEAR_COLOR: [u8; 4] = [20, 22, 28, 255];
const REGION_OUTLINE_COLOR: [u8; 3] = [255, 255, 0];
const REGION_OUTLINE_ALPHA: u8 = 128;
const REGION_OUTLINE_THICKNESS_PX: i32 = 2;
const LABEL_PLATE_COLOR: [u8; 3] = [255, 255, 255];
const LABEL_PLATE_ALPHA: u8 = 204;
const LABEL_PLATE_HEIGHT_PX: i32 = 20;
const LABEL_PLATE_OFFSET_Y_PX: i32 = 25;
const LABEL_PLATE_PADDING_X_PX: i32 = 5;
const LABEL_TEXT_COLOR: [u8; 4] = [0, 0, 0, 255];
const PLACEHOLDER_COLOR: [u8; 4] = [0, 0, 255, 255];

const MODAL_BACKDROP_COLOR: [u8; 3] = [0, 0, 0];
const MODAL_BACKDROP_ALPHA: u8 = 150;
const MODAL_PANEL_COLOR: [u8; 4] = [250, 248, 242, 255];
const MODAL_BORDER_COLOR: [u8; 4] = [92, 106, 126, 255];
const MODAL_TEXT_COLOR: [u8; 4] = [30, 30, 36, 255];
const MODAL_DIM_TEXT_COLOR: [u8; 4] = [110, 116, 128, 255];
const MODAL_MARGIN_PX: i32 = 60;
const MODAL_PADDING_PX: i32 = 16;
const MODAL_NAV_WIDTH_PX: i32 = 24;
const MODAL_DESCRIPTION_MAX_LINES: usize = 4;
const MODAL_EMPTY_TEXT: &str = "暂无图片";
const MODAL_HINT_TEXT: &str = "ESC 关闭";

const CHAT_PANEL_WIDTH_PX: i32 = 340;
const CHAT_PANEL_MARGIN_PX: i32 = 10;
const CHAT_PANEL_PADDING_PX: i32 = 8;
const CHAT_PANEL_COLOR: [u8; 3] = [16, 18, 24];
const CHAT_PANEL_ALPHA: u8 = 225;
const CHAT_BORDER_COLOR: [u8; 4] = [92, 106, 126, 255];
const CHAT_VISITOR_BUBBLE_COLOR: [u8; 4] = [64, 118, 214, 255];
const CHAT_GUIDE_BUBBLE_COLOR: [u8; 4] = [58, 62, 72, 255];
const CHAT_TEXT_COLOR: [u8; 4] = [244, 248, 252, 255];
const CHAT_DIM_TEXT_COLOR: [u8; 4] = [176, 198, 220, 255];
const CHAT_BUBBLE_GAP_PX: i32 = 6;
const CHAT_BUBBLE_PADDING_PX: i32 = 4;
const CHAT_BUBBLE_MAX_WIDTH_PX: i32 = 272;
const CHAT_SENDING_TEXT: &str = "发送中...";

/// Presents `SceneWorld` into a fixed-size pixel buffer that `pixels`
/// scales into the window surface.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    canvas: Viewport,
    text: TextPainter,
}

impl Renderer {
    pub(crate) fn new(
        window: Arc<Window>,
        canvas: Viewport,
        text: TextPainter,
    ) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), canvas, size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            canvas,
            text,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), self.canvas, width, height)?;
        Ok(())
    }

    pub fn canvas(&self) -> Viewport {
        self.canvas
    }

    fn build_pixels(
        window: Arc<Window>,
        canvas: Viewport,
        surface_width: u32,
        surface_height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(surface_width.max(1), surface_height.max(1), window);
        Pixels::new(canvas.width, canvas.height, surface)
    }

    pub(crate) fn render_world(&mut self, world: &SceneWorld) -> Result<(), Error> {
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Ok(());
        }
        compose_frame(self.pixels.frame_mut(), self.canvas, world, &self.text);
        self.pixels.render()
    }
}

/// Draws one full frame. Order: clear, background, area markers, actor,
/// modal, chat panel.
fn compose_frame(frame: &mut [u8], canvas: Viewport, world: &SceneWorld, text: &TextPainter) {
    let (width, height) = (canvas.width, canvas.height);
    for chunk in frame.chunks_exact_mut(4) {
        chunk.copy_from_slice(&CLEAR_COLOR);
    }

    if let Some(background) = world.background() {
        draw_image_scaled(
            frame,
            width,
            height,
            background,
            0,
            0,
            width as i32,
            height as i32,
        );
    }

    for marker in world.region_markers() {
        draw_region_marker(frame, width, height, marker, text);
    }

    if let Some(actor) = world.actor() {
        draw_actor(frame, width, height, actor);
    }

    if let Some(modal) = world.modal() {
        draw_modal(frame, width, height, modal, text);
    }

    if let Some(chat) = world.chat_panel() {
        draw_chat_panel(frame, width, height, chat, text);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

fn pixel_rect(rect: &Rect) -> PixelRect {
    PixelRect {
        x: rect.x.round() as i32,
        y: rect.y.round() as i32,
        width: rect.width.round() as i32,
        height: rect.height.round() as i32,
    }
}

fn draw_region_marker(
    frame: &mut [u8],
    width: u32,
    height: u32,
    marker: &RegionMarker,
    text: &TextPainter,
) {
    let bounds = pixel_rect(&marker.bounds);
    for inset in 0..REGION_OUTLINE_THICKNESS_PX {
        blend_rect_outline(
            frame,
            width,
            height,
            bounds.x - inset,
            bounds.y - inset,
            bounds.width + inset * 2,
            bounds.height + inset * 2,
            REGION_OUTLINE_COLOR,
            REGION_OUTLINE_ALPHA,
        );
    }

    let plate_width = text.width(&marker.label) + LABEL_PLATE_PADDING_X_PX * 2;
    let plate_y = bounds.y - LABEL_PLATE_OFFSET_Y_PX;
    blend_filled_rect(
        frame,
        width,
        height,
        bounds.x,
        plate_y,
        plate_width,
        LABEL_PLATE_HEIGHT_PX,
        LABEL_PLATE_COLOR,
        LABEL_PLATE_ALPHA,
    );
    let text_y = plate_y + (LABEL_PLATE_HEIGHT_PX - LINE_HEIGHT) / 2;
    text.draw(
        frame,
        width,
        height,
        bounds.x + LABEL_PLATE_PADDING_X_PX,
        text_y,
        &marker.label,
        LABEL_TEXT_COLOR,
    );
}

fn draw_actor(frame: &mut [u8], width: u32, height: u32, actor: &ActorVisual) {
    let bounds = pixel_rect(&actor.bounds);
    match actor.image.as_deref() {
        Some(image) => draw_image_scaled(
            frame,
            width,
            height,
            image,
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height,
        ),
        None => draw_filled_rect(
            frame,
            width,
            height,
            bounds.x,
            bounds.y,
            bounds.width,
            bounds.height,
            PLACEHOLDER_COLOR,
        ),
    }
}

fn modal_panel_rect(width: u32, height: u32) -> PixelRect {
    PixelRect {
        x: MODAL_MARGIN_PX,
        y: MODAL_MARGIN_PX,
        width: (width as i32 - MODAL_MARGIN_PX * 2).max(0),
        height: (height as i32 - MODAL_MARGIN_PX * 2).max(0),
    }
}

fn draw_modal(frame: &mut [u8], width: u32, height: u32, modal: &ModalView, text: &TextPainter) {
    blend_filled_rect(
        frame,
        width,
        height,
        0,
        0,
        width as i32,
        height as i32,
        MODAL_BACKDROP_COLOR,
        MODAL_BACKDROP_ALPHA,
    );

    let panel = modal_panel_rect(width, height);
    draw_filled_rect(
        frame,
        width,
        height,
        panel.x,
        panel.y,
        panel.width,
        panel.height,
        MODAL_PANEL_COLOR,
    );
    draw_rect_outline(
        frame,
        width,
        height,
        panel.x,
        panel.y,
        panel.width,
        panel.height,
        MODAL_BORDER_COLOR,
    );

    let title_y = panel.y + MODAL_PADDING_PX;
    text.draw(
        frame,
        width,
        height,
        panel.x + MODAL_PADDING_PX,
        title_y,
        &modal.title,
        MODAL_TEXT_COLOR,
    );
    let hint_x =
        panel.x + panel.width - MODAL_PADDING_PX - text.width(MODAL_HINT_TEXT);
    text.draw(
        frame,
        width,
        height,
        hint_x,
        title_y,
        MODAL_HINT_TEXT,
        MODAL_DIM_TEXT_COLOR,
    );

    let mut content_top = title_y + LINE_ADVANCE + MODAL_PADDING_PX / 2;
    let description_width = panel.width - MODAL_PADDING_PX * 2;
    for line in text
        .wrap(&modal.description, description_width)
        .iter()
        .filter(|line| !line.is_empty())
        .take(MODAL_DESCRIPTION_MAX_LINES)
    {
        text.draw(
            frame,
            width,
            height,
            panel.x + MODAL_PADDING_PX,
            content_top,
            line,
            MODAL_DIM_TEXT_COLOR,
        );
        content_top += LINE_ADVANCE;
    }

    let footer_y = panel.y + panel.height - MODAL_PADDING_PX - LINE_ADVANCE;
    let image_area = PixelRect {
        x: panel.x + MODAL_PADDING_PX + MODAL_NAV_WIDTH_PX,
        y: content_top + MODAL_PADDING_PX / 2,
        width: panel.width - (MODAL_PADDING_PX + MODAL_NAV_WIDTH_PX) * 2,
        height: footer_y - (content_top + MODAL_PADDING_PX),
    };

    match modal.image.as_deref() {
        Some(image) => {
            let fitted = fit_within(image.width(), image.height(), image_area);
            draw_image_scaled(
                frame,
                width,
                height,
                image,
                fitted.x,
                fitted.y,
                fitted.width,
                fitted.height,
            );
        }
        None => {
            let text_x = image_area.x + (image_area.width - text.width(MODAL_EMPTY_TEXT)) / 2;
            let text_y = image_area.y + image_area.height / 2;
            text.draw(
                frame,
                width,
                height,
                text_x,
                text_y,
                MODAL_EMPTY_TEXT,
                MODAL_DIM_TEXT_COLOR,
            );
        }
    }

    if modal.show_navigation {
        let arrow_y = image_area.y + image_area.height / 2;
        text.draw(
            frame,
            width,
            height,
            panel.x + MODAL_PADDING_PX,
            arrow_y,
            "<",
            MODAL_TEXT_COLOR,
        );
        text.draw(
            frame,
            width,
            height,
            panel.x + panel.width - MODAL_PADDING_PX - text.width(">"),
            arrow_y,
            ">",
            MODAL_TEXT_COLOR,
        );
    }

    if let Some(counter) = modal.counter.as_deref() {
        let counter_x = panel.x + (panel.width - text.width(counter)) / 2;
        text.draw(
            frame,
            width,
            height,
            counter_x,
            footer_y,
            counter,
            MODAL_TEXT_COLOR,
        );
    }
}

/// Largest rect with the image's aspect ratio centred inside `area`.
fn fit_within(image_width: u32, image_height: u32, area: PixelRect) -> PixelRect {
    if image_width == 0 || image_height == 0 || area.width <= 0 || area.height <= 0 {
        return PixelRect {
            x: area.x,
            y: area.y,
            width: 0,
            height: 0,
        };
    }
    let scale = (area.width as f32 / image_width as f32).min(area.height as f32 / image_height as f32);
    let fitted_width = ((image_width as f32 * scale).round() as i32).clamp(1, area.width);
    let fitted_height = ((image_height as f32 * scale).round() as i32).clamp(1, area.height);
    PixelRect {
        x: area.x + (area.width - fitted_width) / 2,
        y: area.y + (area.height - fitted_height) / 2,
        width: fitted_width,
        height: fitted_height,
    }
}

fn draw_chat_panel(
    frame: &mut [u8],
    width: u32,
    height: u32,
    chat: &ChatPanelView,
    text: &TextPainter,
) {
    let panel = PixelRect {
        x: width as i32 - CHAT_PANEL_WIDTH_PX - CHAT_PANEL_MARGIN_PX,
        y: CHAT_PANEL_MARGIN_PX,
        width: CHAT_PANEL_WIDTH_PX,
        height: height as i32 - CHAT_PANEL_MARGIN_PX * 2,
    };
    if panel.width <= 0 || panel.height <= 0 {
        return;
    }
    blend_filled_rect(
        frame,
        width,
        height,
        panel.x,
        panel.y,
        panel.width,
        panel.height,
        CHAT_PANEL_COLOR,
        CHAT_PANEL_ALPHA,
    );
    draw_rect_outline(
        frame,
        width,
        height,
        panel.x,
        panel.y,
        panel.width,
        panel.height,
        CHAT_BORDER_COLOR,
    );

    let inner_x = panel.x + CHAT_PANEL_PADDING_PX;
    let inner_width = panel.width - CHAT_PANEL_PADDING_PX * 2;
    let mut top = panel.y + CHAT_PANEL_PADDING_PX;
    for line in &chat.settings_lines {
        text.draw(frame, width, height, inner_x, top, line, CHAT_DIM_TEXT_COLOR);
        top += LINE_ADVANCE;
    }
    if !chat.settings_lines.is_empty() {
        top += CHAT_BUBBLE_GAP_PX;
    }

    let input_y = panel.y + panel.height - CHAT_PANEL_PADDING_PX - LINE_ADVANCE;
    let input_text = if chat.sending {
        CHAT_SENDING_TEXT.to_string()
    } else {
        input_tail(text, &chat.input_line, inner_width)
    };
    text.draw(
        frame,
        width,
        height,
        inner_x,
        input_y,
        &input_text,
        CHAT_TEXT_COLOR,
    );
    draw_filled_rect(
        frame,
        width,
        height,
        inner_x,
        input_y - CHAT_BUBBLE_PADDING_PX,
        inner_width,
        1,
        CHAT_BORDER_COLOR,
    );

    // Newest bubbles sit just above the input line; older ones scroll off.
    let wrap_width = (inner_width - CHAT_BUBBLE_PADDING_PX * 2).min(CHAT_BUBBLE_MAX_WIDTH_PX);
    let mut bottom = input_y - CHAT_BUBBLE_PADDING_PX - CHAT_BUBBLE_GAP_PX;
    for bubble in chat.lines.iter().rev() {
        let wrapped = text.wrap(&bubble.text, wrap_width);
        let text_width = wrapped
            .iter()
            .map(|line| text.width(line))
            .max()
            .unwrap_or(0);
        let bubble_width = text_width + CHAT_BUBBLE_PADDING_PX * 2;
        let bubble_height = wrapped.len() as i32 * LINE_ADVANCE + CHAT_BUBBLE_PADDING_PX * 2;
        let bubble_top = bottom - bubble_height;
        if bubble_top < top {
            break;
        }
        let (bubble_x, color) = match bubble.style {
            BubbleStyle::Visitor => (
                inner_x + inner_width - bubble_width,
                CHAT_VISITOR_BUBBLE_COLOR,
            ),
            BubbleStyle::Guide => (inner_x, CHAT_GUIDE_BUBBLE_COLOR),
        };
        draw_filled_rect(
            frame,
            width,
            height,
            bubble_x,
            bubble_top,
            bubble_width,
            bubble_height,
            color,
        );
        let mut line_y = bubble_top + CHAT_BUBBLE_PADDING_PX;
        for line in &wrapped {
            text.draw(
                frame,
                width,
                height,
                bubble_x + CHAT_BUBBLE_PADDING_PX,
                line_y,
                line,
                CHAT_TEXT_COLOR,
            );
            line_y += LINE_ADVANCE;
        }
        bottom = bubble_top - CHAT_BUBBLE_GAP_PX;
    }
}

/// Prompt plus the tail of the input that fits, so the caret stays visible.
fn input_tail(text: &TextPainter, input: &str, max_width: i32) -> String {
    let prompt = "> ";
    let caret = "_";
    let available = max_width - text.width(prompt) - text.width(caret);
    let visible = text.tail_fitting(input, available);
    format!("{prompt}{visible}{caret}")
}

pub(super) fn write_pixel_rgba_clipped(
    frame: &mut [u8],
    width: usize,
    x: i32,
    y: i32,
    color: [u8; 4],
) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

pub(super) fn blend_pixel_clipped(
    frame: &mut [u8],
    width: usize,
    x: i32,
    y: i32,
    color: [u8; 3],
    alpha: u8,
) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let byte_offset = (y as usize * width + x as usize) * 4;
    let Some(pixel) = frame.get_mut(byte_offset..byte_offset + 4) else {
        return;
    };
    let alpha = u32::from(alpha);
    for (channel, source) in pixel.iter_mut().zip(color) {
        let blended = (u32::from(source) * alpha + u32::from(*channel) * (255 - alpha) + 127) / 255;
        *channel = blended as u8;
    }
    pixel[3] = 255;
}

#[allow(clippy::too_many_arguments)]
fn draw_filled_rect(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    rect_width: i32,
    rect_height: i32,
    color: [u8; 4],
) {
    let start_x = x.max(0);
    let start_y = y.max(0);
    let end_x = x.saturating_add(rect_width).min(width as i32);
    let end_y = y.saturating_add(rect_height).min(height as i32);
    for py in start_y..end_y {
        for px in start_x..end_x {
            write_pixel_rgba_clipped(frame, width as usize, px, py, color);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_rect_outline(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    rect_width: i32,
    rect_height: i32,
    color: [u8; 4],
) {
    if rect_width <= 1 || rect_height <= 1 {
        return;
    }
    draw_filled_rect(frame, width, height, x, y, rect_width, 1, color);
    draw_filled_rect(frame, width, height, x, y + rect_height - 1, rect_width, 1, color);
    draw_filled_rect(frame, width, height, x, y, 1, rect_height, color);
    draw_filled_rect(frame, width, height, x + rect_width - 1, y, 1, rect_height, color);
}

#[allow(clippy::too_many_arguments)]
fn blend_filled_rect(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    rect_width: i32,
    rect_height: i32,
    color: [u8; 3],
    alpha: u8,
) {
    let start_x = x.max(0);
    let start_y = y.max(0);
    let end_x = x.saturating_add(rect_width).min(width as i32);
    let end_y = y.saturating_add(rect_height).min(height as i32);
    for py in start_y..end_y {
        for px in start_x..end_x {
            blend_pixel_clipped(frame, width as usize, px, py, color, alpha);
        }
    }
}

/// Outline where every pixel is blended exactly once, corners included.
#[allow(clippy::too_many_arguments)]
fn blend_rect_outline(
    frame: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    rect_width: i32,
    rect_height: i32,
    color: [u8; 3],
    alpha: u8,
) {
    if rect_width <= 1 || rect_height <= 1 {
        return;
    }
    let inner_height = rect_height - 2;
    blend_filled_rect(frame, width, height, x, y, rect_width, 1, color, alpha);
    blend_filled_rect(
        frame,
        width,
        height,
        x,
        y + rect_height - 1,
        rect_width,
        1,
        color,
        alpha,
    );
    blend_filled_rect(frame, width, height, x, y + 1, 1, inner_height, color, alpha);
    blend_filled_rect(
        frame,
        width,
        height,
        x + rect_width - 1,
        y + 1,
        1,
        inner_height,
        color,
        alpha,
    );
}

/// Nearest-neighbour blit of `image` stretched to the destination rect.
/// Fully transparent source pixels are skipped, partial alpha is blended.
#[allow(clippy::too_many_arguments)]
fn draw_image_scaled(
    frame: &mut [u8],
    width: u32,
    height: u32,
    image: &LoadedImage,
    dest_x: i32,
    dest_y: i32,
    dest_width: i32,
    dest_height: i32,
) {
    if dest_width <= 0 || dest_height <= 0 || width == 0 || height == 0 {
        return;
    }
    let draw_left = dest_x.max(0);
    let draw_top = dest_y.max(0);
    let draw_right = dest_x.saturating_add(dest_width).min(width as i32);
    let draw_bottom = dest_y.saturating_add(dest_height).min(height as i32);
    if draw_left >= draw_right || draw_top >= draw_bottom {
        return;
    }

    let x_ratio = image.width() as f32 / dest_width as f32;
    let y_ratio = image.height() as f32 / dest_height as f32;
    for out_y in draw_top..draw_bottom {
        let src_y = (((out_y - dest_y) as f32 * y_ratio) as u32).min(image.height() - 1);
        for out_x in draw_left..draw_right {
            let src_x = (((out_x - dest_x) as f32 * x_ratio) as u32).min(image.width() - 1);
            let [r, g, b, a] = image.pixel(src_x, src_y);
            match a {
                0 => {}
                255 => write_pixel_rgba_clipped(frame, width as usize, out_x, out_y, [r, g, b, 255]),
                _ => blend_pixel_clipped(frame, width as usize, out_x, out_y, [r, g, b], a),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ChatLineView;

    const CANVAS: Viewport = Viewport {
        width: 200,
        height: 150,
    };

    fn blank_frame(canvas: Viewport) -> Vec<u8> {
        vec![0u8; canvas.width as usize * canvas.height as usize * 4]
    }

    fn pixel_at(frame: &[u8], canvas: Viewport, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * canvas.width as usize + x as usize) * 4;
        [
            frame[offset],
            frame[offset + 1],
            frame[offset + 2],
            frame[offset + 3],
        ]
    }

    fn solid_image(width: u32, height: u32, color: [u8; 4]) -> Arc<LoadedImage> {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Arc::new(LoadedImage::from_rgba(width, height, rgba).expect("image"))
    }

    #[test]
    fn renderer_type_is_non_generic() {
        let _renderer: Option<Renderer> = None;
    }

    #[test]
    fn empty_world_clears_to_background_color() {
        let world = SceneWorld::new(CANVAS);
        let mut frame = blank_frame(CANVAS);
        compose_frame(&mut frame, CANVAS, &world, &TextPainter::builtin());
        assert!(frame.chunks_exact(4).all(|pixel| pixel == CLEAR_COLOR));
    }

    #[test]
    fn background_is_stretched_over_the_whole_canvas() {
        let mut world = SceneWorld::new(CANVAS);
        world.set_background(Some(solid_image(2, 2, [10, 200, 30, 255])));
        let mut frame = blank_frame(CANVAS);
        compose_frame(&mut frame, CANVAS, &world, &TextPainter::builtin());
        assert_eq!(pixel_at(&frame, CANVAS, 0, 0), [10, 200, 30, 255]);
        assert_eq!(pixel_at(&frame, CANVAS, 199, 149), [10, 200, 30, 255]);
    }

    #[test]
    fn missing_actor_image_draws_blue_placeholder() {
        let mut world = SceneWorld::new(CANVAS);
        world.set_actor(Some(ActorVisual {
            bounds: Rect::new(10.0, 20.0, 40.0, 60.0),
            image: None,
        }));
        let mut frame = blank_frame(CANVAS);
        compose_frame(&mut frame, CANVAS, &world, &TextPainter::builtin());
        assert_eq!(pixel_at(&frame, CANVAS, 10, 20), PLACEHOLDER_COLOR);
        assert_eq!(pixel_at(&frame, CANVAS, 49, 79), PLACEHOLDER_COLOR);
        assert_eq!(pixel_at(&frame, CANVAS, 50, 80), CLEAR_COLOR);
    }

    #[test]
    fn actor_sprite_transparent_pixels_keep_the_background() {
        let mut world = SceneWorld::new(CANVAS);
        world.set_actor(Some(ActorVisual {
            bounds: Rect::new(0.0, 0.0, 4.0, 4.0),
            image: Some(solid_image(1, 1, [255, 0, 0, 0])),
        }));
        let mut frame = blank_frame(CANVAS);
        compose_frame(&mut frame, CANVAS, &world, &TextPainter::builtin());
        assert_eq!(pixel_at(&frame, CANVAS, 1, 1), CLEAR_COLOR);
    }

    #[test]
    fn region_outline_is_half_transparent_yellow_and_two_pixels_wide() {
        let mut world = SceneWorld::new(CANVAS);
        world.set_region_markers(vec![RegionMarker {
            bounds: Rect::new(50.0, 60.0, 80.0, 40.0),
            label: "Hall".to_string(),
        }]);
        let mut frame = blank_frame(CANVAS);
        compose_frame(&mut frame, CANVAS, &world, &TextPainter::builtin());

        let outline = pixel_at(&frame, CANVAS, 90, 60);
        assert!(outline[0] > 130 && outline[0] < 145, "{outline:?}");
        assert!(outline[2] < CLEAR_COLOR[2], "{outline:?}");
        assert_eq!(pixel_at(&frame, CANVAS, 90, 59), outline);
        assert_eq!(pixel_at(&frame, CANVAS, 90, 61), CLEAR_COLOR);
        assert_eq!(pixel_at(&frame, CANVAS, 90, 80), CLEAR_COLOR);
    }

    #[test]
    fn region_label_plate_sits_above_the_area() {
        let mut world = SceneWorld::new(CANVAS);
        world.set_region_markers(vec![RegionMarker {
            bounds: Rect::new(50.0, 60.0, 80.0, 40.0),
            label: "Hall".to_string(),
        }]);
        let mut frame = blank_frame(CANVAS);
        compose_frame(&mut frame, CANVAS, &world, &TextPainter::builtin());

        let plate = pixel_at(&frame, CANVAS, 51, 36);
        assert!(plate[0] > 200 && plate[1] > 200 && plate[2] > 200, "{plate:?}");
        let plate_pixels = (35..55)
            .flat_map(|y| (50..90).map(move |x| (x, y)))
            .map(|(x, y)| pixel_at(&frame, CANVAS, x, y))
            .collect::<Vec<_>>();
        assert!(plate_pixels.contains(&LABEL_TEXT_COLOR));
    }

    #[test]
    fn modal_dims_canvas_and_draws_panel() {
        let canvas = Viewport {
            width: 400,
            height: 300,
        };
        let mut world = SceneWorld::new(canvas);
        world.set_modal(Some(ModalView {
            title: "Hall".to_string(),
            description: String::new(),
            image: None,
            counter: None,
            show_navigation: false,
        }));
        let mut frame = blank_frame(canvas);
        compose_frame(&mut frame, canvas, &world, &TextPainter::builtin());

        let backdrop = pixel_at(&frame, canvas, 2, 2);
        assert!(backdrop[0] < CLEAR_COLOR[0]);
        assert_eq!(pixel_at(&frame, canvas, 100, 70), MODAL_PANEL_COLOR);
        assert_eq!(pixel_at(&frame, canvas, 60, 60), MODAL_BORDER_COLOR);
    }

    #[test]
    fn fit_within_preserves_aspect_and_centres() {
        let area = PixelRect {
            x: 10,
            y: 10,
            width: 200,
            height: 100,
        };
        let fitted = fit_within(400, 400, area);
        assert_eq!(
            fitted,
            PixelRect {
                x: 60,
                y: 10,
                width: 100,
                height: 100
            }
        );

        let wide = fit_within(1000, 100, area);
        assert_eq!(wide.width, 200);
        assert_eq!(wide.height, 20);
        assert_eq!(wide.y, 50);

        assert_eq!(fit_within(0, 10, area).width, 0);
    }

    #[test]
    fn chat_panel_draws_visitor_bubbles_on_the_right() {
        let canvas = Viewport {
            width: 400,
            height: 300,
        };
        let mut world = SceneWorld::new(canvas);
        world.set_chat_panel(Some(ChatPanelView {
            lines: vec![
                ChatLineView {
                    style: BubbleStyle::Guide,
                    text: "hello".to_string(),
                },
                ChatLineView {
                    style: BubbleStyle::Visitor,
                    text: "hi".to_string(),
                },
            ],
            input_line: "typing".to_string(),
            sending: false,
            settings_lines: Vec::new(),
        }));
        let mut frame = blank_frame(canvas);
        compose_frame(&mut frame, canvas, &world, &TextPainter::builtin());

        let panel_right = canvas.width as i32 - CHAT_PANEL_MARGIN_PX - CHAT_PANEL_PADDING_PX;
        let found_visitor = (0..canvas.height).any(|y| {
            pixel_at(&frame, canvas, (panel_right - 2) as u32, y) == CHAT_VISITOR_BUBBLE_COLOR
        });
        assert!(found_visitor);
        let panel_left = canvas.width as i32 - CHAT_PANEL_MARGIN_PX - CHAT_PANEL_WIDTH_PX
            + CHAT_PANEL_PADDING_PX;
        let found_guide = (0..canvas.height).any(|y| {
            pixel_at(&frame, canvas, (panel_left + 1) as u32, y) == CHAT_GUIDE_BUBBLE_COLOR
        });
        assert!(found_guide);
    }

    #[test]
    fn chat_bubble_draws_chinese_glyphs_not_fallback_marks() {
        let canvas = Viewport {
            width: 400,
            height: 300,
        };
        let render_bubble = |bubble_text: &str| {
            let mut world = SceneWorld::new(canvas);
            world.set_chat_panel(Some(ChatPanelView {
                lines: vec![ChatLineView {
                    style: BubbleStyle::Guide,
                    text: bubble_text.to_string(),
                }],
                ..ChatPanelView::default()
            }));
            let mut frame = blank_frame(canvas);
            compose_frame(&mut frame, canvas, &world, &TextPainter::builtin());
            frame
        };

        let chinese = render_bubble("你好！我是AI导览员");
        let fallback = render_bubble("?????AI???");
        assert_ne!(chinese, fallback);
        assert!(chinese
            .chunks_exact(4)
            .any(|pixel| pixel == CHAT_TEXT_COLOR));
    }

    #[test]
    fn modal_draws_description_below_the_title() {
        let canvas = Viewport {
            width: 400,
            height: 300,
        };
        let render_modal = |description: &str| {
            let mut world = SceneWorld::new(canvas);
            world.set_modal(Some(ModalView {
                title: "甲午海战".to_string(),
                description: description.to_string(),
                ..ModalView::default()
            }));
            let mut frame = blank_frame(canvas);
            compose_frame(&mut frame, canvas, &world, &TextPainter::builtin());
            frame
        };

        let with_description = render_modal("北洋海军全军覆没");
        let without = render_modal("");
        let description_top =
            (MODAL_MARGIN_PX + MODAL_PADDING_PX + LINE_ADVANCE + MODAL_PADDING_PX / 2) as u32;
        let description_row_has_text = |frame: &[u8]| {
            (description_top..description_top + LINE_ADVANCE as u32).any(|y| {
                (0..canvas.width).any(|x| pixel_at(frame, canvas, x, y) == MODAL_DIM_TEXT_COLOR)
            })
        };
        assert!(description_row_has_text(&with_description));
        assert!(!description_row_has_text(&without));
    }

    #[test]
    fn input_tail_keeps_the_end_of_long_input_visible() {
        let text = TextPainter::builtin();
        assert_eq!(input_tail(&text, "abc", 20 * 8), "> abc_");
        assert_eq!(input_tail(&text, "abcdefghij", 8 * 8), "> fghij_");
        assert_eq!(input_tail(&text, "你好", 2 * 8), "> _");
        assert_eq!(input_tail(&text, "你好", 5 * 8), "> 好_");
    }

    #[test]
    fn drawing_outside_tiny_frames_is_safe() {
        let canvas = Viewport {
            width: 1,
            height: 1,
        };
        let mut world = SceneWorld::new(canvas);
        world.set_region_markers(vec![RegionMarker {
            bounds: Rect::new(-50.0, -50.0, 10.0, 10.0),
            label: "X".to_string(),
        }]);
        world.set_modal(Some(ModalView::default()));
        world.set_chat_panel(Some(ChatPanelView::default()));
        let mut frame = blank_frame(canvas);
        compose_frame(&mut frame, canvas, &world, &TextPainter::builtin());
        assert_eq!(frame.len(), 4);
    }
}
