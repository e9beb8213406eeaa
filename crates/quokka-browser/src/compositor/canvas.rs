//! Drawing display items onto a `tiny_skia` pixmap.
//!
//! Knows nothing about CSS, layout or the DOM. It executes draw commands
//! and visual effects, back to front.

use quokka_common::image::LoadedImage;
use quokka_css::paint::ImageQuality;
use quokka_css::{BlendMode, BlendOp, Color, DisplayItem, DrawCommand, DrawKind, EffectKind, FontKey};
use tiny_skia::{
    FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pattern, Pixmap, PixmapPaint, SpreadMode, Stroke,
    Transform,
};

use crate::fonts::{baseline_offset, rasterize_glyph};

/// Control-point distance for approximating a quarter circle with a cubic.
const KAPPA: f32 = 0.552_284_8;

/// Draw `items` in order.
pub(crate) fn draw_items(pixmap: &mut Pixmap, items: &[DisplayItem], transform: Transform) {
    for item in items {
        match item {
            DisplayItem::Draw(cmd) => draw_command(pixmap, cmd, transform),
            DisplayItem::Effect(effect) => match effect.kind {
                EffectKind::Transform(translation) => {
                    let transform = translation.map_or(transform, |(dx, dy)| transform.pre_translate(dx, dy));
                    draw_items(pixmap, &effect.children, transform);
                }
                EffectKind::Blend(op) => {
                    with_blend(pixmap, op, |surface| draw_items(surface, &effect.children, transform));
                }
            },
        }
    }
}

/// [Compositing and Blending § 3.1 Group opacity](https://www.w3.org/TR/compositing-1/#groupopacity)
///
/// Run `draw` on an offscreen surface the size of `pixmap`, then composite
/// it with `op`. Ops that need no group draw straight onto `pixmap`.
pub(crate) fn with_blend(pixmap: &mut Pixmap, op: BlendOp, draw: impl FnOnce(&mut Pixmap)) {
    if !op.should_save {
        draw(pixmap);
        return;
    }
    let Some(mut surface) = Pixmap::new(pixmap.width(), pixmap.height()) else {
        return;
    };
    draw(&mut surface);
    let paint = PixmapPaint {
        opacity: op.opacity,
        blend_mode: skia_blend_mode(op.mode_or_default()),
        quality: FilterQuality::Nearest,
    };
    pixmap.draw_pixmap(0, 0, surface.as_ref(), &paint, Transform::identity(), None);
}

pub(crate) const fn skia_blend_mode(mode: BlendMode) -> tiny_skia::BlendMode {
    match mode {
        BlendMode::SourceOver => tiny_skia::BlendMode::SourceOver,
        BlendMode::DestinationIn => tiny_skia::BlendMode::DestinationIn,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
        BlendMode::Difference => tiny_skia::BlendMode::Difference,
        BlendMode::Screen => tiny_skia::BlendMode::Screen,
    }
}

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

/// Execute one draw command.
pub(crate) fn draw_command(pixmap: &mut Pixmap, cmd: &DrawCommand, transform: Transform) {
    let rect = cmd.rect;
    match &cmd.kind {
        DrawKind::Rect { color } => {
            if let Some(r) = tiny_skia::Rect::from_ltrb(rect.left, rect.top, rect.right, rect.bottom) {
                pixmap.fill_rect(r, &solid(*color), transform, None);
            }
        }
        DrawKind::RRect { radius, color } => {
            if let Some(path) = rounded_rect(rect.left, rect.top, rect.right, rect.bottom, *radius) {
                pixmap.fill_path(&path, &solid(*color), FillRule::Winding, transform, None);
            }
        }
        DrawKind::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            thickness,
        } => {
            let mut builder = PathBuilder::new();
            builder.move_to(*x1, *y1);
            builder.line_to(*x2, *y2);
            if let Some(path) = builder.finish() {
                let stroke = Stroke {
                    width: *thickness,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &solid(*color), &stroke, transform, None);
            }
        }
        DrawKind::Outline { color, thickness } => {
            if let Some(r) = tiny_skia::Rect::from_ltrb(rect.left, rect.top, rect.right, rect.bottom) {
                let path = PathBuilder::from_rect(r);
                let stroke = Stroke {
                    width: *thickness,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &solid(*color), &stroke, transform, None);
            }
        }
        DrawKind::Text {
            x,
            y,
            text,
            font,
            color,
        } => draw_text(pixmap, *x, *y, text, font, *color, transform),
        DrawKind::Image { image, quality } => draw_image(pixmap, cmd, image, *quality, transform),
    }
}

/// A rectangle with quarter-circle corners.
fn rounded_rect(left: f32, top: f32, right: f32, bottom: f32, radius: f32) -> Option<tiny_skia::Path> {
    let radius = radius.min((right - left) / 2.0).min((bottom - top) / 2.0).max(0.0);
    if radius == 0.0 {
        return tiny_skia::Rect::from_ltrb(left, top, right, bottom).map(PathBuilder::from_rect);
    }
    let k = radius * KAPPA;
    let mut pb = PathBuilder::new();
    pb.move_to(left + radius, top);
    pb.line_to(right - radius, top);
    pb.cubic_to(right - radius + k, top, right, top + radius - k, right, top + radius);
    pb.line_to(right, bottom - radius);
    pb.cubic_to(right, bottom - radius + k, right - radius + k, bottom, right - radius, bottom);
    pb.line_to(left + radius, bottom);
    pb.cubic_to(left + radius - k, bottom, left, bottom - radius + k, left, bottom - radius);
    pb.line_to(left, top + radius);
    pb.cubic_to(left, top + radius - k, left + radius - k, top, left + radius, top);
    pb.close();
    pb.finish()
}

/// Draw a run of glyphs with its top-left corner at `(x, y)`.
///
/// Without a system font there is nothing to rasterise, and the run is
/// skipped.
fn draw_text(
    pixmap: &mut Pixmap,
    x: f32,
    y: f32,
    text: &str,
    font: &FontKey,
    color: Color,
    transform: Transform,
) {
    let baseline = y + baseline_offset(font);
    let mut cursor_x = x;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let Some(glyph) = rasterize_glyph(font, ch) else {
            return;
        };
        let metrics = glyph.metrics;
        let glyph_x = (cursor_x + metrics.xmin as f32).round() as i32;
        let glyph_y = (baseline - (metrics.ymin as f32 + metrics.height as f32)).round() as i32;
        cursor_x += metrics.advance_width;

        let Some(size) = IntSize::from_wh(metrics.width as u32, metrics.height as u32) else {
            continue;
        };
        // Coverage becomes premultiplied colour.
        let alpha = u32::from(color.a);
        let data = glyph
            .coverage
            .iter()
            .flat_map(|&coverage| {
                let a = u32::from(coverage) * alpha / 255;
                [
                    (u32::from(color.r) * a / 255) as u8,
                    (u32::from(color.g) * a / 255) as u8,
                    (u32::from(color.b) * a / 255) as u8,
                    a as u8,
                ]
            })
            .collect();
        if let Some(bitmap) = Pixmap::from_vec(data, size) {
            pixmap.draw_pixmap(
                glyph_x,
                glyph_y,
                bitmap.as_ref(),
                &PixmapPaint::default(),
                transform,
                None,
            );
        }
    }
}

/// A decoded image as a premultiplied pixmap.
fn image_pixmap(image: &LoadedImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let data = image
        .rgba_data()
        .chunks_exact(4)
        .flat_map(|px| {
            let a = u32::from(px[3]);
            [
                (u32::from(px[0]) * a / 255) as u8,
                (u32::from(px[1]) * a / 255) as u8,
                (u32::from(px[2]) * a / 255) as u8,
                px[3],
            ]
        })
        .collect();
    Pixmap::from_vec(data, size)
}

/// [CSS Images § 5.5 object-fit: fill](https://www.w3.org/TR/css-images-3/#valdef-object-fit-fill)
///
/// Scale the image into the command's rect.
fn draw_image(
    pixmap: &mut Pixmap,
    cmd: &DrawCommand,
    image: &LoadedImage,
    quality: ImageQuality,
    transform: Transform,
) {
    let rect = cmd.rect;
    let Some(source) = image_pixmap(image) else {
        return;
    };
    let Some(dest) = tiny_skia::Rect::from_ltrb(rect.left, rect.top, rect.right, rect.bottom) else {
        return;
    };
    let sx = rect.width() / source.width() as f32;
    let sy = rect.height() / source.height() as f32;
    let filter = match quality {
        ImageQuality::Low => FilterQuality::Nearest,
        ImageQuality::Medium => FilterQuality::Bilinear,
        ImageQuality::High => FilterQuality::Bicubic,
    };
    let mut paint = Paint::default();
    paint.shader = Pattern::new(
        source.as_ref(),
        SpreadMode::Pad,
        filter,
        1.0,
        Transform::from_row(sx, 0.0, 0.0, sy, rect.left, rect.top),
    );
    pixmap.fill_rect(dest, &paint, transform, None);
}

#[cfg(test)]
mod tests {
    use quokka_css::Rect;

    use super::*;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let px = pixmap.pixel(x, y).unwrap();
        (px.red(), px.green(), px.blue(), px.alpha())
    }

    #[test]
    fn test_rect_fill() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let cmd = DrawCommand::rect(Rect::from_xywh(5.0, 5.0, 10.0, 10.0), Color::RED);
        draw_command(&mut pixmap, &cmd, Transform::identity());
        assert_eq!(pixel(&pixmap, 10, 10), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 1, 1), (0, 0, 0, 0));
    }

    #[test]
    fn test_translucent_group() {
        let mut pixmap = Pixmap::new(10, 10).unwrap();
        let square = DisplayItem::Draw(DrawCommand::rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::RED));
        with_blend(&mut pixmap, BlendOp::new(0.5, None), |surface| {
            draw_items(surface, &[square], Transform::identity());
        });
        let (r, _, _, a) = pixel(&pixmap, 5, 5);
        assert!((126..=129).contains(&a), "alpha {a}");
        assert!(r.abs_diff(a) <= 1);
    }

    #[test]
    fn test_translation() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let items = [DisplayItem::Effect(quokka_css::VisualEffect::transform(
            Some((10.0, 0.0)),
            None,
            vec![DrawCommand::rect(Rect::from_xywh(0.0, 0.0, 5.0, 5.0), Color::BLACK).into()],
        ))];
        draw_items(&mut pixmap, &items, Transform::identity());
        assert_eq!(pixel(&pixmap, 2, 2).3, 0);
        assert_eq!(pixel(&pixmap, 12, 2), (0, 0, 0, 255));
    }

    #[test]
    fn test_rounded_rect_clamps_radius() {
        assert!(rounded_rect(0.0, 0.0, 10.0, 4.0, 50.0).is_some());
        assert!(rounded_rect(0.0, 0.0, 10.0, 10.0, 0.0).is_some());
    }
}
