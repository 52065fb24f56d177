//! Export pipeline
//!
//! Reads the annotation model and page descriptors, reprojects everything
//! into output space and drives a [`DocumentWriter`]. The model is only
//! borrowed, so a failed export leaves it exactly as it was.

use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};

use crate::assets::AssetDecoder;
use crate::error::{OverlayError, OverlayResult};
use crate::fonts::FontResolver;
use crate::geometry::{Annotation, FontFamily, FontVariant, ImageRef, PageDescriptor};
use crate::reproject::{build_draw_commands, DrawCommand, PageSize};
use crate::writer::{DocumentWriter, FontHandle, ImageHandle, Rect, TextRun};

/// Bake `annotations` into the writer's document and serialize it.
///
/// Image assets are fetched concurrently; fonts are resolved one style at a
/// time. Drawing happens strictly in page order, then insertion order.
/// `line_height` is the text line pitch as a multiple of the font size.
///
/// # Errors
///
/// Any image that fails to load aborts the export. Fonts never fail: they
/// fall back to the standard 14 set.
pub async fn export_annotations<W: DocumentWriter>(
    mut writer: W,
    annotations: &[Annotation],
    previews: &[PageDescriptor],
    fonts: &FontResolver,
    assets: &dyn AssetDecoder,
    line_height: f64,
) -> OverlayResult<Vec<u8>> {
    let outputs = (0..writer.page_count())
        .map(|index| writer.page_size(index))
        .collect::<OverlayResult<Vec<PageSize>>>()?;
    let commands = build_draw_commands(annotations, previews, &outputs, line_height)?;

    let images = embed_images(&mut writer, &commands, assets).await?;
    let font_handles = resolve_fonts(&mut writer, &commands, fonts).await?;

    for command in &commands {
        match command {
            DrawCommand::TextRun {
                page_index,
                x,
                baseline_y,
                font_size,
                text,
                style,
                color,
                ..
            } => {
                let font = font_handles
                    .get(&(style.font_family, style.variant()))
                    .copied()
                    .ok_or_else(|| OverlayError::WriterError("Text style has no font".to_string()))?;
                writer.add_text_run(
                    *page_index,
                    font,
                    &TextRun {
                        x: *x,
                        baseline_y: *baseline_y,
                        font_size: *font_size,
                        text: text.as_str(),
                        color: *color,
                    },
                )?;
            }
            DrawCommand::Image {
                page_index,
                image,
                x,
                y,
                width,
                height,
                ..
            } => {
                let handle = images
                    .get(image.as_str())
                    .copied()
                    .ok_or_else(|| OverlayError::WriterError("Image was not embedded".to_string()))?;
                writer.draw_image(
                    *page_index,
                    handle,
                    Rect {
                        x: *x,
                        y: *y,
                        width: *width,
                        height: *height,
                    },
                )?;
            }
            DrawCommand::VectorPath {
                page_index,
                subpaths,
                stroke_width,
                color,
                ..
            } => {
                writer.draw_vector_path(*page_index, subpaths, *stroke_width, *color)?;
            }
        }
    }

    let bytes = writer.finish()?;
    tracing::info!(
        "Exported {} annotations as {} draw commands ({} bytes)",
        annotations.len(),
        commands.len(),
        bytes.len()
    );
    Ok(bytes)
}

async fn embed_images<'c, W: DocumentWriter>(
    writer: &mut W,
    commands: &'c [DrawCommand],
    assets: &dyn AssetDecoder,
) -> OverlayResult<HashMap<&'c str, ImageHandle>> {
    let mut seen = HashSet::new();
    let refs: Vec<&ImageRef> = commands
        .iter()
        .filter_map(|command| match command {
            DrawCommand::Image { image, .. } => Some(image),
            _ => None,
        })
        .filter(|image| seen.insert(image.as_str()))
        .collect();
    if refs.is_empty() {
        return Ok(HashMap::new());
    }

    tracing::debug!("Fetching {} image assets", refs.len());
    let decoded = try_join_all(refs.iter().map(|image| assets.decode(image)))
        .await
        .map_err(|e| {
            tracing::error!("Image asset failed, aborting export: {}", e);
            e
        })?;

    let mut handles = HashMap::with_capacity(refs.len());
    for (image, bytes) in refs.into_iter().zip(decoded) {
        handles.insert(image.as_str(), writer.embed_image_asset(&bytes)?);
    }
    Ok(handles)
}

async fn resolve_fonts<W: DocumentWriter>(
    writer: &mut W,
    commands: &[DrawCommand],
    fonts: &FontResolver,
) -> OverlayResult<HashMap<(FontFamily, FontVariant), FontHandle>> {
    let mut handles = HashMap::new();
    for command in commands {
        let DrawCommand::TextRun { style, .. } = command else {
            continue;
        };
        let key = (style.font_family, style.variant());
        if handles.contains_key(&key) {
            continue;
        }
        let resolved = fonts.resolve(style).await;
        tracing::debug!("Resolved {:?} to {}", key, resolved.key());
        handles.insert(key, writer.resolve_font(&resolved)?);
    }
    Ok(handles)
}
