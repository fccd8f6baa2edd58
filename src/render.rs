use crate::color::{format_tick, parse_hex, ColorScale, ValueRange};
use crate::config::StyleConfig;
use crate::projection::{scope_extent, Projection, Viewport};
use crate::types::{RegionCollection, RegionValues};
use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, bail, Context, Result};
use geo::{BoundingRect, Contains, Coord, MapCoords, MultiPolygon, Point};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use rstar::{RTree, RTreeObject, AABB};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

const TEXT_COLOR: Rgba<u8> = Rgba([0x2a, 0x3f, 0x5f, 255]);
const FONT_SIZE: f32 = 13.0;
const TITLE_SIZE: f32 = 14.0;
const BAR_WIDTH: u32 = 18;
const TICK_COUNT: usize = 5;

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// A region as drawn, in figure pixel coordinates.
#[derive(Debug, Clone)]
pub struct ProjectedRegion {
    pub id: String,
    pub value: Option<f64>,
    pub outline: MultiPolygon<f64>,
}

// Wrapper for RTree indexing
#[derive(Debug, Clone)]
struct RegionIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Pixel -> region lookup for drawn outlines.
#[derive(Clone)]
pub struct RegionLookup {
    regions: Vec<ProjectedRegion>,
    tree: RTree<RegionIndex>,
}

impl RegionLookup {
    pub fn new(regions: Vec<ProjectedRegion>) -> Self {
        let items: Vec<RegionIndex> = regions
            .iter()
            .enumerate()
            .filter_map(|(i, region)| {
                let rect = region.outline.bounding_rect()?;
                Some(RegionIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self { regions, tree: RTree::bulk_load(items) }
    }

    /// The region covering pixel position `(x, y)`; the last drawn wins where outlines overlap.
    pub fn region_at(&self, x: f64, y: f64) -> Option<&ProjectedRegion> {
        let point = Point::new(x, y);
        let envelope = AABB::from_point([x, y]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|candidate| self.regions[candidate.index].outline.contains(&point))
            .map(|candidate| candidate.index)
            .max()
            .map(|index| &self.regions[index])
    }

    pub fn get(&self, id: &str) -> Option<&ProjectedRegion> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn regions(&self) -> &[ProjectedRegion] {
        &self.regions
    }
}

/// A rendered choropleth: the raster plus what is needed to inspect it.
pub struct Figure {
    image: RgbaImage,
    title: String,
    range: ValueRange,
    lookup: RegionLookup,
}

impl Figure {
    /// Draw every region colored by its value; regions without one get the missing color.
    pub fn render(
        regions: &RegionCollection,
        values: &RegionValues,
        style: &StyleConfig,
        value_column: &str,
    ) -> Result<Self> {
        let background = parse_hex(&style.background).context("Invalid background color")?;
        let missing = parse_hex(&style.missing_color).context("Invalid missing_color")?;
        let border = style
            .border_color
            .as_deref()
            .map(parse_hex)
            .transpose()
            .context("Invalid border_color")?;

        let range = match style.range {
            Some([min, max]) => ValueRange::new(min, max),
            None => ValueRange::from_values(
                regions.regions.iter().filter_map(|r| values.get(&r.id).copied()),
            ),
        };

        if style.width == 0 || style.height == 0 {
            bail!("Figure size must be non-zero, got {}x{}", style.width, style.height);
        }
        let margin = style.margin;
        let legend_width = if style.legend { style.legend_width } else { 0 };
        let reserved_x = margin.left.checked_add(margin.right).and_then(|m| m.checked_add(legend_width));
        let reserved_y = margin.top.checked_add(margin.bottom);
        let (Some(reserved_x), Some(reserved_y)) = (reserved_x, reserved_y) else {
            bail!("Margins and legend leave no room for the map");
        };
        let plot_width = style.width.saturating_sub(reserved_x);
        let plot_height = style.height.saturating_sub(reserved_y);
        if plot_width == 0 || plot_height == 0 {
            bail!("Margins and legend leave no room for the map");
        }

        info!(
            "Rendering {} regions ({}x{}, {:?} scale over [{}, {}])",
            regions.len(), style.width, style.height, style.color_scale, range.min, range.max
        );

        let projection = Projection::for_scope(style.scope);
        let mut map = RgbaImage::from_pixel(plot_width, plot_height, background);
        let mut drawn = Vec::with_capacity(regions.len());

        match scope_extent(&projection, regions.regions.iter().map(|r| &r.geometry)) {
            Some(extent) => {
                let frame = (0.0, 0.0, plot_width as f64, plot_height as f64);
                let viewport = Viewport::fit(projection, extent, frame);

                for region in &regions.regions {
                    let value = values.get(&region.id).copied();
                    let fill = match value {
                        Some(v) => style.color_scale.color_at(range.normalize(v)),
                        None => missing,
                    };
                    let outline = viewport.project_geometry(&region.geometry);
                    fill_multipolygon(&mut map, &outline, fill);
                    drawn.push(ProjectedRegion { id: region.id.clone(), value, outline });
                }

                if let Some(border) = border {
                    for region in &drawn {
                        stroke_multipolygon(&mut map, &region.outline, border);
                    }
                }
            }
            None => warn!("No geometry to draw"),
        }

        let mut image = RgbaImage::from_pixel(style.width, style.height, background);
        image::imageops::overlay(&mut image, &map, margin.left as i64, margin.top as i64);

        let (dx, dy) = (margin.left as f64, margin.top as f64);
        for region in &mut drawn {
            region.outline = region.outline.map_coords(|c| Coord { x: c.x + dx, y: c.y + dy });
        }

        let title = style.label_for(value_column).to_string();

        if style.legend {
            let font = load_font(style.font.as_deref())?;
            let legend = LegendBox {
                x: margin.left + plot_width,
                y: margin.top,
                width: legend_width,
                height: plot_height,
            };
            draw_colorbar(&mut image, &legend, style.color_scale, &range, &title, font.as_ref());
        }

        Ok(Self { image, title, range, lookup: RegionLookup::new(drawn) })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn lookup(&self) -> &RegionLookup {
        &self.lookup
    }

    pub fn region(&self, id: &str) -> Option<&ProjectedRegion> {
        self.lookup.get(id)
    }

    pub fn region_at(&self, x: f64, y: f64) -> Option<&ProjectedRegion> {
        self.lookup.region_at(x, y)
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buffer, ImageFormat::Png)
            .context("Failed to encode figure as PNG")?;
        Ok(buffer.into_inner())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("Failed to write image {:?}", path))?;
        info!("Saved figure to {:?}", path);
        Ok(())
    }
}

// Even-odd scanline fill sampled at pixel centers, so holes stay open.
fn fill_multipolygon(image: &mut RgbaImage, shape: &MultiPolygon<f64>, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    let mut crossings: Vec<f64> = Vec::new();

    for polygon in shape {
        let Some(bbox) = polygon.bounding_rect() else { continue };

        let edges: Vec<(Coord<f64>, Coord<f64>)> = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .flat_map(|ring| ring.lines().map(|line| (line.start, line.end)))
            .collect();

        let first_row = (bbox.min().y - 0.5).ceil().max(0.0);
        let last_row = (bbox.max().y - 0.5).floor().min(height as f64 - 1.0);
        if last_row < first_row {
            continue;
        }

        for row in first_row as u32..=last_row as u32 {
            let sy = row as f64 + 0.5;
            crossings.clear();
            for (a, b) in &edges {
                if (a.y <= sy && b.y > sy) || (b.y <= sy && a.y > sy) {
                    crossings.push(a.x + (sy - a.y) / (b.y - a.y) * (b.x - a.x));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));

            for span in crossings.chunks_exact(2) {
                let start = (span[0] - 0.5).ceil().max(0.0);
                let end = (span[1] - 0.5).ceil().min(width as f64);
                if end <= start {
                    continue;
                }
                for col in start as u32..end as u32 {
                    image.put_pixel(col, row, color);
                }
            }
        }
    }
}

fn stroke_multipolygon(image: &mut RgbaImage, shape: &MultiPolygon<f64>, color: Rgba<u8>) {
    let (width, height) = (image.width() as f64, image.height() as f64);

    for polygon in shape {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for line in ring.lines() {
                let (a, b) = (line.start, line.end);
                // Off-canvas segments cost a full line walk for nothing
                if (a.x < 0.0 && b.x < 0.0)
                    || (a.y < 0.0 && b.y < 0.0)
                    || (a.x >= width && b.x >= width)
                    || (a.y >= height && b.y >= height)
                {
                    continue;
                }
                draw_line_segment_mut(
                    image,
                    ((a.x - 0.5) as f32, (a.y - 0.5) as f32),
                    ((b.x - 0.5) as f32, (b.y - 0.5) as f32),
                    color,
                );
            }
        }
    }
}

struct LegendBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

fn draw_colorbar(
    image: &mut RgbaImage,
    legend: &LegendBox,
    scale: ColorScale,
    range: &ValueRange,
    title: &str,
    font: Option<&FontVec>,
) {
    if legend.width < BAR_WIDTH + 8 || legend.height < 40 {
        warn!("Legend area too small, skipping colorbar");
        return;
    }

    let bar_height = (legend.height as f64 * 0.7) as u32;
    let bar_x = legend.x + 12;
    let bar_y = legend.y + (legend.height - bar_height) / 2;

    for i in 0..bar_height {
        let t = 1.0 - i as f64 / (bar_height - 1).max(1) as f64;
        draw_filled_rect_mut(
            image,
            Rect::at(bar_x as i32, (bar_y + i) as i32).of_size(BAR_WIDTH, 1),
            scale.color_at(t),
        );
    }
    draw_hollow_rect_mut(
        image,
        Rect::at(bar_x as i32, bar_y as i32).of_size(BAR_WIDTH, bar_height),
        TEXT_COLOR,
    );

    let tick_x = (bar_x + BAR_WIDTH) as f32;
    for tick in range.ticks(TICK_COUNT) {
        let y = bar_y as f64 + (1.0 - range.normalize(tick)) * (bar_height - 1) as f64;
        draw_line_segment_mut(image, (tick_x, y as f32), (tick_x + 4.0, y as f32), TEXT_COLOR);

        if let Some(font) = font {
            draw_text_mut(
                image,
                TEXT_COLOR,
                (tick_x + 7.0) as i32,
                y as i32 - (FONT_SIZE / 2.0) as i32,
                PxScale::from(FONT_SIZE),
                font,
                &format_tick(tick),
            );
        }
    }

    if let Some(font) = font {
        let title_y = bar_y as i32 - (TITLE_SIZE * 1.8) as i32;
        draw_text_mut(
            image,
            TEXT_COLOR,
            bar_x as i32,
            title_y.max(0),
            PxScale::from(TITLE_SIZE),
            font,
            title,
        );
    }
}

/// Font for legend text. A configured font must load; otherwise common system fonts are tried.
fn load_font(configured: Option<&Path>) -> Result<Option<FontVec>> {
    if let Some(path) = configured {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read font {:?}", path))?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| anyhow!("Invalid font {:?}: {}", path, e))?;
        return Ok(Some(font));
    }

    for candidate in FONT_CANDIDATES {
        if let Ok(bytes) = std::fs::read(candidate) {
            if let Ok(font) = FontVec::try_from_vec(bytes) {
                debug!("Using font {}", candidate);
                return Ok(Some(font));
            }
        }
    }

    warn!("No usable system font found; legend drawn without labels");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn image_with(shape: &MultiPolygon<f64>) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        fill_multipolygon(&mut image, shape, Rgba([255, 255, 255, 255]));
        image
    }

    fn lit(image: &RgbaImage) -> usize {
        image.pixels().filter(|p| p.0[0] == 255).count()
    }

    #[test]
    fn fill_covers_pixel_centers_inside() {
        let square = MultiPolygon::new(vec![polygon![
            (x: 2., y: 2.), (x: 6., y: 2.), (x: 6., y: 6.), (x: 2., y: 6.), (x: 2., y: 2.)
        ]]);
        let image = image_with(&square);
        assert_eq!(lit(&image), 16);
        assert_eq!(image.get_pixel(2, 2).0[0], 255);
        assert_eq!(image.get_pixel(6, 6).0[0], 0);
    }

    #[test]
    fn fill_leaves_holes_open() {
        let donut = MultiPolygon::new(vec![polygon!(
            exterior: [(x: 1., y: 1.), (x: 9., y: 1.), (x: 9., y: 9.), (x: 1., y: 9.), (x: 1., y: 1.)],
            interiors: [[(x: 3., y: 3.), (x: 7., y: 3.), (x: 7., y: 7.), (x: 3., y: 7.), (x: 3., y: 3.)]]
        )]);
        let image = image_with(&donut);
        assert_eq!(lit(&image), 64 - 16);
        assert_eq!(image.get_pixel(5, 5).0[0], 0);
        assert_eq!(image.get_pixel(1, 5).0[0], 255);
    }

    #[test]
    fn fill_clips_to_canvas() {
        let huge = MultiPolygon::new(vec![polygon![
            (x: -50., y: -50.), (x: 50., y: -50.), (x: 50., y: 50.), (x: -50., y: -50.)
        ]]);
        let image = image_with(&huge);
        assert!(lit(&image) > 0);
    }

    #[test]
    fn lookup_prefers_the_region_drawn_last() {
        let below = ProjectedRegion {
            id: "below".into(),
            value: None,
            outline: MultiPolygon::new(vec![polygon![
                (x: 0., y: 0.), (x: 10., y: 0.), (x: 10., y: 10.), (x: 0., y: 10.), (x: 0., y: 0.)
            ]]),
        };
        let above = ProjectedRegion {
            id: "above".into(),
            value: Some(1.0),
            outline: MultiPolygon::new(vec![polygon![
                (x: 4., y: 4.), (x: 6., y: 4.), (x: 6., y: 6.), (x: 4., y: 6.), (x: 4., y: 4.)
            ]]),
        };
        let lookup = RegionLookup::new(vec![below, above]);
        assert_eq!(lookup.region_at(5.0, 5.0).unwrap().id, "above");
        assert_eq!(lookup.region_at(1.0, 1.0).unwrap().id, "below");
        assert!(lookup.region_at(20.0, 20.0).is_none());
    }
}
