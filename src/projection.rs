use geo::{BoundingRect, Coord, MapCoords, MultiPolygon, Polygon, Rect};
use serde::Deserialize;

// Albers equal-area conics of the composite US map: parallels, origin and
// placement (scale, offset) relative to the lower 48 on the unit sphere
const LOWER_48: InsetParams = InsetParams {
    parallels: (29.5, 45.5),
    origin: (-96.6, 38.7),
    scale: 1.0,
    offset: (0.0, 0.0),
};
const ALASKA: InsetParams = InsetParams {
    parallels: (55.0, 65.0),
    origin: (-156.0, 58.5),
    scale: 0.35,
    offset: (-0.307, -0.201),
};
const HAWAII: InsetParams = InsetParams {
    parallels: (8.0, 18.0),
    origin: (-160.0, 19.9),
    scale: 1.0,
    offset: (-0.205, -0.212),
};

// Framed extents in degrees: west, south, east, north
const LOWER_48_EXTENT: [f64; 4] = [-125.0, 24.0, -66.5, 49.5];
const ALASKA_EXTENT: [f64; 4] = [-180.0, 51.0, -129.5, 71.5];
const HAWAII_EXTENT: [f64; 4] = [-160.5, 18.8, -154.5, 22.4];

/// Which part of the world a figure shows and how it is flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// United States: lower 48 in an Albers conic, Alaska and Hawaii as insets.
    Usa,
    /// Source coordinates as-is, framed around the data.
    #[default]
    Fit,
}

#[derive(Debug, Clone, Copy)]
pub enum Projection {
    Identity,
    AlbersUsa(AlbersUsa),
}

#[derive(Debug, Clone, Copy)]
struct InsetParams {
    parallels: (f64, f64),
    origin: (f64, f64),
    scale: f64,
    offset: (f64, f64),
}

#[derive(Debug, Clone, Copy)]
pub struct AlbersConic {
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
}

impl AlbersConic {
    pub fn new(lat1: f64, lat2: f64, lat0: f64, lon0: f64) -> Self {
        let (phi1, phi2, phi0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());
        let n = (phi1.sin() + phi2.sin()) / 2.0;
        let c = phi1.cos().powi(2) + 2.0 * n * phi1.sin();
        let rho0 = (c - 2.0 * n * phi0.sin()).sqrt() / n;
        Self { n, c, rho0, lon0 }
    }

    /// Unit-sphere coordinates, y pointing north.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        // Aleutians east of the antimeridian stay next to the rest of Alaska
        let dlon = (lon - self.lon0 + 540.0).rem_euclid(360.0) - 180.0;
        let rho = (self.c - 2.0 * self.n * lat.to_radians().sin()).max(0.0).sqrt() / self.n;
        let theta = self.n * dlon.to_radians();
        (rho * theta.sin(), self.rho0 - rho * theta.cos())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Inset {
    conic: AlbersConic,
    scale: f64,
    offset: (f64, f64),
}

impl Inset {
    fn from_params(p: InsetParams) -> Self {
        Self {
            conic: AlbersConic::new(p.parallels.0, p.parallels.1, p.origin.1, p.origin.0),
            scale: p.scale,
            offset: p.offset,
        }
    }

    pub fn project(&self, c: Coord<f64>) -> Coord<f64> {
        let (x, y) = self.conic.forward(c.x, c.y);
        Coord { x: x * self.scale + self.offset.0, y: y * self.scale + self.offset.1 }
    }
}

/// Lower 48 with Alaska and Hawaii moved into the lower-left corner.
#[derive(Debug, Clone, Copy)]
pub struct AlbersUsa {
    lower_48: Inset,
    alaska: Inset,
    hawaii: Inset,
}

impl Default for AlbersUsa {
    fn default() -> Self {
        Self {
            lower_48: Inset::from_params(LOWER_48),
            alaska: Inset::from_params(ALASKA),
            hawaii: Inset::from_params(HAWAII),
        }
    }
}

impl AlbersUsa {
    /// Inset responsible for a location given in degrees. Nothing in the lower 48 lies north of 50°.
    pub fn inset_for(&self, lon: f64, lat: f64) -> &Inset {
        if lat >= 50.0 {
            &self.alaska
        } else if lat < 26.0 && lon < -150.0 {
            &self.hawaii
        } else {
            &self.lower_48
        }
    }

    pub fn project(&self, c: Coord<f64>) -> Coord<f64> {
        self.inset_for(c.x, c.y).project(c)
    }

    /// A polygon goes through one inset as a whole, chosen by its bounding box center.
    pub fn project_polygon(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        let inset = match polygon.bounding_rect() {
            Some(rect) => self.inset_for(rect.center().x, rect.center().y),
            None => &self.lower_48,
        };
        polygon.map_coords(|c| inset.project(c))
    }

    pub fn extent(&self) -> Option<Rect<f64>> {
        let mut points = Vec::new();
        for (inset, box_) in [
            (&self.lower_48, LOWER_48_EXTENT),
            (&self.alaska, ALASKA_EXTENT),
            (&self.hawaii, HAWAII_EXTENT),
        ] {
            // A conic maps the lon/lat box to a curved shape; sample its edges
            points.extend(box_edges(box_).into_iter().map(|c| inset.project(c)));
        }
        bounds(points.into_iter())
    }
}

fn box_edges([west, south, east, north]: [f64; 4]) -> Vec<Coord<f64>> {
    let steps = 32;
    let mut points = Vec::with_capacity(4 * (steps + 1));
    for i in 0..=steps {
        let f = i as f64 / steps as f64;
        let lon = west + (east - west) * f;
        let lat = south + (north - south) * f;
        points.push(Coord { x: lon, y: south });
        points.push(Coord { x: lon, y: north });
        points.push(Coord { x: west, y: lat });
        points.push(Coord { x: east, y: lat });
    }
    points
}

impl Projection {
    pub fn for_scope(scope: Scope) -> Self {
        match scope {
            Scope::Usa => Projection::AlbersUsa(AlbersUsa::default()),
            Scope::Fit => Projection::Identity,
        }
    }

    pub fn project(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Identity => c,
            Projection::AlbersUsa(usa) => usa.project(c),
        }
    }

    pub fn project_polygon(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        match self {
            Projection::Identity => polygon.clone(),
            Projection::AlbersUsa(usa) => usa.project_polygon(polygon),
        }
    }
}

/// Projected extent a figure frames: the fixed US layout, or the data's own bounds.
pub fn scope_extent<'a, I>(projection: &Projection, geometries: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    match projection {
        Projection::AlbersUsa(usa) => usa.extent(),
        Projection::Identity => {
            let rects: Vec<Rect<f64>> = geometries
                .into_iter()
                .filter_map(|g| g.bounding_rect())
                .collect();
            bounds(rects.iter().flat_map(|r| [r.min(), r.max()]))
        }
    }
}

fn bounds<I: Iterator<Item = Coord<f64>>>(coords: I) -> Option<Rect<f64>> {
    let mut min = Coord { x: f64::INFINITY, y: f64::INFINITY };
    let mut max = Coord { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY };
    for c in coords.filter(|c| c.x.is_finite() && c.y.is_finite()) {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    (min.x <= max.x && min.y <= max.y).then(|| Rect::new(min, max))
}

/// Maps projected coordinates into a pixel box, keeping the aspect ratio and centering.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    projection: Projection,
    extent: Rect<f64>,
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Viewport {
    /// `frame` is `(x, y, width, height)` in pixels.
    pub fn fit(projection: Projection, extent: Rect<f64>, frame: (f64, f64, f64, f64)) -> Self {
        let (x0, y0, width, height) = frame;
        let dx = extent.width();
        let dy = extent.height();

        let scale = match (dx > 0.0, dy > 0.0) {
            (true, true) => (width / dx).min(height / dy),
            (true, false) => width / dx,
            (false, true) => height / dy,
            (false, false) => 1.0,
        };

        Self {
            projection,
            extent,
            scale,
            offset_x: x0 + (width - dx * scale) / 2.0,
            offset_y: y0 + (height - dy * scale) / 2.0,
        }
    }

    fn place(&self, p: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.offset_x + (p.x - self.extent.min().x) * self.scale,
            y: self.offset_y + (self.extent.max().y - p.y) * self.scale,
        }
    }

    /// Source coordinate to pixel position, y growing downward.
    pub fn to_pixel(&self, c: Coord<f64>) -> Coord<f64> {
        self.place(self.projection.project(c))
    }

    pub fn project_geometry(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry
            .iter()
            .map(|polygon| self.projection.project_polygon(polygon).map_coords(|c| self.place(c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Contains, Point};

    #[test]
    fn albers_origin_maps_to_zero() {
        let albers = AlbersConic::new(29.5, 45.5, 38.7, -96.6);
        let (x, y) = albers.forward(-96.6, 38.7);
        assert!(x.abs() < 1e-12);
        assert!(y.abs() < 1e-12);
    }

    #[test]
    fn albers_keeps_compass_directions() {
        let albers = AlbersConic::new(29.5, 45.5, 38.7, -96.6);
        let (west_x, _) = albers.forward(-120.0, 40.0);
        let (east_x, _) = albers.forward(-75.0, 40.0);
        let (_, south_y) = albers.forward(-96.0, 30.0);
        let (_, north_y) = albers.forward(-96.0, 48.0);
        assert!(west_x < east_x);
        assert!(south_y < north_y);
    }

    #[test]
    fn aleutians_wrap_across_the_antimeridian() {
        let alaska = AlbersConic::new(55.0, 65.0, 58.5, -156.0);
        let (west_of_line, _) = alaska.forward(-179.5, 52.0);
        let (east_of_line, _) = alaska.forward(179.5, 52.0);
        assert!(east_of_line < west_of_line);
        assert!((west_of_line - east_of_line).abs() < 0.05);
    }

    #[test]
    fn fit_keeps_aspect_and_centers() {
        let extent = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 1.0 });
        let viewport = Viewport::fit(Projection::Identity, extent, (0.0, 0.0, 100.0, 100.0));

        let top_left = viewport.to_pixel(Coord { x: 0.0, y: 1.0 });
        let bottom_right = viewport.to_pixel(Coord { x: 2.0, y: 0.0 });
        assert_eq!(top_left, Coord { x: 0.0, y: 25.0 });
        assert_eq!(bottom_right, Coord { x: 100.0, y: 75.0 });
    }

    #[test]
    fn fit_extent_covers_all_geometries() {
        let a = MultiPolygon::new(vec![polygon![(x: 0., y: 0.), (x: 1., y: 0.), (x: 1., y: 1.), (x: 0., y: 0.)]]);
        let b = MultiPolygon::new(vec![polygon![(x: 5., y: -2.), (x: 6., y: -2.), (x: 6., y: 3.), (x: 5., y: -2.)]]);
        let extent = scope_extent(&Projection::Identity, [&a, &b]).unwrap();
        assert_eq!(extent.min(), Coord { x: 0.0, y: -2.0 });
        assert_eq!(extent.max(), Coord { x: 6.0, y: 3.0 });
        assert!(scope_extent(&Projection::Identity, std::iter::empty()).is_none());
    }

    #[test]
    fn usa_extent_frames_states_and_insets() {
        let projection = Projection::for_scope(Scope::Usa);
        let extent = scope_extent(&projection, std::iter::empty()).unwrap();
        let frame = geo::Polygon::from(extent);

        let kansas = projection.project(Coord { x: -98.0, y: 38.5 });
        let anchorage = projection.project(Coord { x: -149.9, y: 61.2 });
        let honolulu = projection.project(Coord { x: -157.8, y: 21.3 });
        for p in [kansas, anchorage, honolulu] {
            assert!(frame.contains(&Point::from(p)));
        }
        // insets sit south-west of the lower 48's center
        assert!(anchorage.x < kansas.x && anchorage.y < kansas.y);
        assert!(honolulu.x < kansas.x && honolulu.y < kansas.y);
    }

    #[test]
    fn usa_routes_whole_polygons_to_one_inset() {
        let usa = AlbersUsa::default();
        let aleutian = polygon![
            (x: 178.0, y: 51.5), (x: -179.0, y: 51.5), (x: -179.0, y: 52.5), (x: 178.0, y: 52.5), (x: 178.0, y: 51.5)
        ];
        let projected = usa.project_polygon(&aleutian);
        let expected = usa.alaska.project(Coord { x: 178.0, y: 51.5 });
        assert_eq!(projected.exterior().0[0], expected);
    }
}
