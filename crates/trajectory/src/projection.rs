//! Coordinate systems of input polygons and their conversion to WGS84.
//!
//! Walking is simulated in planar meters. Projected inputs (CGCS2000
//! Gauss-Krüger zones, or a bare local plane) are used as-is; geographic
//! inputs are walked in an equirectangular frame anchored on the polygon.

use std::f64::consts::PI;
use std::str::FromStr;

use geo::Coord;

use crate::errors::ConfigError;

/// Meters per degree of latitude on a spherical earth.
const METERS_PER_DEGREE: f64 = 6_371_000.0 * PI / 180.0;

// CGCS2000 ellipsoid.
const CGCS2000_A: f64 = 6_378_137.0;
const CGCS2000_F: f64 = 1.0 / 298.257_222_101;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateSystem {
    /// Planar meters with no geographic reference; lon/lat mirror x/y.
    Local,
    /// EPSG:4326 longitude/latitude degrees.
    Wgs84,
    /// A CGCS2000 Gauss-Krüger zone.
    GaussKruger(GaussKruger),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussKruger {
    /// Central meridian in degrees east.
    pub central_meridian: f64,
    /// Includes the zone prefix for the prefixed EPSG codes.
    pub false_easting: f64,
}

impl FromStr for CoordinateSystem {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("local") || trimmed.eq_ignore_ascii_case("planar") {
            return Ok(Self::Local);
        }

        let code = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("epsg:"))
            .and_then(|_| trimmed[5..].parse::<u32>().ok())
            .ok_or_else(|| {
                ConfigError::invalid("gps.coordinate_system", format!("cannot parse {s:?}"))
            })?;

        match code {
            4326 => Ok(Self::Wgs84),
            _ => GaussKruger::from_epsg(code).map(Self::GaussKruger).ok_or_else(|| {
                ConfigError::invalid(
                    "gps.coordinate_system",
                    format!("EPSG:{code} is not a supported coordinate system"),
                )
            }),
        }
    }
}

impl CoordinateSystem {
    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Wgs84)
    }

    /// Converts a coordinate of this system to WGS84 `(lon, lat)`.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Local | Self::Wgs84 => (x, y),
            Self::GaussKruger(gk) => gk.inverse(x, y),
        }
    }
}

impl GaussKruger {
    /// Maps the CGCS2000 Gauss-Krüger EPSG codes to their zone parameters.
    pub fn from_epsg(code: u32) -> Option<Self> {
        let (central_meridian, false_easting) = match code {
            // 6-degree zones 13-23, zone number prefixed to the easting
            4491..=4501 => {
                let zone = f64::from(code - 4491 + 13);
                (zone * 6.0 - 3.0, zone * 1_000_000.0 + 500_000.0)
            }
            // 6-degree zones by central meridian 75E-135E
            4502..=4512 => (75.0 + 6.0 * f64::from(code - 4502), 500_000.0),
            // 3-degree zones 25-45, zone number prefixed to the easting
            4513..=4533 => {
                let zone = f64::from(code - 4513 + 25);
                (zone * 3.0, zone * 1_000_000.0 + 500_000.0)
            }
            // 3-degree zones by central meridian 75E-135E
            4534..=4554 => (75.0 + 3.0 * f64::from(code - 4534), 500_000.0),
            _ => return None,
        };
        Some(Self {
            central_meridian,
            false_easting,
        })
    }

    /// Inverse transverse Mercator (scale 1, no false northing).
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let a = CGCS2000_A;
        let e2 = CGCS2000_F * (2.0 - CGCS2000_F);
        let ep2 = e2 / (1.0 - e2);
        let e4 = e2 * e2;
        let e6 = e4 * e2;

        let mu = northing / (a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
        let sq = (1.0 - e2).sqrt();
        let e1 = (1.0 - sq) / (1.0 + sq);
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1) = phi1.sin_cos();
        let tan1 = phi1.tan();
        let c1 = ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let w = 1.0 - e2 * sin1 * sin1;
        let n1 = a / w.sqrt();
        let r1 = a * (1.0 - e2) / w.powf(1.5);
        let d = (easting - self.false_easting) / n1;

        let lat = phi1
            - (n1 * tan1 / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);
        let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1)
                * d.powi(5)
                / 120.0)
            / cos1;

        (self.central_meridian + lon.to_degrees(), lat.to_degrees())
    }
}

/// Converts between input coordinates and the planar meters the walk runs in.
#[derive(Debug, Clone, Copy)]
pub struct PlanarFrame {
    /// `(lon0, lat0, cos(lat0))` for geographic inputs.
    anchor: Option<(f64, f64, f64)>,
}

impl PlanarFrame {
    pub fn new(system: &CoordinateSystem, anchor: Coord) -> Self {
        let anchor = system
            .is_geographic()
            .then(|| (anchor.x, anchor.y, anchor.y.to_radians().cos()));
        Self { anchor }
    }

    pub fn to_planar(&self, c: Coord) -> Coord {
        match self.anchor {
            Some((lon0, lat0, cos0)) => Coord {
                x: (c.x - lon0) * METERS_PER_DEGREE * cos0,
                y: (c.y - lat0) * METERS_PER_DEGREE,
            },
            None => c,
        }
    }

    pub fn from_planar(&self, c: Coord) -> Coord {
        match self.anchor {
            Some((lon0, lat0, cos0)) => Coord {
                x: lon0 + c.x / (METERS_PER_DEGREE * cos0),
                y: lat0 + c.y / METERS_PER_DEGREE,
            },
            None => c,
        }
    }
}

/// Planar walking frame plus the source coordinate system of one polygon.
#[derive(Debug, Clone, Copy)]
pub struct Georeference {
    pub system: CoordinateSystem,
    pub frame: PlanarFrame,
}

impl Georeference {
    pub fn new(system: CoordinateSystem, anchor: Coord) -> Self {
        Self {
            system,
            frame: PlanarFrame::new(&system, anchor),
        }
    }

    pub fn to_planar(&self, source: Coord) -> Coord {
        self.frame.to_planar(source)
    }

    /// Planar meters back to the source coordinate system.
    pub fn to_source(&self, planar: Coord) -> Coord {
        self.frame.from_planar(planar)
    }

    /// Planar meters to WGS84 `(lon, lat)`.
    pub fn to_wgs84(&self, planar: Coord) -> (f64, f64) {
        let source = self.to_source(planar);
        self.system.to_wgs84(source.x, source.y)
    }
}
