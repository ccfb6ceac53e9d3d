//! DEM lookups from ESRI ASCII grids (`.asc`).
//!
//! Grids are georeferenced in WGS84 degrees. Each point is answered by the
//! first grid that covers it, bilinearly interpolated and truncated to whole
//! meters. Points outside every grid read as 0 m.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::ElevationProvider;
use crate::errors::ElevationError;

/// One parsed ESRI ASCII grid.
#[derive(Debug, Clone)]
pub struct AsciiGrid {
    ncols: usize,
    nrows: usize,
    /// Lower-left corner of the lower-left cell.
    xll: f64,
    yll: f64,
    cellsize: f64,
    nodata: Option<f64>,
    /// Row-major, first row is the northernmost.
    values: Vec<f64>,
}

impl AsciiGrid {
    pub fn open(path: &Path) -> Result<Self, ElevationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ElevationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&text).map_err(|message| ElevationError::Grid {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let mut tokens = text.split_whitespace().peekable();
        let mut ncols = None;
        let mut nrows = None;
        let mut x = None;
        let mut y = None;
        let mut centered = false;
        let mut cellsize = None;
        let mut nodata = None;

        while let Some(&token) = tokens.peek() {
            if token.parse::<f64>().is_ok() {
                break;
            }
            tokens.next();
            let value = tokens
                .next()
                .ok_or_else(|| format!("header {token} has no value"))?
                .parse::<f64>()
                .map_err(|e| format!("header {token}: {e}"))?;
            match token.to_ascii_lowercase().as_str() {
                "ncols" => ncols = Some(count(token, value)?),
                "nrows" => nrows = Some(count(token, value)?),
                "xllcorner" => x = Some(value),
                "yllcorner" => y = Some(value),
                "xllcenter" => {
                    x = Some(value);
                    centered = true;
                }
                "yllcenter" => y = Some(value),
                "cellsize" => cellsize = Some(value),
                "nodata_value" => nodata = Some(value),
                other => return Err(format!("unknown header {other}")),
            }
        }

        let ncols = ncols.ok_or("missing ncols")?;
        let nrows = nrows.ok_or("missing nrows")?;
        let cellsize = cellsize.ok_or("missing cellsize")?;
        let (mut xll, mut yll) = (x.ok_or("missing xllcorner")?, y.ok_or("missing yllcorner")?);
        if centered {
            xll -= cellsize / 2.0;
            yll -= cellsize / 2.0;
        }
        if ncols == 0 || nrows == 0 || cellsize <= 0.0 {
            return Err("grid has no cells".to_string());
        }

        let values = tokens
            .map(|t| t.parse::<f64>().map_err(|e| format!("cell value {t}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        let cells = ncols
            .checked_mul(nrows)
            .ok_or_else(|| format!("grid of {ncols} x {nrows} cells is too large"))?;
        if values.len() != cells {
            return Err(format!("expected {cells} cell values, found {}", values.len()));
        }

        Ok(Self {
            ncols,
            nrows,
            xll,
            yll,
            cellsize,
            nodata,
            values,
        })
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.xll
            && lon <= self.xll + self.ncols as f64 * self.cellsize
            && lat >= self.yll
            && lat <= self.yll + self.nrows as f64 * self.cellsize
    }

    fn cell(&self, col: usize, row_from_south: usize) -> Option<f64> {
        let row = self.nrows - 1 - row_from_south;
        let value = self.values[row * self.ncols + col];
        match self.nodata {
            Some(nodata) if value == nodata => None,
            _ => Some(value),
        }
    }

    /// Bilinear value between the four surrounding cell centers.
    ///
    /// `None` outside the grid or when a neighbouring cell has no data.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        if !self.contains(lon, lat) {
            return None;
        }
        // Continuous cell-center coordinates, clamped at the outer half cells
        let fx = ((lon - self.xll) / self.cellsize - 0.5).clamp(0.0, (self.ncols - 1) as f64);
        let fy = ((lat - self.yll) / self.cellsize - 0.5).clamp(0.0, (self.nrows - 1) as f64);
        let (c0, r0) = (fx.floor() as usize, fy.floor() as usize);
        let (c1, r1) = ((c0 + 1).min(self.ncols - 1), (r0 + 1).min(self.nrows - 1));
        let (tx, ty) = (fx - c0 as f64, fy - r0 as f64);

        let corners = [
            (c0, r0, (1.0 - tx) * (1.0 - ty)),
            (c1, r0, tx * (1.0 - ty)),
            (c0, r1, (1.0 - tx) * ty),
            (c1, r1, tx * ty),
        ];
        let mut total = 0.0;
        for (col, row, weight) in corners {
            if weight > 0.0 {
                total += self.cell(col, row)? * weight;
            }
        }
        Some(total)
    }
}

/// A row or column count: a whole, non-negative number.
fn count(header: &str, value: f64) -> Result<usize, String> {
    if value.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&value) {
        return Err(format!(
            "header {header} must be a whole number up to {}, got {value}",
            u32::MAX
        ));
    }
    Ok(value as usize)
}

/// A stack of DEM grids searched in order.
#[derive(Debug, Clone)]
pub struct DemElevation {
    grids: Vec<(PathBuf, AsciiGrid)>,
}

impl DemElevation {
    pub fn open(paths: &[PathBuf]) -> Result<Self, ElevationError> {
        let grids = paths
            .iter()
            .map(|path| Ok((path.clone(), AsciiGrid::open(path)?)))
            .collect::<Result<Vec<_>, ElevationError>>()?;
        Ok(Self { grids })
    }

    pub fn from_grids(grids: Vec<AsciiGrid>) -> Self {
        Self {
            grids: grids.into_iter().map(|g| (PathBuf::new(), g)).collect(),
        }
    }
}

impl ElevationProvider for DemElevation {
    fn elevation(&self, lon: f64, lat: f64) -> Result<f64, ElevationError> {
        for (path, grid) in &self.grids {
            if let Some(value) = grid.sample(lon, lat) {
                return Ok(value.trunc());
            }
            if grid.contains(lon, lat) {
                debug!(path = %path.display(), lon, lat, "No DEM data at point");
            }
        }
        Ok(0.0)
    }
}
