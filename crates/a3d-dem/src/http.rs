//! Remote GeoTIFF tiles addressed by a kilometre grid index.
//!
//! The default template points at swissALTI3D, which publishes one GeoTIFF per
//! 1 km x 1 km LV95 square, named after the square's south-west corner in
//! kilometres:
//! `https://data.geo.admin.ch/ch.swisstopo.swissalti3d/swissalti3d_2019_2600-1200/...`

use crate::raster::DemTile;
use crate::source::{FetchError, TileId, TileSource};
use crate::{DemError, Result};
use a3d_metrics::metric_defs;
use a3d_spatial::{Bounds, Crs};
use std::time::Duration;
use tracing::debug;

/// Default swissALTI3D URL template (2 m product, LV95, LN02 heights).
pub const SWISSALTI3D_URL_TEMPLATE: &str = "https://data.geo.admin.ch/ch.swisstopo.swissalti3d/swissalti3d_{version}_{x}-{y}/swissalti3d_{version}_{x}-{y}_2_2056_5728.tif";

/// Default swissALTI3D release.
pub const SWISSALTI3D_VERSION: &str = "2019";

/// Default tile edge length in metres.
pub const DEFAULT_TILE_SIZE_M: f64 = 1000.0;

/// HTTP tile source over a regular square tiling.
pub struct HttpTileSource {
    id: String,
    version: String,
    url_template: String,
    crs: Crs,
    tile_size: f64,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for HttpTileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTileSource")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("url_template", &self.url_template)
            .field("tile_size", &self.tile_size)
            .finish()
    }
}

impl HttpTileSource {
    /// Create a source. The template may use `{x}`, `{y}` (tile south-west
    /// corner in kilometres) and `{version}`.
    pub fn new(
        id: impl Into<String>,
        url_template: impl Into<String>,
        version: impl Into<String>,
        crs: Crs,
        tile_size: f64,
        timeout: Duration,
    ) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains("{x}") || !url_template.contains("{y}") {
            return Err(DemError::InvalidSource(format!(
                "URL template must contain {{x}} and {{y}}: {url_template}"
            )));
        }
        if !(tile_size.is_finite() && tile_size > 0.0) {
            return Err(DemError::InvalidSource(format!("invalid tile size {tile_size}")));
        }
        if !crs.is_projected() {
            return Err(DemError::InvalidSource(format!("tile CRS {crs} is not projected")));
        }

        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            id: id.into(),
            version: version.into(),
            url_template,
            crs,
            tile_size,
            client,
        })
    }

    /// swissALTI3D with the given release and timeout.
    pub fn swissalti3d(version: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::new(
            "swissalti3d",
            SWISSALTI3D_URL_TEMPLATE,
            version,
            Crs::Lv95,
            DEFAULT_TILE_SIZE_M,
            timeout,
        )
    }

    /// URL of a tile whose south-west corner is `(x, y)`.
    pub fn tile_url(&self, x: f64, y: f64) -> String {
        let (kx, ky) = tile_label(x, y);
        self.url_template
            .replace("{version}", &self.version)
            .replace("{x}", &kx)
            .replace("{y}", &ky)
    }
}

/// Tile corner in kilometres; whole kilometres print without a fraction.
fn tile_label(x: f64, y: f64) -> (String, String) {
    (format!("{}", x / 1000.0), format!("{}", y / 1000.0))
}

/// Tiles of a square tiling with edge `size` that intersect `bounds`.
///
/// Tiles that only touch `bounds` on an edge are not included. Ordered south
/// to north, then west to east.
pub fn tiling(bounds: &Bounds, size: f64) -> Vec<TileId> {
    let ix0 = (bounds.min_x / size).floor() as i64;
    let iy0 = (bounds.min_y / size).floor() as i64;
    let ix1 = ((bounds.max_x / size).ceil() as i64 - 1).max(ix0);
    let iy1 = ((bounds.max_y / size).ceil() as i64 - 1).max(iy0);

    let mut tiles = Vec::new();
    for iy in iy0..=iy1 {
        for ix in ix0..=ix1 {
            let x = ix as f64 * size;
            let y = iy as f64 * size;
            let (kx, ky) = tile_label(x, y);
            tiles.push(TileId {
                name: format!("{kx}-{ky}"),
                bounds: Bounds::new(x, y, x + size, y + size),
            });
        }
    }
    tiles
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Fatal(err.to_string())
    }
}

impl TileSource for HttpTileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn tiles_for(&self, bounds: &Bounds) -> Vec<TileId> {
        tiling(bounds, self.tile_size)
    }

    fn fetch(&self, tile: &TileId) -> std::result::Result<DemTile, FetchError> {
        let url = self.tile_url(tile.bounds.min_x, tile.bounds.min_y);
        debug!(source = %self.id, tile = %tile.name, %url, "Fetching tile");

        let response = self.client.get(&url).send().map_err(classify)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Fatal(format!("HTTP {status}")));
        }

        let bytes = response.bytes().map_err(classify)?;
        metrics::counter!(metric_defs::TILES_FETCHED.name, "source" => self.id.clone()).increment(1);
        metrics::counter!(metric_defs::BYTES_DOWNLOADED.name, "source" => self.id.clone())
            .increment(bytes.len() as u64);

        DemTile::from_bytes(&bytes).map_err(|e| FetchError::Fatal(format!("{url}: {e}")))
    }
}
