//! Tile URL providers
//!
//! The server scheme is injected, never hardcoded. Any `Fn(TileKey) -> String`
//! works as a provider; the two schemes used by the image server are provided
//! as ready-made types and can be selected from JSON via [`UrlSource`].

use serde::{Deserialize, Serialize};

use crate::pyramid::TileKey;

/// Maps a tile key to the address its image is fetched from
pub trait TileUrlProvider {
    fn tile_url(&self, key: TileKey) -> String;
}

impl<F> TileUrlProvider for F
where
    F: Fn(TileKey) -> String,
{
    fn tile_url(&self, key: TileKey) -> String {
        self(key)
    }
}

/// `{prefix}{zoom}-{x}-{y}.{extension}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilePathTemplate {
    pub prefix: String,
    pub extension: String,
}

impl TileUrlProvider for TilePathTemplate {
    fn tile_url(&self, key: TileKey) -> String {
        format!("{}{}-{}-{}.{}", self.prefix, key.level, key.x, key.y, self.extension)
    }
}

/// `{base}?region={zoom},{x},{y}`, joined with `&` when `base` already has a query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionQuery {
    pub base: String,
}

impl TileUrlProvider for RegionQuery {
    fn tile_url(&self, key: TileKey) -> String {
        let sep = if self.base.contains('?') { '&' } else { '?' };
        format!("{}{}region={},{},{}", self.base, sep, key.level, key.x, key.y)
    }
}

/// Serializable choice of URL scheme, used by the JavaScript API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UrlSource {
    Path {
        prefix: String,
        #[serde(default = "default_extension")]
        extension: String,
    },
    Region {
        base: String,
    },
}

fn default_extension() -> String {
    "jpg".to_string()
}

impl UrlSource {
    pub fn into_provider(self) -> Box<dyn TileUrlProvider> {
        match self {
            UrlSource::Path { prefix, extension } => Box::new(TilePathTemplate { prefix, extension }),
            UrlSource::Region { base } => Box::new(RegionQuery { base }),
        }
    }
}
