mod decoder;

pub use decoder::*;

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{OsmCanvasError, Result};

/// Geographic bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// Width of the box in degrees longitude
    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height of the box in degrees latitude
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Centre as `(lon, lat)`
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// True when every edge is finite and neither span is negative.
    ///
    /// Zero spans are valid here; projecting them fails later.
    pub fn is_valid(&self) -> bool {
        [self.min_lon, self.max_lon, self.min_lat, self.max_lat]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lon <= self.max_lon
            && self.min_lat <= self.max_lat
    }

    /// Area in square degrees, the unit the map API limits requests by
    pub fn area_deg2(&self) -> f64 {
        self.lon_span().abs() * self.lat_span().abs()
    }

    /// Approximate area in square kilometers
    pub fn area_km2(&self) -> f64 {
        let (center_lon, center_lat) = self.center();

        let width_km = Haversine.distance(
            Point::new(self.min_lon, center_lat),
            Point::new(self.max_lon, center_lat),
        ) / 1000.0;
        let height_km = Haversine.distance(
            Point::new(center_lon, self.min_lat),
            Point::new(center_lon, self.max_lat),
        ) / 1000.0;

        width_km * height_km
    }

    /// The `bbox` query value: left, bottom, right, top
    pub fn to_query(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// A map node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
}

impl Node {
    pub fn new(id: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            id: id.into(),
            lon,
            lat,
        }
    }
}

/// An ordered polyline over node ids
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Way {
    pub id: String,
    pub node_refs: Vec<String>,
    pub tags: HashMap<String, String>,
}

impl Way {
    pub fn new(id: impl Into<String>, node_refs: Vec<String>) -> Self {
        Self {
            id: id.into(),
            node_refs,
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.tags.get("name").map(|s| s.as_str())
    }

    /// Fewer than two nodes leaves no path to draw
    pub fn is_degenerate(&self) -> bool {
        self.node_refs.len() < 2
    }
}

/// One fetched map region.
///
/// Built once per successful fetch and never mutated afterwards; a new fetch produces
/// a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoModel {
    bounds: Bounds,
    nodes: HashMap<String, Node>,
    ways: Vec<Way>,
}

impl GeoModel {
    /// Later nodes replace earlier ones with the same id
    pub fn new(bounds: Bounds, nodes: impl IntoIterator<Item = Node>, ways: Vec<Way>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();

        Self {
            bounds,
            nodes,
            ways,
        }
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn nodes(&self) -> &HashMap<String, Node> {
        &self.nodes
    }

    pub fn ways(&self) -> &[Way] {
        &self.ways
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    /// Resolve every reference of `way`, failing on the first one that is missing
    pub fn resolve_way(&self, way: &Way) -> Result<Vec<&Node>> {
        way.node_refs
            .iter()
            .map(|node_id| {
                self.nodes
                    .get(node_id)
                    .ok_or_else(|| OsmCanvasError::DanglingReference {
                        way_id: way.id.clone(),
                        node_id: node_id.clone(),
                    })
            })
            .collect()
    }
}
