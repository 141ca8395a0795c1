use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Bounds, GeoModel, Node, Way};
use crate::{OsmCanvasError, ResponseFormat, Result};

/// What the server reports about itself in the capabilities document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `api.version.minimum`
    pub version_minimum: String,
    /// `api.version.maximum`
    pub version_maximum: Option<String>,
    /// Largest bbox the map call accepts, in square degrees
    pub area_maximum: Option<f64>,
    /// Server-side request timeout
    pub timeout_seconds: Option<u64>,
}

/// Remove a leading `<?xml ... ?>` declaration
pub fn strip_xml_prolog(body: &str) -> Result<&str> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    if !trimmed.starts_with("<?xml") {
        return Ok(body);
    }

    let end = trimmed
        .find("?>")
        .ok_or_else(|| OsmCanvasError::Parse("Unterminated XML declaration".to_string()))?;
    Ok(&trimmed[end + 2..])
}

/// Decoder for OSM API response bodies.
///
/// All knowledge of the wire schema lives here: the rest of the crate only sees
/// `GeoModel` and `Capabilities`.
pub struct OsmDecoder;

impl OsmDecoder {
    /// Decode a `map` response into a model
    pub fn decode_map(&self, body: &str, format: ResponseFormat) -> Result<GeoModel> {
        match format {
            ResponseFormat::Xml => self.decode_map_xml(body),
            ResponseFormat::Json => self.decode_map_json(body),
        }
    }

    /// Decode a `capabilities` response
    pub fn decode_capabilities(&self, body: &str, format: ResponseFormat) -> Result<Capabilities> {
        match format {
            ResponseFormat::Xml => self.decode_capabilities_xml(body),
            ResponseFormat::Json => self.decode_capabilities_json(body),
        }
    }

    fn decode_map_xml(&self, body: &str) -> Result<GeoModel> {
        let mut builder = MapBuilder::default();
        walk_xml(strip_xml_prolog(body)?, |step| match step {
            XmlStep::Element { element, parent } => builder.element(element, parent),
            XmlStep::Closed("way") => {
                builder.close_way();
                Ok(())
            }
            XmlStep::Closed(_) => Ok(()),
        })?;
        builder.finish()
    }

    fn decode_capabilities_xml(&self, body: &str) -> Result<Capabilities> {
        let mut minimum = None;
        let mut maximum = None;
        let mut area_maximum = None;
        let mut timeout_seconds = None;

        walk_xml(strip_xml_prolog(body)?, |step| {
            let XmlStep::Element { element, parent } = step else {
                return Ok(());
            };
            let name = element_name(element)?;
            match (parent, name.as_str()) {
                (None, "osm") => {}
                (None, other) => return Err(unexpected_root(other)),
                (Some("api"), "version") => {
                    minimum = attribute(element, "minimum")?;
                    maximum = attribute(element, "maximum")?;
                }
                (Some("api"), "area") => {
                    area_maximum = attribute(element, "maximum")?
                        .map(|v| parse_number::<f64>(&v, "area", "maximum"))
                        .transpose()?;
                }
                (Some("api"), "timeout") => {
                    timeout_seconds = attribute(element, "seconds")?
                        .map(|v| parse_number::<u64>(&v, "timeout", "seconds"))
                        .transpose()?;
                }
                _ => {}
            }
            Ok(())
        })?;

        let version_minimum = minimum.ok_or_else(|| {
            OsmCanvasError::Parse("Capabilities missing api.version.minimum".to_string())
        })?;

        Ok(Capabilities {
            version_minimum,
            version_maximum: maximum,
            area_maximum,
            timeout_seconds,
        })
    }

    fn decode_map_json(&self, body: &str) -> Result<GeoModel> {
        let parsed: Value = serde_json::from_str(body)
            .map_err(|e| OsmCanvasError::Parse(format!("Invalid JSON: {}", e)))?;

        let bounds_obj = parsed
            .get("bounds")
            .ok_or_else(|| OsmCanvasError::Parse("No 'bounds' object found in JSON".to_string()))?;
        let bounds = checked_bounds(Bounds::new(
            json_f64(bounds_obj, "bounds", "minlon")?,
            json_f64(bounds_obj, "bounds", "maxlon")?,
            json_f64(bounds_obj, "bounds", "minlat")?,
            json_f64(bounds_obj, "bounds", "maxlat")?,
        ))?;

        let elements = parsed
            .get("elements")
            .and_then(|e| e.as_array())
            .ok_or_else(|| OsmCanvasError::Parse("No 'elements' array found in JSON".to_string()))?;

        let mut nodes = Vec::new();
        let mut ways = Vec::new();

        for element in elements {
            let element_type = element
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| OsmCanvasError::Parse("Element missing 'type'".to_string()))?;

            match element_type {
                "node" => nodes.push(Node::new(
                    json_id(element, "node")?,
                    json_f64(element, "node", "lon")?,
                    json_f64(element, "node", "lat")?,
                )),
                "way" => ways.push(self.parse_json_way(element)?),
                _ => continue,
            }
        }

        Ok(GeoModel::new(bounds, nodes, ways))
    }

    fn parse_json_way(&self, element: &Value) -> Result<Way> {
        let mut way = Way::new(json_id(element, "way")?, Vec::new());

        if let Some(refs) = element.get("nodes").and_then(|v| v.as_array()) {
            for node_ref in refs {
                way.node_refs.push(scalar_to_string(node_ref).ok_or_else(|| {
                    OsmCanvasError::Parse(format!("Way {} has an invalid node reference", way.id))
                })?);
            }
        }

        if let Some(tags_obj) = element.get("tags").and_then(|v| v.as_object()) {
            for (key, value) in tags_obj {
                if let Some(value_str) = value.as_str() {
                    way.tags.insert(key.clone(), value_str.to_string());
                }
            }
        }

        Ok(way)
    }

    fn decode_capabilities_json(&self, body: &str) -> Result<Capabilities> {
        let parsed: Value = serde_json::from_str(body)
            .map_err(|e| OsmCanvasError::Parse(format!("Invalid JSON: {}", e)))?;

        let api = parsed
            .get("api")
            .ok_or_else(|| OsmCanvasError::Parse("No 'api' object found in JSON".to_string()))?;
        let version = api.get("version");

        let version_minimum = version
            .and_then(|v| v.get("minimum"))
            .and_then(scalar_to_string)
            .ok_or_else(|| {
                OsmCanvasError::Parse("Capabilities missing api.version.minimum".to_string())
            })?;

        Ok(Capabilities {
            version_minimum,
            version_maximum: version
                .and_then(|v| v.get("maximum"))
                .and_then(scalar_to_string),
            area_maximum: api
                .get("area")
                .and_then(|a| a.get("maximum"))
                .and_then(|v| v.as_f64()),
            timeout_seconds: api
                .get("timeout")
                .and_then(|t| t.get("seconds"))
                .and_then(|v| v.as_u64()),
        })
    }
}

/// Accumulates the elements of a `map` document
#[derive(Default)]
struct MapBuilder {
    bounds: Option<Bounds>,
    nodes: Vec<Node>,
    ways: Vec<Way>,
    current_way: Option<Way>,
}

impl MapBuilder {
    fn element(&mut self, element: &BytesStart, parent: Option<&str>) -> Result<()> {
        let name = element_name(element)?;

        match (parent, name.as_str()) {
            (None, "osm") => {}
            (None, other) => return Err(unexpected_root(other)),
            (Some("osm"), "bounds") => {
                if self.bounds.is_some() {
                    return Err(OsmCanvasError::Parse(
                        "Document contains more than one <bounds>".to_string(),
                    ));
                }
                self.bounds = Some(checked_bounds(Bounds::new(
                    coordinate(element, "bounds", "minlon")?,
                    coordinate(element, "bounds", "maxlon")?,
                    coordinate(element, "bounds", "minlat")?,
                    coordinate(element, "bounds", "maxlat")?,
                ))?);
            }
            (Some("osm"), "node") => self.nodes.push(Node::new(
                required_attribute(element, "node", "id")?,
                coordinate(element, "node", "lon")?,
                coordinate(element, "node", "lat")?,
            )),
            (Some("osm"), "way") => {
                self.current_way = Some(Way::new(
                    required_attribute(element, "way", "id")?,
                    Vec::new(),
                ));
            }
            (Some("way"), "nd") => {
                let node_ref = required_attribute(element, "nd", "ref")?;
                if let Some(way) = self.current_way.as_mut() {
                    way.node_refs.push(node_ref);
                }
            }
            (Some("way"), "tag") => {
                let key = required_attribute(element, "tag", "k")?;
                let value = required_attribute(element, "tag", "v")?;
                if let Some(way) = self.current_way.as_mut() {
                    way.tags.insert(key, value);
                }
            }
            (Some(parent), "nd") => {
                return Err(OsmCanvasError::Parse(format!(
                    "<nd> found inside <{}>, expected <way>",
                    parent
                )));
            }
            // Relations, node tags, notes and metadata carry nothing we draw
            _ => {}
        }

        Ok(())
    }

    fn close_way(&mut self) {
        if let Some(way) = self.current_way.take() {
            self.ways.push(way);
        }
    }

    fn finish(self) -> Result<GeoModel> {
        let bounds = self
            .bounds
            .ok_or_else(|| OsmCanvasError::Parse("Map document has no <bounds>".to_string()))?;
        Ok(GeoModel::new(bounds, self.nodes, self.ways))
    }
}

/// One step of a document walk
enum XmlStep<'a> {
    /// An opening or self-closing element and the name of its parent
    Element {
        element: &'a BytesStart<'a>,
        parent: Option<&'a str>,
    },
    /// An element has been closed
    Closed(&'a str),
}

/// Drive a quick-xml reader over `xml`, reporting each element with its parent and
/// each element as it closes.
fn walk_xml<F>(xml: &str, mut on_step: F) -> Result<()>
where
    F: FnMut(XmlStep<'_>) -> Result<()>,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut root_seen = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            OsmCanvasError::Parse(format!(
                "Malformed XML at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        let (element, self_closing) = match &event {
            Event::Start(element) => (element, false),
            Event::Empty(element) => (element, true),
            Event::End(_) => {
                if let Some(name) = stack.pop() {
                    on_step(XmlStep::Closed(&name))?;
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        if stack.is_empty() {
            if root_seen {
                return Err(OsmCanvasError::Parse(
                    "Document has more than one root element".to_string(),
                ));
            }
            root_seen = true;
        }

        on_step(XmlStep::Element {
            element,
            parent: stack.last().map(|s| s.as_str()),
        })?;

        let name = element_name(element)?;
        if self_closing {
            on_step(XmlStep::Closed(&name))?;
        } else {
            stack.push(name);
        }
    }

    if let Some(open) = stack.last() {
        return Err(OsmCanvasError::Parse(format!(
            "Document ended inside <{}>",
            open
        )));
    }
    if !root_seen {
        return Err(OsmCanvasError::Parse("Empty document".to_string()));
    }

    Ok(())
}

fn element_name(element: &BytesStart) -> Result<String> {
    std::str::from_utf8(element.name().as_ref())
        .map(|s| s.to_string())
        .map_err(|e| OsmCanvasError::Parse(format!("Element name is not UTF-8: {}", e)))
}

fn unexpected_root(name: &str) -> OsmCanvasError {
    OsmCanvasError::Parse(format!("Expected <osm> root element, found <{}>", name))
}

fn attribute(element: &BytesStart, key: &str) -> Result<Option<String>> {
    match element.try_get_attribute(key) {
        Ok(Some(attr)) => attr
            .unescape_value()
            .map(|v| Some(v.into_owned()))
            .map_err(|e| {
                OsmCanvasError::Parse(format!("Invalid value for attribute '{}': {}", key, e))
            }),
        Ok(None) => Ok(None),
        Err(e) => Err(OsmCanvasError::Parse(format!("Malformed attributes: {}", e))),
    }
}

fn required_attribute(element: &BytesStart, element_type: &str, key: &str) -> Result<String> {
    attribute(element, key)?.ok_or_else(|| {
        OsmCanvasError::Parse(format!("<{}> missing '{}' attribute", element_type, key))
    })
}

fn coordinate(element: &BytesStart, element_type: &str, key: &str) -> Result<f64> {
    let value = required_attribute(element, element_type, key)?;
    finite(parse_number(&value, element_type, key)?, element_type, key)
}

fn finite(value: f64, element_type: &str, key: &str) -> Result<f64> {
    if !value.is_finite() {
        return Err(OsmCanvasError::Parse(format!(
            "Non-finite {} '{}' on <{}>",
            key, value, element_type
        )));
    }
    Ok(value)
}

fn parse_number<T: std::str::FromStr>(value: &str, element_type: &str, key: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        OsmCanvasError::Parse(format!(
            "Invalid {} '{}' on <{}>",
            key, value, element_type
        ))
    })
}

fn checked_bounds(bounds: Bounds) -> Result<Bounds> {
    if !bounds.is_valid() {
        return Err(OsmCanvasError::Parse(format!(
            "Inverted or non-finite bounds: {:?}",
            bounds
        )));
    }
    Ok(bounds)
}

fn json_f64(value: &Value, element_type: &str, key: &str) -> Result<f64> {
    let number = value.get(key).and_then(|v| v.as_f64()).ok_or_else(|| {
        OsmCanvasError::Parse(format!("{} missing '{}'", element_type, key))
    })?;
    finite(number, element_type, key)
}

fn json_id(value: &Value, element_type: &str) -> Result<String> {
    value
        .get("id")
        .and_then(scalar_to_string)
        .ok_or_else(|| OsmCanvasError::Parse(format!("{} missing 'id'", element_type)))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="CGImap 0.9.3" copyright="OpenStreetMap and contributors">
 <bounds minlat="-22.0100000" minlon="-47.8890000" maxlat="-22.0010000" maxlon="-47.8800000"/>
 <node id="101" visible="true" version="3" lat="-22.0090000" lon="-47.8880000"/>
 <node id="102" visible="true" version="1" lat="-22.0055000" lon="-47.8845000">
  <tag k="highway" v="traffic_signals"/>
 </node>
 <node id="103" visible="true" version="2" lat="-22.0020000" lon="-47.8810000"/>
 <way id="201" visible="true" version="4">
  <nd ref="101"/>
  <nd ref="102"/>
  <nd ref="103"/>
  <tag k="highway" v="residential"/>
  <tag k="name" v="Rua Episcopal"/>
 </way>
 <way id="202" visible="true" version="1">
  <nd ref="103"/>
 </way>
 <relation id="301" visible="true" version="1">
  <member type="way" ref="201" role=""/>
  <tag k="type" v="route"/>
 </relation>
</osm>
"#;

    #[test]
    fn test_strip_xml_prolog() {
        assert_eq!(
            strip_xml_prolog("<?xml version=\"1.0\"?><osm/>").unwrap(),
            "<osm/>"
        );
        assert_eq!(strip_xml_prolog("<osm/>").unwrap(), "<osm/>");
        assert!(matches!(
            strip_xml_prolog("<?xml version=\"1.0\""),
            Err(OsmCanvasError::Parse(_))
        ));
    }

    #[test]
    fn test_decode_map_xml() {
        let model = OsmDecoder.decode_map(MAP_XML, ResponseFormat::Xml).unwrap();

        assert_eq!(
            *model.bounds(),
            Bounds::new(-47.889, -47.88, -22.01, -22.001)
        );
        assert_eq!(model.node_count(), 3);
        assert_eq!(model.node("102").unwrap().lat, -22.0055);

        assert_eq!(model.way_count(), 2);
        let street = &model.ways()[0];
        assert_eq!(street.id, "201");
        assert_eq!(street.node_refs, vec!["101", "102", "103"]);
        assert_eq!(street.name(), Some("Rua Episcopal"));
        assert_eq!(street.tags.len(), 2);

        // Node and relation tags never leak into ways
        assert!(model.ways()[1].tags.is_empty());
        assert!(model.ways()[1].is_degenerate());
    }

    #[test]
    fn test_decode_map_without_prolog() {
        let body = r#"<osm><bounds minlat="0" minlon="0" maxlat="1" maxlon="1"/></osm>"#;
        let model = OsmDecoder.decode_map(body, ResponseFormat::Xml).unwrap();
        assert_eq!(*model.bounds(), Bounds::new(0.0, 1.0, 0.0, 1.0));
        assert_eq!(model.way_count(), 0);
    }

    #[test]
    fn test_duplicate_way_ids_are_kept_in_order() {
        let body = r#"<osm>
            <bounds minlat="0" minlon="0" maxlat="1" maxlon="1"/>
            <way id="7"><nd ref="1"/><nd ref="2"/></way>
            <way id="7"><nd ref="3"/><nd ref="4"/></way>
            <way id="8"/>
        </osm>"#;
        let model = OsmDecoder.decode_map(body, ResponseFormat::Xml).unwrap();

        let ids: Vec<&str> = model.ways().iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["7", "7", "8"]);
        assert_eq!(model.ways()[1].node_refs, vec!["3", "4"]);
    }

    #[test]
    fn test_decode_map_rejects_malformed_documents() {
        let cases = [
            ("", "empty"),
            ("<osm><bounds minlat=\"0\"", "truncated"),
            ("<osm></way></osm>", "mismatched end tag"),
            ("<html><body/></html>", "wrong root"),
            ("<osm><node id=\"1\" lat=\"0\" lon=\"0\"/></osm>", "missing bounds"),
            (
                "<osm><bounds minlat=\"0\" minlon=\"0\" maxlat=\"1\" maxlon=\"1\"/><node id=\"1\" lat=\"north\" lon=\"0\"/></osm>",
                "bad coordinate",
            ),
            (
                "<osm><bounds minlat=\"0\" minlon=\"0\" maxlat=\"1\" maxlon=\"1\"/><way><nd ref=\"1\"/></way></osm>",
                "way without id",
            ),
            (
                "<osm><bounds minlat=\"0\" minlon=\"0\" maxlat=\"1\" maxlon=\"1\"/><node id=\"1\" lat=\"0\" lon=\"0\"><nd ref=\"2\"/></node></osm>",
                "nd outside way",
            ),
            (
                "<osm><bounds minlat=\"1\" minlon=\"0\" maxlat=\"0\" maxlon=\"1\"/></osm>",
                "inverted bounds",
            ),
            (
                "<osm><bounds minlat=\"0\" minlon=\"0\" maxlat=\"1\" maxlon=\"1\"/><node id=\"1\" lat=\"NaN\" lon=\"inf\"/></osm>",
                "non-finite node",
            ),
            (
                "<osm><bounds minlat=\"0\" minlon=\"0\" maxlat=\"1\" maxlon=\"infinity\"/></osm>",
                "infinite bounds edge",
            ),
            (
                "<osm><bounds minlat=\"NaN\" minlon=\"0\" maxlat=\"1\" maxlon=\"1\"/></osm>",
                "NaN bounds edge",
            ),
        ];

        for (body, case) in cases {
            let result = OsmDecoder.decode_map(body, ResponseFormat::Xml);
            assert!(
                matches!(result, Err(OsmCanvasError::Parse(_))),
                "{} should be a parse error, got {:?}",
                case,
                result
            );
        }
    }

    #[test]
    fn test_decode_capabilities_xml() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="OpenStreetMap server">
  <api>
    <version minimum="0.6" maximum="0.6"/>
    <area maximum="0.25"/>
    <tracepoints per_page="5000"/>
    <timeout seconds="300"/>
  </api>
  <policy/>
</osm>"#;

        let caps = OsmDecoder
            .decode_capabilities(body, ResponseFormat::Xml)
            .unwrap();
        assert_eq!(caps.version_minimum, "0.6");
        assert_eq!(caps.version_maximum.as_deref(), Some("0.6"));
        assert_eq!(caps.area_maximum, Some(0.25));
        assert_eq!(caps.timeout_seconds, Some(300));
    }

    #[test]
    fn test_decode_capabilities_requires_version() {
        let body = r#"<osm><api><area maximum="0.25"/></api></osm>"#;
        let result = OsmDecoder.decode_capabilities(body, ResponseFormat::Xml);
        assert!(matches!(result, Err(OsmCanvasError::Parse(_))));
    }

    #[test]
    fn test_decode_map_json() {
        let body = r#"{
            "version": "0.6",
            "bounds": {"minlat": -22.01, "minlon": -47.889, "maxlat": -22.001, "maxlon": -47.88},
            "elements": [
                {"type": "node", "id": 101, "lat": -22.009, "lon": -47.888},
                {"type": "node", "id": 102, "lat": -22.002, "lon": -47.881, "tags": {"amenity": "cafe"}},
                {"type": "way", "id": 201, "nodes": [101, 102], "tags": {"highway": "service"}},
                {"type": "relation", "id": 301, "members": []}
            ]
        }"#;

        let model = OsmDecoder.decode_map(body, ResponseFormat::Json).unwrap();
        assert_eq!(model.node_count(), 2);
        assert_eq!(model.way_count(), 1);
        assert_eq!(model.ways()[0].node_refs, vec!["101", "102"]);
        assert_eq!(
            model.ways()[0].tags.get("highway"),
            Some(&"service".to_string())
        );
        assert_eq!(model.node("101").unwrap().lon, -47.888);
    }

    #[test]
    fn test_decode_map_json_errors() {
        assert!(matches!(
            OsmDecoder.decode_map("not json", ResponseFormat::Json),
            Err(OsmCanvasError::Parse(_))
        ));
        assert!(matches!(
            OsmDecoder.decode_map(r#"{"elements": []}"#, ResponseFormat::Json),
            Err(OsmCanvasError::Parse(_))
        ));
    }

    #[test]
    fn test_decode_capabilities_json() {
        let body = r#"{"version": "0.6", "api": {"version": {"minimum": "0.6", "maximum": "0.6"}, "area": {"maximum": 0.25}}}"#;
        let caps = OsmDecoder
            .decode_capabilities(body, ResponseFormat::Json)
            .unwrap();
        assert_eq!(caps.version_minimum, "0.6");
        assert_eq!(caps.area_maximum, Some(0.25));
        assert_eq!(caps.timeout_seconds, None);
    }
}
