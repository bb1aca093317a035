//! Template helpers registered on every compiled template.
//!
//! The URL builders take their arguments from the helper hash
//! (`{{staticMapUrl key=... center=...}}`). The hash is deserialized into a
//! typed parameter struct; a hash that does not fit the struct is a render
//! error rather than a silently empty URL.

use handlebars::{
    handlebars_helper, html_escape, Context, Handlebars, Helper, HelperResult, Output,
    RenderContext, RenderError, RenderErrorReason,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::form_urlencoded;

const STATIC_MAP_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/staticmap";
const CHART_ENDPOINT: &str = "https://quickchart.io/chart";

handlebars_helper!(eq: |a: Json, b: Json| strict_eq(a, b));

/// Strict equality: no type coercion, but numbers compare by value, so `1`
/// equals `1.0`.
fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| strict_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| strict_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Register the fixed helper set. This is the only place helpers are added,
/// so every cache entry gets an identical set.
pub fn register_builtin_helpers(registry: &mut Handlebars<'_>) {
    registry.register_helper("eq", Box::new(eq));
    registry.register_helper("staticMapUrl", Box::new(static_map_url_helper));
    registry.register_helper("chartImageUrl", Box::new(chart_image_url_helper));
}

// ---------------------------------------------------------------------------
// staticMapUrl
// ---------------------------------------------------------------------------

/// Hash arguments of `staticMapUrl`.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticMapParams {
    /// API key. Without one the helper renders an empty string.
    #[serde(default)]
    pub key: Option<String>,
    /// Either `"lat,lng"` / a place name, or `[lat, lng]`.
    #[serde(default)]
    pub center: Option<MapCenter>,
    #[serde(default = "StaticMapParams::default_zoom")]
    pub zoom: u32,
    /// `WIDTHxHEIGHT` in pixels.
    #[serde(default = "StaticMapParams::default_size")]
    pub size: String,
    #[serde(default)]
    pub markers: Vec<MapMarker>,
}

impl StaticMapParams {
    fn default_zoom() -> u32 {
        12
    }

    fn default_size() -> String {
        "600x400".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MapCenter {
    Text(String),
    Coordinates(Vec<f64>),
}

impl MapCenter {
    fn to_param(&self) -> String {
        match self {
            MapCenter::Text(s) => s.clone(),
            MapCenter::Coordinates(c) => c
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapMarker {
    #[serde(default, alias = "latitude")]
    pub lat: Option<f64>,
    #[serde(default, alias = "longitude")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl MapMarker {
    /// `color:C|label:L|lat,lng`, or `None` when a coordinate is missing.
    fn to_param(&self) -> Option<String> {
        let (lat, lng) = (self.lat?, self.lng?);
        let mut out = String::new();
        if let Some(color) = &self.color {
            out.push_str(&format!("color:{color}|"));
        }
        if let Some(label) = &self.label {
            out.push_str(&format!("label:{label}|"));
        }
        out.push_str(&format!("{lat},{lng}"));
        Some(out)
    }
}

/// Build a static map image URL. Empty when no key is given.
pub fn static_map_url(params: &StaticMapParams) -> String {
    let key = match params.key.as_deref() {
        Some(k) if !k.is_empty() => k,
        _ => return String::new(),
    };
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("key", key);
    if let Some(center) = &params.center {
        query.append_pair("center", &center.to_param());
    }
    query.append_pair("zoom", &params.zoom.to_string());
    query.append_pair("size", &params.size);
    query.append_pair("maptype", "roadmap");
    for marker in params.markers.iter().filter_map(MapMarker::to_param) {
        query.append_pair("markers", &marker);
    }
    format!("{STATIC_MAP_ENDPOINT}?{}", query.finish())
}

fn static_map_url_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let params: StaticMapParams = hash_params(h)?;
    out.write(&html_escape(&static_map_url(&params)))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// chartImageUrl
// ---------------------------------------------------------------------------

/// Hash arguments of `chartImageUrl`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChartImageParams {
    /// Chart.js configuration object. Anything else renders an empty string.
    #[serde(default)]
    pub chart: Option<Value>,
    #[serde(default)]
    pub config: ChartPalette,
    #[serde(default = "ChartImageParams::default_width")]
    pub width: u32,
    #[serde(default = "ChartImageParams::default_height")]
    pub height: u32,
}

impl ChartImageParams {
    fn default_width() -> u32 {
        680
    }

    fn default_height() -> u32 {
        340
    }
}

/// Colours substituted for the `"primary"` / `"secondary"` placeholders.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPalette {
    #[serde(default = "ChartPalette::default_primary")]
    pub primary_color: String,
    #[serde(default = "ChartPalette::default_secondary")]
    pub secondary_color: String,
}

impl ChartPalette {
    fn default_primary() -> String {
        "#2563eb".to_string()
    }

    fn default_secondary() -> String {
        "#64748b".to_string()
    }
}

impl Default for ChartPalette {
    fn default() -> Self {
        Self {
            primary_color: Self::default_primary(),
            secondary_color: Self::default_secondary(),
        }
    }
}

/// Build a chart image URL. Empty when `chart` is not an object or array.
pub fn chart_image_url(params: &ChartImageParams) -> String {
    let chart = match &params.chart {
        Some(c @ (Value::Object(_) | Value::Array(_))) => c,
        _ => return String::new(),
    };
    let chart = chart
        .to_string()
        .replace("\"primary\"", &format!("\"{}\"", params.config.primary_color))
        .replace("\"secondary\"", &format!("\"{}\"", params.config.secondary_color));
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("c", &chart)
        .append_pair("width", &params.width.to_string())
        .append_pair("height", &params.height.to_string())
        .finish();
    format!("{CHART_ENDPOINT}?{query}")
}

fn chart_image_url_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let params: ChartImageParams = hash_params(h)?;
    out.write(&html_escape(&chart_image_url(&params)))?;
    Ok(())
}

/// Deserialize a helper's hash arguments into `T`.
fn hash_params<T: DeserializeOwned>(h: &Helper) -> Result<T, RenderError> {
    let hash: Map<String, Value> = h
        .hash()
        .iter()
        .filter(|(_, v)| !v.value().is_null())
        .map(|(k, v)| (k.to_string(), v.value().clone()))
        .collect();
    serde_json::from_value(Value::Object(hash)).map_err(|e| {
        RenderErrorReason::Other(format!("invalid arguments for helper {}: {e}", h.name())).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Handlebars<'static> {
        let mut hb = Handlebars::new();
        register_builtin_helpers(&mut hb);
        hb
    }

    #[test]
    fn eq_helper() {
        let hb = registry();
        let out = hb
            .render_template(
                "{{#if (eq status \"paid\")}}PAID{{else}}OPEN{{/if}}",
                &json!({"status": "paid"}),
            )
            .unwrap();
        assert_eq!(out, "PAID");
        let out = hb
            .render_template("{{#if (eq n 1)}}one{{else}}other{{/if}}", &json!({"n": "1"}))
            .unwrap();
        assert_eq!(out, "other", "eq is strict: string \"1\" != number 1");
        let out = hb
            .render_template("{{#if (eq n 1)}}one{{else}}other{{/if}}", &json!({"n": 1.0}))
            .unwrap();
        assert_eq!(out, "one", "1.0 and 1 are the same number");
    }

    #[test]
    fn static_map_without_key_is_empty() {
        let params: StaticMapParams = serde_json::from_value(json!({"center": "Oslo"})).unwrap();
        assert_eq!(static_map_url(&params), "");
    }

    #[test]
    fn static_map_full() {
        let params: StaticMapParams = serde_json::from_value(json!({
            "key": "K",
            "center": [59.9, 10.75],
            "markers": [
                {"lat": 59.9, "lng": 10.75, "label": "A", "color": "red"},
                {"latitude": 60, "longitude": 11},
                {"lat": 1.0}
            ]
        }))
        .unwrap();
        let url = static_map_url(&params);
        assert!(url.starts_with(STATIC_MAP_ENDPOINT));
        assert!(url.contains("key=K"));
        assert!(url.contains("center=59.9%2C10.75"));
        assert!(url.contains("zoom=12"));
        assert!(url.contains("size=600x400"));
        assert!(url.contains("maptype=roadmap"));
        assert!(url.contains("markers=color%3Ared%7Clabel%3AA%7C59.9%2C10.75"));
        assert!(url.contains("markers=60%2C11"));
        assert_eq!(url.matches("markers=").count(), 2);
    }

    #[test]
    fn chart_palette_substitution() {
        let params: ChartImageParams = serde_json::from_value(json!({
            "chart": {"type": "bar", "color": "primary"},
            "config": {"secondaryColor": "#000"}
        }))
        .unwrap();
        let url = chart_image_url(&params);
        assert!(url.starts_with(CHART_ENDPOINT));
        assert!(url.contains("%232563eb"), "primary default applied: {url}");
        assert!(url.contains("width=680"));
        assert!(url.contains("height=340"));
    }

    #[test]
    fn chart_without_object_is_empty() {
        let params: ChartImageParams = serde_json::from_value(json!({"chart": "bar"})).unwrap();
        assert_eq!(chart_image_url(&params), "");
    }

    #[test]
    fn helpers_render_through_registry() {
        let hb = registry();
        let out = hb
            .render_template(
                "<img src=\"{{chartImageUrl chart=chart width=100}}\">",
                &json!({"chart": {"type": "line"}}),
            )
            .unwrap();
        assert!(out.contains("100&amp;height"), "{out}");
        assert!(!out.contains("&height"), "output is escaped: {out}");

        let err = hb.render_template("{{staticMapUrl key=\"k\" zoom=\"far\"}}", &json!({}));
        assert!(err.is_err());
    }
}
