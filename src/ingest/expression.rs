/// Earth Engine value graphs.
///
/// Earth Engine evaluates nothing locally: every stage of the pipeline
/// extends a lazy expression that is only sent to the service when a table
/// export is requested. `Expr` is that expression as a plain tree; `to_graph`
/// renders it to the REST `Expression` message:
///
/// ```json
/// { "result": "2", "values": { "0": {...}, "1": {...}, "2": {...} } }
/// ```
///
/// Every function invocation is stored once in `values` and referenced by
/// key, so a subgraph used several times (the upstream collection inside
/// the per-date mosaic, for instance) is only sent once. Constants and
/// argument references are inlined.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Map, Value, json};

use crate::model::{Aoi, AOI_CRS, CollectionQuery, DATE_PROPERTY, SCL_BAND};
use crate::scl::{MaskMode, SclMask};

/// Earth Engine's date pattern for `Date.format` (Joda style).
const EE_DATE_PATTERN: &str = "YYYY-MM-dd";

/// Image property holding the capture time in milliseconds since epoch.
const TIME_START: &str = "system:time_start";

/// Per-image cloudiness property of Sentinel-2 collections.
pub const CLOUDY_PIXEL_PERCENTAGE: &str = "CLOUDY_PIXEL_PERCENTAGE";

/// Numbers the stand-in parameter names used until a lambda's nesting
/// depth is known. Each lambda gets its own, so renaming one never touches
/// an enclosing lambda's parameter.
static PENDING_VARS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    Call { function: String, args: BTreeMap<String, Expr> },
    Argument(String),
    Function { params: Vec<String>, body: Box<Expr> },
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Expr {
        Expr::Constant(value.into())
    }

    pub fn null() -> Expr {
        Expr::Constant(Value::Null)
    }

    pub fn call<'a>(function: &str, args: impl IntoIterator<Item = (&'a str, Expr)>) -> Expr {
        Expr::Call {
            function: function.to_string(),
            args: args.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    /// Call without arguments.
    pub fn invoke(function: &str) -> Expr {
        Expr::Call {
            function: function.to_string(),
            args: BTreeMap::new(),
        }
    }

    pub fn argument(name: &str) -> Expr {
        Expr::Argument(name.to_string())
    }

    /// Single-parameter function, the shape `map` expects. `body` receives
    /// the parameter. The parameter is named `_MAPPING_VAR_<depth>_0` after
    /// the number of functions nested inside the body, so an inner function
    /// never shadows an outer one.
    pub fn lambda(body: impl FnOnce(Expr) -> Expr) -> Expr {
        let pending = format!("_PENDING_VAR_{}", PENDING_VARS.fetch_add(1, Ordering::Relaxed));
        let mut body = body(Expr::argument(&pending));
        let param = format!("_MAPPING_VAR_{}_0", body.function_depth());
        body.rename_argument(&pending, &param);
        Expr::Function {
            params: vec![param],
            body: Box::new(body),
        }
    }

    /// Deepest nesting of function definitions within this expression.
    pub fn function_depth(&self) -> usize {
        match self {
            Expr::Constant(_) | Expr::Argument(_) => 0,
            Expr::Call { args, .. } => args.values().map(Expr::function_depth).max().unwrap_or(0),
            Expr::Function { body, .. } => 1 + body.function_depth(),
        }
    }

    #[cfg(test)]
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Expr::Call { function, .. } => Some(function),
            _ => None,
        }
    }

    fn rename_argument(&mut self, from: &str, to: &str) {
        match self {
            Expr::Argument(name) if name == from => *name = to.to_string(),
            Expr::Constant(_) | Expr::Argument(_) => {}
            Expr::Call { args, .. } => args.values_mut().for_each(|a| a.rename_argument(from, to)),
            Expr::Function { body, .. } => body.rename_argument(from, to),
        }
    }

    /// Render as a REST `Expression` message.
    pub fn to_graph(&self) -> Value {
        let mut graph = GraphBuilder::default();
        let root = graph.encode(self);
        let result = graph.key_of(root);
        json!({ "result": result, "values": graph.values })
    }
}

#[derive(Default)]
struct GraphBuilder {
    values: Map<String, Value>,
    /// serialized node -> key, for deduplication
    seen: HashMap<String, String>,
}

impl GraphBuilder {
    fn intern(&mut self, node: Value) -> String {
        let text = node.to_string();
        if let Some(key) = self.seen.get(&text) {
            return key.clone();
        }
        let key = self.values.len().to_string();
        self.values.insert(key.clone(), node);
        self.seen.insert(text, key.clone());
        key
    }

    /// Key of an encoded node, interning it if it is inline.
    fn key_of(&mut self, encoded: Value) -> String {
        match encoded.get("valueReference").and_then(Value::as_str) {
            Some(key) => key.to_string(),
            None => self.intern(encoded),
        }
    }

    fn encode(&mut self, expr: &Expr) -> Value {
        match expr {
            Expr::Constant(v) => json!({ "constantValue": v }),
            Expr::Argument(name) => json!({ "argumentReference": name }),
            Expr::Call { function, args } => {
                let arguments: Map<String, Value> = args
                    .iter()
                    .map(|(k, v)| (k.clone(), self.encode(v)))
                    .collect();
                let key = self.intern(json!({
                    "functionInvocationValue": {
                        "functionName": function,
                        "arguments": arguments,
                    }
                }));
                json!({ "valueReference": key })
            }
            Expr::Function { params, body } => {
                let body = self.encode(body);
                let body = self.key_of(body);
                json!({
                    "functionDefinitionValue": {
                        "argumentNames": params,
                        "body": body,
                    }
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stage builders
// ---------------------------------------------------------------------------

fn map_collection(collection: Expr, body: impl FnOnce(Expr) -> Expr) -> Expr {
    Expr::call(
        "Collection.map",
        [("collection", collection), ("baseAlgorithm", Expr::lambda(body))],
    )
}

fn map_list(list: Expr, body: impl FnOnce(Expr) -> Expr) -> Expr {
    Expr::call("List.map", [("list", list), ("baseAlgorithm", Expr::lambda(body))])
}

fn filter_collection(collection: Expr, filter: Expr) -> Expr {
    Expr::call("Collection.filter", [("collection", collection), ("filter", filter)])
}

fn date(value: Expr) -> Expr {
    Expr::call("Date", [("value", value)])
}

fn format_date(date: Expr) -> Expr {
    Expr::call("Date.format", [("date", date), ("format", Expr::constant(EE_DATE_PATTERN))])
}

fn date_range_filter(start: Expr, end: Expr) -> Expr {
    Expr::call(
        "Filter.dateRangeContains",
        [
            ("leftValue", Expr::call("DateRange", [("start", start), ("end", end)])),
            ("rightField", Expr::constant(TIME_START)),
        ],
    )
}

/// Planar rectangle in EPSG:4326.
pub fn aoi_geometry(aoi: &Aoi) -> Expr {
    Expr::call(
        "GeometryConstructors.Rectangle",
        [
            ("coordinates", Expr::constant(aoi.corners().to_vec())),
            ("crs", Expr::call("Projection", [("crs", Expr::constant(AOI_CRS))])),
            ("geodesic", Expr::constant(false)),
        ],
    )
}

/// Collection load, date/bounds/cloud filters and band selection.
pub fn filtered_collection(query: &CollectionQuery) -> Expr {
    let loaded = Expr::call("ImageCollection.load", [("id", Expr::constant(query.collection.as_str()))]);

    let by_date = filter_collection(
        loaded,
        date_range_filter(
            date(Expr::constant(query.range.start.to_string())),
            date(Expr::constant(query.range.end.to_string())),
        ),
    );

    let by_bounds = filter_collection(
        by_date,
        Expr::call(
            "Filter.intersects",
            [("leftField", Expr::constant(".all")), ("rightValue", aoi_geometry(&query.aoi))],
        ),
    );

    let by_cloud = filter_collection(
        by_bounds,
        Expr::call(
            "Filter.lessThan",
            [
                ("leftField", Expr::constant(CLOUDY_PIXEL_PERCENTAGE)),
                ("rightValue", Expr::constant(query.max_cloudy_pixel_percentage)),
            ],
        ),
    );

    let bands = query.selected_bands();
    map_collection(by_cloud, |image| {
        Expr::call(
            "Image.select",
            [("input", image), ("bandSelectors", Expr::constant(bands))],
        )
    })
}

/// `scl == c1 || scl == c2 || ...` as an image expression over `image`.
fn scl_matches(image: Expr, mask: &SclMask) -> Expr {
    let scl = Expr::call(
        "Image.select",
        [("input", image), ("bandSelectors", Expr::constant(vec![SCL_BAND]))],
    );

    let eq = |value: u8| {
        Expr::call(
            "Image.eq",
            [
                ("image1", scl.clone()),
                ("image2", Expr::call("Image.constant", [("value", Expr::constant(value))])),
            ],
        )
    };

    let mut values = mask.class_values().into_iter();
    let first = match values.next() {
        Some(v) => eq(v),
        None => return Expr::call("Image.constant", [("value", Expr::constant(0))]),
    };
    values.fold(first, |acc, v| Expr::call("Image.or", [("image1", acc), ("image2", eq(v))]))
}

/// `updateMask` every image with the SCL condition of `mask`.
pub fn masked(collection: Expr, mask: &SclMask) -> Expr {
    map_collection(collection, |image| {
        let condition = scl_matches(image.clone(), mask);
        let condition = match mask.mode {
            MaskMode::Keep => condition,
            MaskMode::Exclude => Expr::call("Image.not", [("value", condition)]),
        };
        Expr::call("Image.updateMask", [("image", image), ("mask", condition)])
    })
}

/// One mosaic per distinct capture date, in first-seen order, each tagged
/// with a `Date` property.
pub fn daily_mosaics(collection: Expr) -> Expr {
    let as_list = Expr::call(
        "Collection.toList",
        [
            ("collection", collection.clone()),
            ("count", Expr::call("Collection.size", [("collection", collection.clone())])),
        ],
    );
    let capture_dates = map_list(as_list, |image| {
        format_date(Expr::call("Image.date", [("image", image)]))
    });
    let distinct_dates = Expr::call("List.distinct", [("list", capture_dates)]);

    let mosaics = map_list(distinct_dates, |date_str| {
        let day = date(date_str);
        let next_day = Expr::call(
            "Date.advance",
            [("date", day.clone()), ("delta", Expr::constant(1)), ("unit", Expr::constant("day"))],
        );
        let same_day = filter_collection(collection, date_range_filter(day.clone(), next_day));
        Expr::call(
            "Element.set",
            [
                ("object", Expr::call("ImageCollection.mosaic", [("collection", same_day)])),
                ("key", Expr::constant(DATE_PROPERTY)),
                ("value", format_date(day)),
            ],
        )
    });
    Expr::call("ImageCollection.fromImages", [("images", mosaics)])
}

/// Geometry-less features holding each mosaic's band means plus `Date`.
pub fn mean_features(collection: Expr, aoi: &Aoi, scale_m: f64) -> Expr {
    map_collection(collection, |image| {
        let means = Expr::call(
            "Image.reduceRegion",
            [
                ("image", image.clone()),
                ("reducer", Expr::invoke("Reducer.mean")),
                ("geometry", aoi_geometry(aoi)),
                ("scale", Expr::constant(scale_m)),
                ("bestEffort", Expr::constant(true)),
            ],
        );
        let feature = Expr::call("Feature", [("geometry", Expr::null()), ("metadata", means)]);
        Expr::call(
            "Element.set",
            [
                ("object", feature),
                ("key", Expr::constant(DATE_PROPERTY)),
                (
                    "value",
                    Expr::call(
                        "Element.get",
                        [("object", image), ("property", Expr::constant(DATE_PROPERTY))],
                    ),
                ),
            ],
        )
    })
}
