use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static NON_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]").unwrap());

/// Written for any field that has no value.
pub const UNAVAILABLE: &str = "No disponible";
/// Written when a listing card carries no location.
pub const UNSPECIFIED_LOCATION: &str = "No especificado";

pub const HEADER: [&str; 13] = [
    "Precio (ARS)",
    "Marca",
    "Modelo",
    "Versión",
    "Año",
    "KM",
    "Color",
    "Combustible",
    "Puertas",
    "Transmisión",
    "Motor",
    "Carrocería",
    "Ubicación",
];

/// Lowercased attribute label → raw value, for a single listing.
pub type AttributeMap = HashMap<String, String>;

/// One candidate row. `None` means the value was not available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarRecord {
    pub price: Option<i64>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub year: Option<String>,
    pub mileage: Option<String>,
    pub color: Option<String>,
    pub fuel: Option<String>,
    pub doors: Option<String>,
    pub transmission: Option<String>,
    pub engine: Option<String>,
    pub body: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject { missing: &'static str },
}

impl CarRecord {
    /// Build a record from the inline card data and the detail attributes.
    pub fn assemble(price: Option<i64>, location: Option<String>, attrs: &AttributeMap) -> Self {
        let get = |key: &str| attrs.get(key).cloned();

        Self {
            price,
            brand: get("marca"),
            model: get("modelo"),
            version: get("versión"),
            year: get("año"),
            mileage: attrs.get("kilómetros").and_then(|km| digits_only(km)),
            color: get("color"),
            fuel: get("tipo de combustible"),
            doors: get("puertas"),
            transmission: get("transmisión"),
            engine: get("motor"),
            body: get("tipo de carrocería"),
            location,
        }
    }

    /// Price, brand, model, year and mileage must all be present.
    pub fn validate(&self) -> Verdict {
        let mandatory = [
            ("price", self.price.is_some()),
            ("brand", self.brand.is_some()),
            ("model", self.model.is_some()),
            ("year", self.year.is_some()),
            ("mileage", self.mileage.as_deref().is_some_and(|m| !m.is_empty())),
        ];

        match mandatory.iter().find(|(_, present)| !present) {
            Some((name, _)) => Verdict::Reject { missing: *name },
            None => Verdict::Accept,
        }
    }

    /// Cells in `HEADER` order.
    pub fn to_row(&self) -> [String; 13] {
        let text = |v: &Option<String>| v.clone().unwrap_or_else(|| UNAVAILABLE.to_string());

        [
            self.price.map(|p| p.to_string()).unwrap_or_else(|| UNAVAILABLE.to_string()),
            text(&self.brand),
            text(&self.model),
            text(&self.version),
            text(&self.year),
            text(&self.mileage),
            text(&self.color),
            text(&self.fuel),
            text(&self.doors),
            text(&self.transmission),
            text(&self.engine),
            text(&self.body),
            self.location.clone().unwrap_or_else(|| UNSPECIFIED_LOCATION.to_string()),
        ]
    }
}

/// Keep only ASCII digits; an all-noise value counts as missing.
fn digits_only(raw: &str) -> Option<String> {
    let digits = NON_DIGIT_RE.replace_all(raw, "");
    if digits.is_empty() {
        None
    } else {
        Some(digits.into_owned())
    }
}
