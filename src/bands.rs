/// Band registry for Sentinel-2 surface reflectance products.
///
/// Defines the canonical column order used for the output table, along
/// with per-band metadata. This is the single source of truth for band
/// names; other modules should reference bands from here rather than
/// hardcoding the order.

// ---------------------------------------------------------------------------
// Band metadata
// ---------------------------------------------------------------------------

pub struct Band {
    /// Band name as it appears in the collection and the export.
    pub name: &'static str,
    pub description: &'static str,
    /// Central wavelength in nanometres. `None` for derived layers.
    pub wavelength_nm: Option<u32>,
    /// Native ground resolution in metres.
    pub resolution_m: u32,
}

/// All bands that may appear as output columns, in canonical order.
pub static BAND_REGISTRY: &[Band] = &[
    Band { name: "B1", description: "Aerosols", wavelength_nm: Some(443), resolution_m: 60 },
    Band { name: "B2", description: "Blue", wavelength_nm: Some(490), resolution_m: 10 },
    Band { name: "B3", description: "Green", wavelength_nm: Some(560), resolution_m: 10 },
    Band { name: "B4", description: "Red", wavelength_nm: Some(665), resolution_m: 10 },
    Band { name: "B5", description: "Red Edge 1", wavelength_nm: Some(705), resolution_m: 20 },
    Band { name: "B6", description: "Red Edge 2", wavelength_nm: Some(740), resolution_m: 20 },
    Band { name: "B7", description: "Red Edge 3", wavelength_nm: Some(783), resolution_m: 20 },
    Band { name: "B8", description: "NIR", wavelength_nm: Some(842), resolution_m: 10 },
    Band { name: "B8A", description: "Red Edge 4", wavelength_nm: Some(865), resolution_m: 20 },
    Band { name: "B9", description: "Water vapor", wavelength_nm: Some(945), resolution_m: 60 },
    Band { name: "B11", description: "SWIR 1", wavelength_nm: Some(1610), resolution_m: 20 },
    Band { name: "B12", description: "SWIR 2", wavelength_nm: Some(2190), resolution_m: 20 },
    Band { name: "AOT", description: "Aerosol Optical Thickness", wavelength_nm: None, resolution_m: 10 },
];

impl Band {
    /// One-line description for logs, e.g. `B8A Red Edge 4 (865 nm, 20 m)`.
    pub fn summary(&self) -> String {
        match self.wavelength_nm {
            Some(nm) => format!("{} {} ({} nm, {} m)", self.name, self.description, nm, self.resolution_m),
            None => format!("{} {} ({} m)", self.name, self.description, self.resolution_m),
        }
    }
}

/// Position of a band in the canonical order, or `None` if unlisted.
pub fn canonical_rank(name: &str) -> Option<usize> {
    BAND_REGISTRY.iter().position(|b| b.name == name)
}

pub fn find_band(name: &str) -> Option<&'static Band> {
    BAND_REGISTRY.iter().find(|b| b.name == name)
}

/// Finest native resolution among the requested bands, in metres.
/// Unknown bands are ignored; `None` if no band is known.
pub fn finest_resolution_m(bands: &[String]) -> Option<u32> {
    bands
        .iter()
        .filter_map(|b| find_band(b))
        .map(|b| b.resolution_m)
        .min()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
