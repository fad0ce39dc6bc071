//! Types for garments and their analysis

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::deserialize_id;
use crate::mask::{render_mask, MaskRender};

/// Categories the closet can be filtered by; `all` means unfiltered
pub const CATEGORIES: [&str; 7] = [
    "all",
    "top",
    "bottom",
    "dress",
    "sneakers",
    "accesories",
    "backpack",
];

/// A normalized image coordinate, both axes in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(alias = "X")]
    pub x: f64,
    #[serde(alias = "Y")]
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The point pulled back into the unit square
    pub fn clamped(&self) -> Self {
        Self {
            x: self.x.clamp(0.0, 1.0),
            y: self.y.clamp(0.0, 1.0),
        }
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(flag)) => flag,
        Some(Flag::Text(text)) => text.eq_ignore_ascii_case("true"),
        None => false,
    })
}

/// A cataloged garment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Garment {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub color: String,

    #[serde(default)]
    pub brand: String,

    #[serde(default)]
    pub size: String,

    #[serde(default)]
    pub image_url: String,

    #[serde(default)]
    pub barcode: Option<String>,

    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_verified: bool,

    /// Garment silhouette in normalized image coordinates, once analyzed
    #[serde(
        default,
        rename = "boundingPoly",
        alias = "bounding_poly",
        skip_serializing_if = "Option::is_none"
    )]
    pub bounding_poly: Option<Vec<Point>>,
}

impl Garment {
    /// Clip mask for displaying this garment at `width` x `height`
    pub fn mask(&self, width: f64, height: f64) -> MaskRender {
        render_mask(self.bounding_poly.as_deref(), width, height)
    }
}

/// A dominant color reported by the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorInfo {
    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Hex", skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,

    #[serde(default, alias = "Percentage", skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

/// Remote visual analysis of an uploaded photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(alias = "MainCategory")]
    pub category: String,

    #[serde(default, alias = "Colors")]
    pub colors: Vec<ColorInfo>,

    #[serde(
        default,
        rename = "boundingPoly",
        alias = "BoundingPoly",
        alias = "bounding_poly",
        skip_serializing_if = "Option::is_none"
    )]
    pub bounding_poly: Option<Vec<Point>>,
}

impl AnalysisResult {
    /// Name of the first reported color, falling back to its hex code
    pub fn primary_color(&self) -> Option<&str> {
        self.colors.first().and_then(|color| {
            if !color.name.is_empty() {
                Some(color.name.as_str())
            } else {
                color.hex.as_deref()
            }
        })
    }
}

/// Query for the garment list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GarmentFilter {
    pub page: u32,
    category: String,
    pub color: Option<String>,
    pub brand: Option<String>,
}

impl Default for GarmentFilter {
    fn default() -> Self {
        Self {
            page: 1,
            category: String::new(),
            color: None,
            brand: None,
        }
    }
}

impl GarmentFilter {
    /// Filter by category; `all` and empty mean unfiltered
    pub fn category(category: &str) -> Self {
        Self::default().with_category(category)
    }

    pub fn with_category(mut self, category: &str) -> Self {
        let category = category.trim().to_lowercase();
        self.category = if category == "all" { String::new() } else { category };
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn with_brand(mut self, brand: &str) -> Self {
        self.brand = Some(brand.to_string());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// The category sent to the server; empty when unfiltered
    pub fn category_param(&self) -> &str {
        &self.category
    }
}

/// A local photo yielded by the camera capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    path: PathBuf,
    data: Option<Vec<u8>>,
}

impl ImageHandle {
    /// A photo stored on disk
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            data: None,
        }
    }

    /// A photo already held in memory
    pub fn from_bytes(file_name: &str, data: Vec<u8>) -> Self {
        Self {
            path: PathBuf::from(file_name),
            data: Some(data),
        }
    }

    /// Last path segment, used as the upload file name
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    }

    /// `image/<extension>`, or plain `image` when there is none
    pub fn mime_type(&self) -> String {
        match self.path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if !ext.is_empty() => format!("image/{}", ext.to_lowercase()),
            _ => "image".to_string(),
        }
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.data {
            Some(data) => Ok(data.clone()),
            None => tokio::fs::read(&self.path).await,
        }
    }
}

/// The optimistic closet entry shown while a capture is being analyzed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGarment {
    pub image: ImageHandle,
    pub category: Option<String>,
    pub color: Option<String>,
    pub bounding_poly: Option<Vec<Point>>,
}

impl PendingGarment {
    pub(crate) fn new(image: ImageHandle) -> Self {
        Self {
            image,
            category: None,
            color: None,
            bounding_poly: None,
        }
    }

    pub(crate) fn merge(&mut self, analysis: &AnalysisResult) {
        if !analysis.category.is_empty() {
            self.category = Some(analysis.category.clone());
        }
        if let Some(color) = analysis.primary_color() {
            self.color = Some(color.to_string());
        }
        self.bounding_poly = analysis.bounding_poly.clone();
    }

    /// Whether the analysis result has been merged in
    pub fn is_analyzed(&self) -> bool {
        self.category.is_some()
    }

    pub fn mask(&self, width: f64, height: f64) -> MaskRender {
        render_mask(self.bounding_poly.as_deref(), width, height)
    }
}
