//! Batch input: listing rows from a JSON array or JSON Lines file.
//!
//! Row shape:
//!
//! ```json
//! { "id": "A12", "listing_url": "https://www.ebay.co.uk/itm/1234?var=55",
//!   "dimensions": { "size": "80 x 150 cm", "variation": "Grey" },
//!   "sheet_status": "INSTOCK", "label": "Hallway runner" }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use stockcheck_engine::VariantRequest;
use url::Url;

/// Dimension carried forward by `inherit_variation`.
const VARIATION: &str = "variation";

/// One row as written in the input file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub dimensions: Dimensions,
    /// Status the caller's sheet currently records, in its own vocabulary.
    #[serde(default)]
    pub sheet_status: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Requested dimensions in the order the row lists them. A repeated name
/// keeps its first position and takes the later value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dimensions(Vec<(String, String)>);

impl Dimensions {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for `name`, compared case-insensitively after trimming.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Dimensions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dims = Dimensions::default();
        for (k, v) in iter {
            dims.insert(k, v);
        }
        dims
    }
}

impl IntoIterator for Dimensions {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for Dimensions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Dimensions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DimensionsVisitor;

        impl<'de> Visitor<'de> for DimensionsVisitor {
            type Value = Dimensions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of dimension names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Dimensions, A::Error> {
                let mut dims = Dimensions::default();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    dims.insert(k, v);
                }
                Ok(dims)
            }
        }

        deserializer.deserialize_map(DimensionsVisitor)
    }
}

/// A listing URL split into the parts the report needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRef {
    /// URL without query or fragment.
    pub url: String,
    /// Last all-digit path segment.
    pub item_number: Option<String>,
    /// `var` query parameter of the original URL.
    pub variation_id: Option<String>,
}

impl ListingRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = Url::parse(raw.trim()).with_context(|| format!("invalid listing URL '{raw}'"))?;

        let variation_id = parsed
            .query_pairs()
            .find(|(k, _)| k == "var")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());

        let item_number = parsed.path_segments().and_then(|segments| {
            segments
                .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
                .last()
                .map(str::to_string)
        });

        let mut base = parsed;
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self {
            url: base.to_string(),
            item_number,
            variation_id,
        })
    }
}

/// A row ready to check, with its position in the input file.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// 1-based row number in the input.
    pub row: usize,
    pub request: VariantRequest,
    pub listing: ListingRef,
    pub sheet_status: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// 1-based first row to keep.
    pub start_row: usize,
    pub limit: Option<usize>,
    /// Rows without a variation take the last one given for the same listing.
    pub inherit_variation: bool,
}

/// Parse rows from text. A leading `[` means a JSON array; anything else is
/// read as JSON Lines, skipping blank lines.
pub fn parse_rows(text: &str) -> Result<Vec<InputRow>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("invalid JSON array of rows");
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid row on line {}", i + 1))
        })
        .collect()
}

pub fn load_file(path: &Path, options: &LoadOptions) -> Result<Vec<BatchItem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    build_items(parse_rows(&text)?, options)
}

/// Turn rows into checkable items.
///
/// Rows without a listing URL are skipped with a warning. Inheritance looks
/// at every earlier row, including those before `start_row`.
pub fn build_items(rows: Vec<InputRow>, options: &LoadOptions) -> Result<Vec<BatchItem>> {
    let start = options.start_row.max(1);
    let mut last_variation: HashMap<String, String> = HashMap::new();
    let mut items = Vec::new();

    for (i, row) in rows.into_iter().enumerate() {
        let row_no = i + 1;
        let Some(raw_url) = row.listing_url.as_deref().filter(|u| !u.trim().is_empty()) else {
            tracing::warn!(row = row_no, "row has no listing URL, skipping");
            continue;
        };
        let listing = ListingRef::parse(raw_url).with_context(|| format!("row {row_no}"))?;

        let mut dimensions = row.dimensions.clone();
        if options.inherit_variation {
            inherit(&mut dimensions, &listing.url, &mut last_variation, row_no);
        }

        if row_no < start {
            continue;
        }

        let id = row.id.clone().unwrap_or_else(|| row_no.to_string());
        let request = VariantRequest::new(id, listing.url.clone(), dimensions)
            .with_context(|| format!("row {row_no}"))?;
        items.push(BatchItem {
            row: row_no,
            request,
            listing,
            sheet_status: row.sheet_status,
            label: row.label,
        });

        if options.limit.is_some_and(|limit| items.len() >= limit) {
            break;
        }
    }
    Ok(items)
}

fn inherit(
    dimensions: &mut Dimensions,
    listing: &str,
    last: &mut HashMap<String, String>,
    row: usize,
) {
    let given = dimensions
        .get(VARIATION)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    match given {
        Some(value) => {
            last.insert(listing.to_string(), value);
        }
        None => {
            if let Some(value) = last.get(listing) {
                tracing::debug!(row, %value, "variation inherited from an earlier row");
                dimensions.insert(VARIATION, value.clone());
            }
        }
    }
}
