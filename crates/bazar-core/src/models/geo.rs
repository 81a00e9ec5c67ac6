//! Geographic point stored with a listing
//!
//! The hosted backend keeps locations in a PostGIS `geography(Point, 4326)`
//! column, which PostgREST reads and writes as hex-encoded EWKB.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const WKB_POINT: u32 = 1;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const SRID_WGS84: u32 = 4326;
const OSM_ZOOM: u8 = 13;

/// A WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Stored when precise geocoding is unavailable.
    pub const PLACEHOLDER: Self = Self { lat: 0.0, lng: 0.0 };

    /// Map centre used when a listing only has the placeholder point.
    pub const DEFAULT_MAP_CENTER: Self = Self {
        lat: 38.7223,
        lng: -9.1393,
    };

    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }

    /// The point to show on a map, falling back to the default centre.
    #[must_use]
    pub fn display_or_default(point: Option<Self>) -> Self {
        point
            .filter(|point| !point.is_placeholder())
            .unwrap_or(Self::DEFAULT_MAP_CENTER)
    }

    /// OpenStreetMap link centred on this point.
    #[must_use]
    pub fn osm_url(&self) -> String {
        format!(
            "https://www.openstreetmap.org/?mlat={lat:.4}&mlon={lng:.4}#map={OSM_ZOOM}/{lat:.4}/{lng:.4}",
            lat = self.lat,
            lng = self.lng,
        )
    }

    /// Encode as little-endian EWKB hex with SRID 4326.
    #[must_use]
    pub fn to_ewkb_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(25);
        bytes.push(1);
        bytes.extend_from_slice(&(WKB_POINT | EWKB_SRID_FLAG).to_le_bytes());
        bytes.extend_from_slice(&SRID_WGS84.to_le_bytes());
        bytes.extend_from_slice(&self.lng.to_le_bytes());
        bytes.extend_from_slice(&self.lat.to_le_bytes());
        hex::encode_upper(bytes)
    }

    /// Decode a hex (E)WKB point in either byte order.
    pub fn from_ewkb_hex(raw: &str) -> Result<Self, String> {
        let bytes = hex::decode(raw.trim()).map_err(|error| format!("invalid hex: {error}"))?;
        let (&order, rest) = bytes
            .split_first()
            .ok_or_else(|| "empty geometry".to_string())?;
        let little_endian = match order {
            0 => false,
            1 => true,
            other => return Err(format!("unknown byte order {other}")),
        };

        let read_u32 = |chunk: &[u8]| -> Result<u32, String> {
            let array: [u8; 4] = chunk
                .try_into()
                .map_err(|_| "truncated geometry".to_string())?;
            Ok(if little_endian {
                u32::from_le_bytes(array)
            } else {
                u32::from_be_bytes(array)
            })
        };
        let read_f64 = |chunk: &[u8]| -> Result<f64, String> {
            let array: [u8; 8] = chunk
                .try_into()
                .map_err(|_| "truncated geometry".to_string())?;
            Ok(if little_endian {
                f64::from_le_bytes(array)
            } else {
                f64::from_be_bytes(array)
            })
        };

        let geometry_type = read_u32(rest.get(..4).unwrap_or_default())?;
        if geometry_type & 0xFF != WKB_POINT {
            return Err(format!("geometry type {geometry_type:#x} is not a point"));
        }
        let coordinates = if geometry_type & EWKB_SRID_FLAG == 0 {
            rest.get(4..)
        } else {
            rest.get(8..)
        }
        .unwrap_or_default();
        if coordinates.len() != 16 {
            return Err("truncated geometry".to_string());
        }

        Ok(Self {
            lng: read_f64(&coordinates[..8])?,
            lat: read_f64(&coordinates[8..])?,
        })
    }
}

impl Serialize for GeoPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_ewkb_hex())
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_ewkb_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// Lenient reader for optional location columns; undecodable values become `None`.
pub(crate) fn deserialize_location<'de, D>(deserializer: D) -> Result<Option<GeoPoint>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(hex)) => match GeoPoint::from_ewkb_hex(&hex) {
            Ok(point) => Some(point),
            Err(error) => {
                tracing::debug!("Ignoring undecodable location: {}", error);
                None
            }
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_matches_backend_literal() {
        assert_eq!(
            GeoPoint::PLACEHOLDER.to_ewkb_hex(),
            "0101000020E610000000000000000000000000000000000000"
        );
    }

    #[test]
    fn ewkb_hex_roundtrip_keeps_axis_order() {
        let point = GeoPoint::new(41.1579, -8.6291);
        let decoded = GeoPoint::from_ewkb_hex(&point.to_ewkb_hex()).unwrap();
        assert_eq!(decoded, point);
    }

    #[test]
    fn decodes_plain_big_endian_wkb() {
        let mut bytes = vec![0];
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&2.5f64.to_be_bytes());
        bytes.extend_from_slice(&10.0f64.to_be_bytes());
        let point = GeoPoint::from_ewkb_hex(&hex::encode(bytes)).unwrap();
        assert_eq!(point, GeoPoint::new(10.0, 2.5));
    }

    #[test]
    fn rejects_non_points_and_truncation() {
        assert!(GeoPoint::from_ewkb_hex("").is_err());
        assert!(GeoPoint::from_ewkb_hex("zz").is_err());
        assert!(GeoPoint::from_ewkb_hex("0102000000").is_err());
        assert!(GeoPoint::from_ewkb_hex("0101000020E6100000").is_err());
    }

    #[test]
    fn placeholder_displays_default_centre() {
        assert_eq!(
            GeoPoint::display_or_default(Some(GeoPoint::PLACEHOLDER)),
            GeoPoint::DEFAULT_MAP_CENTER
        );
        assert_eq!(
            GeoPoint::display_or_default(None),
            GeoPoint::DEFAULT_MAP_CENTER
        );
        let porto = GeoPoint::new(41.1579, -8.6291);
        assert_eq!(GeoPoint::display_or_default(Some(porto)), porto);
    }

    #[test]
    fn osm_url_contains_coordinates() {
        let url = GeoPoint::DEFAULT_MAP_CENTER.osm_url();
        assert!(url.contains("mlat=38.7223"));
        assert!(url.contains("mlon=-9.1393"));
        assert!(url.contains("#map=13/"));
    }
}
