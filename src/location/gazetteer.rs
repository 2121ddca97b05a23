//! Built-in gazetteer: an offline city table with alias and fuzzy matching.
//!
//! Lets a manually entered city resolve to coordinates without any network.

use serde::Serialize;

use super::types::{GeocodedAddress, SourceTrust};
use crate::geo::LatLng;

struct Place {
    names: &'static [&'static str], // canonical + aliases
    lat: f64,
    lng: f64,
    region: &'static str,
    country: &'static str,
    country_code: &'static str,
}

const PLACES: &[Place] = &[
    Place { names: &["lucknow", "lakhnau"], lat: 26.8467, lng: 80.9462, region: "Uttar Pradesh", country: "India", country_code: "IN" },
    Place { names: &["kanpur", "cawnpore"], lat: 26.4499, lng: 80.3319, region: "Uttar Pradesh", country: "India", country_code: "IN" },
    Place { names: &["varanasi", "benares", "kashi"], lat: 25.3176, lng: 82.9739, region: "Uttar Pradesh", country: "India", country_code: "IN" },
    Place { names: &["prayagraj", "allahabad"], lat: 25.4358, lng: 81.8463, region: "Uttar Pradesh", country: "India", country_code: "IN" },
    Place { names: &["agra"], lat: 27.1767, lng: 78.0081, region: "Uttar Pradesh", country: "India", country_code: "IN" },
    Place { names: &["noida"], lat: 28.5355, lng: 77.3910, region: "Uttar Pradesh", country: "India", country_code: "IN" },
    Place { names: &["new delhi", "delhi"], lat: 28.6139, lng: 77.2090, region: "Delhi", country: "India", country_code: "IN" },
    Place { names: &["gurugram", "gurgaon"], lat: 28.4595, lng: 77.0266, region: "Haryana", country: "India", country_code: "IN" },
    Place { names: &["jaipur", "pink city"], lat: 26.9124, lng: 75.7873, region: "Rajasthan", country: "India", country_code: "IN" },
    Place { names: &["mumbai", "bombay"], lat: 19.0760, lng: 72.8777, region: "Maharashtra", country: "India", country_code: "IN" },
    Place { names: &["pune", "poona"], lat: 18.5204, lng: 73.8567, region: "Maharashtra", country: "India", country_code: "IN" },
    Place { names: &["bengaluru", "bangalore"], lat: 12.9716, lng: 77.5946, region: "Karnataka", country: "India", country_code: "IN" },
    Place { names: &["chennai", "madras"], lat: 13.0827, lng: 80.2707, region: "Tamil Nadu", country: "India", country_code: "IN" },
    Place { names: &["hyderabad"], lat: 17.3850, lng: 78.4867, region: "Telangana", country: "India", country_code: "IN" },
    Place { names: &["kolkata", "calcutta"], lat: 22.5726, lng: 88.3639, region: "West Bengal", country: "India", country_code: "IN" },
    Place { names: &["ahmedabad"], lat: 23.0225, lng: 72.5714, region: "Gujarat", country: "India", country_code: "IN" },
    Place { names: &["chandigarh"], lat: 30.7333, lng: 76.7794, region: "Chandigarh", country: "India", country_code: "IN" },
    Place { names: &["london"], lat: 51.5074, lng: -0.1278, region: "England", country: "United Kingdom", country_code: "GB" },
    Place { names: &["new york", "newyork", "nyc"], lat: 40.7128, lng: -74.0060, region: "New York", country: "United States", country_code: "US" },
    Place { names: &["san francisco", "sf"], lat: 37.7749, lng: -122.4194, region: "California", country: "United States", country_code: "US" },
    Place { names: &["dubai"], lat: 25.2048, lng: 55.2708, region: "Dubai", country: "United Arab Emirates", country_code: "AE" },
    Place { names: &["singapore"], lat: 1.3521, lng: 103.8198, region: "Singapore", country: "Singapore", country_code: "SG" },
    Place { names: &["stockholm", "stokholm"], lat: 59.3293, lng: 18.0686, region: "Stockholm County", country: "Sweden", country_code: "SE" },
    Place { names: &["paris"], lat: 48.8566, lng: 2.3522, region: "Île-de-France", country: "France", country_code: "FR" },
    Place { names: &["berlin"], lat: 52.5200, lng: 13.4050, region: "Berlin", country: "Germany", country_code: "DE" },
    Place { names: &["tokyo"], lat: 35.6762, lng: 139.6503, region: "Tokyo", country: "Japan", country_code: "JP" },
    Place { names: &["sydney"], lat: -33.8688, lng: 151.2093, region: "New South Wales", country: "Australia", country_code: "AU" },
];

/// A gazetteer entry for the public place list API.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceInfo {
    pub name: String,
    pub region: String,
    pub country_code: String,
    pub lat: f64,
    pub lng: f64,
}

/// Edit distance where an adjacent transposition counts as one edit
/// (optimal string alignment), so "dehli" is one typo away from "delhi".
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut before: Vec<usize> = vec![0; b.len() + 1];
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 0..a.len() {
        curr[0] = i + 1;
        for j in 0..b.len() {
            let cost = usize::from(a[i] != b[j]);
            let mut d = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
            if i > 0 && j > 0 && a[i] == b[j - 1] && a[i - 1] == b[j] {
                d = d.min(before[j - 1] + 1);
            }
            curr[j + 1] = d;
        }
        std::mem::swap(&mut before, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Typos tolerated for a query of `len` characters: none below 5, then one
/// per 5 characters, at most 2.
fn max_typos(len: usize) -> usize {
    (len / 5).min(2)
}

fn normalize(query: &str) -> Option<String> {
    let q = query.trim().to_lowercase();
    (!q.is_empty()).then_some(q)
}

fn places_in(country: Option<&str>) -> Vec<&'static Place> {
    let country = country.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty());
    PLACES
        .iter()
        .filter(|p| match &country {
            Some(c) => p.country_code.eq_ignore_ascii_case(c) || p.country.to_lowercase() == *c,
            None => true,
        })
        .collect()
}

/// Find a place by its name or one of its aliases, ignoring case.
pub fn lookup_exact(query: &str, country: Option<&str>) -> Option<(LatLng, GeocodedAddress)> {
    let q = normalize(query)?;
    places_in(country)
        .into_iter()
        .find(|p| p.names.contains(&q.as_str()))
        .map(to_entry)
}

/// Find the closest place name within the typo budget for the query length.
///
/// The address carries the canonical place name, never the query text.
pub fn lookup_fuzzy(query: &str, country: Option<&str>) -> Option<(LatLng, GeocodedAddress)> {
    let q = normalize(query)?;
    let budget = max_typos(q.chars().count());
    if budget == 0 {
        return None;
    }
    let q = q.as_str();
    places_in(country)
        .into_iter()
        .flat_map(|p| p.names.iter().map(move |n| (p, edit_distance(q, n))))
        .filter(|(_, dist)| *dist <= budget)
        .min_by_key(|(_, dist)| *dist)
        .map(|(place, _)| to_entry(place))
}

/// Exact match, else fuzzy match.
pub fn lookup(query: &str, country: Option<&str>) -> Option<(LatLng, GeocodedAddress)> {
    lookup_exact(query, country).or_else(|| lookup_fuzzy(query, country))
}

fn to_entry(place: &Place) -> (LatLng, GeocodedAddress) {
    let coords = LatLng { lat: place.lat, lng: place.lng };
    let address = GeocodedAddress {
        city: Some(title_case(place.names[0])),
        region: Some(place.region.to_string()),
        country: Some(place.country.to_string()),
        country_code: Some(place.country_code.to_string()),
        postal_code: None,
        display_name: None,
        source: "gazetteer".into(),
        trust: SourceTrust::Unrated,
    };
    (coords, address)
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Return the full place list (for autocomplete / API).
pub fn place_list() -> Vec<PlaceInfo> {
    PLACES
        .iter()
        .map(|p| PlaceInfo {
            name: title_case(p.names[0]),
            region: p.region.to_string(),
            country_code: p.country_code.to_string(),
            lat: p.lat,
            lng: p.lng,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_case_insensitive() {
        let (coords, addr) = lookup("LUCKNOW", None).unwrap();
        assert_eq!(coords.lat, 26.8467);
        assert_eq!(addr.city.as_deref(), Some("Lucknow"));
        assert_eq!(addr.region.as_deref(), Some("Uttar Pradesh"));
        assert_eq!(addr.source, "gazetteer");
    }

    #[test]
    fn test_alias() {
        let (_, addr) = lookup("bombay", None).unwrap();
        assert_eq!(addr.city.as_deref(), Some("Mumbai"));
        let (_, addr) = lookup("NYC", None).unwrap();
        assert_eq!(addr.city.as_deref(), Some("New York"));
    }

    #[test]
    fn test_fuzzy() {
        let (_, addr) = lookup("luknow", None).unwrap();
        assert_eq!(addr.city.as_deref(), Some("Lucknow"));
    }

    #[test]
    fn test_country_filter() {
        assert!(lookup("lucknow", Some("IN")).is_some());
        assert!(lookup("lucknow", Some("india")).is_some());
        assert!(lookup("lucknow", Some("FR")).is_none());
    }

    #[test]
    fn test_not_found() {
        assert!(lookup("xyznonexistent", None).is_none());
        assert!(lookup("   ", None).is_none());
    }

    #[test]
    fn test_short_queries_never_fuzzy() {
        // "goa" is two edits from "agra", "x" two from "sf".
        assert!(lookup("Goa", None).is_none());
        assert!(lookup("X", None).is_none());
        assert!(lookup("sf", None).is_some());
    }

    #[test]
    fn test_typo_budget_scales_with_length() {
        // Two edits from the "kashi" alias of Varanasi: too many for 5 letters.
        assert!(lookup("Kochi", None).is_none());
        // Two edits from "pink city": too many for 9 characters.
        assert!(lookup("Pune City", None).is_none());
        let (_, addr) = lookup_fuzzy("dehli", None).unwrap();
        assert_eq!(addr.city.as_deref(), Some("New Delhi"));
        assert_eq!(max_typos(4), 0);
        assert_eq!(max_typos(7), 1);
        assert_eq!(max_typos(12), 2);
    }

    #[test]
    fn test_exact_lookup_skips_fuzzy() {
        assert!(lookup_exact("luknow", None).is_none());
        assert!(lookup_exact("Lakhnau", Some("IN")).is_some());
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("dehli", "delhi"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("lucknow", "luknow"), 1);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_place_list_coords_valid() {
        let places = place_list();
        assert!(!places.is_empty());
        for p in places {
            assert!(crate::geo::is_valid(p.lat, p.lng), "{} has invalid coords", p.name);
        }
    }
}
