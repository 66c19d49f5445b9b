use dashmap::DashMap;
use uuid::Uuid;

use crate::models::courier::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

/// Last-known courier positions, queryable by proximity.
#[derive(Default)]
pub struct GeoIndex {
    positions: DashMap<Uuid, GeoPoint>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
        }
    }

    pub fn track(&self, courier_id: Uuid, position: GeoPoint) {
        self.positions.insert(courier_id, position);
    }

    pub fn position_of(&self, courier_id: Uuid) -> Option<GeoPoint> {
        self.positions.get(&courier_id).map(|entry| *entry.value())
    }

    /// Couriers within `radius_m` of `origin`, closest first.
    pub fn find_nearby(&self, origin: &GeoPoint, radius_m: f64) -> Vec<(Uuid, f64)> {
        let mut hits: Vec<(Uuid, f64)> = self
            .positions
            .iter()
            .filter_map(|entry| {
                let distance = haversine_m(origin, entry.value());
                (distance <= radius_m).then_some((*entry.key(), distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }

    /// Every tracked courier regardless of distance, for the
    /// widen-the-search fallback.
    pub fn all_tracked(&self) -> Vec<Uuid> {
        self.positions.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{haversine_m, GeoIndex};
    use crate::models::courier::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        let distance = haversine_m(&p, &p);
        assert!(distance < 1e-6);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_m(&london, &paris);
        assert!((distance - 343_000.0).abs() < 5_000.0);
    }

    #[test]
    fn find_nearby_filters_and_orders_by_distance() {
        let index = GeoIndex::new();
        let origin = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };

        let near = Uuid::new_v4();
        let nearer = Uuid::new_v4();
        let far = Uuid::new_v4();

        index.track(
            near,
            GeoPoint {
                lat: 12.98,
                lng: 77.60,
            },
        );
        index.track(
            nearer,
            GeoPoint {
                lat: 12.9717,
                lng: 77.5947,
            },
        );
        // Mumbai, well outside a 10 km radius
        index.track(
            far,
            GeoPoint {
                lat: 19.0760,
                lng: 72.8777,
            },
        );

        let hits = index.find_nearby(&origin, 10_000.0);
        let ids: Vec<_> = hits.iter().map(|(id, _)| *id).collect();

        assert_eq!(ids, vec![nearer, near]);
    }

    #[test]
    fn all_tracked_ignores_distance() {
        let index = GeoIndex::new();
        let far = Uuid::new_v4();
        index.track(
            far,
            GeoPoint {
                lat: 19.0760,
                lng: 72.8777,
            },
        );

        assert_eq!(index.all_tracked(), vec![far]);
    }
}
