use crate::models::locker::{GeoPoint, ParcelLocker};

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Picks the closest active locker to a point. Inactive lockers are skipped;
/// availability is not consulted here, only proximity.
pub fn nearest_active_locker<'a>(
    lockers: &'a [ParcelLocker],
    from: &GeoPoint,
) -> Option<&'a ParcelLocker> {
    lockers
        .iter()
        .filter(|locker| locker.status)
        .min_by(|a, b| {
            haversine_km(&a.position(), from).total_cmp(&haversine_km(&b.position(), from))
        })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{haversine_km, nearest_active_locker};
    use crate::models::locker::{GeoPoint, ParcelLocker};

    fn locker(id: i64, lat: f64, lng: f64, active: bool) -> ParcelLocker {
        ParcelLocker {
            id,
            name: format!("PKO-{id}"),
            location: "Warszawa".to_string(),
            latitude: lat,
            longitude: lng,
            status: active,
            number_of_slots: 20,
            created_at: Utc::now(),
            available_slots_count: None,
            available_slots_by_size: None,
        }
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 52.2297,
            lng: 21.0122,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn warsaw_to_krakow_is_around_252_km() {
        let warsaw = GeoPoint {
            lat: 52.2297,
            lng: 21.0122,
        };
        let krakow = GeoPoint {
            lat: 50.0647,
            lng: 19.9450,
        };
        let distance = haversine_km(&warsaw, &krakow);
        assert!((distance - 252.0).abs() < 5.0);
    }

    #[test]
    fn nearest_lookup_skips_inactive_lockers() {
        let here = GeoPoint {
            lat: 52.2297,
            lng: 21.0122,
        };
        let lockers = vec![
            locker(1, 52.2300, 21.0125, false),
            locker(2, 52.2512, 21.0336, true),
            locker(3, 50.0647, 19.9450, true),
        ];

        let nearest = nearest_active_locker(&lockers, &here).unwrap();
        assert_eq!(nearest.id, 2);
    }
}
