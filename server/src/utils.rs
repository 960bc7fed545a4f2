use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Whether a coordinate triple lies inside the accepted world bounds
pub fn within_world_bounds(x: f64, y: f64, z: f64) -> bool {
    x.abs() <= shared::MAX_HORIZONTAL_COORD
        && z.abs() <= shared::MAX_HORIZONTAL_COORD
        && y.abs() <= shared::MAX_VERTICAL_COORD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_bounds() {
        assert!(within_world_bounds(0.0, 64.0, 0.0));
        assert!(within_world_bounds(3.0e7, -2.0e7, -3.0e7));
        assert!(!within_world_bounds(3.0e7 + 1.0, 0.0, 0.0));
        assert!(!within_world_bounds(0.0, 2.0e7 + 1.0, 0.0));
        assert!(!within_world_bounds(f64::NAN, 0.0, 0.0));
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let t1 = get_timestamp();
        std::thread::sleep(Duration::from_millis(2));
        let t2 = get_timestamp();
        assert!(t2 > t1);
    }
}
