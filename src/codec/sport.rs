use crate::codec::types::Sport;

/// Average speed above which a track is treated as a ride, in m/s.
pub const CYCLING_MIN_SPEED_MPS: f64 = 8.0;
/// Average speed below which a track is treated as a walk, in m/s.
pub const WALKING_MAX_SPEED_MPS: f64 = 2.0;

/// Guess the sport from the average speed of a track.
///
/// The bands are `< 2.0` walking, `2.0..=8.0` running and `> 8.0` cycling.
/// Without any speed information the track is assumed to be a run. New sports
/// get a variant on [`Sport`] and a band here.
pub fn classify_sport(avg_speed_mps: Option<f64>) -> Sport {
    match avg_speed_mps {
        Some(speed) if speed > CYCLING_MIN_SPEED_MPS => Sport::Cycling,
        Some(speed) if speed < WALKING_MAX_SPEED_MPS => Sport::Walking,
        _ => Sport::Running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_exclusive_at_the_band_edges() {
        let outcomes: Vec<Sport> = [1.9, 2.0, 8.0, 8.1]
            .into_iter()
            .map(|speed| classify_sport(Some(speed)))
            .collect();
        assert_eq!(
            outcomes,
            vec![Sport::Walking, Sport::Running, Sport::Running, Sport::Cycling]
        );
    }

    #[test]
    fn missing_speed_defaults_to_running() {
        assert_eq!(classify_sport(None), Sport::Running);
    }
}
