//! Per-axis scalar Kalman filtering for one correction call's GPS batch.
//!
//! Three independent filters (lat, lng, altitude) rather than a coupled
//! matrix state, since the three axes are smoothed independently and a
//! scalar filter keeps the per-sample update a handful of float ops instead
//! of matrix inversions.

use crate::config::KalmanConfig;

/// A single scalar Kalman filter: estimate plus its variance.
#[derive(Debug, Clone, Copy)]
struct ScalarFilter {
    estimate: f64,
    variance: f64,
    initialized: bool,
}

impl ScalarFilter {
    fn new() -> Self {
        Self { estimate: 0.0, variance: 1.0, initialized: false }
    }

    fn update(&mut self, measurement: f64, process_noise: f64, measurement_noise: f64) {
        if !self.initialized {
            self.estimate = measurement;
            self.variance = measurement_noise;
            self.initialized = true;
            return;
        }

        // Predict.
        let predicted_variance = self.variance + process_noise;

        // Update.
        let gain = predicted_variance / (predicted_variance + measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.variance = (1.0 - gain) * predicted_variance;
    }
}

/// Folds a batch of GPS samples into a smoothed lat/lng/altitude estimate.
///
/// One filter per correction call — state does not persist across calls.
#[derive(Debug, Clone)]
pub struct KalmanFilter3D {
    lat: ScalarFilter,
    lng: ScalarFilter,
    alt: ScalarFilter,
    config: KalmanConfig,
}

impl KalmanFilter3D {
    pub fn new(config: KalmanConfig) -> Self {
        Self {
            lat: ScalarFilter::new(),
            lng: ScalarFilter::new(),
            alt: ScalarFilter::new(),
            config,
        }
    }

    /// Apply one measurement. `confidence` must be in `[0.1, 1.0]`; values
    /// outside that range are clamped rather than rejected.
    pub fn update(&mut self, lat: f64, lng: f64, alt: Option<f64>, confidence: f64) {
        let confidence = confidence.clamp(0.1, 1.0);

        let measurement_noise_latlng = self.config.base_measurement_noise / confidence;
        self.lat.update(lat, self.config.process_noise_latlng, measurement_noise_latlng);
        self.lng.update(lng, self.config.process_noise_latlng, measurement_noise_latlng);

        if let Some(alt) = alt {
            let measurement_noise_alt = self.config.base_measurement_noise * 4.0 / confidence;
            self.alt.update(alt, self.config.process_noise_alt, measurement_noise_alt);
        }
    }

    pub fn current_position(&self) -> (f64, f64, Option<f64>) {
        let alt = if self.alt.initialized { Some(self.alt.estimate) } else { None };
        (self.lat.estimate, self.lng.estimate, alt)
    }

    pub fn uncertainty(&self) -> (f64, f64, Option<f64>) {
        let alt = if self.alt.initialized { Some(self.alt.variance) } else { None };
        (self.lat.variance, self.lng.variance, alt)
    }
}

/// Reference confidence derivation from GPS accuracy and reported speed.
///
/// Combines an accuracy-based score (70% weight) and a speed-based score
/// (30% weight) into a value in `[0.1, 1.0]`. Missing inputs default to a
/// neutral 0.7.
pub fn derive_confidence(accuracy_m: Option<f64>, speed_mps: Option<f64>) -> f64 {
    let accuracy_score = match accuracy_m {
        Some(a) if a <= 3.0 => 1.0,
        Some(a) if a <= 5.0 => 0.9,
        Some(a) if a <= 10.0 => 0.7,
        Some(a) if a <= 20.0 => 0.5,
        Some(_) => 0.3,
        None => 0.7,
    };

    let speed_score = match speed_mps {
        Some(s) if s < 0.5 => 0.8,
        Some(s) if s < 1.0 => 0.9,
        Some(s) if s < 5.0 => 1.0,
        Some(s) if s < 15.0 => 0.95,
        Some(_) => 0.8,
        None => 0.9,
    };

    (0.7 * accuracy_score + 0.3 * speed_score).clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_snaps_to_measurement() {
        let mut filter = KalmanFilter3D::new(KalmanConfig::default());
        filter.update(37.5, 127.0, Some(50.0), 0.9);
        let (lat, lng, alt) = filter.current_position();
        assert!((lat - 37.5).abs() < 1e-9);
        assert!((lng - 127.0).abs() < 1e-9);
        assert_eq!(alt, Some(50.0));
    }

    #[test]
    fn test_converges_on_stationary_noisy_samples() {
        let mut filter = KalmanFilter3D::new(KalmanConfig::default());
        let true_lat = 37.5;
        let true_lng = 127.0;
        // Alternate +/- a small noise offset around the true position.
        let noise = 0.00005; // roughly 5m at this latitude
        for i in 0..20 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            filter.update(true_lat + sign * noise, true_lng + sign * noise, None, 0.7);
        }
        let (lat, lng, _) = filter.current_position();
        assert!((lat - true_lat).abs() < 0.001);
        assert!((lng - true_lng).abs() < 0.001);
    }

    #[test]
    fn test_altitude_absent_preserves_prior_estimate() {
        let mut filter = KalmanFilter3D::new(KalmanConfig::default());
        filter.update(37.5, 127.0, Some(50.0), 0.9);
        filter.update(37.5001, 127.0001, None, 0.9);
        let (_, _, alt) = filter.current_position();
        assert_eq!(alt, Some(50.0));
    }

    #[test]
    fn test_no_altitude_ever_observed_is_none() {
        let mut filter = KalmanFilter3D::new(KalmanConfig::default());
        filter.update(37.5, 127.0, None, 0.9);
        let (_, _, alt) = filter.current_position();
        assert_eq!(alt, None);
    }

    #[test]
    fn test_derive_confidence_bounds() {
        assert!(derive_confidence(Some(1.0), Some(2.0)) > 0.9);
        assert!(derive_confidence(Some(50.0), Some(20.0)) < 0.6);
        let c = derive_confidence(None, None);
        assert!(c >= 0.1 && c <= 1.0);
    }
}
