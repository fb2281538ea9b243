//! Conversions between time budgets, target resolutions and power-of-two
//! resolution dividers.
//!
//! Render time is assumed to be proportional to the number of pixels, so a
//! resolution divider of 2 brings the render time down by a factor of 4.

/// Target resolution which disables downsampling.
pub const UNLIMITED_RESOLUTION: u32 = u32::MAX;

/// Smallest resolution divider which brings `actual_time` at or below
/// `desired_time`.
pub fn resolution_divider_for_time(desired_time: f64, mut actual_time: f64) -> u32 {
    let mut resolution_divider: u32 = 1;
    while actual_time > desired_time {
        let Some(next) = resolution_divider.checked_mul(2) else {
            break;
        };
        resolution_divider = next;
        actual_time /= 4.0;
    }
    resolution_divider
}

/// Smallest resolution divider which brings the pixel count of a
/// `width`x`height` buffer at or below `resolution`².
pub fn resolution_divider_for_resolution(width: u32, height: u32, resolution: u32) -> u32 {
    if resolution == UNLIMITED_RESOLUTION {
        return 1;
    }

    let target_pixels = u64::from(resolution) * u64::from(resolution);
    let (mut width, mut height) = (width, height);
    let mut resolution_divider: u32 = 1;
    while u64::from(width) * u64::from(height) > target_pixels && (width > 1 || height > 1) {
        width = (width / 2).max(1);
        height = (height / 2).max(1);
        resolution_divider <<= 1;
    }
    resolution_divider
}

/// Square-equivalent resolution of a `width`x`height` buffer rendered with the
/// given divider.
pub fn resolution_for_divider(width: u32, height: u32, resolution_divider: u32) -> u32 {
    let pixel_area = u64::from(width) * u64::from(height);
    let resolution = (pixel_area as f64).sqrt().round() as u32;
    resolution / resolution_divider.max(1)
}

/// Rounds the number of samples to the closest power of two, preferring the
/// higher one on ties.
pub fn round_num_samples_to_power_of_2(num_samples: u32) -> u32 {
    if num_samples <= 1 {
        return 1;
    }
    if num_samples.is_power_of_two() {
        return num_samples;
    }

    let Some(num_samples_up) = num_samples.checked_next_power_of_two() else {
        return 1 << 31;
    };
    let num_samples_down = num_samples_up >> 1;

    let delta_up = num_samples_up - num_samples;
    let delta_down = num_samples - num_samples_down;
    if delta_up <= delta_down {
        num_samples_up
    } else {
        num_samples_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_closest_power_of_two() {
        assert_eq!(round_num_samples_to_power_of_2(1), 1);
        assert_eq!(round_num_samples_to_power_of_2(8), 8);
        assert_eq!(round_num_samples_to_power_of_2(6), 8);
        assert_eq!(round_num_samples_to_power_of_2(5), 4);
        assert_eq!(round_num_samples_to_power_of_2(3), 4);
        assert_eq!(round_num_samples_to_power_of_2(100), 128);
        assert_eq!(round_num_samples_to_power_of_2(90), 64);
        assert_eq!(round_num_samples_to_power_of_2(u32::MAX), 1 << 31);
    }

    #[test]
    fn divider_for_time() {
        assert_eq!(resolution_divider_for_time(1.0, 1.0), 1);
        assert_eq!(resolution_divider_for_time(1.0, 0.5), 1);
        assert_eq!(resolution_divider_for_time(1.0, 5.0), 4);
        assert_eq!(resolution_divider_for_time(1.0, 4.0), 2);
        assert_eq!(resolution_divider_for_time(1.0, 16.5), 8);
    }

    #[test]
    fn divider_for_time_terminates_on_zero_budget() {
        assert_eq!(resolution_divider_for_time(0.0, 1.0), 1 << 31);
    }

    #[test]
    fn divider_for_resolution() {
        assert_eq!(resolution_divider_for_resolution(2000, 1000, 1000), 2);
        assert_eq!(resolution_divider_for_resolution(1000, 1000, 1000), 1);
        assert_eq!(resolution_divider_for_resolution(1920, 1080, 64), 32);
        assert_eq!(resolution_divider_for_resolution(64, 64, 64), 1);
        assert_eq!(
            resolution_divider_for_resolution(8000, 8000, UNLIMITED_RESOLUTION),
            1
        );
    }

    #[test]
    fn divider_for_resolution_terminates_on_zero_target() {
        assert_eq!(resolution_divider_for_resolution(4, 4, 0), 4);
    }

    #[test]
    fn resolution_for_divider_uses_square_equivalent() {
        assert_eq!(resolution_for_divider(1000, 1000, 1), 1000);
        assert_eq!(resolution_for_divider(1000, 1000, 4), 250);
        assert_eq!(resolution_for_divider(2000, 500, 2), 500);
    }
}
