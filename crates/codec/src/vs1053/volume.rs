//! Volume, balance and tone register math
//!
//! SCI_VOL holds attenuation in 0.5 dB steps per channel (0 = loudest,
//! 254 = silent). The volume setting is linear (0..=1000), so the mapping
//! goes through a coarse log table sampled every 2 % and interpolated
//! between neighbours.

use super::registers::{
    BASS_FREQLIMIT, SB_AMPLITUDE_SHIFT, ST_AMPLITUDE_SHIFT, ST_FREQLIMIT_SHIFT, TREBLE_FREQLIMIT,
};

/// Full-scale volume / balance setting.
pub const SCALE_MAX: u16 = 1000;

/// Balance setting for equal left and right.
pub const BALANCE_CENTER: u16 = 500;

/// Volume applied until the upper half configures one (25 %).
pub const DEFAULT_VOLUME: u16 = 250;

/// Tone level ceiling in percent.
pub const TONE_MAX: u8 = 100;

/// Attenuation for 0 %, 2 %, 4 % … 100 % of full volume.
const LOG_TABLE: [u8; 51] = [
    254, 170, 140, 122, 110, // 0 - 8
    100, 92, 85, 80, 74, // 10 - 18
    70, 66, 62, 59, 55, // 20 - 28
    52, 49, 47, 44, 42, // 30 - 38
    40, 38, 36, 34, 32, // 40 - 48
    30, 28, 27, 25, 24, // 50 - 58
    22, 21, 19, 18, 17, // 60 - 68
    15, 14, 13, 12, 11, // 70 - 78
    10, 9, 8, 7, 6, // 80 - 88
    5, 4, 3, 2, 1, // 90 - 98
    0, // 100
];

/// Attenuation register value for a volume percentage.
///
/// Averages the two table entries that bracket `percent`; 100 % and above
/// is 0 (no attenuation).
#[allow(clippy::cast_possible_truncation)] // average of two u8 values fits in u8
pub fn log_approx(percent: u16) -> u8 {
    if percent >= 100 {
        return 0;
    }
    let lower = LOG_TABLE.get(usize::from(percent >> 1)).copied().unwrap_or(0);
    let upper = LOG_TABLE
        .get(usize::from(percent.saturating_add(1) >> 1))
        .copied()
        .unwrap_or(0);
    (u16::from(lower).saturating_add(u16::from(upper)) >> 1) as u8
}

/// Per-channel linear level (0..=1000) for a volume and balance.
///
/// Balance below center attenuates the right channel, above center the
/// left. Both inputs are clamped to [`SCALE_MAX`].
pub fn channel_levels(volume: u16, balance: u16) -> (u16, u16) {
    let volume = u32::from(volume.min(SCALE_MAX));
    let balance = u32::from(balance.min(SCALE_MAX));
    let center = u32::from(BALANCE_CENTER);

    let left = if balance <= center {
        volume
    } else {
        volume
            .saturating_mul(u32::from(SCALE_MAX).saturating_sub(balance))
            .checked_div(center)
            .unwrap_or(0)
    };
    let right = if balance >= center {
        volume
    } else {
        volume
            .saturating_mul(balance)
            .checked_div(center)
            .unwrap_or(0)
    };

    // Both are bounded by `volume`, which is at most 1000.
    #[allow(clippy::cast_possible_truncation)]
    (left as u16, right as u16)
}

/// SCI_VOL value: left attenuation in the high byte, right in the low byte.
pub fn volume_register(volume: u16, balance: u16) -> u16 {
    let (left, right) = channel_levels(volume, balance);
    let left = log_approx(left / 10);
    let right = log_approx(right / 10);
    u16::from(left) << 8 | u16::from(right)
}

/// Boost step (0..=15) for a tone level percentage.
fn boost(level: u8) -> u16 {
    let level = u16::from(level.min(TONE_MAX));
    level.saturating_mul(15) / 100
}

/// SCI_BASS value for bass and treble levels in percent.
///
/// Both enhancers use their widest frequency limit; only the amplitude
/// follows the level.
pub fn bass_register(bass: u8, treble: u8) -> u16 {
    boost(treble) << ST_AMPLITUDE_SHIFT
        | TREBLE_FREQLIMIT << ST_FREQLIMIT_SHIFT
        | boost(bass) << SB_AMPLITUDE_SHIFT
        | BASS_FREQLIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_endpoints() {
        assert_eq!(log_approx(0), 254);
        assert_eq!(log_approx(100), 0);
        assert_eq!(log_approx(250), 0);
    }

    #[test]
    fn odd_percent_interpolates() {
        // 1 % sits between 254 (0 %) and 170 (2 %)
        assert_eq!(log_approx(1), 212);
        assert_eq!(log_approx(2), 170);
    }

    #[test]
    fn centered_balance_keeps_both_channels() {
        assert_eq!(channel_levels(600, BALANCE_CENTER), (600, 600));
    }

    #[test]
    fn hard_balance_silences_one_side() {
        assert_eq!(channel_levels(800, 0), (800, 0));
        assert_eq!(channel_levels(800, SCALE_MAX), (0, 800));
        assert_eq!(channel_levels(800, 750), (400, 800));
    }

    #[test]
    fn default_volume_register() {
        // 25 % → (table[12] + table[13]) / 2 = (62 + 59) / 2 = 60
        assert_eq!(volume_register(DEFAULT_VOLUME, BALANCE_CENTER), 0x3C3C);
    }

    #[test]
    fn full_volume_is_no_attenuation() {
        assert_eq!(volume_register(SCALE_MAX, BALANCE_CENTER), 0x0000);
    }

    #[test]
    fn flat_tone_register() {
        assert_eq!(bass_register(0, 0), 0x0F0F);
    }

    #[test]
    fn full_tone_register() {
        assert_eq!(bass_register(100, 100), 0xFFFF);
        assert_eq!(bass_register(200, 50), 0x7FFF);
    }
}
