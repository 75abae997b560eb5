//! Signal report estimates derived from modem quality and SNR
//!
//! fldigi reports a 0-100 quality figure for the decoder and prints the
//! signal-to-noise ratio in its status bar. Neither is a calibrated signal
//! report, so the RST/RSQ strings are labelled estimates.

/// Parse the SNR figure out of a status line such as `"s/n 12 dB"` or
/// `"s/n -3.5 dB, imd -25 dB"`.
///
/// # Examples
/// ```
/// use digishell_core::signal::parse_snr;
///
/// assert_eq!(parse_snr("s/n 12 dB"), Some(12.0));
/// assert_eq!(parse_snr("S/N -3.5 dB"), Some(-3.5));
/// assert_eq!(parse_snr("imd -25 dB"), None);
/// ```
pub fn parse_snr(line: &str) -> Option<f64> {
    let lower = line.to_ascii_lowercase();
    let start = lower.find("s/n")? + 3;
    let rest = lower[start..].trim_start_matches([' ', ':', '=']);
    let end = rest
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && matches!(c, '-' | '+'))))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// Readability digit (1-5) from decoder quality
pub fn readability(quality: f64) -> u8 {
    match quality {
        q if q >= 80.0 => 5,
        q if q >= 60.0 => 4,
        q if q >= 40.0 => 3,
        q if q >= 20.0 => 2,
        _ => 1,
    }
}

/// Strength digit (1-9) from SNR: 9 at 30 dB and above, one unit per 4 dB below
pub fn strength(snr: Option<f64>) -> u8 {
    let Some(snr) = snr else {
        return 1;
    };
    if snr >= 30.0 {
        return 9;
    }
    let drop = ((30.0 - snr) / 4.0).ceil();
    (9.0 - drop).clamp(1.0, 9.0) as u8
}

/// RSQ quality digit (1-9) from decoder quality
pub fn quality_digit(quality: f64) -> u8 {
    ((quality / 100.0) * 9.0).round().clamp(1.0, 9.0) as u8
}

/// RST estimate, tone fixed at 9 for digital modes
pub fn rst_estimate(quality: Option<f64>, snr: Option<f64>) -> Option<String> {
    let quality = quality?;
    Some(format!("{}{}9", readability(quality), strength(snr)))
}

pub fn rsq_estimate(quality: Option<f64>, snr: Option<f64>) -> Option<String> {
    let quality = quality?;
    Some(format!(
        "{}{}{}",
        readability(quality),
        strength(snr),
        quality_digit(quality)
    ))
}
