//! Low-precision solar ephemeris (USNO almanac approximation)
//!
//! Provides the three astronomical quantities prayer-time calculation needs:
//! the Julian day number, the Sun's declination, and the equation of time.
//! Accuracy is a few hundredths of a degree in declination and well under a
//! minute in the equation of time for the years 1950–2050, which is more than
//! sufficient for clock times rounded to the nearest minute.
//!
//! Reference: "Approximate Solar Coordinates", US Naval Observatory
//! Astronomical Almanac low-precision series; the same formula set used by
//! the praytimes.org family of prayer-time calculators.

use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;

/// Solar quantities for one instant, as needed by the hour-angle equations.
#[derive(Debug, Clone, Copy)]
pub struct SolarPosition {
    /// Apparent declination of the Sun in degrees.
    pub declination_deg: f64,
    /// Equation of time in hours (apparent minus mean solar time).
    pub equation_of_time_hours: f64,
}

/// Julian day number for a proleptic-Gregorian calendar date at 00:00 UT.
///
/// Standard Fliegel/Van Flandern-style integer formula with the Gregorian
/// century correction. Add a day fraction for instants after midnight.
pub fn julian_day(date: NaiveDate) -> f64 {
    let (mut y, mut m) = (date.year() as f64, date.month() as f64);
    let d = date.day() as f64;

    if m <= 2.0 {
        y -= 1.0;
        m += 12.0;
    }

    let a = (y / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();

    (365.25 * (y + 4716.0)).floor() + (30.6001 * (m + 1.0)).floor() + d + b - 1524.5
}

/// Sun declination and equation of time for a given Julian day (UT).
///
/// `jd` may carry a day fraction; evaluating at the local noon of the date
/// under calculation keeps intra-day declination drift below the rounding
/// threshold of the final clock times.
pub fn solar_position(jd: f64) -> SolarPosition {
    // Days from epoch J2000.0
    let d = jd - 2451545.0;

    // Mean anomaly and mean ecliptic longitude of the Sun (degrees)
    let g = fix_angle(357.529 + 0.98560028 * d);
    let q = fix_angle(280.459 + 0.98564736 * d);

    // Apparent ecliptic longitude
    let l = fix_angle(q + 1.915 * sin_deg(g) + 0.020 * sin_deg(2.0 * g));

    // Mean obliquity of the ecliptic
    let e = 23.439 - 0.00000036 * d;

    let declination_deg = asin_deg(sin_deg(e) * sin_deg(l));

    // Right ascension in hours, kept in the same quadrant as L
    let ra = atan2_deg(cos_deg(e) * sin_deg(l), cos_deg(l)) / 15.0;
    let ra = fix_hour(ra);

    let equation_of_time_hours = fix_eqt(q / 15.0 - ra);

    SolarPosition {
        declination_deg,
        equation_of_time_hours,
    }
}

/// Normalize an angle into [0, 360) degrees.
fn fix_angle(a: f64) -> f64 {
    a.rem_euclid(360.0)
}

/// Normalize an hour value into [0, 24).
fn fix_hour(h: f64) -> f64 {
    h.rem_euclid(24.0)
}

/// Center the equation of time around zero (it never exceeds ±~17 minutes,
/// but the raw `q/15 - ra` difference can wrap by a full day).
fn fix_eqt(e: f64) -> f64 {
    let e = e.rem_euclid(24.0);
    if e > 12.0 {
        e - 24.0
    } else {
        e
    }
}

fn sin_deg(x: f64) -> f64 {
    (x * PI / 180.0).sin()
}

fn cos_deg(x: f64) -> f64 {
    (x * PI / 180.0).cos()
}

fn asin_deg(x: f64) -> f64 {
    x.asin() * 180.0 / PI
}

fn atan2_deg(y: f64, x: f64) -> f64 {
    y.atan2(x) * 180.0 / PI
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn julian_day_j2000_epoch() {
        // J2000.0 is 2000-01-01 12:00 TT; at 00:00 the JD is 2451544.5
        let jd = julian_day(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert!((jd - 2451544.5).abs() < 1e-9, "got {jd}");
    }

    #[test]
    fn julian_day_handles_january_shift() {
        // 1987-01-27 00:00 UT → 2446822.5 (Meeus, Astronomical Algorithms)
        let jd = julian_day(NaiveDate::from_ymd_opt(1987, 1, 27).unwrap());
        assert!((jd - 2446822.5).abs() < 1e-9, "got {jd}");
    }

    #[test]
    fn declination_at_solstices_and_equinox() {
        let jd_jun = julian_day(NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()) + 0.5;
        let jd_dec = julian_day(NaiveDate::from_ymd_opt(2024, 12, 21).unwrap()) + 0.5;
        let jd_mar = julian_day(NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()) + 0.5;

        let summer = solar_position(jd_jun).declination_deg;
        let winter = solar_position(jd_dec).declination_deg;
        let equinox = solar_position(jd_mar).declination_deg;

        assert!((summer - 23.44).abs() < 0.1, "summer decl {summer}");
        assert!((winter + 23.44).abs() < 0.1, "winter decl {winter}");
        assert!(equinox.abs() < 0.5, "equinox decl {equinox}");
    }

    #[test]
    fn equation_of_time_stays_within_physical_bounds() {
        // EoT oscillates within roughly ±16.5 minutes over the year
        for day in 0..365 {
            let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
            let jd = julian_day(base + chrono::Duration::days(day)) + 0.5;
            let eqt_min = solar_position(jd).equation_of_time_hours * 60.0;
            assert!(
                (-17.0..=17.0).contains(&eqt_min),
                "day {day}: eqt {eqt_min} min"
            );
        }
    }

    #[test]
    fn equation_of_time_november_peak() {
        // Early November carries the largest positive EoT (~16.4 min)
        let jd = julian_day(NaiveDate::from_ymd_opt(2024, 11, 3).unwrap()) + 0.5;
        let eqt_min = solar_position(jd).equation_of_time_hours * 60.0;
        assert!((15.5..=17.0).contains(&eqt_min), "eqt {eqt_min} min");
    }
}
