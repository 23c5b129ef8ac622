//! # Islamic Prayer Time Calculation
//!
//! This module computes the six daily prayer/marker times (Fajr, Sunrise,
//! Dhuhr, Asr, Maghrib, Isha) from geographic coordinates, a calendar date,
//! and an IANA timezone, using the standard astronomical method:
//!
//! 1. Evaluate the low-precision solar ephemeris ([`crate::solar`]) at the
//!    local noon of the requested date.
//! 2. Solve the hour-angle equation for each depression-angle event
//!    (`cos H = (sin(-θ) - sin φ · sin δ) / (cos φ · cos δ)`).
//! 3. Derive Dhuhr from the equation of time, Asr from the juristic
//!    shadow-factor equation, and Isha either from an angle or as a fixed
//!    offset after Maghrib depending on the calculation method.
//! 4. Convert hour angles to clock times (`12 ∓ H/15`, plus the timezone
//!    and longitude correction) and round to the nearest minute.
//!
//! ## Calculation methods
//!
//! Seven juristic conventions are supported, each a fixed parameter row
//! (dawn/dusk depression angles, optional Maghrib angle, Isha rule). The
//! Jafari method is the only one where Maghrib is an angle event rather
//! than sunset itself.
//!
//! ## High latitudes
//!
//! Above roughly 48° the sun may never reach the required depression angle
//! near the solstices. A [`HighLatitudeRule`] substitutes a night-fraction
//! clamp in that case; with [`HighLatitudeRule::None`] the affected prayers
//! are listed in [`PrayerTimes::unsolved`] instead of being silently wrong.

use crate::solar::{julian_day, solar_position};
use chrono::{DateTime, Duration, NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::str::FromStr;
use thiserror::Error;

/// Errors rejected at input validation, before any computation is attempted.
#[derive(Error, Debug, PartialEq)]
pub enum PrayerError {
    /// Latitude outside [-90, 90] or longitude outside [-180, 180]
    #[error("invalid coordinate: lat {latitude}, lon {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Timezone string is empty or not a known IANA identifier
    #[error("invalid timezone: {0:?}")]
    InvalidTimezone(String),
}

/// Immutable calculation input: where, when, and in which civil timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTime {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, [-180, 180]
    pub longitude: f64,
    /// Calendar date the times are computed for
    pub date: NaiveDate,
    /// IANA timezone identifier (e.g. "Asia/Baghdad")
    pub timezone: String,
}

/// The six daily events, in fixed chronological order.
///
/// Sunrise is a marker (end of the Fajr window), not an obligatory prayer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PrayerTime {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerTime {
    /// All six events in chronological order.
    pub const ALL: [PrayerTime; 6] = [
        PrayerTime::Fajr,
        PrayerTime::Sunrise,
        PrayerTime::Dhuhr,
        PrayerTime::Asr,
        PrayerTime::Maghrib,
        PrayerTime::Isha,
    ];

    /// True for the five obligatory prayers; false only for Sunrise.
    pub fn is_prayer(self) -> bool {
        self != PrayerTime::Sunrise
    }

    /// The next event in sequence, wrapping from Isha to the next day's Fajr.
    pub fn next(self) -> PrayerTime {
        match self {
            PrayerTime::Fajr => PrayerTime::Sunrise,
            PrayerTime::Sunrise => PrayerTime::Dhuhr,
            PrayerTime::Dhuhr => PrayerTime::Asr,
            PrayerTime::Asr => PrayerTime::Maghrib,
            PrayerTime::Maghrib => PrayerTime::Isha,
            PrayerTime::Isha => PrayerTime::Fajr,
        }
    }

    pub fn english_name(self) -> &'static str {
        match self {
            PrayerTime::Fajr => "Fajr",
            PrayerTime::Sunrise => "Sunrise",
            PrayerTime::Dhuhr => "Dhuhr",
            PrayerTime::Asr => "Asr",
            PrayerTime::Maghrib => "Maghrib",
            PrayerTime::Isha => "Isha",
        }
    }

    pub fn arabic_name(self) -> &'static str {
        match self {
            PrayerTime::Fajr => "الفجر",
            PrayerTime::Sunrise => "الشروق",
            PrayerTime::Dhuhr => "الظهر",
            PrayerTime::Asr => "العصر",
            PrayerTime::Maghrib => "المغرب",
            PrayerTime::Isha => "العشاء",
        }
    }
}

/// How a method defines Isha: a solar depression angle, or a fixed number
/// of minutes after Maghrib. Exactly one applies per method, which the sum
/// type enforces structurally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IshaRule {
    /// Isha when the sun is this many degrees below the horizon
    Angle(f64),
    /// Isha at a fixed offset after Maghrib (Umm Al-Qura convention)
    MinutesAfterMaghrib(i64),
}

/// Fixed parameter row for one calculation method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodParameters {
    /// Dawn depression angle in degrees below the horizon
    pub fajr_angle: f64,
    /// Isha definition (angle or fixed minutes)
    pub isha: IshaRule,
    /// Maghrib depression angle; `None` means Maghrib = sunset.
    /// Only Jafari uses a non-zero angle here.
    pub maghrib_angle: Option<f64>,
    /// Midpoint-of-night convention: midnight is halfway from sunset to the
    /// next dawn rather than to the next sunrise.
    pub uses_jafari_midnight: bool,
}

/// The supported juristic calculation conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationMethod {
    Jafari,
    Mwl,
    Isna,
    Egypt,
    Makkah,
    Karachi,
    Tehran,
}

impl CalculationMethod {
    /// The angle/offset table for this method.
    pub fn parameters(self) -> MethodParameters {
        use CalculationMethod::*;
        match self {
            Jafari => MethodParameters {
                fajr_angle: 16.0,
                isha: IshaRule::Angle(14.0),
                maghrib_angle: Some(4.0),
                uses_jafari_midnight: true,
            },
            Mwl => MethodParameters {
                fajr_angle: 18.0,
                isha: IshaRule::Angle(17.0),
                maghrib_angle: None,
                uses_jafari_midnight: false,
            },
            Isna => MethodParameters {
                fajr_angle: 15.0,
                isha: IshaRule::Angle(15.0),
                maghrib_angle: None,
                uses_jafari_midnight: false,
            },
            Egypt => MethodParameters {
                fajr_angle: 19.5,
                isha: IshaRule::Angle(17.5),
                maghrib_angle: None,
                uses_jafari_midnight: false,
            },
            Makkah => MethodParameters {
                fajr_angle: 18.5,
                isha: IshaRule::MinutesAfterMaghrib(90),
                maghrib_angle: None,
                uses_jafari_midnight: false,
            },
            Karachi => MethodParameters {
                fajr_angle: 18.0,
                isha: IshaRule::Angle(18.0),
                maghrib_angle: None,
                uses_jafari_midnight: false,
            },
            Tehran => MethodParameters {
                fajr_angle: 17.7,
                isha: IshaRule::Angle(14.0),
                maghrib_angle: None,
                uses_jafari_midnight: true,
            },
        }
    }

    pub fn display_name(self) -> &'static str {
        use CalculationMethod::*;
        match self {
            Jafari => "Shia Ithna Ashari (Jafari)",
            Mwl => "Muslim World League",
            Isna => "Islamic Society of North America",
            Egypt => "Egyptian General Authority",
            Makkah => "Umm Al-Qura University, Makkah",
            Karachi => "University of Islamic Sciences, Karachi",
            Tehran => "Institute of Geophysics, Tehran",
        }
    }
}

/// Shadow-length multiple that defines the Asr time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrJuristicMethod {
    /// Shadow = object length + noon shadow (Shafi'i, Maliki, Ja'fari, Hanbali)
    Shafii,
    /// Shadow = 2 × object length + noon shadow
    Hanafi,
}

impl AsrJuristicMethod {
    pub fn shadow_factor(self) -> f64 {
        match self {
            AsrJuristicMethod::Shafii => 1.0,
            AsrJuristicMethod::Hanafi => 2.0,
        }
    }
}

/// Fallback policy when a twilight angle has no solution at this
/// latitude/date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HighLatitudeRule {
    #[serde(rename = "middleOfNight")]
    MiddleOfNight,
    #[serde(rename = "seventhOfNight")]
    SeventhOfNight,
    /// praytimes.org "twilightAngle": night scaled by angle / 60°
    #[serde(rename = "twilightAngle")]
    AngleBased,
    #[serde(rename = "none")]
    None,
}

impl HighLatitudeRule {
    /// Fraction of the night the twilight event may extend into, or `None`
    /// when the caller has opted out of clamping.
    fn night_fraction(self, angle: f64) -> Option<f64> {
        match self {
            HighLatitudeRule::MiddleOfNight => Some(0.5),
            HighLatitudeRule::SeventhOfNight => Some(1.0 / 7.0),
            HighLatitudeRule::AngleBased => Some(angle / 60.0),
            HighLatitudeRule::None => None,
        }
    }
}

/// Computed prayer times for one date/location/method combination.
///
/// Immutable once computed; recompute and replace wholesale when the
/// location, date, or method changes. Entries missing from the map are
/// listed in [`unsolved`](Self::unsolved) (only possible under
/// [`HighLatitudeRule::None`] or during polar day/night).
#[derive(Debug, Clone)]
pub struct PrayerTimes {
    /// The inputs this result was computed from
    pub geo: GeoTime,
    /// Calculation method used
    pub method: CalculationMethod,
    times: BTreeMap<PrayerTime, DateTime<Tz>>,
    /// Prayers whose astronomical equation had no solution and no fallback
    /// rule was selected
    pub unsolved: Vec<PrayerTime>,
    /// Plain sunset, kept for the midnight convention even when Maghrib is
    /// an angle event (Jafari)
    sunset: Option<DateTime<Tz>>,
    uses_jafari_midnight: bool,
}

impl PrayerTimes {
    /// Absolute clock time for one event, if it was solvable.
    pub fn time(&self, prayer: PrayerTime) -> Option<DateTime<Tz>> {
        self.times.get(&prayer).copied()
    }

    /// The five obligatory prayers with their times, sorted chronologically.
    fn sorted_prayers(&self) -> Vec<(PrayerTime, DateTime<Tz>)> {
        let mut entries: Vec<_> = self
            .times
            .iter()
            .filter(|(p, _)| p.is_prayer())
            .map(|(p, t)| (*p, *t))
            .collect();
        entries.sort_by_key(|(_, t)| *t);
        entries
    }

    /// The prayer whose window contains `at`: the last prayer that has
    /// passed. Before Fajr this is yesterday's Isha.
    pub fn current_prayer(&self, at: DateTime<Tz>) -> PrayerTime {
        for (prayer, time) in self.sorted_prayers().into_iter().rev() {
            if time <= at {
                return prayer;
            }
        }
        PrayerTime::Isha
    }

    /// The next upcoming prayer after `at`. After Isha this is tomorrow's
    /// Fajr.
    pub fn next_prayer(&self, at: DateTime<Tz>) -> PrayerTime {
        for (prayer, time) in self.sorted_prayers() {
            if time > at {
                return prayer;
            }
        }
        PrayerTime::Fajr
    }

    /// Time remaining until the next prayer, wrapping past Isha into the
    /// next day's Fajr. `None` only when no prayer was solvable at all.
    pub fn time_until_next_prayer(&self, at: DateTime<Tz>) -> Option<Duration> {
        let next = self.next_prayer(at);
        let time = self.time(next)?;
        if time > at {
            Some(time - at)
        } else {
            // All of today's prayers have passed; next is tomorrow's Fajr
            Some(time + Duration::days(1) - at)
        }
    }

    /// Islamic midnight: the midpoint of the night. Under the Jafari
    /// convention the night runs from sunset to the next dawn; otherwise
    /// from sunset to the next sunrise.
    pub fn midnight(&self) -> Option<DateTime<Tz>> {
        let sunset = self.sunset?;
        let night_end = if self.uses_jafari_midnight {
            self.time(PrayerTime::Fajr)? + Duration::days(1)
        } else {
            self.time(PrayerTime::Sunrise)? + Duration::days(1)
        };
        let half = (night_end - sunset).num_seconds() / 2;
        Some(sunset + Duration::seconds(half))
    }
}

/// Intermediate solar-time values in hours from local midnight, before
/// clock conversion. `None` means the hour-angle equation had no solution.
struct SolarDay {
    declination: f64,
    dhuhr: f64,
}

impl SolarDay {
    /// Solve `cos H = (sin(-θ) - sin φ sin δ) / (cos φ cos δ)` and convert
    /// the hour angle to solar hours. Morning events fall before Dhuhr,
    /// evening events after.
    fn angle_time(&self, angle_deg: f64, latitude: f64, morning: bool) -> Option<f64> {
        let lat = latitude * PI / 180.0;
        let decl = self.declination * PI / 180.0;
        let theta = angle_deg * PI / 180.0;

        let cos_h = ((-theta).sin() - lat.sin() * decl.sin()) / (lat.cos() * decl.cos());
        if !(-1.0..=1.0).contains(&cos_h) {
            return None;
        }

        let h = cos_h.acos() * 180.0 / PI;
        Some(if morning {
            self.dhuhr - h / 15.0
        } else {
            self.dhuhr + h / 15.0
        })
    }

    /// Asr: the instant the shadow of an object equals `factor × length`
    /// plus its noon shadow. Expressed as an equivalent (negative)
    /// depression angle and fed through the same hour-angle solver.
    fn asr_time(&self, shadow_factor: f64, latitude: f64) -> Option<f64> {
        let lat = latitude * PI / 180.0;
        let decl = self.declination * PI / 180.0;

        let angle = -(1.0 / (shadow_factor + (lat - decl).abs().tan())).atan();
        self.angle_time(angle * 180.0 / PI, latitude, false)
    }
}

/// Depression angle for sunrise/sunset: solar radius plus mean refraction.
const HORIZON_ANGLE: f64 = 0.833;

/// Compute prayer times for one date and location.
///
/// Pure and stateless: no shared state, no blocking calls, completes
/// synchronously. `adjustments` holds per-prayer additive minute offsets
/// for local mosque convention; missing entries mean zero.
///
/// Input validation failures return an error; an unsolvable twilight angle
/// under [`HighLatitudeRule::None`] does not — the affected prayers are
/// listed in [`PrayerTimes::unsolved`] and the rest of the result stays
/// valid.
pub fn compute_prayer_times(
    geo: &GeoTime,
    method: CalculationMethod,
    asr_method: AsrJuristicMethod,
    high_lat_rule: HighLatitudeRule,
    adjustments: &BTreeMap<PrayerTime, i64>,
) -> Result<PrayerTimes, PrayerError> {
    if !geo.latitude.is_finite()
        || !geo.longitude.is_finite()
        || geo.latitude.abs() > 90.0
        || geo.longitude.abs() > 180.0
    {
        return Err(PrayerError::InvalidCoordinate {
            latitude: geo.latitude,
            longitude: geo.longitude,
        });
    }

    let tz = Tz::from_str(&geo.timezone)
        .map_err(|_| PrayerError::InvalidTimezone(geo.timezone.clone()))?;

    // Civil offset at (approximately) noon of the requested date. DST
    // transitions never land mid-day in practice, so the approximation of
    // probing at 12:00 UT is safely below the one-minute rounding.
    let noon_naive = geo
        .date
        .and_hms_opt(12, 0, 0)
        .expect("12:00:00 is always a valid time");
    let tz_hours =
        tz.offset_from_utc_datetime(&noon_naive).fix().local_minus_utc() as f64 / 3600.0;

    // Solar ephemeris at local noon
    let jd_local_noon = julian_day(geo.date) + (12.0 - tz_hours) / 24.0;
    let sun = solar_position(jd_local_noon);

    let day = SolarDay {
        declination: sun.declination_deg,
        dhuhr: 12.0 - sun.equation_of_time_hours,
    };

    let params = method.parameters();

    let sunrise = day.angle_time(HORIZON_ANGLE, geo.latitude, true);
    let sunset = day.angle_time(HORIZON_ANGLE, geo.latitude, false);

    let mut fajr = day.angle_time(params.fajr_angle, geo.latitude, true);
    let asr = day.asr_time(asr_method.shadow_factor(), geo.latitude);

    let mut maghrib = match params.maghrib_angle {
        Some(angle) => day.angle_time(angle, geo.latitude, false),
        None => sunset,
    };

    let mut isha = match params.isha {
        IshaRule::Angle(angle) => day.angle_time(angle, geo.latitude, false),
        IshaRule::MinutesAfterMaghrib(min) => maghrib.map(|m| m + min as f64 / 60.0),
    };

    // High-latitude clamping. Requires a real sunrise/sunset pair to define
    // the night; during polar day/night even the fallback has no anchor and
    // the events stay unsolved.
    if let (Some(rise), Some(set)) = (sunrise, sunset) {
        let night = 24.0 - (set - rise);

        fajr = clamp_twilight(fajr, rise, params.fajr_angle, night, true, high_lat_rule);
        if let Some(angle) = params.maghrib_angle {
            maghrib = clamp_twilight(maghrib, set, angle, night, false, high_lat_rule);
        }
        if let IshaRule::Angle(angle) = params.isha {
            isha = clamp_twilight(isha, set, angle, night, false, high_lat_rule);
        }
    }

    let mut times = BTreeMap::new();
    let mut unsolved = Vec::new();
    let solved = [
        (PrayerTime::Fajr, fajr),
        (PrayerTime::Sunrise, sunrise),
        (PrayerTime::Dhuhr, Some(day.dhuhr)),
        (PrayerTime::Asr, asr),
        (PrayerTime::Maghrib, maghrib),
        (PrayerTime::Isha, isha),
    ];

    for (prayer, solar_hours) in solved {
        match solar_hours {
            Some(hours) => {
                // Solar time → civil clock time, plus the manual offset
                let clock = hours + tz_hours - geo.longitude / 15.0;
                let offset_min = adjustments.get(&prayer).copied().unwrap_or(0);
                times.insert(prayer, to_local_time(geo.date, clock, offset_min, tz));
            }
            None => unsolved.push(prayer),
        }
    }

    let sunset_clock = sunset.map(|hours| {
        to_local_time(geo.date, hours + tz_hours - geo.longitude / 15.0, 0, tz)
    });

    Ok(PrayerTimes {
        geo: geo.clone(),
        method,
        times,
        unsolved,
        sunset: sunset_clock,
        uses_jafari_midnight: params.uses_jafari_midnight,
    })
}

/// Apply a high-latitude rule to one twilight event.
///
/// praytimes.org semantics: substitute the night-fraction bound both when
/// the equation had no solution and when the solved time falls outside the
/// allowed fraction of the night.
fn clamp_twilight(
    time: Option<f64>,
    base: f64,
    angle: f64,
    night_hours: f64,
    morning: bool,
    rule: HighLatitudeRule,
) -> Option<f64> {
    let Some(fraction) = rule.night_fraction(angle) else {
        return time;
    };
    let portion = fraction * night_hours;

    match time {
        Some(t) => {
            let gap = if morning { base - t } else { t - base };
            if gap > portion {
                Some(if morning { base - portion } else { base + portion })
            } else {
                Some(t)
            }
        }
        None => Some(if morning { base - portion } else { base + portion }),
    }
}

/// Convert fractional clock hours on `date` to a timezone-aware instant,
/// rounded to the nearest minute. Hours outside [0, 24) roll into the
/// adjacent day (a clamped Isha can cross midnight).
fn to_local_time(date: NaiveDate, clock_hours: f64, offset_min: i64, tz: Tz) -> DateTime<Tz> {
    let total_min = (clock_hours * 60.0).round() as i64 + offset_min;
    let days = total_min.div_euclid(24 * 60);
    let minutes = total_min.rem_euclid(24 * 60);

    let naive = (date + Duration::days(days))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        + Duration::minutes(minutes);

    // A DST gap can swallow a wall-clock minute; take the nearest valid
    // interpretation rather than failing.
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(t) => t,
        chrono::LocalResult::Ambiguous(earliest, _) => earliest,
        chrono::LocalResult::None => tz.from_utc_datetime(&naive),
    }
}
