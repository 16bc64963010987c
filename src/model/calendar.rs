//! Indonesian calendar labels used by the ledger: `1 Jan 2026` style short dates and the
//! `Malam <weekday>` night names that kamling shifts are filed under.

use chrono::{Datelike, NaiveDate, Weekday};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

/// Formats `date` the way `id-ID` short dates read, e.g. `31 Des 2025`.
pub fn short_date(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

/// The Indonesian name of a weekday.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Senin",
        Weekday::Tue => "Selasa",
        Weekday::Wed => "Rabu",
        Weekday::Thu => "Kamis",
        Weekday::Fri => "Jumat",
        Weekday::Sat => "Sabtu",
        Weekday::Sun => "Minggu",
    }
}

/// The night a patrol on `date` belongs to. The evening of a Thursday is `Malam Jumat`.
pub fn night_of(date: NaiveDate) -> String {
    format!("Malam {}", weekday_name(date.weekday().succ()))
}

/// Today's date as a short date, in local time.
pub(crate) fn today() -> String {
    short_date(chrono::Local::now().date_naive())
}
