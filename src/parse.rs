//! Field parsers for résumé export cells.
//!
//! Every parser is total: input it cannot interpret maps to `None` (or a
//! tuple of `None`s), never to an error. Parsers take raw cell text and run
//! [`clean_text`] themselves, so they can be applied to cleaned or uncleaned
//! values alike.

use chrono::{NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WS_RE: Regex = compile(r"\s+");
    static ref AGE_RE: Regex = compile(r"(\d+)\s*(?:год|лет)");
    // Thousands groups separated by single spaces form one number ("27 000").
    static ref NUMBER_RE: Regex = compile(r"\d{1,3}(?: \d{3})+|\d+");
    static ref EXPERIENCE_RE: Regex =
        compile(r"опыт работы\s+(\d+)\s*(?:года|год|лет)(?:\s+(\d+)\s*(?:месяц|мес))?");
    static ref EXPERIENCE_MONTHS_RE: Regex = compile(r"опыт работы\s+(\d+)\s*(?:месяц|мес)");
}

/// # Panics
/// Panics if a pattern literal in this module is invalid.
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

/// Marker meaning "not specified" in several source columns.
const NOT_SPECIFIED: &str = "не указ";

/// Currency markers in priority order; the first substring found wins.
const CURRENCY_MARKERS: [(&str, Currency); 7] = [
    ("руб", Currency::Rub),
    ("rub", Currency::Rub),
    ("р.", Currency::Rub),
    ("usd", Currency::Usd),
    ("$", Currency::Usd),
    ("eur", Currency::Eur),
    ("€", Currency::Eur),
];

const DATETIME_FORMATS: [&str; 4] = [
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: [&str; 2] = ["%d.%m.%Y", "%Y-%m-%d"];

/// Normalizes whitespace in a cell.
///
/// Non-breaking and thin spaces become plain spaces, the value is trimmed,
/// and any run of whitespace collapses to a single ASCII space.
pub fn clean_text(text: &str) -> String {
    let replaced = text.replace(['\u{00A0}', '\u{2009}'], " ");
    WS_RE.replace_all(replaced.trim(), " ").into_owned()
}

/// Gender marker parsed from the combined gender/age column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    /// Male marker.
    Male,
    /// Female marker.
    Female,
}

impl Gender {
    /// The code written into the `gender` feature column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

/// Currency detected in a salary cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    /// Russian ruble, the local currency.
    Rub,
    /// US dollar.
    Usd,
    /// Euro.
    Eur,
}

impl Currency {
    /// ISO code written into the `salary_currency` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rub => "RUB",
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }
}

/// Parsed salary: an amount and its currency, each possibly missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Salary {
    /// The amount, if any number could be extracted.
    pub value: Option<i64>,
    /// The currency, if a marker was found or a number was present.
    pub currency: Option<Currency>,
}

impl Salary {
    /// The amount only when it is expressed in rubles; no conversion is done.
    pub fn rub_value(&self) -> Option<i64> {
        match self.currency {
            Some(Currency::Rub) => self.value,
            _ => None,
        }
    }
}

/// City plus the two readiness flags from the city column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CityFlags {
    /// First non-empty comma-separated segment.
    pub city: Option<String>,
    /// Ready to relocate, if stated either way.
    pub relocation: Option<bool>,
    /// Ready for business trips, if stated either way.
    pub business_trips: Option<bool>,
}

/// Education level bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EducationLevel {
    /// Higher education.
    Higher,
    /// Secondary special education.
    SecondarySpecial,
    /// Secondary education.
    Secondary,
    /// Anything else that is specified.
    Other,
}

impl EducationLevel {
    /// Label written into the `education_level` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Higher => "higher",
            Self::SecondarySpecial => "secondary_special",
            Self::Secondary => "secondary",
            Self::Other => "other",
        }
    }
}

/// Parses a cell such as `"Мужчина, 33 года"` into gender and age.
pub fn parse_gender_age(text: &str) -> (Option<Gender>, Option<i64>) {
    let t = clean_text(text).to_lowercase();
    let gender = if t.contains("муж") {
        Some(Gender::Male)
    } else if t.contains("жен") {
        Some(Gender::Female)
    } else {
        None
    };
    let age = AGE_RE
        .captures(&t)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok());
    (gender, age)
}

/// Parses a salary cell such as `"27 000 руб."` or `"по договоренности"`.
pub fn parse_salary(text: &str) -> Salary {
    let t = clean_text(text).to_lowercase();
    if t.is_empty() || t.contains(NOT_SPECIFIED) || t.contains("договор") {
        return Salary::default();
    }

    let currency = CURRENCY_MARKERS
        .iter()
        .find(|(marker, _)| t.contains(marker))
        .map(|(_, currency)| *currency);

    let nums: Vec<i64> = NUMBER_RE
        .find_iter(&t)
        .filter_map(|m| m.as_str().replace(' ', "").parse::<i64>().ok())
        .collect();
    let Some(&first) = nums.first() else {
        return Salary {
            value: None,
            currency,
        };
    };

    // "до N" alone keeps its number; "N до M" is a range and takes the midpoint.
    let value = match nums.get(1) {
        Some(&second) if !t.contains("от") => midpoint(first, second),
        _ => first,
    };

    Salary {
        value: Some(value),
        currency: Some(currency.unwrap_or(Currency::Rub)),
    }
}

/// Rounded midpoint, ties to even.
fn midpoint(a: i64, b: i64) -> i64 {
    let sum = i128::from(a) + i128::from(b);
    let half = sum.div_euclid(2);
    let mid = if sum.rem_euclid(2) == 1 && half % 2 != 0 {
        half + 1
    } else {
        half
    };
    i64::try_from(mid).unwrap_or(i64::MAX)
}

/// Parses a cell such as `"Москва, готов к переезду, не готов к командировкам"`.
pub fn parse_city_flags(text: &str) -> CityFlags {
    let t = clean_text(text);
    if t.is_empty() {
        return CityFlags::default();
    }
    let city = t
        .split(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
        .map(str::to_string);

    let lower = t.to_lowercase();
    CityFlags {
        city,
        relocation: phrase_flag(&lower, "не готов к переезду", "готов к переезду"),
        business_trips: phrase_flag(&lower, "не готов к командировкам", "готов к командировкам"),
    }
}

// The negative phrase contains the positive one, so it is checked first.
fn phrase_flag(text: &str, negative: &str, positive: &str) -> Option<bool> {
    if text.contains(negative) {
        Some(false)
    } else if text.contains(positive) {
        Some(true)
    } else {
        None
    }
}

/// Total experience in months from text like `"Опыт работы 6 лет 1 месяц"`.
pub fn parse_experience_months(text: &str) -> Option<i64> {
    let t = clean_text(text).to_lowercase();
    if t.is_empty() {
        return None;
    }
    if let Some(caps) = EXPERIENCE_RE.captures(&t) {
        let years = caps.get(1)?.as_str().parse::<i64>().ok()?;
        let months = caps
            .get(2)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0);
        return years.checked_mul(12)?.checked_add(months);
    }
    EXPERIENCE_MONTHS_RE
        .captures(&t)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Buckets an education cell; `None` means not specified.
pub fn parse_education(text: &str) -> Option<EducationLevel> {
    let t = clean_text(text).to_lowercase();
    if t.is_empty() || t.contains(NOT_SPECIFIED) {
        return None;
    }
    let level = if t.contains("высшее") {
        EducationLevel::Higher
    } else if t.contains("среднее специальное") {
        EducationLevel::SecondarySpecial
    } else if t.contains("среднее") {
        EducationLevel::Secondary
    } else {
        EducationLevel::Other
    };
    Some(level)
}

/// Car ownership: `None` when not specified, otherwise whether a car is owned.
pub fn parse_has_car(text: &str) -> Option<bool> {
    let t = clean_text(text).to_lowercase();
    if t.is_empty() || t.contains(NOT_SPECIFIED) {
        return None;
    }
    Some(t.contains("имеется") || t.contains("собственн"))
}

/// Parses a résumé update stamp (day first) into seconds since the Unix epoch.
pub fn parse_resume_date(text: &str) -> Option<i64> {
    let t = clean_text(text);
    if t.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&t, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&t, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_unicode_spaces() {
        assert_eq!(clean_text("  27\u{00A0}000\u{2009}руб.  "), "27 000 руб.");
        assert_eq!(clean_text("a\t\n  b"), "a b");
        assert_eq!(clean_text("   "), "");
    }

    #[test]
    fn test_gender_age_male_with_age() {
        assert_eq!(
            parse_gender_age("Мужчина ,  33 года"),
            (Some(Gender::Male), Some(33))
        );
        assert_eq!(parse_gender_age("Мужчина, 33 года"), (Some(Gender::Male), Some(33)));
    }

    #[test]
    fn test_gender_age_female_without_age() {
        assert_eq!(parse_gender_age("Женщина"), (Some(Gender::Female), None));
    }

    #[test]
    fn test_gender_age_plural_years() {
        assert_eq!(parse_gender_age("Женщина , 27 лет"), (Some(Gender::Female), Some(27)));
    }

    #[test]
    fn test_gender_age_unknown() {
        assert_eq!(parse_gender_age(""), (None, None));
        assert_eq!(parse_gender_age("n/a"), (None, None));
        assert_eq!(parse_gender_age("Женщина, 41 год, родилась 1 мая"), (Some(Gender::Female), Some(41)));
    }

    #[test]
    fn test_salary_grouped_digits() {
        let salary = parse_salary("27 000 руб.");
        assert_eq!(salary.value, Some(27000));
        assert_eq!(salary.currency, Some(Currency::Rub));
        assert_eq!(salary.rub_value(), Some(27000));
    }

    #[test]
    fn test_salary_bare_numbers_are_not_joined() {
        assert_eq!(parse_salary("27 000").value, Some(27000));
        assert_eq!(parse_salary("40000 60000").value, Some(50000));
        assert_eq!(parse_salary("40000 60000 руб.").value, Some(50000));
    }

    #[test]
    fn test_salary_nbsp_grouping() {
        assert_eq!(parse_salary("120\u{00A0}000 руб.").value, Some(120_000));
    }

    #[test]
    fn test_salary_from_marker() {
        let salary = parse_salary("от 50000");
        assert_eq!(salary.value, Some(50000));
        assert_eq!(salary.currency, Some(Currency::Rub));
    }

    #[test]
    fn test_salary_to_marker() {
        assert_eq!(parse_salary("до 60000 руб.").value, Some(60000));
        assert_eq!(parse_salary("40000 до 60000").value, Some(50000));
        assert_eq!(parse_salary("от 30 000 до 50 000 руб.").value, Some(30000));
    }

    #[test]
    fn test_salary_midpoint_without_markers() {
        assert_eq!(parse_salary("40000 - 60000").value, Some(50000));
        assert_eq!(parse_salary("40000-60000 руб.").value, Some(50000));
        // ties go to the even neighbour
        assert_eq!(parse_salary("1-4").value, Some(2));
        assert_eq!(parse_salary("1-2").value, Some(2));
    }

    #[test]
    fn test_salary_negotiable_is_missing() {
        assert_eq!(parse_salary("по договоренности"), Salary::default());
        assert_eq!(parse_salary("з/п не указана"), Salary::default());
        assert_eq!(parse_salary(""), Salary::default());
    }

    #[test]
    fn test_salary_foreign_currency_not_converted() {
        let salary = parse_salary("1 500 USD");
        assert_eq!(salary.value, Some(1500));
        assert_eq!(salary.currency, Some(Currency::Usd));
        assert_eq!(salary.rub_value(), None);

        let salary = parse_salary("2000 €");
        assert_eq!(salary.currency, Some(Currency::Eur));
        assert_eq!(salary.rub_value(), None);
    }

    #[test]
    fn test_salary_marker_without_number() {
        let salary = parse_salary("руб.");
        assert_eq!(salary.value, None);
        assert_eq!(salary.currency, Some(Currency::Rub));

        assert_eq!(parse_salary("дорого"), Salary::default());
    }

    #[test]
    fn test_city_flags() {
        let flags = parse_city_flags("Москва , готов к переезду , не готов к командировкам");
        assert_eq!(flags.city.as_deref(), Some("Москва"));
        assert_eq!(flags.relocation, Some(true));
        assert_eq!(flags.business_trips, Some(false));
    }

    #[test]
    fn test_city_flags_negative_relocation() {
        let flags = parse_city_flags("Казань, не готов к переезду, готов к командировкам");
        assert_eq!(flags.relocation, Some(false));
        assert_eq!(flags.business_trips, Some(true));
    }

    #[test]
    fn test_city_flags_absent_phrases_are_unknown() {
        let flags = parse_city_flags(", Самара");
        assert_eq!(flags.city.as_deref(), Some("Самара"));
        assert_eq!(flags.relocation, None);
        assert_eq!(flags.business_trips, None);
        assert_eq!(parse_city_flags(" "), CityFlags::default());
    }

    #[test]
    fn test_experience_years_and_months() {
        assert_eq!(parse_experience_months("Опыт работы 6 лет 1 месяц"), Some(73));
        assert_eq!(
            parse_experience_months("Опыт работы 1 год 10 месяцев  Ноябрь 2018"),
            Some(22)
        );
        assert_eq!(parse_experience_months("Опыт работы 3 года"), Some(36));
    }

    #[test]
    fn test_experience_months_only() {
        assert_eq!(parse_experience_months("Опыт работы 11 месяцев"), Some(11));
    }

    #[test]
    fn test_experience_missing() {
        assert_eq!(parse_experience_months(""), None);
        assert_eq!(parse_experience_months("Не указано"), None);
    }

    #[test]
    fn test_education_precedence() {
        assert_eq!(
            parse_education("Высшее образование 2010 МГУ"),
            Some(EducationLevel::Higher)
        );
        assert_eq!(
            parse_education("Среднее специальное образование"),
            Some(EducationLevel::SecondarySpecial)
        );
        assert_eq!(parse_education("Среднее образование"), Some(EducationLevel::Secondary));
        assert_eq!(parse_education("Неоконченное"), Some(EducationLevel::Other));
        assert_eq!(parse_education("Не указано"), None);
        assert_eq!(parse_education(""), None);
    }

    #[test]
    fn test_has_car() {
        assert_eq!(parse_has_car("Имеется собственный автомобиль"), Some(true));
        assert_eq!(parse_has_car("Не указано"), None);
        assert_eq!(parse_has_car(""), None);
        assert_eq!(parse_has_car("Нет"), Some(false));
    }

    #[test]
    fn test_resume_date_day_first() {
        // 2019-04-16 15:59:00 UTC
        assert_eq!(parse_resume_date("16.04.2019 15:59"), Some(1_555_430_340));
        assert_eq!(parse_resume_date("01.02.2019"), Some(1_548_979_200));
        assert_eq!(parse_resume_date("2019-02-01"), Some(1_548_979_200));
    }

    #[test]
    fn test_resume_date_unparsable() {
        assert_eq!(parse_resume_date("вчера"), None);
        assert_eq!(parse_resume_date("32.13.2019"), None);
        assert_eq!(parse_resume_date(""), None);
    }
}
