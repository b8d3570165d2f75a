//! Identifier formats and template rendering.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::SequenceType;
use crate::error::RepositoryError;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Z]+)\}").unwrap_or_else(|err| panic!("invalid token pattern: {err}"))
});

const CHECK_TOKEN: &str = "{C}";

/// How a sequence value is turned into a human-facing identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceFormat {
    pub prefix: String,
    pub include_year: bool,
    /// 2 or 4
    pub year_digits: u8,
    pub include_month: bool,
    /// Replaces the month with the ISO week number
    pub include_week_number: bool,
    pub include_day: bool,
    /// Zero padding width of the counter, 1..=18
    pub sequence_digits: u8,
    pub include_location_code: bool,
    pub location_code: String,
    pub include_business_unit_code: bool,
    pub business_unit_code: String,
    pub include_random_digits: bool,
    /// 0..=10
    pub random_digits_count: u8,
    pub include_check_digit: bool,
    pub use_separators: bool,
    pub separator_char: String,
    pub allow_custom_format: bool,
    /// Template with `{P}`, `{Y}`, `{YY}`, `{YYYY}`, `{M}`, `{W}`, `{D}`,
    /// `{L}`, `{B}`, `{S}`, `{R}` and `{C}` tokens
    pub custom_format: String,
}

impl Default for SequenceFormat {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            include_year: true,
            year_digits: 2,
            include_month: true,
            include_week_number: false,
            include_day: false,
            sequence_digits: 4,
            include_location_code: false,
            location_code: String::new(),
            include_business_unit_code: false,
            business_unit_code: String::new(),
            include_random_digits: false,
            random_digits_count: 0,
            include_check_digit: false,
            use_separators: false,
            separator_char: "-".to_string(),
            allow_custom_format: false,
            custom_format: String::new(),
        }
    }
}

impl SequenceFormat {
    /// Built-in format for `sequence_type`.
    pub fn default_for(sequence_type: SequenceType) -> Self {
        match sequence_type {
            SequenceType::ProNumber => Self::freight("S"),
            SequenceType::Consolidation => Self::freight("C"),
            SequenceType::Invoice => Self {
                prefix: "INV".to_string(),
                year_digits: 4,
                sequence_digits: 6,
                include_check_digit: true,
                use_separators: true,
                ..Self::default()
            },
            SequenceType::WorkOrder => Self {
                prefix: "WO".to_string(),
                sequence_digits: 6,
                use_separators: true,
                ..Self::default()
            },
        }
    }

    fn freight(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            include_location_code: true,
            location_code: "12".to_string(),
            include_random_digits: true,
            random_digits_count: 6,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        if !matches!(self.year_digits, 2 | 4) {
            return Err(RepositoryError::internal(format!(
                "year digits must be 2 or 4, got {}",
                self.year_digits
            )));
        }
        if !(1..=18).contains(&self.sequence_digits) {
            return Err(RepositoryError::internal(format!(
                "sequence digits must be between 1 and 18, got {}",
                self.sequence_digits
            )));
        }
        if self.random_digits_count > 10 {
            return Err(RepositoryError::internal(format!(
                "random digits must be between 0 and 10, got {}",
                self.random_digits_count
            )));
        }
        if self.use_separators && self.separator_char.chars().count() > 1 {
            return Err(RepositoryError::internal(
                "separator must be a single character",
            ));
        }
        if self.allow_custom_format && self.custom_format.trim().is_empty() {
            return Err(RepositoryError::internal(
                "custom format is enabled but empty",
            ));
        }
        Ok(())
    }

    fn uses_template(&self) -> bool {
        self.allow_custom_format && !self.custom_format.is_empty()
    }

    fn separator(&self) -> &str {
        if self.use_separators {
            &self.separator_char
        } else {
            ""
        }
    }

    fn year(&self, at: &DateTime<Utc>) -> String {
        match self.year_digits {
            4 => format!("{:04}", at.year()),
            _ => format!("{:02}", at.year().rem_euclid(100)),
        }
    }

    fn padded(&self, sequence: i64) -> String {
        format!("{:0width$}", sequence, width = usize::from(self.sequence_digits))
    }

    fn random_digits(&self, rng: &mut impl Rng) -> String {
        (0..self.random_digits_count)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    /// Renders `sequence` as of `at`.
    pub fn render(&self, sequence: i64, at: &DateTime<Utc>, rng: &mut impl Rng) -> String {
        if self.uses_template() {
            return self.render_template(sequence, at, rng);
        }

        let mut parts: Vec<String> = Vec::new();
        if !self.prefix.is_empty() {
            parts.push(self.prefix.clone());
        }
        if self.include_business_unit_code && !self.business_unit_code.is_empty() {
            parts.push(self.business_unit_code.clone());
        }
        if self.include_year {
            parts.push(self.year(at));
        }
        if self.include_week_number {
            parts.push(format!("{:02}", at.iso_week().week()));
        } else if self.include_month {
            parts.push(format!("{:02}", at.month()));
        }
        if self.include_day {
            parts.push(format!("{:02}", at.day()));
        }
        if self.include_location_code && !self.location_code.is_empty() {
            parts.push(self.location_code.clone());
        }
        parts.push(self.padded(sequence));
        if self.include_random_digits && self.random_digits_count > 0 {
            parts.push(self.random_digits(rng));
        }

        let separator = self.separator();
        let mut rendered = parts.join(separator);
        if self.include_check_digit {
            let check = luhn_check_digit(&rendered);
            rendered.push_str(separator);
            rendered.push(char::from(b'0' + check));
        }
        rendered
    }

    fn render_template(&self, sequence: i64, at: &DateTime<Utc>, rng: &mut impl Rng) -> String {
        let rendered = TOKEN
            .replace_all(&self.custom_format, |caps: &Captures<'_>| {
                match &caps[1] {
                    "P" => self.prefix.clone(),
                    "Y" => self.year(at),
                    "YY" => format!("{:02}", at.year().rem_euclid(100)),
                    "YYYY" => format!("{:04}", at.year()),
                    "M" => format!("{:02}", at.month()),
                    "W" => format!("{:02}", at.iso_week().week()),
                    "D" => format!("{:02}", at.day()),
                    "L" => self.location_code.clone(),
                    "B" => self.business_unit_code.clone(),
                    "S" => self.padded(sequence),
                    "R" => self.random_digits(rng),
                    // {C} is resolved once the rest is known; unknown tokens stay
                    _ => caps[0].to_string(),
                }
            })
            .into_owned();

        if !rendered.contains(CHECK_TOKEN) {
            return rendered;
        }
        let check = luhn_check_digit(&rendered.replace(CHECK_TOKEN, ""));
        rendered.replace(CHECK_TOKEN, &char::from(b'0' + check).to_string())
    }

    /// Checks a rendered identifier against this format.
    pub fn verify(&self, rendered: &str) -> Result<(), RepositoryError> {
        if rendered.is_empty() {
            return Err(RepositoryError::internal("rendered identifier is empty"));
        }

        if self.uses_template() {
            if self.custom_format.contains("{P}") && !rendered.contains(self.prefix.as_str()) {
                return Err(RepositoryError::internal(format!(
                    "identifier {rendered} is missing prefix {}",
                    self.prefix
                )));
            }
            return Ok(());
        }

        if !rendered.starts_with(self.prefix.as_str()) {
            return Err(RepositoryError::internal(format!(
                "identifier {rendered} is missing prefix {}",
                self.prefix
            )));
        }
        if self.include_check_digit && !luhn_valid(rendered) {
            return Err(RepositoryError::internal(format!(
                "identifier {rendered} has an invalid check digit"
            )));
        }
        Ok(())
    }
}

/// Luhn digit to append to the digits of `input`; non-digits are ignored.
pub fn luhn_check_digit(input: &str) -> u8 {
    let sum: u32 = input
        .chars()
        .filter_map(|c| c.to_digit(10))
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { double(d) } else { d })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Whether the digits of `input` end in a valid Luhn check digit.
pub fn luhn_valid(input: &str) -> bool {
    let digits: Vec<u32> = input.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 2 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 1 { double(d) } else { d })
        .sum();
    sum % 10 == 0
}

fn double(d: u32) -> u32 {
    let doubled = d * 2;
    if doubled > 9 { doubled - 9 } else { doubled }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn march_2025() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn pro_number_layout() {
        let format = SequenceFormat::default_for(SequenceType::ProNumber);
        let id = format.render(42, &march_2025(), &mut rng());
        assert_eq!(id.len(), 1 + 2 + 2 + 2 + 4 + 6);
        assert!(id.starts_with("S250312"), "{id}");
        assert_eq!(&id[7..11], "0042");
        assert!(id[11..].chars().all(|c| c.is_ascii_digit()));
        format.verify(&id).unwrap();
    }

    #[test]
    fn invoice_has_separators_and_valid_check_digit() {
        let format = SequenceFormat::default_for(SequenceType::Invoice);
        let id = format.render(7, &march_2025(), &mut rng());
        assert!(id.starts_with("INV-2025-03-000007-"), "{id}");
        assert!(luhn_valid(&id));
        format.verify(&id).unwrap();
    }

    #[test]
    fn work_order_layout() {
        let format = SequenceFormat::default_for(SequenceType::WorkOrder);
        assert_eq!(format.render(12, &march_2025(), &mut rng()), "WO-25-03-000012");
    }

    #[test]
    fn week_number_replaces_month() {
        let format = SequenceFormat {
            prefix: "X".into(),
            include_week_number: true,
            ..SequenceFormat::default()
        };
        assert_eq!(format.render(1, &march_2025(), &mut rng()), "X25110001");
    }

    #[test]
    fn template_tokens_are_substituted() {
        let format = SequenceFormat {
            prefix: "PRO".into(),
            location_code: "ATL".into(),
            allow_custom_format: true,
            custom_format: "{P}/{YYYY}{M}/{L}/{S}/{UNKNOWN}".into(),
            sequence_digits: 5,
            ..SequenceFormat::default()
        };
        assert_eq!(
            format.render(99, &march_2025(), &mut rng()),
            "PRO/202503/ATL/00099/{UNKNOWN}"
        );
    }

    #[test]
    fn template_check_digit_covers_the_rest() {
        let format = SequenceFormat {
            allow_custom_format: true,
            custom_format: "{YY}{S}{C}".into(),
            ..SequenceFormat::default()
        };
        let id = format.render(123, &march_2025(), &mut rng());
        assert_eq!(&id[..6], "250123");
        assert!(luhn_valid(&id), "{id}");
    }

    #[test]
    fn luhn_known_values() {
        assert_eq!(luhn_check_digit("7992739871"), 3);
        assert!(luhn_valid("79927398713"));
        assert!(!luhn_valid("79927398710"));
    }

    #[test]
    fn invalid_formats_are_internal_errors() {
        let bad_year = SequenceFormat {
            year_digits: 3,
            ..SequenceFormat::default()
        };
        assert!(bad_year.validate().is_err());

        let bad_seq = SequenceFormat {
            sequence_digits: 19,
            ..SequenceFormat::default()
        };
        assert!(bad_seq.validate().is_err());

        let bad_random = SequenceFormat {
            random_digits_count: 11,
            ..SequenceFormat::default()
        };
        assert!(bad_random.validate().is_err());

        for ty in [
            SequenceType::ProNumber,
            SequenceType::Consolidation,
            SequenceType::Invoice,
            SequenceType::WorkOrder,
        ] {
            SequenceFormat::default_for(ty).validate().unwrap();
        }
    }
}
