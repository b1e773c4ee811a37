use std::num::NonZeroU32;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_codes::{CodedError, INVALID_CONFIG};

/// How a remainder of zero is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStyle {
    /// `0` is shown as the modulus itself ("100" instead of "00").
    WrapToModulus,
    /// The remainder is printed as-is, width 1, no padding.
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelRule {
    pub modulus: NonZeroU32,
    pub style: LabelStyle,
}

impl LabelRule {
    pub fn new(modulus: u32, style: LabelStyle) -> Result<Self> {
        let modulus = NonZeroU32::new(modulus).ok_or_else(|| {
            anyhow!(CodedError::usage(INVALID_CONFIG, "label modulus must be > 0")
                .with_details(json!({ "field": "label.modulus", "provided": modulus })))
        })?;
        Ok(Self { modulus, style })
    }

    /// Hundred-second countdown where the wraparound reads "100".
    pub fn hundred() -> Self {
        Self {
            modulus: NonZeroU32::MIN.saturating_add(99),
            style: LabelStyle::WrapToModulus,
        }
    }

    /// Seconds-of-minute countdown, no wraparound substitution.
    pub fn sixty() -> Self {
        Self {
            modulus: NonZeroU32::MIN.saturating_add(59),
            style: LabelStyle::Plain,
        }
    }

    pub fn label(&self, remaining_time: u64) -> String {
        label(remaining_time, *self)
    }
}

impl Default for LabelRule {
    fn default() -> Self {
        Self::hundred()
    }
}

/// Display string for one second of the countdown.
pub fn label(remaining_time: u64, rule: LabelRule) -> String {
    let modulus = u64::from(rule.modulus.get());
    let remainder = remaining_time % modulus;
    match rule.style {
        LabelStyle::WrapToModulus if remainder == 0 => modulus.to_string(),
        LabelStyle::WrapToModulus => remainder.to_string(),
        LabelStyle::Plain => format!("{remainder:01}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{label, LabelRule, LabelStyle};

    #[test]
    fn wraparound_shows_modulus_instead_of_zero() {
        let rule = LabelRule::hundred();
        assert_eq!(label(100, rule), "100");
        assert_eq!(label(0, rule), "100");
        assert_eq!(label(200, rule), "100");
        assert_eq!(label(101, rule), "1");
        assert_eq!(label(57, rule), "57");
    }

    #[test]
    fn plain_style_shows_zero_unpadded() {
        let rule = LabelRule::sixty();
        assert_eq!(label(0, rule), "0");
        assert_eq!(label(60, rule), "0");
        assert_eq!(label(5, rule), "5");
        assert_eq!(label(125, rule), "5");
    }

    #[test]
    fn labels_never_exceed_modulus() {
        for modulus in [1_u32, 7, 60, 100] {
            for style in [LabelStyle::WrapToModulus, LabelStyle::Plain] {
                let rule = LabelRule::new(modulus, style).expect("modulus is non-zero");
                for remaining in 0..(u64::from(modulus) * 3) {
                    let value: u64 = label(remaining, rule)
                        .parse()
                        .expect("label should be an integer");
                    assert!(value <= u64::from(modulus), "{value} > {modulus}");
                }
            }
        }
    }

    #[test]
    fn zero_modulus_is_rejected() {
        let error = LabelRule::new(0, LabelStyle::Plain).expect_err("zero modulus must fail");
        assert!(error.to_string().contains("modulus"));
    }
}
