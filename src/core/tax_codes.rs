//! IVA rate codes (`codigoPorcentaje`).
//!
//! Every line carries a percentage; the authority identifies the rate by a
//! code from its catalog. Rates without a catalog entry are reported under
//! the 15% code, the general rate since April 2024.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// `codigo` for IVA in `impuesto` / `totalImpuesto`.
pub const IVA_TAX_CODE: &str = "2";

/// `codigoPorcentaje` for IVA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaxRateCode {
    /// 0: 0%.
    Zero,
    /// 2: 12%.
    Twelve,
    /// 3: 14%.
    Fourteen,
    /// 4: 15%.
    Fifteen,
    /// 5: 5%.
    Five,
    /// 8: 8% (reduced rate for tourism holidays).
    Eight,
    /// 10: 13%.
    Thirteen,
}

impl TaxRateCode {
    /// Code used when a rate has no catalog entry.
    pub const FALLBACK: Self = Self::Fifteen;

    pub fn code(&self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::Twelve => "2",
            Self::Fourteen => "3",
            Self::Fifteen => "4",
            Self::Five => "5",
            Self::Eight => "8",
            Self::Thirteen => "10",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(Self::Zero),
            "2" => Some(Self::Twelve),
            "3" => Some(Self::Fourteen),
            "4" => Some(Self::Fifteen),
            "5" => Some(Self::Five),
            "8" => Some(Self::Eight),
            "10" => Some(Self::Thirteen),
            _ => None,
        }
    }

    /// Nominal percentage for this code.
    pub fn rate(&self) -> Decimal {
        match self {
            Self::Zero => dec!(0),
            Self::Twelve => dec!(12),
            Self::Fourteen => dec!(14),
            Self::Fifteen => dec!(15),
            Self::Five => dec!(5),
            Self::Eight => dec!(8),
            Self::Thirteen => dec!(13),
        }
    }

    /// Exact catalog lookup.
    pub fn lookup(rate: Decimal) -> Option<Self> {
        let rate = rate.normalize();
        [
            Self::Zero,
            Self::Twelve,
            Self::Fourteen,
            Self::Fifteen,
            Self::Five,
            Self::Eight,
            Self::Thirteen,
        ]
        .into_iter()
        .find(|c| c.rate() == rate)
    }

    /// Catalog lookup with fallback to [`TaxRateCode::FALLBACK`].
    pub fn for_rate(rate: Decimal) -> Self {
        Self::lookup(rate).unwrap_or(Self::FALLBACK)
    }
}
