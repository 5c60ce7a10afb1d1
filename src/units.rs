//! This module defines the unit types used by the storage model and their conversions.
#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

/// Number of gigabytes in a terabyte, as used for checkpoint volumes
pub const GIGABYTES_PER_TERABYTE: f64 = 1024.0;

/// Number of terabytes in a petabyte, as used for HDD pool sizes
pub const TERABYTES_PER_PETABYTE: f64 = 1000.0;

/// Number of seconds in an hour
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Represents a dimensionless quantity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Default,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::Sub,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct Dimensionless(pub f64);

impl Dimensionless {
    /// Returns the underlying f64 value.
    pub fn value(self) -> f64 {
        self.0
    }
}

impl std::ops::Mul for Dimensionless {
    type Output = Dimensionless;

    fn mul(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 * rhs.0)
    }
}

impl std::ops::Div for Dimensionless {
    type Output = Dimensionless;

    fn div(self, rhs: Dimensionless) -> Self::Output {
        Dimensionless(self.0 / rhs.0)
    }
}

impl From<f64> for Dimensionless {
    fn from(val: f64) -> Self {
        Self(val)
    }
}

impl From<Dimensionless> for f64 {
    fn from(val: Dimensionless) -> Self {
        val.0
    }
}

macro_rules! unit_struct {
    ($name:ident) => {
        /// Represents a type of quantity.
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Default,
            Serialize,
            Deserialize,
            derive_more::Add,
            derive_more::Sub,
            derive_more::Display,
        )]
        #[serde(transparent)]
        pub struct $name(pub f64);

        impl $name {
            /// Creates a new instance of the unit type from a f64 value.
            pub fn new(val: f64) -> Self {
                Self(val)
            }

            /// Returns the value of the unit type as a f64.
            pub fn value(self) -> f64 {
                self.0
            }

            /// Whether the underlying value is finite (i.e. not infinite or NaN)
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }

            /// The larger of `self` and `other`
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            /// The smaller of `self` and `other`
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }
        }

        impl std::ops::Mul<Dimensionless> for $name {
            type Output = $name;
            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Mul<$name> for Dimensionless {
            type Output = $name;
            fn mul(self, rhs: $name) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl std::ops::Div<Dimensionless> for $name {
            type Output = $name;
            fn div(self, rhs: Dimensionless) -> $name {
                $name(self.0 / rhs.0)
            }
        }

        impl std::ops::Div<$name> for $name {
            type Output = Dimensionless;
            fn div(self, rhs: $name) -> Dimensionless {
                Dimensionless(self.0 / rhs.0)
            }
        }
    };
}

macro_rules! impl_mul {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Mul<$Rhs> for $Lhs {
            type Output = $Out;
            fn mul(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 * rhs.0)
            }
        }
        impl std::ops::Mul<$Lhs> for $Rhs {
            type Output = $Out;
            fn mul(self, lhs: $Lhs) -> $Out {
                <$Out>::new(self.0 * lhs.0)
            }
        }
    };
}

macro_rules! impl_div {
    ($Lhs:ty, $Rhs:ty, $Out:ty) => {
        impl std::ops::Div<$Rhs> for $Lhs {
            type Output = $Out;
            fn div(self, rhs: $Rhs) -> $Out {
                <$Out>::new(self.0 / rhs.0)
            }
        }
    };
}

// Base quantities
unit_struct!(Terabytes);
unit_struct!(Petabytes);
unit_struct!(Gigabytes);
unit_struct!(Seconds);
unit_struct!(Hours);
unit_struct!(Money);

// Derived quantities
unit_struct!(GigabytesPerSecond);
unit_struct!(MoneyPerTerabyte);
unit_struct!(MoneyPerHour);

// Division rules
impl_div!(Gigabytes, GigabytesPerSecond, Seconds);
impl_div!(Money, Terabytes, MoneyPerTerabyte);

// Multiplication rules
impl_mul!(MoneyPerTerabyte, Terabytes, Money);
impl_mul!(MoneyPerHour, Hours, Money);

impl Terabytes {
    /// Convert to gigabytes
    pub fn to_gigabytes(self) -> Gigabytes {
        Gigabytes(self.0 * GIGABYTES_PER_TERABYTE)
    }
}

impl Petabytes {
    /// Convert to terabytes
    pub fn to_terabytes(self) -> Terabytes {
        Terabytes(self.0 * TERABYTES_PER_PETABYTE)
    }
}

impl Seconds {
    /// Convert to hours
    pub fn to_hours(self) -> Hours {
        Hours(self.0 / SECONDS_PER_HOUR)
    }
}
