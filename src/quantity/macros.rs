macro_rules! quantity {
    ($(#[$attr:meta])* $name:ident, suffix: $suffix:literal, precision: $precision:literal) => {
        $(#[$attr])*
        #[repr(transparent)]
        #[must_use]
        #[derive(
            ::derive_more::Add,
            ::derive_more::AddAssign,
            ::derive_more::FromStr,
            ::derive_more::Neg,
            ::derive_more::Sub,
            ::derive_more::SubAssign,
            ::derive_more::Sum,
            ::serde::Deserialize,
            ::serde::Serialize,
            ::std::clone::Clone,
            ::std::marker::Copy,
        )]
        pub struct $name(pub f64);

        impl $crate::quantity::Zero for $name {
            const ZERO: Self = Self(0.0);
        }

        impl $name {
            #[must_use]
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            #[must_use]
            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            #[must_use]
            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            #[must_use]
            pub fn clamp(self, min: Self, max: Self) -> Self {
                Self(self.0.clamp(min.0, max.0))
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(formatter, concat!("{:.", $precision, "} ", $suffix), self.0)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, formatter: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(formatter, concat!("{:.", $precision, "}", $suffix), self.0)
            }
        }

        ordered_float!($name);

        impl ::std::ops::Mul<f64> for $name {
            type Output = Self;

            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl ::std::ops::Div<f64> for $name {
            type Output = Self;

            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl ::std::ops::Div<Self> for $name {
            type Output = f64;

            fn div(self, rhs: Self) -> Self::Output {
                self.0 / rhs.0
            }
        }
    };
}

macro_rules! mul {
    ($lhs:ident, $rhs:ident, $output:ident) => {
        impl ::std::ops::Mul<$rhs> for $lhs {
            type Output = $output;

            fn mul(self, rhs: $rhs) -> Self::Output {
                $output(self.0 * rhs.0)
            }
        }

        impl ::std::ops::Mul<$lhs> for $rhs {
            type Output = $output;

            fn mul(self, rhs: $lhs) -> Self::Output {
                $output(self.0 * rhs.0)
            }
        }
    };
}

macro_rules! ordered_float {
    ($name:path) => {
        impl ::std::cmp::PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<::std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl ::std::cmp::Ord for $name {
            fn cmp(&self, other: &Self) -> ::std::cmp::Ordering {
                ::ordered_float::OrderedFloat(self.0).cmp(&::ordered_float::OrderedFloat(other.0))
            }
        }

        impl ::std::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                ::ordered_float::OrderedFloat(self.0).eq(&::ordered_float::OrderedFloat(other.0))
            }
        }

        impl ::std::cmp::Eq for $name {}
    };
}
