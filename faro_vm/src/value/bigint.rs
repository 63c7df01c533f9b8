//! BigInt values: arbitrary-precision integers backed by `num-bigint`.

use num_bigint::BigInt;
use std::rc::Rc;

/// Reference-counted so cloning a `Value::BigInt` is cheap; BigInts are
/// immutable once constructed, matching the spec's value semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsBigInt(pub Rc<BigInt>);

impl JsBigInt {
    pub fn from_i64(v: i64) -> Self {
        Self(Rc::new(BigInt::from(v)))
    }

    pub fn from_digits(digits: &str) -> Option<Self> {
        digits
            .parse::<BigInt>()
            .ok()
            .map(|b| Self(Rc::new(b)))
    }

    pub fn to_string_radix(&self, radix: u32) -> String {
        self.0.to_str_radix(radix)
    }

    pub fn is_zero(&self) -> bool {
        use num_traits::Zero;
        self.0.is_zero()
    }
}

impl std::fmt::Display for JsBigInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
